// ==========================================
// 车队表格导入 - 文件解析器实现
// ==========================================
// 职责: 字节流 → 表头 + 原始行（阶段 Parsing）
// 支持: Excel (.xlsx/.xls) / CSV (.csv，自动识别 , ; Tab 分隔)
// 约束: 解析是管道中唯一的阻塞 I/O，一次性完成
// ==========================================

use crate::domain::job::{ImportFormat, ImportInput};
use crate::domain::record::RawRow;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::{FileParser, ParsedSheet};
use calamine::{Data, Range, Reader, Xls, Xlsx};
use chrono::{Duration, NaiveDate, Timelike};
use csv::ReaderBuilder;
use std::io::{Cursor, Read, Seek};

const XLSX_MAGIC: &[u8] = b"PK\x03\x04";
const XLS_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_bytes(&self, bytes: &[u8]) -> ImportResult<ParsedSheet> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ImportError::UnreadableFile(format!("CSV 非 UTF-8 文本: {}", e)))?;
        // 去除 UTF-8 BOM（Excel 导出的 CSV 常带）
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        if text.trim().is_empty() {
            return Ok(ParsedSheet::default());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .delimiter(sniff_delimiter(text))
            .from_reader(text.as_bytes());

        // 读取表头
        let headers = normalize_headers(reader.headers()?.iter().map(str::to_string).collect());

        // 读取所有行
        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            push_row(&mut rows, idx + 1, &headers, record.iter().map(str::to_string));
        }

        Ok(ParsedSheet { headers, rows })
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser {
    format: ImportFormat,
}

impl ExcelParser {
    pub fn xlsx() -> Self {
        Self {
            format: ImportFormat::Xlsx,
        }
    }

    pub fn xls() -> Self {
        Self {
            format: ImportFormat::Xls,
        }
    }
}

impl FileParser for ExcelParser {
    fn parse_bytes(&self, bytes: &[u8]) -> ImportResult<ParsedSheet> {
        let cursor = Cursor::new(bytes.to_vec());

        // 读取第一个 sheet
        let range = match self.format {
            ImportFormat::Xls => {
                let mut workbook: Xls<_> = Xls::new(cursor)?;
                first_sheet_range(&mut workbook)?
            }
            _ => {
                let mut workbook: Xlsx<_> = Xlsx::new(cursor)?;
                first_sheet_range(&mut workbook)?
            }
        };

        // 提取表头（第一行）
        let mut sheet_rows = range.rows();
        let Some(header_row) = sheet_rows.next() else {
            return Ok(ParsedSheet::default());
        };
        let headers = normalize_headers(header_row.iter().map(cell_text).collect());

        // 读取数据行
        let mut rows = Vec::new();
        for (idx, data_row) in sheet_rows.enumerate() {
            push_row(&mut rows, idx + 1, &headers, data_row.iter().map(cell_text));
        }

        Ok(ParsedSheet { headers, rows })
    }
}

fn first_sheet_range<RS, R>(workbook: &mut R) -> ImportResult<Range<Data>>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let sheet_names = workbook.sheet_names();
    let Some(sheet_name) = sheet_names.first().cloned() else {
        return Err(ImportError::UnreadableFile("Excel 文件无工作表".to_string()));
    };

    workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ImportError::UnreadableFile(format!("Excel 解析失败: {}", e)))
}

/// 单元格转文本；日期单元格输出 ISO 格式
fn cell_text(cell: &Data) -> String {
    let text = match cell {
        Data::Empty => String::new(),
        Data::DateTime(dt) => excel_serial_to_iso(dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        other => other.to_string(),
    };
    text.trim().to_string()
}

/// Excel 序列日期（1900 日期系统）→ ISO 文本
///
/// 超出日期范围的序列值原样返回数字文本，由后续校验报告类型错误。
fn excel_serial_to_iso(serial: f64) -> String {
    let fallback = || serial.to_string();
    let Some(midnight) = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return fallback();
    };
    if !serial.is_finite() {
        return fallback();
    }

    let days = serial.floor();
    let seconds = ((serial - days) * 86_400.0).round() as i64;
    let datetime = Duration::try_days(days as i64)
        .and_then(|delta| midnight.checked_add_signed(delta))
        .and_then(|dt| dt.checked_add_signed(Duration::seconds(seconds)));

    match datetime {
        Some(dt) if dt.num_seconds_from_midnight() == 0 => dt.format("%Y-%m-%d").to_string(),
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => fallback(),
    }
}

// ==========================================
// 通用文件解析器（声明格式优先，否则按内容嗅探）
// ==========================================
pub struct UniversalFileParser;

impl UniversalFileParser {
    pub fn parse(&self, input: &ImportInput) -> ImportResult<(ImportFormat, ParsedSheet)> {
        let format = input
            .format
            .or_else(|| sniff_format(&input.bytes))
            .ok_or_else(|| {
                ImportError::UnreadableFile("无法识别的文件格式".to_string())
            })?;

        let sheet = match format {
            ImportFormat::Csv => CsvParser.parse_bytes(&input.bytes)?,
            ImportFormat::Xlsx => ExcelParser::xlsx().parse_bytes(&input.bytes)?,
            ImportFormat::Xls => ExcelParser::xls().parse_bytes(&input.bytes)?,
        };
        Ok((format, sheet))
    }
}

/// 按文件头魔数嗅探格式；合法 UTF-8 文本视为 CSV
pub fn sniff_format(bytes: &[u8]) -> Option<ImportFormat> {
    if bytes.starts_with(XLSX_MAGIC) {
        Some(ImportFormat::Xlsx)
    } else if bytes.starts_with(XLS_MAGIC) {
        Some(ImportFormat::Xls)
    } else if std::str::from_utf8(bytes).is_ok() {
        Some(ImportFormat::Csv)
    } else {
        None
    }
}

/// 按表头行中出现次数选择分隔符
fn sniff_delimiter(text: &str) -> u8 {
    let header_line = text.lines().next().unwrap_or_default();
    let count = |c: char| header_line.matches(c).count();

    [b',', b';', b'\t']
        .into_iter()
        .max_by_key(|d| (count(*d as char), d == &b','))
        .filter(|d| count(*d as char) > 0)
        .unwrap_or(b',')
}

/// 表头规范化：TRIM、空表头补名、大小写不敏感去重
fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut headers: Vec<String> = Vec::with_capacity(raw.len());
    for (idx, header) in raw.into_iter().enumerate() {
        let base = match header.trim() {
            "" => format!("column_{}", idx + 1),
            trimmed => trimmed.to_string(),
        };

        let mut candidate = base.clone();
        let mut n = 2;
        while headers.iter().any(|h| h.eq_ignore_ascii_case(&candidate)) {
            candidate = format!("{} ({})", base, n);
            n += 1;
        }
        headers.push(candidate);
    }
    headers
}

/// 组装原始行；超出表头宽度的单元格命名为 column_<n>
fn push_row<I>(rows: &mut Vec<RawRow>, row_index: usize, headers: &[String], values: I)
where
    I: Iterator<Item = String>,
{
    let cells: Vec<(String, String)> = values
        .enumerate()
        .map(|(col_idx, value)| {
            let name = headers
                .get(col_idx)
                .cloned()
                .unwrap_or_else(|| format!("column_{}", col_idx + 1));
            (name, value.trim().to_string())
        })
        .collect();

    let row = RawRow::new(row_index, cells);
    // 跳过完全空白的行
    if !row.is_blank() {
        rows.push(row);
    }
}
