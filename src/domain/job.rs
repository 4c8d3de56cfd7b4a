// ==========================================
// 车队表格导入 - 导入任务状态与结果
// ==========================================
// 职责: 任务状态机枚举 / 输入描述 / 汇总统计 / 结果快照 / 进度事件
// 状态机: Created → Parsing → Mapping → Validating → Completed
//        任意非终态 → Failed；Parsing/Mapping/Validating → Cancelled
// ==========================================

use crate::domain::mapping::{FrozenColumnMapping, MappingWarning};
use crate::domain::record::{FieldValue, NormalizedRecord, RowError};
use crate::domain::schema::{FieldKey, SchemaRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use uuid::Uuid;

// ==========================================
// JobState - 任务状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Parsing,
    Mapping,
    Validating,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "CREATED",
            JobState::Parsing => "PARSING",
            JobState::Mapping => "MAPPING",
            JobState::Validating => "VALIDATING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// 是否允许取消
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            JobState::Parsing | JobState::Mapping | JobState::Validating
        )
    }

    /// 状态迁移合法性
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Created, Parsing) => true,
            (Parsing, Mapping) => true,
            (Mapping, Validating) => true,
            (Validating, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            (from, Cancelled) => from.is_cancellable(),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// ImportFormat - 表格格式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Xlsx,
    Xls,
    Csv,
}

impl ImportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportFormat::Xlsx => "xlsx",
            ImportFormat::Xls => "xls",
            ImportFormat::Csv => "csv",
        }
    }

    /// 按格式标签或文件扩展名解析
    pub fn from_tag(tag: &str) -> Option<ImportFormat> {
        let tag = tag.trim().trim_start_matches('.').to_lowercase();
        match tag.as_str() {
            "xlsx" => Some(ImportFormat::Xlsx),
            "xls" => Some(ImportFormat::Xls),
            "csv" => Some(ImportFormat::Csv),
            _ => None,
        }
    }
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// ImportInput - 导入输入
// ==========================================
#[derive(Debug, Clone)]
pub struct ImportInput {
    pub bytes: Vec<u8>,
    /// 声明格式；None 表示按内容嗅探
    pub format: Option<ImportFormat>,
    pub file_name: Option<String>,
}

impl ImportInput {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            format: None,
            file_name: None,
        }
    }

    pub fn with_format(mut self, format: ImportFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        if self.format.is_none() {
            self.format = file_name
                .rsplit_once('.')
                .and_then(|(_, ext)| ImportFormat::from_tag(ext));
        }
        self.file_name = Some(file_name);
        self
    }
}

// ==========================================
// MappingMode - 映射确认方式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMode {
    /// 推断完成后自动冻结并进入校验
    #[default]
    Automatic,
    /// 推断完成后停在 Mapping，等待人工覆写与冻结
    AwaitOverrides,
}

// ==========================================
// ImportSummary - 汇总统计
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub rows_seen: usize,
    pub rows_accepted: usize,
    pub rows_rejected: usize,
    pub error_count: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<i64>,
}

impl ImportSummary {
    pub fn rejection_rate(&self) -> f64 {
        if self.rows_seen == 0 {
            0.0
        } else {
            self.rows_rejected as f64 / self.rows_seen as f64
        }
    }
}

// ==========================================
// ImportSnapshot - 已完成任务的原子结果快照
// ==========================================
// 仅在 Completed 时生成，下游只读
#[derive(Debug, Clone, Serialize)]
pub struct ImportSnapshot {
    pub job_id: Uuid,
    pub file_name: Option<String>,
    pub mapping: FrozenColumnMapping,
    pub warnings: Vec<MappingWarning>,
    pub records: Vec<NormalizedRecord>,
    pub errors: Vec<RowError>,
    pub summary: ImportSummary,
}

impl ImportSnapshot {
    pub fn preview(&self, limit: usize) -> &[NormalizedRecord] {
        &self.records[..self.records.len().min(limit)]
    }

    /// 记录中出现的标准字段（按注册顺序）
    pub fn columns(&self) -> Vec<FieldKey> {
        let resolved = self.mapping.resolved_fields();
        SchemaRegistry::global()
            .fields()
            .iter()
            .filter(|spec| spec.required || resolved.contains(&spec.key))
            .map(|spec| spec.key)
            .collect()
    }

    /// 以标准表头导出 CSV
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let columns = self.columns();
        let mut out = csv::Writer::from_writer(writer);

        out.write_record(columns.iter().map(|key| key.as_str()))?;
        for record in &self.records {
            out.write_record(columns.iter().map(|key| {
                record
                    .get(*key)
                    .map(FieldValue::to_string)
                    .unwrap_or_default()
            }))?;
        }
        out.flush()?;
        Ok(())
    }
}

// ==========================================
// ImportOutcome - 任务结果
// ==========================================
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub job_id: Uuid,
    pub state: JobState,
    pub summary: ImportSummary,
    /// Failed 时的单条诊断
    pub failure: Option<String>,
    /// 仅 Completed 时存在
    pub snapshot: Option<Arc<ImportSnapshot>>,
}

// ==========================================
// ProgressEvent - 进度事件
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: Uuid,
    /// 任务内部递增序号
    pub sequence: u64,
    pub state: JobState,
    /// 本事件对应的最后处理行号；状态迁移事件为 None
    pub row_index: Option<usize>,
    pub total_rows: usize,
    pub rows_seen: usize,
    pub rows_accepted: usize,
    pub rows_rejected: usize,
    pub emitted_at: DateTime<Utc>,
}
