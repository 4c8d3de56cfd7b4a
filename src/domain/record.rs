// ==========================================
// 车队表格导入 - 行级数据结构
// ==========================================
// 职责: 原始行 / 标准化记录 / 行级错误
// 生命周期: RawRow 解析后不可变；NormalizedRecord 仅由校验通过的行产生
// ==========================================

use crate::domain::schema::FieldKey;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// RawRow - 原始行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    /// 1-based 数据行号（不含表头）
    pub row_index: usize,
    /// (源列名, 原始单元格文本)，保持列顺序
    pub cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(row_index: usize, cells: Vec<(String, String)>) -> Self {
        Self { row_index, cells }
    }

    pub fn cell(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.trim().is_empty())
    }
}

// ==========================================
// FieldValue - 类型化字段值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Date(NaiveDate),
    Text(String),
    /// 已映射的可选字段，但该行单元格为空
    Null,
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Null => Ok(()),
        }
    }
}

// ==========================================
// NormalizedRecord - 标准化记录
// ==========================================
// 字段集合 = 全部必填字段 + 映射中出现的可选字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub row_index: usize,
    pub fields: BTreeMap<FieldKey, FieldValue>,
}

impl NormalizedRecord {
    pub fn get(&self, key: FieldKey) -> Option<&FieldValue> {
        self.fields.get(&key)
    }

    pub fn number(&self, key: FieldKey) -> Option<f64> {
        self.get(key).and_then(FieldValue::as_f64)
    }

    pub fn text(&self, key: FieldKey) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_text)
    }

    pub fn date(&self, key: FieldKey) -> Option<NaiveDate> {
        self.get(key).and_then(FieldValue::as_date)
    }
}

// ==========================================
// RowErrorKind - 行级错误类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorKind {
    MissingRequired,
    TypeMismatch,
    ConstraintViolation,
    UnmappedColumn,
}

impl RowErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowErrorKind::MissingRequired => "missing_required",
            RowErrorKind::TypeMismatch => "type_mismatch",
            RowErrorKind::ConstraintViolation => "constraint_violation",
            RowErrorKind::UnmappedColumn => "unmapped_column",
        }
    }
}

impl fmt::Display for RowErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// RowError - 行级错误
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub row_index: usize,
    /// 源列名；必填字段未出现在任何列时为 None
    pub column: Option<String>,
    pub field: Option<FieldKey>,
    pub kind: RowErrorKind,
    pub detail: String,
}
