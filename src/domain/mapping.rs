// ==========================================
// 车队表格导入 - 列映射结构
// ==========================================
// 职责: 源列 → 标准字段 / 忽略 的映射关系
// 约束: 列名大小写不敏感且唯一；同一标准字段最多被一列占用
// 约束: 覆写返回新映射（不原地修改）；冻结后以独立类型表达不可变
// ==========================================

use crate::domain::schema::FieldKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// 可被识别为“忽略”的覆写取值
pub const IGNORE_SENTINELS: [&str; 4] = ["ignore", "ignored", "ignorar", ""];

// ==========================================
// MappingTarget - 映射目标
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingTarget {
    Field(FieldKey),
    Ignored,
}

impl MappingTarget {
    /// 解析覆写取值：标准字段名或忽略标记
    pub fn parse(value: &str) -> Option<MappingTarget> {
        let trimmed = value.trim();
        if IGNORE_SENTINELS
            .iter()
            .any(|s| s.eq_ignore_ascii_case(trimmed))
        {
            return Some(MappingTarget::Ignored);
        }
        FieldKey::parse(trimmed).map(MappingTarget::Field)
    }

    pub fn field(&self) -> Option<FieldKey> {
        match self {
            MappingTarget::Field(key) => Some(*key),
            MappingTarget::Ignored => None,
        }
    }
}

impl fmt::Display for MappingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingTarget::Field(key) => f.write_str(key.as_str()),
            MappingTarget::Ignored => f.write_str("ignored"),
        }
    }
}

// ==========================================
// ColumnAssignment - 单列映射
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnAssignment {
    pub column: String,
    pub target: MappingTarget,
    /// 推断得分；人工覆写为 1.0
    pub confidence: f64,
    pub overridden: bool,
}

// ==========================================
// MappingWarning - 映射告警
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingWarningKind {
    /// 推断冲突：后出现的列被强制忽略
    Collision,
    /// 人工覆写抢占：原持有列被改为忽略
    Reassigned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingWarning {
    pub kind: MappingWarningKind,
    /// 被改为忽略的列
    pub column: String,
    pub field: FieldKey,
    /// 最终持有该字段的列
    pub kept_column: String,
}

// ==========================================
// ColumnMapping - 可编辑映射（冻结前）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    assignments: Vec<ColumnAssignment>,
}

impl ColumnMapping {
    pub fn from_assignments(assignments: Vec<ColumnAssignment>) -> Self {
        Self { assignments }
    }

    /// 按源列顺序返回映射
    pub fn assignments(&self) -> &[ColumnAssignment] {
        &self.assignments
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    /// 查询源列的映射目标（大小写不敏感）；未知列返回 None
    pub fn target_of(&self, column: &str) -> Option<MappingTarget> {
        self.position(column).map(|idx| self.assignments[idx].target)
    }

    /// 查询占用某标准字段的源列
    pub fn column_for(&self, field: FieldKey) -> Option<&str> {
        self.assignments
            .iter()
            .find(|a| a.target == MappingTarget::Field(field))
            .map(|a| a.column.as_str())
    }

    pub fn resolved_fields(&self) -> BTreeSet<FieldKey> {
        self.assignments
            .iter()
            .filter_map(|a| a.target.field())
            .collect()
    }

    /// 返回替换了单列目标的新映射
    ///
    /// 若目标字段已被其他列占用，则原持有列改为忽略，并返回告警。
    /// 调用方需保证 column 存在。
    pub(crate) fn with_target(
        &self,
        column: &str,
        target: MappingTarget,
    ) -> (ColumnMapping, Option<MappingWarning>) {
        let mut next = self.clone();
        let Some(idx) = next.position(column) else {
            return (next, None);
        };

        let mut warning = None;
        if let MappingTarget::Field(field) = target {
            if let Some(holder) = next
                .assignments
                .iter()
                .position(|a| a.target == target && !a.column.eq_ignore_ascii_case(column))
            {
                next.assignments[holder].target = MappingTarget::Ignored;
                next.assignments[holder].overridden = true;
                warning = Some(MappingWarning {
                    kind: MappingWarningKind::Reassigned,
                    column: next.assignments[holder].column.clone(),
                    field,
                    kept_column: next.assignments[idx].column.clone(),
                });
            }
        }

        let assignment = &mut next.assignments[idx];
        assignment.target = target;
        assignment.confidence = 1.0;
        assignment.overridden = true;

        (next, warning)
    }

    /// 冻结映射；此后不再允许覆写
    pub fn freeze(self) -> FrozenColumnMapping {
        FrozenColumnMapping(Arc::new(self))
    }

    fn position(&self, column: &str) -> Option<usize> {
        let wanted = column.trim();
        self.assignments
            .iter()
            .position(|a| a.column.eq_ignore_ascii_case(wanted))
    }
}

// ==========================================
// FrozenColumnMapping - 已冻结映射
// ==========================================
// 只读共享（校验 worker 之间共享同一份）
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenColumnMapping(Arc<ColumnMapping>);

impl Deref for FrozenColumnMapping {
    type Target = ColumnMapping;

    fn deref(&self) -> &ColumnMapping {
        &self.0
    }
}

impl Serialize for FrozenColumnMapping {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(column: &str, target: MappingTarget) -> ColumnAssignment {
        ColumnAssignment {
            column: column.to_string(),
            target,
            confidence: 0.9,
            overridden: false,
        }
    }

    #[test]
    fn test_target_parse_sentinels() {
        assert_eq!(MappingTarget::parse("Ignorar"), Some(MappingTarget::Ignored));
        assert_eq!(MappingTarget::parse(""), Some(MappingTarget::Ignored));
        assert_eq!(
            MappingTarget::parse("plate"),
            Some(MappingTarget::Field(FieldKey::Plate))
        );
        assert_eq!(MappingTarget::parse("odometer"), None);
    }

    #[test]
    fn test_with_target_moves_field_and_warns() {
        let mapping = ColumnMapping::from_assignments(vec![
            assignment("Placa", MappingTarget::Field(FieldKey::Plate)),
            assignment("Registro", MappingTarget::Ignored),
        ]);

        let (next, warning) =
            mapping.with_target("registro", MappingTarget::Field(FieldKey::Plate));

        assert_eq!(next.target_of("Placa"), Some(MappingTarget::Ignored));
        assert_eq!(next.column_for(FieldKey::Plate), Some("Registro"));
        let warning = warning.expect("应产生抢占告警");
        assert_eq!(warning.kind, MappingWarningKind::Reassigned);
        assert_eq!(warning.column, "Placa");

        // 原映射保持不变
        assert_eq!(mapping.column_for(FieldKey::Plate), Some("Placa"));
    }

    #[test]
    fn test_frozen_mapping_derefs() {
        let frozen = ColumnMapping::from_assignments(vec![assignment(
            "KM",
            MappingTarget::Field(FieldKey::KmTraveled),
        )])
        .freeze();
        assert_eq!(frozen.column_for(FieldKey::KmTraveled), Some("KM"));
        assert_eq!(frozen.resolved_fields().len(), 1);
    }
}
