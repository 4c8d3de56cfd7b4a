// ==========================================
// 车队表格导入 - 行校验器实现
// ==========================================
// 职责: 按冻结映射对单行做类型转换 + 约束校验
// 规则: 一行可产生多条错误（每个违规列一条）
// 规则: 全有或全无，有任何错误则不产生记录
// ==========================================

use crate::domain::mapping::{ColumnMapping, MappingTarget};
use crate::domain::record::{FieldValue, NormalizedRecord, RawRow, RowError, RowErrorKind};
use crate::domain::schema::{FieldKey, FieldSpec, SchemaRegistry};
use crate::i18n::t_with_args;
use crate::importer::coercion::{check_rule, coerce};
use crate::importer::importer_trait::RowValidator as RowValidatorTrait;
use std::collections::BTreeMap;

pub struct RowValidator {
    registry: &'static SchemaRegistry,
}

impl RowValidator {
    pub fn new() -> Self {
        Self {
            registry: SchemaRegistry::global(),
        }
    }
}

impl Default for RowValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl RowValidatorTrait for RowValidator {
    fn validate(
        &self,
        row: &RawRow,
        mapping: &ColumnMapping,
    ) -> Result<NormalizedRecord, Vec<RowError>> {
        let mut fields: BTreeMap<FieldKey, FieldValue> = BTreeMap::new();
        let mut errors = Vec::new();

        // === 1-3: 逐列解析目标字段、类型转换、约束校验 ===
        for (column, raw) in &row.cells {
            let key = match mapping.target_of(column) {
                Some(MappingTarget::Field(key)) => key,
                Some(MappingTarget::Ignored) => continue,
                None => {
                    // 表头之外的空单元格无意义，直接跳过
                    if !raw.trim().is_empty() {
                        errors.push(row_error(
                            row.row_index,
                            Some(column),
                            None,
                            RowErrorKind::UnmappedColumn,
                            &[("column", column), ("value", raw)],
                        ));
                    }
                    continue;
                }
            };

            let spec = self.registry.get(key);
            match self.coerce_cell(row.row_index, column, raw, spec) {
                Ok(value) => {
                    fields.insert(key, value);
                }
                Err(error) => errors.push(error),
            }
        }

        // === 4: 必填字段覆盖检查 ===
        for spec in self.registry.required_fields() {
            if fields.contains_key(&spec.key) || errors.iter().any(|e| e.field == Some(spec.key)) {
                continue;
            }
            let column = mapping.column_for(spec.key);
            errors.push(row_error(
                row.row_index,
                column,
                Some(spec.key),
                RowErrorKind::MissingRequired,
                &[("field", spec.name()), ("column", column.unwrap_or("-"))],
            ));
        }

        // === 5: 全有或全无 ===
        if !errors.is_empty() {
            return Err(errors);
        }

        // 映射中存在、但该行缺少单元格的可选字段补 Null，保证字段集合一致
        for key in mapping.resolved_fields() {
            fields.entry(key).or_insert(FieldValue::Null);
        }

        Ok(NormalizedRecord {
            row_index: row.row_index,
            fields,
        })
    }
}

impl RowValidator {
    /// 单元格 → 字段值；空单元格对必填字段为 missing_required
    fn coerce_cell(
        &self,
        row_index: usize,
        column: &str,
        raw: &str,
        spec: &FieldSpec,
    ) -> Result<FieldValue, RowError> {
        match coerce(raw, spec.semantic_type) {
            Ok(Some(value)) => match check_rule(&value, &spec.rule) {
                Ok(()) => Ok(value),
                Err(reason) => Err(row_error(
                    row_index,
                    Some(column),
                    Some(spec.key),
                    RowErrorKind::ConstraintViolation,
                    &[("column", column), ("field", spec.name()), ("reason", &reason)],
                )),
            },
            Ok(None) if spec.required => Err(row_error(
                row_index,
                Some(column),
                Some(spec.key),
                RowErrorKind::MissingRequired,
                &[("field", spec.name()), ("column", column)],
            )),
            Ok(None) => Ok(FieldValue::Null),
            Err(reason) => Err(row_error(
                row_index,
                Some(column),
                Some(spec.key),
                RowErrorKind::TypeMismatch,
                &[
                    ("column", column),
                    ("value", raw),
                    ("expected", spec.semantic_type.as_str()),
                    ("reason", &reason.to_string()),
                ],
            )),
        }
    }
}

fn row_error(
    row_index: usize,
    column: Option<&str>,
    field: Option<FieldKey>,
    kind: RowErrorKind,
    args: &[(&str, &str)],
) -> RowError {
    RowError {
        row_index,
        column: column.map(str::to_string),
        field,
        kind,
        detail: t_with_args(&format!("row_error.{}", kind.as_str()), args),
    }
}
