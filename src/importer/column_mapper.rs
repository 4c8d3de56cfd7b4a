// ==========================================
// 车队表格导入 - 列映射器实现
// ==========================================
// 职责: 源表头 → 标准字段 的推断与人工覆写（阶段 Mapping）
// 规则: 推断为确定性函数，同一表头序列总得到同一映射
// 规则: 同一字段被多列推断时保留先出现的列
// ==========================================

use crate::domain::mapping::{
    ColumnAssignment, ColumnMapping, MappingTarget, MappingWarning, MappingWarningKind,
};
use crate::domain::schema::{FieldKey, FieldSpec, SchemaRegistry};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::{ColumnMapper as ColumnMapperTrait, InferredMapping};
use std::collections::HashMap;
use tracing::{debug, warn};

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// 包含匹配时较短一方的最小长度
const MIN_CONTAINMENT_LEN: usize = 3;

pub struct ColumnMapper {
    registry: &'static SchemaRegistry,
    threshold: f64,
}

impl ColumnMapper {
    pub fn new(threshold: f64) -> Self {
        Self {
            registry: SchemaRegistry::global(),
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 表头与字段的最佳得分（字段名与全部同义词取最大）
    pub fn score_field(&self, header: &str, spec: &FieldSpec) -> f64 {
        std::iter::once(spec.name())
            .chain(spec.synonyms.iter().copied())
            .map(|candidate| score(header, candidate))
            .fold(0.0, f64::max)
    }

    /// 表头的最佳字段；平局取注册顺序靠前者
    fn best_field(&self, header: &str) -> Option<(FieldKey, f64)> {
        let mut best: Option<(FieldKey, f64)> = None;
        for spec in self.registry.fields() {
            let s = self.score_field(header, spec);
            if best.map_or(true, |(_, top)| s > top) {
                best = Some((spec.key, s));
            }
        }
        best.filter(|(_, s)| *s >= self.threshold)
    }
}

impl Default for ColumnMapper {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl ColumnMapperTrait for ColumnMapper {
    fn infer(&self, headers: &[String]) -> InferredMapping {
        let mut assignments = Vec::with_capacity(headers.len());
        let mut warnings = Vec::new();
        // 字段 → 已占用列
        let mut claimed: HashMap<FieldKey, String> = HashMap::new();

        for header in headers {
            let (target, confidence) = match self.best_field(header) {
                Some((field, confidence)) => match claimed.get(&field) {
                    Some(kept) => {
                        warn!(
                            column = %header,
                            field = %field,
                            kept_column = %kept,
                            "列映射冲突，后出现的列被忽略"
                        );
                        warnings.push(MappingWarning {
                            kind: MappingWarningKind::Collision,
                            column: header.clone(),
                            field,
                            kept_column: kept.clone(),
                        });
                        (MappingTarget::Ignored, confidence)
                    }
                    None => {
                        claimed.insert(field, header.clone());
                        (MappingTarget::Field(field), confidence)
                    }
                },
                None => (MappingTarget::Ignored, 0.0),
            };

            debug!(column = %header, target = %target, confidence, "列映射推断");
            assignments.push(ColumnAssignment {
                column: header.clone(),
                target,
                confidence,
                overridden: false,
            });
        }

        InferredMapping {
            mapping: ColumnMapping::from_assignments(assignments),
            warnings,
        }
    }

    fn override_column(
        &self,
        mapping: &ColumnMapping,
        column: &str,
        field: &str,
    ) -> ImportResult<(ColumnMapping, Option<MappingWarning>)> {
        let target = self.resolve_target(mapping, column, field)?;
        Ok(mapping.with_target(column, target))
    }

    fn resolve_target(
        &self,
        mapping: &ColumnMapping,
        column: &str,
        field: &str,
    ) -> ImportResult<MappingTarget> {
        if !mapping.contains_column(column) {
            return Err(ImportError::UnknownColumn(column.to_string()));
        }
        MappingTarget::parse(field).ok_or_else(|| ImportError::UnknownField(field.to_string()))
    }
}

/// 映射已解析的必填字段数量
///
/// # 返回
/// (已解析数, 必填总数)
pub fn required_coverage(mapping: &ColumnMapping) -> (usize, usize) {
    let resolved = mapping.resolved_fields();
    let required: Vec<FieldKey> = SchemaRegistry::global()
        .required_fields()
        .map(|spec| spec.key)
        .collect();
    let covered = required.iter().filter(|key| resolved.contains(key)).count();
    (covered, required.len())
}

// ==========================================
// 相似度打分
// ==========================================

/// 表头与候选名的相似度，取值 [0, 1]
///
/// - 1.0: 忽略大小写完全相同
/// - 0.9: 规范化后相同（小写、去重音、去非字母数字）
/// - 0.6 ~ 0.8: 规范化后一方包含另一方，按长度比缩放
/// - 其余: 0.5 × 归一化编辑距离相似度
pub fn score(header: &str, candidate: &str) -> f64 {
    let header = header.trim();
    if header.eq_ignore_ascii_case(candidate) || header.to_lowercase() == candidate.to_lowercase()
    {
        return 1.0;
    }

    let a = normalize(header);
    let b = normalize(candidate);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 0.9;
    }

    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if short.chars().count() >= MIN_CONTAINMENT_LEN && long.contains(short.as_str()) {
        let ratio = short.chars().count() as f64 / long.chars().count() as f64;
        return 0.6 + 0.2 * ratio;
    }

    0.5 * strsim::normalized_levenshtein(&a, &b)
}

/// 小写、折叠葡语常见重音、仅保留字母数字
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(fold_diacritic)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'ê' | 'è' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}
