// ==========================================
// 车队表格导入 - 导入组件 Trait
// ==========================================
// 职责: 定义导入管道各阶段的接口（不包含实现）
// 流程: 文件解析 → 列映射推断/覆写 → 逐行校验
// ==========================================

use crate::domain::job::ImportSnapshot;
use crate::domain::mapping::{ColumnMapping, MappingTarget, MappingWarning};
use crate::domain::record::{NormalizedRecord, RawRow, RowError};
use crate::importer::error::ImportResult;
use std::sync::Arc;

// ==========================================
// ParsedSheet - 解析结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSheet {
    /// 去重、补名后的表头
    pub headers: Vec<String>,
    /// 数据行（已跳过全空行）
    pub rows: Vec<RawRow>,
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口（阶段 Parsing）
// 实现者: CsvParser / ExcelParser / UniversalFileParser
pub trait FileParser: Send + Sync {
    /// 将字节流解析为表头 + 原始行
    ///
    /// # 返回
    /// - Ok(ParsedSheet): 表头与数据行（数据行可能为空，由调用方判定 EmptyFile）
    /// - Err(UnreadableFile): 字节流无法按该格式解码
    fn parse_bytes(&self, bytes: &[u8]) -> ImportResult<ParsedSheet>;
}

// ==========================================
// InferredMapping - 推断结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferredMapping {
    pub mapping: ColumnMapping,
    pub warnings: Vec<MappingWarning>,
}

// ==========================================
// ColumnMapper Trait
// ==========================================
// 用途: 表头 → 标准字段 映射接口（阶段 Mapping）
// 实现者: ColumnMapperImpl
pub trait ColumnMapper: Send + Sync {
    /// 根据源表头推断映射
    ///
    /// # 规则
    /// - 每个表头取得分最高且不低于阈值的字段，否则忽略
    /// - 平局取注册顺序靠前的字段
    /// - 同一字段被多列推断时，后出现的列强制忽略并记录告警
    fn infer(&self, headers: &[String]) -> InferredMapping;

    /// 人工覆写单列
    ///
    /// # 返回
    /// - Ok((新映射, 可能的抢占告警))
    /// - Err(UnknownField / UnknownColumn)
    fn override_column(
        &self,
        mapping: &ColumnMapping,
        column: &str,
        field: &str,
    ) -> ImportResult<(ColumnMapping, Option<MappingWarning>)>;

    /// 批量覆写（原子：任一项非法则整体拒绝）
    fn apply_overrides(
        &self,
        mapping: &ColumnMapping,
        overrides: &[(String, String)],
    ) -> ImportResult<(ColumnMapping, Vec<MappingWarning>)> {
        let mut targets = Vec::with_capacity(overrides.len());
        for (column, field) in overrides {
            targets.push((column.as_str(), self.resolve_target(mapping, column, field)?));
        }

        let mut current = mapping.clone();
        let mut warnings = Vec::new();
        for (column, target) in targets {
            let (next, warning) = current.with_target(column, target);
            current = next;
            warnings.extend(warning);
        }
        Ok((current, warnings))
    }

    /// 校验覆写取值并解析为映射目标
    fn resolve_target(
        &self,
        mapping: &ColumnMapping,
        column: &str,
        field: &str,
    ) -> ImportResult<MappingTarget>;
}

// ==========================================
// RowValidator Trait
// ==========================================
// 用途: 单行类型转换 + 约束校验（阶段 Validating）
// 实现者: RowValidatorImpl
// 约束: 纯函数，无共享可变状态，可在多个 worker 间并行调用
pub trait RowValidator: Send + Sync {
    /// 校验单行
    ///
    /// # 返回
    /// - Ok(NormalizedRecord): 全部列通过
    /// - Err(Vec<RowError>): 该行全部错误（至少一条），不产生部分记录
    fn validate(
        &self,
        row: &RawRow,
        mapping: &ColumnMapping,
    ) -> Result<NormalizedRecord, Vec<RowError>>;
}

// ==========================================
// SnapshotSink Trait
// ==========================================
// 用途: 接收已完成任务的快照（阶段 Completed）
// 实现者: SnapshotHub
// 约束: 在 Completed 事件发布之前调用；store 返回后快照即对外可见
pub trait SnapshotSink: Send + Sync {
    fn store(&self, snapshot: Arc<ImportSnapshot>);
}
