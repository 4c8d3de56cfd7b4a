// ==========================================
// 车队表格导入 - 核心库
// ==========================================
// 职责: 车队运营表格（Excel/CSV）→ 标准化车队记录
// 流程: 解析 → 列映射（推断/覆写/冻结）→ 逐行校验 → 原子快照
// 下游: KPI/图表与对话助手只读消费已完成的快照
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "en");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 字段注册表、映射、记录、任务状态
pub mod domain;

// 导入层 - 解析、映射、校验、任务状态机
pub mod importer;

// 配置层 - 导入配置
pub mod config;

// 应用层 - 导入会话
pub mod app;

// API 层 - 导入与记录查询接口
pub mod api;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    ColumnMapping, FieldKey, FieldSpec, FieldValue, FrozenColumnMapping, ImportFormat,
    ImportInput, ImportOutcome, ImportSnapshot, ImportSummary, JobState, MappingMode,
    MappingTarget, MappingWarning, NormalizedRecord, ProgressEvent, RawRow, RowError,
    RowErrorKind, SchemaRegistry, SemanticType,
};

// 导入层
pub use importer::{ImportError, ImportJob, ImportResult};

// 配置
pub use config::{ConfigManager, ImportConfig};

// 会话
pub use app::{ImportSession, JobHandle, RecordConsumer};

// API
pub use api::{ImportApi, RecordsApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "fleet-ingest";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
