// ==========================================
// 车队表格导入 - 领域模型层
// ==========================================
// 职责: 标准字段、列映射、行数据、任务状态与结果
// 红线: 不含文件 I/O，不含任务编排逻辑
// ==========================================

pub mod job;
pub mod mapping;
pub mod record;
pub mod schema;

// 重导出核心类型
pub use job::{
    ImportFormat, ImportInput, ImportOutcome, ImportSnapshot, ImportSummary, JobState,
    MappingMode, ProgressEvent,
};
pub use mapping::{
    ColumnAssignment, ColumnMapping, FrozenColumnMapping, MappingTarget, MappingWarning,
    MappingWarningKind,
};
pub use record::{FieldValue, NormalizedRecord, RawRow, RowError, RowErrorKind};
pub use schema::{FieldKey, FieldSpec, SchemaRegistry, SemanticType, ValidationRule};
