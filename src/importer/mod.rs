// ==========================================
// 车队表格导入 - 导入层
// ==========================================
// 职责: 表格字节流 → 标准化车队记录
// 流程: 解析 → 映射推断/覆写/冻结 → 逐行校验 → 原子快照
// 支持: Excel (.xlsx/.xls), CSV
// ==========================================

// 模块声明
pub mod coercion;
pub mod column_mapper;
pub mod error;
pub mod file_parser;
pub mod import_job;
pub mod importer_trait;
pub mod progress;
pub mod row_validator;

// 重导出核心类型
pub use column_mapper::{required_coverage, ColumnMapper as ColumnMapperImpl};
pub use error::{ErrorClass, ImportError, ImportResult};
pub use file_parser::{sniff_format, CsvParser, ExcelParser, UniversalFileParser};
pub use import_job::ImportJob;
pub use progress::ProgressPublisher;
pub use row_validator::RowValidator as RowValidatorImpl;

// 重导出 Trait 接口
pub use importer_trait::{
    ColumnMapper, FileParser, InferredMapping, ParsedSheet, RowValidator, SnapshotSink,
};
