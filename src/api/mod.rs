// ==========================================
// 车队表格导入 - API 层
// ==========================================
// 职责: 提供导入与记录查询 API，供界面与下游协作方调用
// ==========================================

pub mod error;
pub mod import_api;
pub mod records_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_api::{
    ColumnMappingView, ImportApi, ImportApiResponse, ImportStartResponse, MappingOverrideRequest,
    MappingView,
};
pub use records_api::{FleetTotals, RecordsApi};
