// ==========================================
// 车队表格导入 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，将导入层错误转换为面向调用方的错误
// 规则: 保留错误分类（任务致命 / 映射操作 / 内部）
// ==========================================

use crate::importer::error::{ErrorClass, ImportError};
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 调用方输入错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 导入错误
    // ==========================================
    /// 任务致命错误（任务已进入 Failed 或未能启动）
    #[error("文件导入失败: {0}")]
    ImportFailed(String),

    /// 映射操作被拒绝（任务状态不变）
    #[error("映射操作被拒绝: {0}")]
    MappingRejected(String),

    #[error("无效的任务状态: {0}")]
    InvalidJobState(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::InvalidJobState { .. } => ApiError::InvalidJobState(err.to_string()),
            ImportError::Config { .. } => ApiError::ConfigError(err.to_string()),
            ImportError::Other(inner) => ApiError::Other(inner),
            other => match other.class() {
                ErrorClass::JobFatal => ApiError::ImportFailed(other.to_string()),
                ErrorClass::MappingFatal => ApiError::MappingRejected(other.to_string()),
                ErrorClass::Internal => ApiError::InternalError(other.to_string()),
            },
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_error_classes_preserved() {
        assert!(matches!(
            ApiError::from(ImportError::EmptyFile),
            ApiError::ImportFailed(_)
        ));
        assert!(matches!(
            ApiError::from(ImportError::MappingFrozen),
            ApiError::MappingRejected(_)
        ));
        assert!(matches!(
            ApiError::from(ImportError::InternalError("x".into())),
            ApiError::InternalError(_)
        ));
    }
}
