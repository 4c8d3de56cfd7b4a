// ==========================================
// 车队表格导入 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 任务致命 / 映射操作致命 / 内部错误
// 说明: 行级错误（RowError）是数据而非 Err，不在此定义
// ==========================================

use crate::domain::job::JobState;
use thiserror::Error;
use uuid::Uuid;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 中止任务，无部分输出
    JobFatal,
    /// 仅拒绝当前映射操作，任务状态不变
    MappingFatal,
    Internal,
}

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 任务致命错误 =====
    #[error("文件过大: {size} 字节，上限 {limit} 字节")]
    FileTooLarge { size: usize, limit: usize },

    #[error("文件无法读取: {0}（仅支持 .xlsx/.xls/.csv）")]
    UnreadableFile(String),

    #[error("文件无数据行（表头之后为空）")]
    EmptyFile,

    #[error("会话已有进行中的导入任务: {0}")]
    JobAlreadyRunning(Uuid),

    #[error("映射未能解析任何必填字段（必填: {required}）")]
    UnresolvableMapping { required: String },

    // ===== 映射操作错误 =====
    #[error("未知标准字段: {0}")]
    UnknownField(String),

    #[error("未知源列: {0}")]
    UnknownColumn(String),

    #[error("映射已冻结，不允许覆写")]
    MappingFrozen,

    // ===== 状态机错误 =====
    #[error("当前状态 {state} 不允许操作: {action}")]
    InvalidJobState { state: JobState, action: &'static str },

    // ===== 配置错误 =====
    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    Config {
        key: String,
        value: String,
        message: String,
    },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ImportError::FileTooLarge { .. }
            | ImportError::UnreadableFile(_)
            | ImportError::EmptyFile
            | ImportError::JobAlreadyRunning(_)
            | ImportError::UnresolvableMapping { .. } => ErrorClass::JobFatal,
            ImportError::UnknownField(_)
            | ImportError::UnknownColumn(_)
            | ImportError::MappingFrozen => ErrorClass::MappingFatal,
            ImportError::InvalidJobState { .. }
            | ImportError::Config { .. }
            | ImportError::InternalError(_)
            | ImportError::Other(_) => ErrorClass::Internal,
        }
    }

    pub fn is_job_fatal(&self) -> bool {
        self.class() == ErrorClass::JobFatal
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::UnreadableFile(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::UnreadableFile(format!("CSV 解析失败: {}", err))
    }
}

// 实现 From<calamine::XlsxError>
impl From<calamine::XlsxError> for ImportError {
    fn from(err: calamine::XlsxError) -> Self {
        ImportError::UnreadableFile(format!("Excel 解析失败: {}", err))
    }
}

// 实现 From<calamine::XlsError>
impl From<calamine::XlsError> for ImportError {
    fn from(err: calamine::XlsError) -> Self {
        ImportError::UnreadableFile(format!("Excel 解析失败: {}", err))
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
