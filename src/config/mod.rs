// ==========================================
// 车队表格导入 - 配置层
// ==========================================
// 职责: 导入配置加载与校验，支持多级覆写
// 层级: 内置默认值 < JSON 配置文件 < 环境变量
// ==========================================

pub mod config_manager;
pub mod import_config;
pub mod import_config_trait;

// 重导出核心配置类型
pub use config_manager::{config_keys, default_config_path, ConfigManager};
pub use import_config::{ImportConfig, SUPPORTED_LOCALES};
pub use import_config_trait::ImportConfigReader;
