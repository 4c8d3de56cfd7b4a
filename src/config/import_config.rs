// ==========================================
// 车队表格导入 - 导入配置快照
// ==========================================
// 职责: 单个导入任务使用的只读配置（任务期间不变）
// 规则: 全部字段有默认值；非法取值报 ImportError::Config，不静默回退
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::importer::error::{ImportError, ImportResult};
use serde::{Deserialize, Serialize};

/// 支持的界面语言
pub const SUPPORTED_LOCALES: [&str; 3] = ["en", "pt-BR", "zh-CN"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub max_file_bytes: usize,
    pub progress_batch_size: usize,
    pub validation_workers: usize,
    pub mapping_confidence_threshold: f64,
    pub event_channel_capacity: usize,
    pub preview_rows: usize,
    pub locale: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            progress_batch_size: 50,
            validation_workers: 4,
            mapping_confidence_threshold: 0.5,
            event_channel_capacity: 256,
            preview_rows: 20,
            locale: "en".to_string(),
        }
    }
}

impl ImportConfig {
    /// 从配置读取器构建配置快照并校验
    pub async fn resolve(reader: &dyn ImportConfigReader) -> ImportResult<ImportConfig> {
        let config = ImportConfig {
            max_file_bytes: reader.get_max_file_bytes().await?,
            progress_batch_size: reader.get_progress_batch_size().await?,
            validation_workers: reader.get_validation_workers().await?,
            mapping_confidence_threshold: reader.get_mapping_confidence_threshold().await?,
            event_channel_capacity: reader.get_event_channel_capacity().await?,
            preview_rows: reader.get_preview_rows().await?,
            locale: reader.get_locale().await?,
        };
        config.validate()?;
        Ok(config)
    }

    /// 校验取值范围
    pub fn validate(&self) -> ImportResult<()> {
        if self.max_file_bytes == 0 {
            return Err(invalid("max_file_bytes", self.max_file_bytes, "必须大于 0"));
        }
        if self.progress_batch_size == 0 {
            return Err(invalid("progress_batch_size", self.progress_batch_size, "必须 >= 1"));
        }
        if self.validation_workers == 0 {
            return Err(invalid("validation_workers", self.validation_workers, "必须 >= 1"));
        }
        let threshold = self.mapping_confidence_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(invalid("mapping_confidence_threshold", threshold, "取值须在 (0, 1]"));
        }
        if self.event_channel_capacity == 0 {
            return Err(invalid("event_channel_capacity", self.event_channel_capacity, "必须 >= 1"));
        }
        if !SUPPORTED_LOCALES.contains(&self.locale.as_str()) {
            return Err(invalid("locale", &self.locale, "仅支持 en / pt-BR / zh-CN"));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString, message: &str) -> ImportError {
    ImportError::Config {
        key: key.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}
