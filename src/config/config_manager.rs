// ==========================================
// 车队表格导入 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、快照
// 层级: 内置默认值 < JSON 配置文件 < 环境变量
// 文件: 显式路径 > $FLEET_INGEST_CONFIG > <config_dir>/fleet-ingest/config.json
// ==========================================

use crate::config::import_config::ImportConfig;
use crate::config::import_config_trait::ImportConfigReader;
use crate::importer::error::{ImportError, ImportResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    // key → 原始文本值（已合并文件与环境变量层）
    values: BTreeMap<String, String>,
    // 实际加载的配置文件
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// 仅使用内置默认值
    pub fn new() -> Self {
        Self::default()
    }

    /// 按层级加载配置（文件 + 进程环境变量）
    ///
    /// # 参数
    /// - explicit_path: 显式指定的配置文件；指定但不存在时报错
    pub fn load(explicit_path: Option<&Path>) -> ImportResult<Self> {
        let mut manager = Self::new();

        let env_path = std::env::var_os(config_keys::ENV_CONFIG_PATH).map(PathBuf::from);
        match explicit_path.map(Path::to_path_buf).or(env_path) {
            Some(path) => manager.merge_file(&path)?,
            None => {
                if let Some(path) = default_config_path().filter(|p| p.exists()) {
                    manager.merge_file(&path)?;
                }
            }
        }

        manager.merge_env(std::env::vars());
        Ok(manager)
    }

    /// 从键值对创建（测试与嵌入场景）
    pub fn from_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            source: None,
        }
    }

    /// 合并 JSON 配置文件层
    ///
    /// 文件须为 JSON 对象；键为 ImportConfig 字段名，值可为数字或字符串
    pub fn merge_file(&mut self, path: &Path) -> ImportResult<()> {
        let text = std::fs::read_to_string(path).map_err(|e| ImportError::Config {
            key: "config_file".to_string(),
            value: path.display().to_string(),
            message: format!("无法读取配置文件: {}", e),
        })?;
        let json: Value = serde_json::from_str(&text).map_err(|e| ImportError::Config {
            key: "config_file".to_string(),
            value: path.display().to_string(),
            message: format!("配置文件不是合法 JSON: {}", e),
        })?;
        let Value::Object(entries) = json else {
            return Err(ImportError::Config {
                key: "config_file".to_string(),
                value: path.display().to_string(),
                message: "配置文件顶层必须是 JSON 对象".to_string(),
            });
        };

        for (key, value) in entries {
            if !config_keys::ALL.contains(&key.as_str()) {
                warn!(config_key = %key, file = %path.display(), "未知配置项，已忽略");
                continue;
            }
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.values.insert(key, text);
        }

        info!(file = %path.display(), "已加载配置文件");
        self.source = Some(path.to_path_buf());
        Ok(())
    }

    /// 合并环境变量层（仅识别 FLEET_INGEST_* 中的已知变量）
    pub fn merge_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            if let Some(key) = config_keys::key_for_env(&name) {
                debug!(env = %name, config_key = key, "环境变量覆写配置");
                self.values.insert(key.to_string(), value);
            }
        }
    }

    /// 读取配置值（原始文本）
    pub fn get_config_value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// 获取所有显式配置的快照（JSON 格式）
    pub fn get_config_snapshot(&self) -> ImportResult<String> {
        serde_json::to_string(&self.values)
            .map_err(|e| ImportError::InternalError(format!("配置快照序列化失败: {}", e)))
    }

    /// 读取并解析配置值；缺省时使用默认值，格式错误时报错
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ImportResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_config_value(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|e| ImportError::Config {
                key: key.to_string(),
                value: raw.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// 默认配置文件位置: <config_dir>/fleet-ingest/config.json
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fleet-ingest").join("config.json"))
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_max_file_bytes(&self) -> ImportResult<usize> {
        let default = ImportConfig::default().max_file_bytes;
        self.get_parsed_or_default(config_keys::MAX_FILE_BYTES, default)
    }

    async fn get_progress_batch_size(&self) -> ImportResult<usize> {
        let default = ImportConfig::default().progress_batch_size;
        self.get_parsed_or_default(config_keys::PROGRESS_BATCH_SIZE, default)
    }

    async fn get_validation_workers(&self) -> ImportResult<usize> {
        let default = ImportConfig::default().validation_workers;
        self.get_parsed_or_default(config_keys::VALIDATION_WORKERS, default)
    }

    async fn get_mapping_confidence_threshold(&self) -> ImportResult<f64> {
        let default = ImportConfig::default().mapping_confidence_threshold;
        self.get_parsed_or_default(config_keys::MAPPING_CONFIDENCE_THRESHOLD, default)
    }

    async fn get_event_channel_capacity(&self) -> ImportResult<usize> {
        let default = ImportConfig::default().event_channel_capacity;
        self.get_parsed_or_default(config_keys::EVENT_CHANNEL_CAPACITY, default)
    }

    async fn get_preview_rows(&self) -> ImportResult<usize> {
        let default = ImportConfig::default().preview_rows;
        self.get_parsed_or_default(config_keys::PREVIEW_ROWS, default)
    }

    async fn get_locale(&self) -> ImportResult<String> {
        Ok(self
            .get_config_value(config_keys::LOCALE)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| ImportConfig::default().locale))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    pub const MAX_FILE_BYTES: &str = "max_file_bytes";
    pub const PROGRESS_BATCH_SIZE: &str = "progress_batch_size";
    pub const VALIDATION_WORKERS: &str = "validation_workers";
    pub const MAPPING_CONFIDENCE_THRESHOLD: &str = "mapping_confidence_threshold";
    pub const EVENT_CHANNEL_CAPACITY: &str = "event_channel_capacity";
    pub const PREVIEW_ROWS: &str = "preview_rows";
    pub const LOCALE: &str = "locale";

    pub const ALL: [&str; 7] = [
        MAX_FILE_BYTES,
        PROGRESS_BATCH_SIZE,
        VALIDATION_WORKERS,
        MAPPING_CONFIDENCE_THRESHOLD,
        EVENT_CHANNEL_CAPACITY,
        PREVIEW_ROWS,
        LOCALE,
    ];

    // 环境变量
    pub const ENV_CONFIG_PATH: &str = "FLEET_INGEST_CONFIG";
    pub const ENV_MAX_FILE_BYTES: &str = "FLEET_INGEST_MAX_FILE_BYTES";
    pub const ENV_BATCH_SIZE: &str = "FLEET_INGEST_BATCH_SIZE";
    pub const ENV_WORKERS: &str = "FLEET_INGEST_WORKERS";
    pub const ENV_MAPPING_THRESHOLD: &str = "FLEET_INGEST_MAPPING_THRESHOLD";
    pub const ENV_LOCALE: &str = "FLEET_INGEST_LOCALE";

    /// 环境变量名 → 配置键
    pub fn key_for_env(name: &str) -> Option<&'static str> {
        match name {
            ENV_MAX_FILE_BYTES => Some(MAX_FILE_BYTES),
            ENV_BATCH_SIZE => Some(PROGRESS_BATCH_SIZE),
            ENV_WORKERS => Some(VALIDATION_WORKERS),
            ENV_MAPPING_THRESHOLD => Some(MAPPING_CONFIDENCE_THRESHOLD),
            ENV_LOCALE => Some(LOCALE),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_defaults_without_sources() {
        let manager = ConfigManager::new();
        let config = ImportConfig::resolve(&manager).await.unwrap();
        assert_eq!(config, ImportConfig::default());
    }

    #[tokio::test]
    async fn test_env_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"validation_workers": 2, "progress_batch_size": "10"}}"#).unwrap();

        let mut manager = ConfigManager::new();
        manager.merge_file(file.path()).unwrap();
        manager.merge_env(vec![
            ("FLEET_INGEST_WORKERS".to_string(), "8".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ]);

        let config = ImportConfig::resolve(&manager).await.unwrap();
        assert_eq!(config.validation_workers, 8);
        assert_eq!(config.progress_batch_size, 10);
        assert_eq!(manager.source(), Some(file.path()));
    }

    #[tokio::test]
    async fn test_malformed_value_is_config_error() {
        let manager = ConfigManager::from_values([("mapping_confidence_threshold", "high")]);

        let err = ImportConfig::resolve(&manager).await.unwrap_err();
        assert!(matches!(err, ImportError::Config { key, .. } if key == "mapping_confidence_threshold"));
    }

    #[test]
    fn test_non_object_file_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();

        let err = ConfigManager::new().merge_file(file.path()).unwrap_err();
        assert!(matches!(err, ImportError::Config { .. }));
    }
}
