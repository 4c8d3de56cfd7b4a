// ==========================================
// 车队表格导入 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入任务所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::importer::error::ImportResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入任务所需的配置读取接口
// 实现者: ConfigManager（默认值 → JSON 文件 → 环境变量）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 输入限制 =====

    /// 获取单个文件最大字节数
    ///
    /// # 默认值
    /// - 10_485_760 (10 MiB)
    async fn get_max_file_bytes(&self) -> ImportResult<usize>;

    // ===== 校验执行 =====

    /// 获取每条进度事件覆盖的行数（同时是校验批次大小）
    ///
    /// # 默认值
    /// - 50
    async fn get_progress_batch_size(&self) -> ImportResult<usize>;

    /// 获取并行校验 worker 数（1 = 顺序执行）
    ///
    /// # 默认值
    /// - 4
    async fn get_validation_workers(&self) -> ImportResult<usize>;

    // ===== 列映射 =====

    /// 获取列映射置信度阈值，取值 (0, 1]
    ///
    /// # 默认值
    /// - 0.5
    async fn get_mapping_confidence_threshold(&self) -> ImportResult<f64>;

    // ===== 进度与展示 =====

    /// 获取进度事件通道容量
    ///
    /// # 默认值
    /// - 256
    async fn get_event_channel_capacity(&self) -> ImportResult<usize>;

    /// 获取预览行数
    ///
    /// # 默认值
    /// - 20
    async fn get_preview_rows(&self) -> ImportResult<usize>;

    /// 获取界面语言
    ///
    /// # 默认值
    /// - "en"（另支持 "pt-BR" / "zh-CN"）
    async fn get_locale(&self) -> ImportResult<String>;
}
