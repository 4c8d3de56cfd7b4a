// ==========================================
// 车队表格导入 - 导入会话
// ==========================================
// 职责: 会话级句柄，管理“每会话至多一个活动任务”的生命周期
// 规则: 已有非终态任务时再次启动报 JobAlreadyRunning（需先显式取消）
// 规则: 任务完成时快照先写入 SnapshotHub 再发布 Completed，随后通知下游消费者
// ==========================================

use crate::app::snapshot_hub::{RecordConsumer, SnapshotHub};
use crate::config::{ImportConfig, ImportConfigReader};
use crate::domain::job::{
    ImportInput, ImportOutcome, ImportSnapshot, JobState, MappingMode, ProgressEvent,
};
use crate::domain::mapping::{ColumnMapping, MappingWarning};
use crate::importer::column_mapper::ColumnMapper as ColumnMapperImpl;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::import_job::ImportJob;
use crate::importer::importer_trait::{ColumnMapper, RowValidator, SnapshotSink};
use crate::importer::progress::ProgressPublisher;
use crate::importer::row_validator::RowValidator as RowValidatorImpl;
use futures::Stream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

// ==========================================
// ImportSession - 导入会话
// ==========================================
pub struct ImportSession {
    config: Arc<ImportConfig>,
    mapper: Arc<dyn ColumnMapper>,
    validator: Arc<dyn RowValidator>,
    active: Mutex<Option<JobHandle>>,
    hub: Arc<SnapshotHub>,
}

impl ImportSession {
    /// 使用默认组件创建会话
    pub fn new(config: ImportConfig) -> Self {
        let mapper = Arc::new(ColumnMapperImpl::new(config.mapping_confidence_threshold));
        Self::with_components(config, mapper, Arc::new(RowValidatorImpl::new()))
    }

    /// 从配置读取器创建会话
    pub async fn from_reader(reader: &dyn ImportConfigReader) -> ImportResult<Self> {
        Ok(Self::new(ImportConfig::resolve(reader).await?))
    }

    pub fn with_components(
        config: ImportConfig,
        mapper: Arc<dyn ColumnMapper>,
        validator: Arc<dyn RowValidator>,
    ) -> Self {
        // 会话语言决定诊断与任务消息的输出语言
        if !crate::i18n::set_locale(&config.locale) {
            warn!(locale = %config.locale, "不支持的语言，沿用当前语言");
        }
        Self {
            config: Arc::new(config),
            mapper,
            validator,
            active: Mutex::new(None),
            hub: Arc::new(SnapshotHub::new()),
        }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// 启动导入任务
    ///
    /// # 参数
    /// - input: 文件字节流与格式
    /// - mode: Automatic 推断后直接冻结并校验；AwaitOverrides 停在 Mapping
    ///
    /// # 返回
    /// - Ok(JobHandle): 任务句柄（Automatic 模式下校验在后台进行）
    /// - Err(JobAlreadyRunning): 会话已有活动任务
    /// - Err(任务致命错误): 任务已进入 Failed
    pub async fn start_import(
        &self,
        input: ImportInput,
        mode: MappingMode,
    ) -> ImportResult<JobHandle> {
        let handle = {
            let mut active = self.lock_active();
            if let Some(current) = active.as_ref().filter(|h| !h.state().is_terminal()) {
                warn!(active_job = %current.id(), "会话已有活动任务，拒绝启动");
                return Err(ImportError::JobAlreadyRunning(current.id()));
            }

            let job = ImportJob::with_components(
                Arc::clone(&self.config),
                Arc::clone(&self.mapper),
                Arc::clone(&self.validator),
            );
            let job = job.with_snapshot_sink(Arc::clone(&self.hub) as Arc<dyn SnapshotSink>);
            let handle = JobHandle::new(job, Arc::clone(&self.hub));
            *active = Some(handle.clone());
            handle
        };

        info!(job_id = %handle.id(), mode = ?mode, "导入任务已创建");
        handle.parse(input).await?;

        if mode == MappingMode::Automatic && handle.state() == JobState::Mapping {
            handle.freeze_and_validate().await?;
        }
        Ok(handle)
    }

    /// 取消活动任务
    ///
    /// # 返回
    /// 取消后的任务状态；无活动任务时为 None
    pub async fn cancel_active(&self) -> Option<JobState> {
        match self.active_job() {
            Some(handle) => Some(handle.cancel().await),
            None => None,
        }
    }

    /// 当前非终态任务
    pub fn active_job(&self) -> Option<JobHandle> {
        self.lock_active()
            .as_ref()
            .filter(|h| !h.state().is_terminal())
            .cloned()
    }

    /// 最近一次启动的任务（含已结束任务）
    pub fn last_job(&self) -> Option<JobHandle> {
        self.lock_active().clone()
    }

    /// 最近一次完成任务的快照
    pub fn latest_snapshot(&self) -> Option<Arc<ImportSnapshot>> {
        self.hub.latest()
    }

    pub fn register_consumer(&self, consumer: Arc<dyn RecordConsumer>) {
        self.hub.register(consumer);
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<JobHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ==========================================
// JobHandle - 任务句柄
// ==========================================
// 状态查询与进度订阅不经过任务锁；其余操作串行访问任务
#[derive(Clone)]
pub struct JobHandle {
    id: Uuid,
    job: Arc<AsyncMutex<ImportJob>>,
    publisher: Arc<ProgressPublisher>,
    cancel: CancellationToken,
    hub: Arc<SnapshotHub>,
}

impl JobHandle {
    fn new(job: ImportJob, hub: Arc<SnapshotHub>) -> Self {
        Self {
            id: job.id(),
            publisher: job.publisher(),
            cancel: job.cancel_token(),
            job: Arc::new(AsyncMutex::new(job)),
            hub,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 当前状态（取自最近一次状态事件）
    pub fn state(&self) -> JobState {
        self.publisher
            .latest()
            .map_or(JobState::Created, |event| event.state)
    }

    /// 订阅进度事件；任务到达终态后结束
    pub fn subscribe(&self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        self.publisher.subscribe()
    }

    pub async fn mapping(&self) -> ColumnMapping {
        self.job.lock().await.mapping()
    }

    pub async fn mapping_warnings(&self) -> Vec<MappingWarning> {
        self.job.lock().await.mapping_warnings().to_vec()
    }

    pub async fn headers(&self) -> Vec<String> {
        self.job.lock().await.headers().to_vec()
    }

    pub async fn override_column(
        &self,
        column: &str,
        field: &str,
    ) -> ImportResult<Option<MappingWarning>> {
        self.job.lock().await.override_column(column, field)
    }

    pub async fn apply_overrides(
        &self,
        overrides: &[(String, String)],
    ) -> ImportResult<Vec<MappingWarning>> {
        self.job.lock().await.apply_overrides(overrides)
    }

    /// 冻结映射并在后台执行校验
    ///
    /// 返回时任务已进入 Validating；校验任务持有任务锁直至终态，
    /// 因此随后的 outcome() 会等待校验结束。
    pub async fn freeze_and_validate(&self) -> ImportResult<()> {
        let mut job = Arc::clone(&self.job).lock_owned().await;
        job.freeze_mapping()?;

        let hub = Arc::clone(&self.hub);
        let job_id = self.id;
        tokio::spawn(async move {
            match job.run_validation().await {
                Ok(outcome) => {
                    // 最新快照已在 Completed 之前写入，此处只通知消费者
                    if let Some(snapshot) = outcome.snapshot {
                        hub.notify(snapshot).await;
                    }
                }
                Err(e) => error!(job_id = %job_id, error = %e, "校验执行失败"),
            }
        });
        Ok(())
    }

    /// 请求取消；进行中的校验在当前批次结束后停止
    pub async fn cancel(&self) -> JobState {
        self.cancel.cancel();
        let mut job = self.job.lock().await;
        job.cancel();
        job.state()
    }

    /// 任务结果；校验进行中时等待其结束
    pub async fn outcome(&self) -> ImportOutcome {
        self.job.lock().await.outcome()
    }

    async fn parse(&self, input: ImportInput) -> ImportResult<()> {
        self.job.lock().await.parse_input(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::ImportFormat;

    fn csv(text: &str) -> ImportInput {
        ImportInput::new(text.as_bytes().to_vec()).with_format(ImportFormat::Csv)
    }

    #[tokio::test]
    async fn test_second_job_rejected_while_active() {
        let _locale = crate::i18n::locale_test_guard();
        let session = ImportSession::new(ImportConfig::default());
        let first = session
            .start_import(csv("Placa,KM\nABC-1234,1\n"), MappingMode::AwaitOverrides)
            .await
            .unwrap();

        let err = session
            .start_import(csv("Placa,KM\nABC-1234,1\n"), MappingMode::Automatic)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ImportError::JobAlreadyRunning(id) if id == first.id()));

        assert_eq!(session.cancel_active().await, Some(JobState::Cancelled));
        assert!(session.active_job().is_none());
        assert!(session
            .start_import(csv("Placa,KM\nABC-1234,1\n"), MappingMode::Automatic)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_automatic_mode_completes() {
        let _locale = crate::i18n::locale_test_guard();
        let session = ImportSession::new(ImportConfig::default());
        let handle = session
            .start_import(csv("Placa,KM\nABC-1234,1\nDEF-5678,2\n"), MappingMode::Automatic)
            .await
            .unwrap();

        let outcome = handle.outcome().await;

        assert_eq!(outcome.state, JobState::Completed);
        assert_eq!(outcome.summary.rows_accepted, 2);
        assert_eq!(session.latest_snapshot().map(|s| s.job_id), Some(handle.id()));
    }

    #[tokio::test]
    async fn test_session_applies_configured_locale() {
        let _locale = crate::i18n::locale_test_guard();
        let session = ImportSession::new(ImportConfig {
            locale: "pt-BR".to_string(),
            ..ImportConfig::default()
        });
        assert_eq!(crate::i18n::current_locale(), "pt-BR");

        // 仅表头的文件使任务失败，失败说明按会话语言输出
        let err = session
            .start_import(csv("Placa,KM\n"), MappingMode::Automatic)
            .await
            .err();
        assert!(matches!(err, Some(ImportError::EmptyFile)));
        let failed = session.last_job().unwrap().outcome().await;
        assert_eq!(failed.state, JobState::Failed);
        assert!(failed.failure.unwrap().starts_with("Falha na importação"));

        crate::i18n::set_locale("en");
    }
}
