// ==========================================
// 车队表格导入 - 结果快照分发
// ==========================================
// 职责: 保存最近一次完成任务的快照，并分发给下游消费者
// 规则: 每个 Completed 任务对每个消费者恰好投递一次
// 规则: 消费者失败仅记录日志，不影响任务结果
// 规则: 最新快照先于 Completed 事件写入（store），消费者通知随后进行（notify）
// ==========================================

use crate::domain::job::ImportSnapshot;
use crate::importer::importer_trait::SnapshotSink;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

// ==========================================
// RecordConsumer Trait
// ==========================================
// 用途: 下游协作方（图表/KPI、对话助手）接收已完成的快照
// 约束: 只读使用，不修改、不重新校验记录
#[async_trait]
pub trait RecordConsumer: Send + Sync {
    /// 消费者名称（用于日志）
    fn name(&self) -> &str;

    /// 接收已完成任务的快照
    async fn on_snapshot(&self, snapshot: Arc<ImportSnapshot>) -> anyhow::Result<()>;
}

// ==========================================
// SnapshotHub
// ==========================================
#[derive(Default)]
pub struct SnapshotHub {
    latest: RwLock<Option<Arc<ImportSnapshot>>>,
    consumers: RwLock<Vec<Arc<dyn RecordConsumer>>>,
}

impl SnapshotHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, consumer: Arc<dyn RecordConsumer>) {
        info!(consumer = consumer.name(), "注册快照消费者");
        match self.consumers.write() {
            Ok(mut consumers) => consumers.push(consumer),
            Err(poisoned) => poisoned.into_inner().push(consumer),
        }
    }

    /// 最近一次完成任务的快照
    pub fn latest(&self) -> Option<Arc<ImportSnapshot>> {
        match self.latest.read() {
            Ok(latest) => latest.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 发布快照：先替换最新快照，再依次通知消费者
    pub async fn publish(&self, snapshot: Arc<ImportSnapshot>) {
        self.store(Arc::clone(&snapshot));
        self.notify(snapshot).await;
    }

    /// 依次通知消费者（不修改最新快照）
    pub async fn notify(&self, snapshot: Arc<ImportSnapshot>) {
        let consumers: Vec<Arc<dyn RecordConsumer>> = match self.consumers.read() {
            Ok(consumers) => consumers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        for consumer in consumers {
            if let Err(e) = consumer.on_snapshot(Arc::clone(&snapshot)).await {
                warn!(
                    consumer = consumer.name(),
                    job_id = %snapshot.job_id,
                    error = %e,
                    "快照消费者处理失败"
                );
            }
        }
    }
}

impl SnapshotSink for SnapshotHub {
    fn store(&self, snapshot: Arc<ImportSnapshot>) {
        match self.latest.write() {
            Ok(mut latest) => *latest = Some(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Some(snapshot),
        }
    }
}
