// ==========================================
// 车队表格导入 - 进度发布器
// ==========================================
// 职责: 将任务进度以有序事件流推送给订阅者
// 规则: 序号由发布器单调分配，订阅者按序接收，不重复
// 规则: 任务到达终态后的新订阅立即得到终态事件并结束
// ==========================================

use crate::domain::job::{ImportSummary, JobState, ProgressEvent};
use chrono::Utc;
use futures::Stream;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{trace, warn};
use uuid::Uuid;

/// 默认事件缓冲容量
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct PublisherState {
    sequence: u64,
    latest: Option<ProgressEvent>,
}

pub struct ProgressPublisher {
    job_id: Uuid,
    sender: broadcast::Sender<ProgressEvent>,
    state: Mutex<PublisherState>,
}

impl ProgressPublisher {
    pub fn new(job_id: Uuid, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            job_id,
            sender,
            state: Mutex::new(PublisherState::default()),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// 发布一条进度事件
    ///
    /// # 参数
    /// - state: 事件所处状态
    /// - row_index: 最后处理的行号（状态迁移事件为 None）
    /// - summary: 当前计数
    ///
    /// # 返回
    /// 已发布的事件；终态事件之后的发布被丢弃，返回 None
    pub fn publish(
        &self,
        state: JobState,
        row_index: Option<usize>,
        summary: &ImportSummary,
    ) -> Option<ProgressEvent> {
        let mut guard = self.lock();
        if guard
            .latest
            .as_ref()
            .is_some_and(|event| event.state.is_terminal())
        {
            warn!(job_id = %self.job_id, state = %state, "任务已结束，丢弃进度事件");
            return None;
        }

        guard.sequence += 1;
        let event = ProgressEvent {
            job_id: self.job_id,
            sequence: guard.sequence,
            state,
            row_index,
            total_rows: summary.total_rows,
            rows_seen: summary.rows_seen,
            rows_accepted: summary.rows_accepted,
            rows_rejected: summary.rows_rejected,
            emitted_at: Utc::now(),
        };

        // 持锁发送，保证序号与投递顺序一致；无订阅者时 send 返回 Err，可忽略
        let _ = self.sender.send(event.clone());
        trace!(job_id = %self.job_id, sequence = event.sequence, state = %state, "进度事件");
        guard.latest = Some(event.clone());
        Some(event)
    }

    /// 最近一次发布的事件
    pub fn latest(&self) -> Option<ProgressEvent> {
        self.lock().latest.clone()
    }

    /// 订阅进度事件
    ///
    /// 先产出订阅时刻的最新事件（若有），随后按序产出新事件，
    /// 产出终态事件后结束。
    pub fn subscribe(&self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        let guard = self.lock();
        let latest = guard.latest.clone();
        let finished = latest
            .as_ref()
            .is_some_and(|event| event.state.is_terminal());
        // 持锁订阅：latest 之后的事件必然进入该接收端
        let mut receiver = (!finished).then(|| self.sender.subscribe());
        drop(guard);

        let job_id = self.job_id;
        async_stream::stream! {
            if let Some(event) = latest {
                let terminal = event.state.is_terminal();
                yield event;
                if terminal {
                    return;
                }
            }

            let Some(receiver) = receiver.as_mut() else {
                return;
            };
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let terminal = event.state.is_terminal();
                        yield event;
                        if terminal {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(job_id = %job_id, skipped, "进度订阅者落后，跳过部分事件");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, PublisherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn counts(seen: usize) -> ImportSummary {
        ImportSummary {
            total_rows: 3,
            rows_seen: seen,
            rows_accepted: seen,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_events_ordered_and_finite() {
        let publisher = ProgressPublisher::new(Uuid::new_v4(), 16);
        let stream = publisher.subscribe();

        publisher.publish(JobState::Parsing, None, &counts(0));
        publisher.publish(JobState::Validating, Some(2), &counts(2));
        publisher.publish(JobState::Completed, None, &counts(3));

        let events: Vec<ProgressEvent> = stream.collect().await;
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(events[1].row_index, Some(2));
        assert_eq!(events[2].state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_terminal_only() {
        let publisher = ProgressPublisher::new(Uuid::new_v4(), 16);
        publisher.publish(JobState::Parsing, None, &counts(0));
        publisher.publish(JobState::Failed, None, &counts(0));

        let events: Vec<ProgressEvent> = publisher.subscribe().collect().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state, JobState::Failed);
        assert_eq!(events[0].sequence, 2);
    }

    #[tokio::test]
    async fn test_mid_job_subscriber_starts_from_latest() {
        let publisher = ProgressPublisher::new(Uuid::new_v4(), 16);
        publisher.publish(JobState::Parsing, None, &counts(0));
        publisher.publish(JobState::Mapping, None, &counts(0));

        let stream = publisher.subscribe();
        publisher.publish(JobState::Cancelled, None, &counts(0));

        let states: Vec<JobState> = stream.map(|e| e.state).collect().await;
        assert_eq!(states, vec![JobState::Mapping, JobState::Cancelled]);
    }

    #[test]
    fn test_publish_after_terminal_is_dropped() {
        let publisher = ProgressPublisher::new(Uuid::new_v4(), 4);
        publisher.publish(JobState::Completed, None, &counts(3));

        assert!(publisher.publish(JobState::Validating, Some(1), &counts(1)).is_none());
        assert_eq!(publisher.latest().map(|e| e.sequence), Some(1));
    }
}
