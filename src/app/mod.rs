// ==========================================
// 车队表格导入 - 应用层
// ==========================================
// 职责: 会话级任务管理，连接导入管道与下游消费者
// ==========================================

pub mod session;
pub mod snapshot_hub;

// 重导出
pub use session::{ImportSession, JobHandle};
pub use snapshot_hub::{RecordConsumer, SnapshotHub};
