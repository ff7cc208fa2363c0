//! 队列：工作项同步队列的消费者、打卡重试队列、重试策略

pub mod retry_policy;
pub mod sync_processor;
pub mod clock_retry_queue;

pub use retry_policy::{retry_with_backoff, RetryPolicy};
pub use sync_processor::{DrainReport, SyncConfig, SyncMetrics, SyncQueueProcessor};
pub use clock_retry_queue::{ClockRetryEntry, ClockRetryQueue, ReplayReport};
