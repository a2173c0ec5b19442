pub mod batch;
pub mod dedupe;
pub mod queue;
pub mod retry;
pub mod sweep;
pub mod worker;

pub use batch::BatchTracker;
pub use dedupe::RequestDeduplicator;
pub use queue::{CheckJob, EnqueueOptions, JobState, QueueConfig, TaskQueue};
pub use retry::{RetryError, RetryExecutor, RetryPolicy};
pub use worker::{ExecutionResult, MonitorWorkerPool};
