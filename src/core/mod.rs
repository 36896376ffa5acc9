//! Core: 任务记录、执行器、调度管理、重试、测速，以及 HTTP 下载任务

pub mod error;
pub mod executor;
pub mod listener;
pub mod manager;
pub mod monitor;
pub mod record;
pub mod retry;
pub mod speed;
pub(crate) mod sync;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

// 只导出主流程和其它模块实际用到的类型
pub use error::{DownloadError, DownloadErrorKind, DownloadResult};
pub use executor::{ExecutorListener, Lifecycle, NoopHooks, TaskExecutor, TaskHooks};
pub use listener::{ListenerSet, ManagerListener};
pub use manager::{ManagerKind, ManagerSnapshot, TaskFilter, TaskManager, TaskScheduler};
pub use monitor::{QuerySpeeds, SampleNow, SpeedMonitor, StopMonitor};
pub use record::{TaskRecord, TaskSnapshot, TaskStatus};
pub use retry::{CancelToken, RetryBudget, RetryOutcome, RetryStrategy, RetryableOperation, RetryableWork};
pub use speed::{InstantSpeed, SmoothedSpeed, SpeedCalculator, WindowSpeed};
