//! 可重试操作：一次性准备 + 带退避的重复执行循环，支持协作式取消

use async_trait::async_trait;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// 协作式取消标记
///
/// 标记只会从"运行"变为"取消"，不会复位；每次启动都应创建新的标记。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.is_cancelled()
    }

    /// 等待取消发生
    pub async fn cancelled(&self) {
        loop {
            // 先登记再检查，避免错过检查与等待之间的通知
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// 可被取消打断的睡眠，睡满返回 true
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_running(),
            _ = self.cancelled() => false,
        }
    }
}

/// 重试预算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    /// 最多执行这么多次（至少一次）
    Finite(usize),
    /// 直到成功或被取消
    Infinite,
}

impl RetryBudget {
    pub fn finite(attempts: usize) -> Self {
        RetryBudget::Finite(attempts.max(1))
    }

    fn allows(self, attempts_done: usize) -> bool {
        match self {
            RetryBudget::Finite(limit) => attempts_done < limit.max(1),
            RetryBudget::Infinite => true,
        }
    }
}

/// 指数退避
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64, // 抖动因子，避免重试风暴
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryStrategy {
    /// 固定间隔，不带抖动
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// 第 `retry_count` 次失败之后的等待时间（从 1 开始计数）
    pub fn delay(&self, retry_count: usize) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let jitter = if self.jitter_factor > 0.0 {
            delay_secs * self.jitter_factor * (rand::random::<f64>() - 0.5)
        } else {
            0.0
        };
        let final_delay = (delay_secs + jitter).max(0.0);

        Duration::from_secs_f64(final_delay.min(self.max_delay.as_secs_f64()))
    }
}

/// 被重试驱动的工作单元
#[async_trait(?Send)]
pub trait RetryableWork {
    /// 一次性准备；返回 false 且未被取消时触发 `on_pre_execute_error`
    async fn pre_execute(&mut self, token: &CancelToken) -> bool;

    fn on_pre_execute_error(&mut self) {}

    /// 被重试的单元，返回 true 表示结束重试（成功或致命失败）
    async fn repeat_execute(&mut self, token: &CancelToken) -> bool;

    /// 第 `count` 次失败后的退避时间
    fn retry_interval(&self, count: usize) -> Duration;

    /// 循环结束且未被取消；`finished` 为 false 表示预算用尽
    fn on_post_execute(&mut self, finished: bool);

    fn on_cancelled(&mut self);
}

/// 一次运行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Finished,
    Exhausted,
    PreExecuteFailed,
    Cancelled,
}

/// 重试循环本身；每次启动任务时新建一个，结束后丢弃
#[derive(Debug)]
pub struct RetryableOperation {
    budget: RetryBudget,
    token: CancelToken,
    retry_count: usize,
}

impl RetryableOperation {
    pub fn new(budget: RetryBudget, token: CancelToken) -> Self {
        Self {
            budget,
            token,
            retry_count: 0,
        }
    }

    pub fn retry_count(&self) -> usize {
        self.retry_count
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub async fn run<W: RetryableWork + ?Sized>(&mut self, work: &mut W) -> RetryOutcome {
        if !work.pre_execute(&self.token).await {
            if self.token.is_cancelled() {
                work.on_cancelled();
                return RetryOutcome::Cancelled;
            }
            work.on_pre_execute_error();
            return RetryOutcome::PreExecuteFailed;
        }

        let mut finished = false;
        while self.token.is_running() && self.budget.allows(self.retry_count) {
            if work.repeat_execute(&self.token).await {
                finished = true;
                break;
            }
            self.retry_count += 1;
            if !self.budget.allows(self.retry_count) {
                warn!("重试 {} 次后放弃", self.retry_count);
                break;
            }
            let delay = work.retry_interval(self.retry_count);
            debug!("第 {} 次重试前等待 {:?}", self.retry_count, delay);
            if !self.token.sleep(delay).await {
                break;
            }
        }

        if self.token.is_running() {
            work.on_post_execute(finished);
            if finished {
                RetryOutcome::Finished
            } else {
                RetryOutcome::Exhausted
            }
        } else {
            work.on_cancelled();
            RetryOutcome::Cancelled
        }
    }
}
