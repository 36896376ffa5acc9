//! 断点续传的 HTTP 下载任务
//!
//! 每次 `start()` 新开一个工作线程，线程里跑一个 actix System，
//! 用一个新的 `RetryableOperation` 驱动下载直到成功、致命失败、预算用尽或被取消。
//! 暂停 / 中止只设置取消标记，工作线程自己收尾。

use futures::StreamExt;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use url::Url;

use super::bean::DownloadBean;
use super::fs::{BufferedWriter, FileSystem};
use super::http::{HttpClient, HttpClientFactory};
use super::naming;
use crate::core::error::{DownloadError, DownloadErrorKind, DownloadResult};
use crate::core::executor::{Lifecycle, TaskExecutor, TaskHooks};
use crate::core::record::TaskStatus;
use crate::core::retry::{CancelToken, RetryBudget, RetryStrategy, RetryableOperation, RetryableWork};
use crate::core::sync::lock;

/// 下载参数
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub retry: RetryBudget,
    pub strategy: RetryStrategy,
    /// 重试用尽后是否回到等待队列
    pub requeue_on_error: bool,
    pub buffer_size: usize,
    /// 进度回调的最小间隔
    pub progress_interval: Duration,
    /// 剩余空间低于该值视为磁盘已满
    pub min_free_space: u64,
    /// 单次读取响应体的超时
    pub read_timeout: Duration,
    pub lifecycle: Lifecycle,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            retry: RetryBudget::finite(3),
            strategy: RetryStrategy::default(),
            requeue_on_error: false,
            buffer_size: 64 * 1024,
            progress_interval: Duration::from_millis(500),
            min_free_space: 16 * 1024 * 1024,
            read_timeout: Duration::from_secs(30),
            lifecycle: Lifecycle::Basic,
        }
    }
}

struct ActiveRun {
    token: CancelToken,
    worker: ThreadId,
}

/// 工作线程存活期间在 bean 上计数，线程退出（或没能创建）时归还
struct WorkerGuard(Arc<DownloadBean>);

impl WorkerGuard {
    fn enter(bean: Arc<DownloadBean>) -> Self {
        bean.worker_started();
        WorkerGuard(bean)
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.worker_exited();
    }
}

/// 下载任务的状态钩子
pub struct DownloadTask {
    bean: Arc<DownloadBean>,
    options: DownloadOptions,
    http: Arc<dyn HttpClientFactory>,
    fs: Arc<dyn FileSystem>,
    active: Mutex<Option<ActiveRun>>,
    /// 同一任务前后两个工作线程不会同时写同一个文件
    file_lock: Arc<Mutex<()>>,
}

impl DownloadTask {
    /// 创建下载任务并返回它的执行器
    pub fn executor(
        bean: Arc<DownloadBean>,
        options: DownloadOptions,
        http: Arc<dyn HttpClientFactory>,
        fs: Arc<dyn FileSystem>,
    ) -> Arc<TaskExecutor> {
        let record = bean.record().clone();
        let lifecycle = options.lifecycle;
        let hooks = Arc::new(Self {
            bean,
            options,
            http,
            fs,
            active: Mutex::new(None),
            file_lock: Arc::new(Mutex::new(())),
        });
        TaskExecutor::with_lifecycle(record, lifecycle, hooks)
    }

    fn cancel_active(&self) {
        if let Some(run) = lock(&self.active).take() {
            run.token.cancel();
        }
    }

    /// 只有当前这一轮的工作线程才能结束任务，被暂停过的旧线程的结果作废
    fn is_current_worker(&self) -> bool {
        lock(&self.active)
            .as_ref()
            .map_or(false, |run| run.worker == thread::current().id())
    }

    fn finish_from_worker(&self) -> bool {
        let mut active = lock(&self.active);
        let current = active
            .as_ref()
            .map_or(false, |run| run.worker == thread::current().id());
        if current {
            *active = None;
        }
        current
    }

    fn spawn_worker(&self, task: &Arc<TaskExecutor>) -> std::io::Result<ActiveRun> {
        let token = CancelToken::new();
        let task = task.clone();
        let bean = self.bean.clone();
        let options = self.options.clone();
        let fs = self.fs.clone();
        let factory = self.http.clone();
        let file_lock = self.file_lock.clone();
        let worker_token = token.clone();
        let alive = WorkerGuard::enter(self.bean.clone());

        let handle = thread::Builder::new()
            .name(format!("download-{}", short_id(self.bean.id())))
            .spawn(move || {
                let _alive = alive;
                let _file_guard = lock(&file_lock);
                let budget = options.retry;
                let system = actix_rt::System::new();
                system.block_on(async move {
                    // 客户端不能跨线程，必须在工作线程里创建
                    let mut work = DownloadWork {
                        task,
                        bean,
                        options,
                        fs,
                        client: Some(factory.create()),
                        outcome: None,
                        last_error: None,
                        pre_error: None,
                    };
                    let mut operation = RetryableOperation::new(budget, worker_token);
                    let outcome = operation.run(&mut work).await;
                    debug!("任务 {} 本轮结束: {:?}，重试 {} 次", work.bean.id(), outcome, operation.retry_count());
                });
            })?;
        Ok(ActiveRun {
            token,
            worker: handle.thread().id(),
        })
    }

    /// 把下载中的文件改名为最终文件。可以重复调用：
    /// 下载中的文件已不存在而最终文件存在时直接视为成功。
    pub fn finalize(bean: &DownloadBean, fs: &dyn FileSystem) -> DownloadResult<PathBuf> {
        let (Some(partial), Some(target)) = (bean.partial_path(), bean.final_path()) else {
            return Err(DownloadError::unknown("文件名未确定"));
        };
        if fs.exists(&partial) {
            if fs.exists(&target) {
                fs.remove_file(&target)?;
            }
            fs.rename(&partial, &target)?;
            info!("下载完成: {}", target.display());
            return Ok(target);
        }
        if fs.exists(&target) {
            debug!("{} 已经是最终文件", target.display());
            return Ok(target);
        }
        Err(DownloadError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("找不到下载文件 {}", partial.display()),
        )))
    }
}

impl TaskHooks for DownloadTask {
    fn on_start(&self, task: &Arc<TaskExecutor>) -> bool {
        // 上一轮如果还没退出，先让它退出；新线程会等它释放文件锁
        self.cancel_active();
        match self.spawn_worker(task) {
            Ok(run) => {
                *lock(&self.active) = Some(run);
                info!("开始下载 {}", self.bean.url());
                true
            }
            Err(e) => {
                error!("无法创建下载线程: {}", e);
                false
            }
        }
    }

    fn on_start_finish(&self, _task: &Arc<TaskExecutor>) -> bool {
        self.is_current_worker()
    }

    fn on_pause(&self, _task: &Arc<TaskExecutor>) -> bool {
        self.cancel_active();
        info!("暂停下载 {}", self.bean.url());
        true
    }

    fn on_abort(&self, _task: &Arc<TaskExecutor>) -> bool {
        self.cancel_active();
        info!("中止下载 {}", self.bean.url());
        true
    }

    fn on_end_success(&self, _task: &Arc<TaskExecutor>) -> bool {
        self.finish_from_worker()
    }

    fn on_end_error(&self, _task: &Arc<TaskExecutor>, _code: i32, _retry: bool) -> bool {
        self.finish_from_worker()
    }
}

fn short_id(id: &str) -> String {
    let tail: String = id.chars().rev().take(24).collect();
    tail.chars().rev().collect()
}

/// 一次尝试失败的原因，以及要不要继续重试
#[derive(Debug)]
struct Failure {
    error: DownloadError,
    fatal: bool,
}

impl Failure {
    fn fatal(error: DownloadError) -> Self {
        Self { error, fatal: true }
    }

    fn transient(error: DownloadError) -> Self {
        Self { error, fatal: false }
    }
}

impl From<DownloadError> for Failure {
    fn from(error: DownloadError) -> Self {
        let fatal = error.is_fatal();
        Self { error, fatal }
    }
}

/// 工作线程里被重试的下载过程
struct DownloadWork {
    task: Arc<TaskExecutor>,
    bean: Arc<DownloadBean>,
    options: DownloadOptions,
    fs: Arc<dyn FileSystem>,
    client: Option<Box<dyn HttpClient>>,
    /// 重试循环因成功或致命错误结束时的结论
    outcome: Option<Result<(), DownloadError>>,
    last_error: Option<DownloadError>,
    pre_error: Option<DownloadError>,
}

impl DownloadWork {
    fn prepare(&self) -> DownloadResult<()> {
        let url = Url::parse(self.bean.url()).map_err(|e| DownloadError::invalid_url(format!("{}: {}", self.bean.url(), e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(format!("不支持的协议: {}", url.scheme())));
        }
        let folder = self.bean.folder();
        if let Err(e) = self.fs.create_dir_all(folder) {
            warn!("创建目录 {} 失败: {}", folder.display(), e);
            return Err(self.classify_io(e).error);
        }
        if self.fs.is_storage_full(folder, self.options.min_free_space) {
            return Err(DownloadError::InsufficientSpace {
                required: self.options.min_free_space,
            });
        }
        Ok(())
    }

    /// 本地 I/O 出错：磁盘满或读写自检失败是致命的，其余视为临时错误
    fn classify_io(&self, e: std::io::Error) -> Failure {
        let folder = self.bean.folder();
        if self.fs.is_storage_full(folder, self.options.min_free_space) {
            Failure::fatal(DownloadError::InsufficientSpace {
                required: self.options.min_free_space,
            })
        } else if !self.fs.is_io_healthy(folder) {
            Failure::fatal(DownloadError::LocalIoBroken(e.to_string().into()))
        } else {
            Failure::transient(DownloadError::IoError(e))
        }
    }

    fn finish_complete(&self, total: u64) -> Result<(), Failure> {
        self.bean.record().set_total_size(total);
        DownloadTask::finalize(&self.bean, self.fs.as_ref()).map_err(|e| match e {
            DownloadError::IoError(io) => self.classify_io(io),
            other => Failure::from(other),
        })?;
        self.task.notify_progress(total);
        Ok(())
    }

    async fn attempt(&mut self, token: &CancelToken) -> Result<(), Failure> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Failure::fatal(DownloadError::unknown("HTTP 客户端未初始化")))?;

        let downloaded = self
            .bean
            .partial_path()
            .and_then(|path| self.fs.file_len(&path))
            .unwrap_or(0);
        let mut request = client.new_request(self.bean.url());
        if downloaded > 0 {
            request = request.range_from(downloaded);
        }
        debug!("请求 {}，已下载 {} 字节", self.bean.url(), downloaded);

        let mut response = client
            .execute(request)
            .await
            .map_err(|e| Failure::transient(DownloadError::NetworkError(e.to_string().into())))?
            .ok_or_else(|| Failure::transient(DownloadError::NoResponse))?;

        let status = response.status();
        if status == 416 {
            if downloaded > 0 {
                info!("服务器返回 416，本地已有 {} 字节，视为下载完成", downloaded);
                return self.finish_complete(downloaded);
            }
            return Err(Failure::fatal(DownloadError::StatusCode(status)));
        }
        if !response.is_success() {
            return Err(Failure::transient(DownloadError::StatusCode(status)));
        }

        // 续传请求得到 200 说明服务器忽略了 Range，从头下载
        let offset = if status == 206 { downloaded } else { 0 };
        if downloaded > 0 && offset == 0 {
            warn!("服务器不支持断点续传，从头下载 {}", self.bean.url());
        }

        let chunked = response.is_chunked();
        let mut total = None;
        if !chunked {
            let length = response.content_length().unwrap_or(-1);
            if length <= 0 {
                // 本地已有数据时不管是 206 还是 200，都按已下完处理
                if downloaded > 0 {
                    return self.finish_complete(downloaded);
                }
                return Err(Failure::fatal(DownloadError::NoContentLength));
            }
            let size = offset + length as u64;
            self.bean.record().set_total_size(size);
            total = Some(size);
        }

        if self.bean.file_name().is_none() {
            let name = naming::derive(response.header("Content-Disposition"), self.bean.url());
            info!("{} 保存为 {}", self.bean.url(), name);
            self.bean.set_file_name(name);
        }
        let (Some(partial), Some(target)) = (self.bean.partial_path(), self.bean.final_path()) else {
            return Err(Failure::fatal(DownloadError::unknown("文件名未确定")));
        };

        if let Some(size) = total {
            if let Some(existing) = self.fs.file_len(&target) {
                if existing >= size {
                    info!("{} 已存在且完整，跳过下载", target.display());
                    if self.fs.exists(&partial) {
                        let _ = self.fs.remove_file(&partial);
                    }
                    self.bean.record().set_total_size(existing);
                    self.task.notify_progress(existing);
                    return Ok(());
                }
                debug!("删除不完整的旧文件 {}", target.display());
                self.fs.remove_file(&target).map_err(|e| self.classify_io(e))?;
            }
        }

        let mut body = response
            .take_body()
            .ok_or_else(|| Failure::transient(DownloadError::NoInputStream))?;
        let file = self
            .fs
            .open_write(&partial, offset > 0)
            .map_err(|e| self.classify_io(e))?;
        let mut writer = BufferedWriter::new(file, self.options.buffer_size);

        let mut completed = offset;
        let mut last_report = Instant::now();
        self.task.notify_progress(completed);
        loop {
            if token.is_cancelled() {
                let _ = writer.flush();
                return Err(Failure::transient(DownloadError::Cancelled));
            }
            let next = tokio::select! {
                _ = token.cancelled() => {
                    let _ = writer.flush();
                    return Err(Failure::transient(DownloadError::Cancelled));
                }
                next = tokio::time::timeout(self.options.read_timeout, body.next()) => next,
            };
            let chunk = match next {
                Err(_) => {
                    let _ = writer.flush();
                    return Err(Failure::transient(DownloadError::NetworkError("读取响应超时".into())));
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    let _ = writer.flush();
                    return Err(match e {
                        DownloadError::IoError(io) => self.classify_io(io),
                        other => Failure::transient(other),
                    });
                }
                Ok(Some(Ok(chunk))) => chunk,
            };
            writer.write(&chunk).map_err(|e| self.classify_io(e))?;
            completed += chunk.len() as u64;
            if last_report.elapsed() >= self.options.progress_interval {
                self.task.notify_progress(completed);
                last_report = Instant::now();
            }
        }
        writer.flush().map_err(|e| self.classify_io(e))?;
        drop(writer);

        match total {
            Some(size) if completed < size => {
                self.task.notify_progress(completed);
                Err(Failure::transient(DownloadError::NetworkError(
                    format!("连接提前结束: {}/{}", completed, size).into(),
                )))
            }
            Some(size) => self.finish_complete(size.max(completed)),
            None => self.finish_complete(completed),
        }
    }
}

#[async_trait::async_trait(?Send)]
impl RetryableWork for DownloadWork {
    async fn pre_execute(&mut self, token: &CancelToken) -> bool {
        if token.is_cancelled() {
            return false;
        }
        if let Err(e) = self.prepare() {
            error!("下载准备失败 {}: {}", self.bean.url(), e);
            self.pre_error = Some(e);
            return false;
        }
        if self.task.lifecycle() == Lifecycle::Gradual && !self.task.start_finish() {
            // 启动过程中被暂停或中止
            return false;
        }
        true
    }

    fn on_pre_execute_error(&mut self) {
        let code = self
            .pre_error
            .as_ref()
            .map_or(DownloadErrorKind::IoException, DownloadError::kind)
            .code();
        self.task.end_error(code, false);
    }

    async fn repeat_execute(&mut self, token: &CancelToken) -> bool {
        match self.attempt(token).await {
            Ok(()) => {
                self.outcome = Some(Ok(()));
                true
            }
            Err(_) if token.is_cancelled() => true,
            Err(failure) if failure.fatal => {
                error!("下载失败 {}: {}（{}）", self.bean.url(), failure.error, failure.error.kind());
                self.outcome = Some(Err(failure.error));
                true
            }
            Err(failure) => {
                warn!("下载出错，准备重试 {}: {}", self.bean.url(), failure.error);
                self.last_error = Some(failure.error);
                false
            }
        }
    }

    fn retry_interval(&self, count: usize) -> Duration {
        self.options.strategy.delay(count)
    }

    fn on_post_execute(&mut self, finished: bool) {
        match (finished, self.outcome.take()) {
            (true, Some(Ok(()))) => {
                self.task.end_success();
            }
            (true, Some(Err(e))) => {
                self.task.end_error(e.kind().code(), false);
            }
            _ => {
                let kind = self
                    .last_error
                    .as_ref()
                    .map_or(DownloadErrorKind::IoException, DownloadError::kind);
                warn!("{} 重试用尽，最后错误 {}", self.bean.url(), kind);
                self.task.end_error(kind.code(), self.options.requeue_on_error);
            }
        }
    }

    fn on_cancelled(&mut self) {
        debug!("下载 {} 已取消", self.bean.url());
        if self.task.status() == TaskStatus::Pausing {
            self.task.pause_finish();
        }
    }
}
