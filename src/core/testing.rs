//! 测试用的记录监听器、脚本化 HTTP 客户端和可注入故障的文件系统

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::core::error::{DownloadError, DownloadResult};
use crate::core::listener::ManagerListener;
use crate::core::record::TaskRecord;
use crate::core::sync::lock;
use crate::core::task::fs::{FileSystem, LocalFileSystem};
use crate::core::task::http::{HttpClient, HttpClientFactory, HttpRequest, HttpResponse};

/// 把管理器事件记成字符串
#[derive(Default)]
pub(crate) struct RecordingListener {
    pending: Mutex<Vec<String>>,
    history: Mutex<Vec<String>>,
    arrived: Condvar,
}

impl RecordingListener {
    fn push(&self, event: String) {
        lock(&self.pending).push(event.clone());
        lock(&self.history).push(event);
        self.arrived.notify_all();
    }

    /// 取出上次 take 之后的事件
    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.pending))
    }

    /// 全部历史事件
    pub(crate) fn events(&self) -> Vec<String> {
        lock(&self.history).clone()
    }

    /// 等到历史里出现 `event`
    pub(crate) fn wait_for(&self, event: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut history = lock(&self.history);
        loop {
            if history.iter().any(|e| e == event) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            history = match self.arrived.wait_timeout(history, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

impl ManagerListener for RecordingListener {
    fn on_add(&self, task: &TaskRecord) {
        self.push(format!("add:{}", task.id()));
    }

    fn on_add_all(&self, tasks: &[Arc<TaskRecord>]) {
        self.push(format!("add_all:{}", tasks.len()));
    }

    fn on_remove(&self, task: &TaskRecord) {
        self.push(format!("remove:{}", task.id()));
    }

    fn on_remove_all(&self, tasks: &[Arc<TaskRecord>]) {
        self.push(format!("remove_all:{}", tasks.len()));
    }

    fn on_start(&self, task: &TaskRecord) {
        self.push(format!("start:{}", task.id()));
    }

    fn on_stop(&self, task: &TaskRecord) {
        self.push(format!("stop:{}", task.id()));
    }

    fn on_stop_all(&self) {
        self.push("stop_all".to_string());
    }

    fn on_finish_all(&self) {
        self.push("finish_all".to_string());
    }

    fn on_doing(&self, task: &TaskRecord, completed: u64) {
        self.push(format!("doing:{}:{}", task.id(), completed));
    }

    fn on_complete(&self, task: &TaskRecord) {
        self.push(format!("complete:{}", task.id()));
    }

    fn on_error(&self, task: &TaskRecord, code: i32) {
        self.push(format!("error:{}:{}", task.id(), code));
    }

    fn on_speed_update(&self, task: &TaskRecord, bytes_per_second: u64) {
        self.push(format!("speed:{}:{}", task.id(), bytes_per_second));
    }
}

/// 响应体发完之后怎么收尾
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tail {
    End,
    /// 一直挂起，直到被取消或读超时
    Stall,
    Error,
}

/// 预先排好的一次响应
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Reply {
        status: u16,
        headers: Vec<(String, String)>,
        chunks: Vec<Vec<u8>>,
        tail: Tail,
    },
    NoResponse,
    TransportError,
}

impl Scripted {
    pub(crate) fn ok(status: u16, body: &[u8]) -> Self {
        let chunks = if body.is_empty() { Vec::new() } else { vec![body.to_vec()] };
        Self::chunks(status, chunks)
    }

    pub(crate) fn chunks(status: u16, chunks: Vec<Vec<u8>>) -> Self {
        Self::Reply {
            status,
            headers: Vec::new(),
            chunks,
            tail: Tail::End,
        }
    }

    pub(crate) fn header(mut self, name: &str, value: &str) -> Self {
        if let Self::Reply { headers, .. } = &mut self {
            headers.push((name.to_string(), value.to_string()));
        }
        self
    }

    pub(crate) fn stall(self) -> Self {
        self.ending(Tail::Stall)
    }

    pub(crate) fn ending(mut self, end: Tail) -> Self {
        if let Self::Reply { tail, .. } = &mut self {
            *tail = end;
        }
        self
    }
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Scripted>,
    requests: Vec<HttpRequest>,
}

/// 按顺序吐出预设响应的客户端工厂，同时记录收到的请求
#[derive(Default, Clone)]
pub(crate) struct ScriptedHttp {
    script: Arc<Mutex<Script>>,
}

impl ScriptedHttp {
    pub(crate) fn push(&self, reply: Scripted) {
        lock(&self.script).replies.push_back(reply);
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.script).requests.clone()
    }
}

impl HttpClientFactory for ScriptedHttp {
    fn create(&self) -> Box<dyn HttpClient> {
        Box::new(self.clone())
    }
}

#[async_trait(?Send)]
impl HttpClient for ScriptedHttp {
    async fn execute(&self, request: HttpRequest) -> DownloadResult<Option<HttpResponse>> {
        let reply = {
            let mut script = lock(&self.script);
            script.requests.push(request);
            script.replies.pop_front()
        };
        match reply {
            None | Some(Scripted::TransportError) => Err(DownloadError::NetworkError("连接被拒绝".into())),
            Some(Scripted::NoResponse) => Ok(None),
            Some(Scripted::Reply {
                status,
                headers,
                chunks,
                tail,
            }) => {
                let mut response = HttpResponse::new(status);
                for (name, value) in headers {
                    response = response.with_header(name, value);
                }
                let body = stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))));
                let body = match tail {
                    Tail::End => body.boxed_local(),
                    Tail::Stall => body.chain(stream::pending()).boxed_local(),
                    Tail::Error => body
                        .chain(stream::once(async {
                            Err(DownloadError::NetworkError("连接被重置".into()))
                        }))
                        .boxed_local(),
                };
                Ok(Some(response.with_body(body)))
            }
        }
    }
}

/// 本地文件系统外加可控的探测结果和一次性的写入故障
pub(crate) struct ProbeFs {
    local: LocalFileSystem,
    storage_full: AtomicBool,
    io_healthy: AtomicBool,
    write_budget: Arc<Mutex<Option<usize>>>,
}

impl Default for ProbeFs {
    fn default() -> Self {
        Self {
            local: LocalFileSystem::new(),
            storage_full: AtomicBool::new(false),
            io_healthy: AtomicBool::new(true),
            write_budget: Arc::new(Mutex::new(None)),
        }
    }
}

impl ProbeFs {
    pub(crate) fn set_storage_full(&self, full: bool) {
        self.storage_full.store(full, Ordering::SeqCst);
    }

    pub(crate) fn set_io_healthy(&self, healthy: bool) {
        self.io_healthy.store(healthy, Ordering::SeqCst);
    }

    /// 再写入 `bytes` 字节后的下一次写入失败一次
    pub(crate) fn fail_writes_after(&self, bytes: usize) {
        *lock(&self.write_budget) = Some(bytes);
    }
}

impl FileSystem for ProbeFs {
    fn open_write(&self, path: &Path, append: bool) -> io::Result<Box<dyn Write + Send>> {
        let inner = self.local.open_write(path, append)?;
        Ok(Box::new(BudgetWriter {
            inner,
            budget: self.write_budget.clone(),
        }))
    }

    fn is_storage_full(&self, _dir: &Path, _min_free: u64) -> bool {
        self.storage_full.load(Ordering::SeqCst)
    }

    fn is_io_healthy(&self, _dir: &Path) -> bool {
        self.io_healthy.load(Ordering::SeqCst)
    }
}

struct BudgetWriter {
    inner: Box<dyn Write + Send>,
    budget: Arc<Mutex<Option<usize>>>,
}

impl Write for BudgetWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        {
            let mut budget = lock(&self.budget);
            match *budget {
                Some(left) if buf.len() > left => {
                    *budget = None;
                    return Err(io::Error::new(io::ErrorKind::Other, "模拟写入失败"));
                }
                Some(left) => *budget = Some(left - buf.len()),
                None => {}
            }
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
