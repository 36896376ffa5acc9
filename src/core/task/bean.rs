use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::record::TaskRecord;
use crate::core::sync::lock;

/// 下载中文件的默认后缀
pub const DEFAULT_DOWNLOADING_SUFFIX: &str = ".downloading";

/// 下载任务的描述：在任务记录之上加上 URL、目录和文件名
///
/// 文件名和总大小可以在服务器响应后才补上。
#[derive(Debug)]
pub struct DownloadBean {
    record: Arc<TaskRecord>,
    url: String,
    folder: PathBuf,
    file_name: Mutex<Option<String>>,
    downloading_suffix: String,
    /// 仍未退出的工作线程数
    workers: AtomicUsize,
}

impl DownloadBean {
    /// 以 URL 作为任务 id
    pub fn new(url: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
        let url = url.into();
        Self::with_id(url.clone(), url, folder)
    }

    pub fn with_id(id: impl Into<String>, url: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
        Self {
            record: Arc::new(TaskRecord::new(id, 0)),
            url: url.into(),
            folder: folder.into(),
            file_name: Mutex::new(None),
            downloading_suffix: DEFAULT_DOWNLOADING_SUFFIX.to_string(),
            workers: AtomicUsize::new(0),
        }
    }

    /// 预先指定文件名
    pub fn file_name_hint(self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            *lock(&self.file_name) = Some(name);
        }
        self
    }

    pub fn downloading_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.downloading_suffix = suffix.into();
        self
    }

    pub fn record(&self) -> &Arc<TaskRecord> {
        &self.record
    }

    pub fn id(&self) -> &str {
        self.record.id()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn suffix(&self) -> &str {
        &self.downloading_suffix
    }

    pub fn file_name(&self) -> Option<String> {
        lock(&self.file_name).clone()
    }

    pub fn set_file_name(&self, name: impl Into<String>) {
        *lock(&self.file_name) = Some(name.into());
    }

    /// 下载完成后的文件路径
    pub fn final_path(&self) -> Option<PathBuf> {
        self.file_name().map(|name| self.folder.join(name))
    }

    /// 还有工作线程在写文件或收尾
    pub fn has_live_worker(&self) -> bool {
        self.workers.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn worker_started(&self) {
        self.workers.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn worker_exited(&self) {
        self.workers.fetch_sub(1, Ordering::SeqCst);
    }

    /// 下载过程中的文件路径：`<文件名><后缀>`
    pub fn partial_path(&self) -> Option<PathBuf> {
        self.file_name()
            .map(|name| self.folder.join(format!("{}{}", name, self.downloading_suffix)))
    }
}
