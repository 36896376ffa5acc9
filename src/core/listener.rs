use std::sync::{Arc, RwLock};

use super::record::TaskRecord;
use super::sync::{read, write};

/// 任务管理器对外广播的事件
///
/// 回调可能来自任意工作线程，实现方需要自己保证线程安全；
/// 回调里不要阻塞等待其它任务的状态切换。
pub trait ManagerListener: Send + Sync {
    fn on_add(&self, _task: &TaskRecord) {}
    fn on_add_all(&self, _tasks: &[Arc<TaskRecord>]) {}
    fn on_remove(&self, _task: &TaskRecord) {}
    fn on_remove_all(&self, _tasks: &[Arc<TaskRecord>]) {}
    fn on_start(&self, _task: &TaskRecord) {}
    fn on_stop(&self, _task: &TaskRecord) {}
    fn on_stop_all(&self) {}
    fn on_finish_all(&self) {}
    fn on_doing(&self, _task: &TaskRecord, _completed: u64) {}
    fn on_complete(&self, _task: &TaskRecord) {}
    fn on_error(&self, _task: &TaskRecord, _code: i32) {}
    fn on_speed_update(&self, _task: &TaskRecord, _bytes_per_second: u64) {}
}

/// 监听者列表：遍历前先拍快照，回调中增删监听者不会影响本轮广播
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn ManagerListener>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn ManagerListener>) {
        write(&self.listeners).push(listener);
    }

    pub fn remove(&self, listener: &Arc<dyn ManagerListener>) -> bool {
        let mut listeners = write(&self.listeners);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        read(&self.listeners).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emit<F>(&self, f: F)
    where
        F: Fn(&dyn ManagerListener),
    {
        let snapshot: Vec<Arc<dyn ManagerListener>> = read(&self.listeners).clone();
        for listener in &snapshot {
            f(listener.as_ref());
        }
    }
}
