//! 任务管理器：等待队列 / 运行队列（Rich 模式另有未执行队列）与调度策略
//!
//! 队列只在管理器锁内修改。锁内只做纯内存操作，把要对执行器做的动作
//! （启动、暂停、中止、改写状态）和要广播的事件收集成 `Steps`，
//! 解锁之后再依次执行，执行器回调重新进入管理器时不会自锁。

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, Weak};

use super::executor::{ExecutorListener, TaskExecutor};
use super::listener::{ListenerSet, ManagerListener};
use super::record::{TaskRecord, TaskSnapshot, TaskStatus};
use super::sync::lock;

/// 任务过滤器：返回 false 的任务不会被 `find_next_task` 选中
pub type TaskFilter = Arc<dyn Fn(&TaskRecord) -> bool + Send + Sync>;

/// 等待队列的排序规则，第一个参数是当前正在运行（或刚结束）的任务
pub type TaskScheduler = Arc<dyn Fn(Option<&TaskRecord>, &TaskRecord, &TaskRecord) -> Ordering + Send + Sync>;

/// 调度方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerKind {
    /// 同一时刻只运行一个任务
    Serial,
    /// 最多同时运行 `limit` 个任务
    Parallel { limit: usize },
    /// 串行，另设未执行队列保存 DEFAULT/ERROR 与已结束的任务
    RichSerial,
}

impl ManagerKind {
    pub fn limit(self) -> usize {
        match self {
            ManagerKind::Serial | ManagerKind::RichSerial => 1,
            ManagerKind::Parallel { limit } => limit.max(1),
        }
    }

    pub fn is_rich(self) -> bool {
        matches!(self, ManagerKind::RichSerial)
    }
}

impl fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerKind::Serial => write!(f, "serial"),
            ManagerKind::Parallel { limit } => write!(f, "parallel({})", limit),
            ManagerKind::RichSerial => write!(f, "rich_serial"),
        }
    }
}

/// 可序列化的队列快照，用于诊断输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    pub kind: ManagerKind,
    pub stopped: bool,
    pub auto_run: bool,
    pub running: Vec<TaskSnapshot>,
    pub waiting: Vec<TaskSnapshot>,
    pub unexecuted: Vec<TaskSnapshot>,
}

#[derive(Default)]
struct Queues {
    waiting: VecDeque<Arc<TaskExecutor>>,
    running: Vec<Arc<TaskExecutor>>,
    unexecuted: VecDeque<Arc<TaskExecutor>>,
    /// 原地软暂停（或被过滤器拒绝）的运行中任务，不会被自动启动
    held: HashSet<String>,
    filter: Option<TaskFilter>,
    scheduler: Option<TaskScheduler>,
    stopped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Running,
    Waiting,
    Unexecuted,
}

impl Queues {
    fn locate(&self, id: &str) -> Option<(Slot, Arc<TaskExecutor>)> {
        if let Some(task) = self.running.iter().find(|t| t.id() == id) {
            return Some((Slot::Running, task.clone()));
        }
        if let Some(task) = self.waiting.iter().find(|t| t.id() == id) {
            return Some((Slot::Waiting, task.clone()));
        }
        self.unexecuted
            .iter()
            .find(|t| t.id() == id)
            .map(|task| (Slot::Unexecuted, task.clone()))
    }

    fn contains(&self, id: &str) -> bool {
        self.locate(id).is_some()
    }

    fn take(&mut self, id: &str) -> Option<(Slot, Arc<TaskExecutor>)> {
        if let Some(pos) = self.running.iter().position(|t| t.id() == id) {
            self.held.remove(id);
            return Some((Slot::Running, self.running.remove(pos)));
        }
        if let Some(pos) = self.waiting.iter().position(|t| t.id() == id) {
            return self.waiting.remove(pos).map(|t| (Slot::Waiting, t));
        }
        if let Some(pos) = self.unexecuted.iter().position(|t| t.id() == id) {
            return self.unexecuted.remove(pos).map(|t| (Slot::Unexecuted, t));
        }
        None
    }

    fn passes(&self, record: &TaskRecord) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(record))
    }

    fn all_waiting_errored(&self) -> bool {
        !self.waiting.is_empty() && self.waiting.iter().all(|t| t.status() == TaskStatus::Error)
    }

    /// 按调度规则排序等待队列，取第一个通过过滤器的 TODO 任务；
    /// 都不通过时退回第一个 TODO 任务。每次最多取走一个。
    fn find_next_task(&mut self, current: Option<&Arc<TaskRecord>>) -> Option<Arc<TaskExecutor>> {
        if let Some(scheduler) = self.scheduler.clone() {
            let current = current.cloned().or_else(|| self.running.first().map(|t| t.record().clone()));
            self.waiting
                .make_contiguous()
                .sort_by(|a, b| scheduler(current.as_deref(), a.record().as_ref(), b.record().as_ref()));
        }
        let mut chosen = None;
        let mut fallback = None;
        for (index, task) in self.waiting.iter().enumerate() {
            if task.status() != TaskStatus::Todo {
                continue;
            }
            if self.passes(task.record()) {
                chosen = Some(index);
                break;
            }
            if fallback.is_none() {
                fallback = Some(index);
            }
        }
        chosen.or(fallback).and_then(|index| self.waiting.remove(index))
    }
}

enum Event {
    Add(Arc<TaskRecord>),
    AddAll(Vec<Arc<TaskRecord>>),
    Remove(Arc<TaskRecord>),
    RemoveAll(Vec<Arc<TaskRecord>>),
    StopAll,
    FinishAll,
}

enum Step {
    Start(Arc<TaskExecutor>),
    Pause(Arc<TaskExecutor>),
    Abort(Arc<TaskExecutor>),
    Reset(Arc<TaskExecutor>, TaskStatus),
    Emit(Event),
}

/// 锁内收集、锁外执行的动作序列
#[derive(Default)]
struct Steps(Vec<Step>);

impl Steps {
    fn start(&mut self, task: &Arc<TaskExecutor>) {
        self.0.push(Step::Start(task.clone()));
    }

    fn pause(&mut self, task: &Arc<TaskExecutor>) {
        self.0.push(Step::Pause(task.clone()));
    }

    fn abort(&mut self, task: &Arc<TaskExecutor>) {
        self.0.push(Step::Abort(task.clone()));
    }

    fn reset(&mut self, task: &Arc<TaskExecutor>, status: TaskStatus) {
        self.0.push(Step::Reset(task.clone(), status));
    }

    fn emit(&mut self, event: Event) {
        // 同一批里的 StopAll 只广播一次
        if matches!(event, Event::StopAll) && self.0.iter().any(|s| matches!(s, Step::Emit(Event::StopAll))) {
            return;
        }
        self.0.push(Step::Emit(event));
    }
}

struct ManagerInner {
    kind: ManagerKind,
    me: Weak<ManagerInner>,
    queues: Mutex<Queues>,
    auto_run: AtomicBool,
    listeners: ListenerSet,
}

/// 任务管理器，克隆得到的是同一个管理器的句柄
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

impl TaskManager {
    pub fn new(kind: ManagerKind) -> Self {
        let inner = Arc::new_cyclic(|me| ManagerInner {
            kind,
            me: me.clone(),
            queues: Mutex::new(Queues {
                stopped: true,
                ..Queues::default()
            }),
            auto_run: AtomicBool::new(true),
            listeners: ListenerSet::new(),
        });
        info!("创建任务管理器: {}", kind);
        Self { inner }
    }

    pub fn serial() -> Self {
        Self::new(ManagerKind::Serial)
    }

    pub fn parallel(limit: usize) -> Self {
        Self::new(ManagerKind::Parallel { limit })
    }

    pub fn rich_serial() -> Self {
        Self::new(ManagerKind::RichSerial)
    }

    pub fn kind(&self) -> ManagerKind {
        self.inner.kind
    }

    // ================== 监听与配置 ==================

    pub fn add_listener(&self, listener: Arc<dyn ManagerListener>) {
        self.inner.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ManagerListener>) -> bool {
        self.inner.listeners.remove(listener)
    }

    /// 任务结束后是否自动启动下一个
    pub fn set_auto_run(&self, auto_run: bool) {
        self.inner.auto_run.store(auto_run, AtomicOrdering::SeqCst);
    }

    pub fn is_auto_run(&self) -> bool {
        self.inner.auto_run.load(AtomicOrdering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        lock(&self.inner.queues).stopped
    }

    /// 安装等待队列的排序规则；None 恢复插入顺序
    pub fn set_task_scheduler(&self, scheduler: Option<TaskScheduler>) {
        lock(&self.inner.queues).scheduler = scheduler;
    }

    /// 安装过滤器，已在运行但不满足新过滤器的任务被原地暂停；
    /// 之前因过滤器被搁置、现在满足条件的任务会被启动
    pub fn set_task_filter(&self, filter: Option<TaskFilter>) {
        let mut steps = Steps::default();
        {
            let mut q = lock(&self.inner.queues);
            q.filter = filter;
            self.inner.hold_rejected(&mut q, &mut steps);
            if !q.stopped {
                let released: Vec<Arc<TaskExecutor>> = q
                    .running
                    .iter()
                    .filter(|t| q.held.contains(t.id()) && q.passes(t.record()))
                    .cloned()
                    .collect();
                for task in released {
                    q.held.remove(task.id());
                    if !task.status().is_active() {
                        steps.start(&task);
                    }
                }
            }
        }
        self.inner.run(steps);
    }

    // ================== 增删 ==================

    /// 加入单个任务；id 重复或任务属于另一个管理器时返回 false
    pub fn add_task(&self, task: Arc<TaskExecutor>) -> bool {
        let mut steps = Steps::default();
        let added = self.inner.add_locked(&task);
        if added {
            steps.emit(Event::Add(task.record().clone()));
            self.inner.fill_if_running(&mut steps);
        }
        self.inner.run(steps);
        added
    }

    /// 批量加入，返回实际加入的个数
    pub fn add_tasks(&self, tasks: Vec<Arc<TaskExecutor>>) -> usize {
        let mut steps = Steps::default();
        let mut added = Vec::new();
        for task in tasks {
            if self.inner.add_locked(&task) {
                added.push(task.record().clone());
            }
        }
        let count = added.len();
        if count > 0 {
            steps.emit(Event::AddAll(added));
            self.inner.fill_if_running(&mut steps);
        }
        self.inner.run(steps);
        count
    }

    pub fn remove_task(&self, task: &TaskExecutor) -> bool {
        self.remove_task_by_id(task.id())
    }

    /// 中止并移出队列；运行中的任务会让出运行位置
    pub fn remove_task_by_id(&self, id: &str) -> bool {
        let mut steps = Steps::default();
        let removed = {
            let mut q = lock(&self.inner.queues);
            let removed = self.inner.remove_locked(&mut q, id, &mut steps);
            if let Some(record) = &removed {
                steps.emit(Event::Remove(record.clone()));
                self.inner.refill(&mut q, None, &mut steps);
            }
            removed
        };
        self.inner.run(steps);
        removed.is_some()
    }

    pub fn remove_tasks(&self, ids: &[&str]) -> usize {
        let mut steps = Steps::default();
        let removed = {
            let mut q = lock(&self.inner.queues);
            let removed: Vec<Arc<TaskRecord>> = ids
                .iter()
                .filter_map(|id| self.inner.remove_locked(&mut q, id, &mut steps))
                .collect();
            if !removed.is_empty() {
                steps.emit(Event::RemoveAll(removed.clone()));
                self.inner.refill(&mut q, None, &mut steps);
            }
            removed
        };
        self.inner.run(steps);
        removed.len()
    }

    /// 移除全部任务（Rich 模式下同样彻底删除）
    pub fn remove_all(&self) -> usize {
        let mut steps = Steps::default();
        let removed = {
            let mut guard = lock(&self.inner.queues);
            let q = &mut *guard;
            let all: Vec<Arc<TaskExecutor>> = q
                .running
                .drain(..)
                .chain(q.waiting.drain(..))
                .chain(q.unexecuted.drain(..))
                .collect();
            q.held.clear();
            for task in &all {
                task.detach_owner();
                steps.abort(task);
                steps.reset(task, TaskStatus::Default);
            }
            let records: Vec<Arc<TaskRecord>> = all.iter().map(|t| t.record().clone()).collect();
            if !records.is_empty() {
                steps.emit(Event::RemoveAll(records.clone()));
            }
            records
        };
        self.inner.run(steps);
        removed.len()
    }

    // ================== 启停 ==================

    /// 全局启动：填满运行位置并启动所有运行中的任务
    pub fn start(&self) {
        self.inner.start_all();
    }

    pub fn resume(&self) {
        self.inner.start_all();
    }

    /// 立即启动指定任务，运行位置已满时把优先级最低的任务挤回等待队列头部
    pub fn start_task(&self, id: &str) -> bool {
        let mut steps = Steps::default();
        let found = {
            let mut q = lock(&self.inner.queues);
            self.inner.promote(&mut q, id, &mut steps)
        };
        self.inner.run(steps);
        found
    }

    pub fn resume_task(&self, id: &str) -> bool {
        self.start_task(id)
    }

    /// 全局软暂停：任务留在运行位置上，`resume()` 原地恢复
    pub fn pause(&self) {
        let mut steps = Steps::default();
        {
            let mut q = lock(&self.inner.queues);
            q.stopped = true;
            let running = q.running.clone();
            for task in running {
                q.held.insert(task.id().to_string());
                steps.pause(&task);
            }
        }
        info!("暂停全部任务");
        self.inner.run(steps);
    }

    pub fn pause_task(&self, id: &str) -> bool {
        let mut steps = Steps::default();
        let found = {
            let mut q = lock(&self.inner.queues);
            match q.running.iter().find(|t| t.id() == id).cloned() {
                Some(task) => {
                    q.held.insert(task.id().to_string());
                    steps.pause(&task);
                    true
                }
                None => false,
            }
        };
        self.inner.run(steps);
        found
    }

    /// 全局停止：运行中的任务按原顺序退回等待队列头部
    pub fn stop(&self) {
        let mut steps = Steps::default();
        {
            let mut q = lock(&self.inner.queues);
            q.stopped = true;
            q.held.clear();
            let running: Vec<Arc<TaskExecutor>> = q.running.drain(..).collect();
            for task in running.iter().rev() {
                q.waiting.push_front(task.clone());
            }
            for task in &running {
                steps.pause(task);
            }
            steps.emit(Event::StopAll);
        }
        info!("停止全部任务");
        self.inner.run(steps);
    }

    /// 停止单个任务并退回等待队列头部，不补位
    pub fn stop_task(&self, id: &str) -> bool {
        let mut steps = Steps::default();
        let found = {
            let mut q = lock(&self.inner.queues);
            match q.running.iter().position(|t| t.id() == id) {
                Some(pos) => {
                    let task = q.running.remove(pos);
                    q.held.remove(id);
                    q.waiting.push_front(task.clone());
                    steps.pause(&task);
                    if q.running.is_empty() {
                        steps.emit(Event::StopAll);
                    }
                    true
                }
                None => false,
            }
        };
        self.inner.run(steps);
        found
    }

    /// 安装过滤器并原地暂停不满足条件的运行中任务
    pub fn pause_by_filter(&self, filter: TaskFilter) {
        let mut steps = Steps::default();
        {
            let mut q = lock(&self.inner.queues);
            q.filter = Some(filter);
            self.inner.hold_rejected(&mut q, &mut steps);
        }
        self.inner.run(steps);
    }

    /// 安装过滤器，把不满足条件的运行中任务退回等待队列头部并补位
    pub fn stop_by_filter(&self, filter: TaskFilter) {
        let mut steps = Steps::default();
        {
            let mut q = lock(&self.inner.queues);
            q.filter = Some(filter);
            let rejected: Vec<Arc<TaskExecutor>> =
                q.running.iter().filter(|t| !q.passes(t.record())).cloned().collect();
            for task in rejected.iter().rev() {
                q.running.retain(|t| !Arc::ptr_eq(t, task));
                q.held.remove(task.id());
                q.waiting.push_front(task.clone());
            }
            for task in &rejected {
                steps.pause(task);
            }
            if !rejected.is_empty() {
                self.inner.refill(&mut q, None, &mut steps);
            }
        }
        self.inner.run(steps);
    }

    /// 执行器结束（完成、出错、暂停、中止）后的统一入口
    pub fn notify_task_finished(&self, task: &Arc<TaskExecutor>, add_back: bool) {
        self.inner.notify_task_finished(task, add_back);
    }

    /// 从等待队列中按调度规则取出下一个候选任务（不启动）
    pub fn find_next_task(&self) -> Option<Arc<TaskExecutor>> {
        lock(&self.inner.queues).find_next_task(None)
    }

    // ================== Rich 模式 ==================

    /// 把未执行队列里的任务重新放回等待队列
    pub fn requeue(&self, id: &str) -> bool {
        let task = {
            let q = lock(&self.inner.queues);
            match q.unexecuted.iter().find(|t| t.id() == id) {
                Some(task) => task.clone(),
                None => return false,
            }
        };
        if !task.reset_status(TaskStatus::Todo) {
            return false;
        }
        let mut steps = Steps::default();
        {
            let mut q = lock(&self.inner.queues);
            match q.unexecuted.iter().position(|t| t.id() == id) {
                Some(pos) => {
                    if let Some(task) = q.unexecuted.remove(pos) {
                        q.waiting.push_back(task);
                    }
                }
                None => return false,
            }
            if !q.stopped {
                self.inner.fill_slots_locked(&mut q, None, &mut steps);
            }
        }
        self.inner.run(steps);
        true
    }

    /// 立即运行指定任务（可以来自未执行队列）
    pub fn set_running_task(&self, id: &str) -> bool {
        self.start_task(id)
    }

    // ================== 查询 ==================

    pub fn get_task(&self, id: &str) -> Option<Arc<TaskExecutor>> {
        lock(&self.inner.queues).locate(id).map(|(_, task)| task)
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.inner.queues).contains(id)
    }

    pub fn running_tasks(&self) -> Vec<Arc<TaskExecutor>> {
        lock(&self.inner.queues).running.clone()
    }

    pub fn waiting_tasks(&self) -> Vec<Arc<TaskExecutor>> {
        lock(&self.inner.queues).waiting.iter().cloned().collect()
    }

    pub fn unexecuted_tasks(&self) -> Vec<Arc<TaskExecutor>> {
        lock(&self.inner.queues).unexecuted.iter().cloned().collect()
    }

    pub fn task_count(&self) -> usize {
        let q = lock(&self.inner.queues);
        q.running.len() + q.waiting.len() + q.unexecuted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_count() == 0
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        let q = lock(&self.inner.queues);
        ManagerSnapshot {
            kind: self.inner.kind,
            stopped: q.stopped,
            auto_run: self.is_auto_run(),
            running: snapshot_of(q.running.iter()),
            waiting: snapshot_of(q.waiting.iter()),
            unexecuted: snapshot_of(q.unexecuted.iter()),
        }
    }

    /// 测速器上报的速度，转发给管理器监听者
    pub fn report_speed(&self, record: &TaskRecord, bytes_per_second: u64) {
        self.inner
            .listeners
            .emit(|l| l.on_speed_update(record, bytes_per_second));
    }
}

fn snapshot_of<'a>(tasks: impl Iterator<Item = &'a Arc<TaskExecutor>>) -> Vec<TaskSnapshot> {
    tasks.map(|t| TaskSnapshot::from(t.record().as_ref())).collect()
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = lock(&self.inner.queues);
        f.debug_struct("TaskManager")
            .field("kind", &self.inner.kind)
            .field("running", &q.running.len())
            .field("waiting", &q.waiting.len())
            .field("unexecuted", &q.unexecuted.len())
            .field("stopped", &q.stopped)
            .finish()
    }
}

impl ManagerInner {
    fn owner_handle(&self) -> Weak<dyn ExecutorListener> {
        let me: Weak<dyn ExecutorListener> = self.me.clone();
        me
    }

    fn run(&self, steps: Steps) {
        for step in steps.0 {
            match step {
                Step::Start(task) => {
                    if !task.start() {
                        debug!("任务 {} 未能启动，当前状态 {}", task.id(), task.status());
                    }
                }
                Step::Pause(task) => {
                    task.pause();
                }
                Step::Abort(task) => {
                    task.abort();
                }
                Step::Reset(task, status) => {
                    if !task.reset_status(status) {
                        warn!("任务 {} 正在运行，无法重置为 {}", task.id(), status);
                    }
                }
                Step::Emit(event) => self.emit(event),
            }
        }
    }

    fn emit(&self, event: Event) {
        match event {
            Event::Add(record) => self.listeners.emit(|l| l.on_add(&record)),
            Event::AddAll(records) => self.listeners.emit(|l| l.on_add_all(&records)),
            Event::Remove(record) => self.listeners.emit(|l| l.on_remove(&record)),
            Event::RemoveAll(records) => self.listeners.emit(|l| l.on_remove_all(&records)),
            Event::StopAll => self.listeners.emit(|l| l.on_stop_all()),
            Event::FinishAll => {
                info!("全部任务已结束");
                self.listeners.emit(|l| l.on_finish_all())
            }
        }
    }

    /// 入队：先在锁外把状态改写好，再在锁内放入对应队列
    fn add_locked(&self, task: &Arc<TaskExecutor>) -> bool {
        if lock(&self.queues).contains(task.id()) {
            warn!("任务 {} 已存在，拒绝重复添加", task.id());
            return false;
        }
        if !task.attach_owner(self.owner_handle()) {
            warn!("任务 {} 已属于另一个管理器", task.id());
            return false;
        }
        let parked = self.kind.is_rich() && matches!(task.status(), TaskStatus::Default | TaskStatus::Error);
        if !parked && !task.reset_status(TaskStatus::Todo) {
            warn!("任务 {} 正在运行（{}），拒绝加入", task.id(), task.status());
            task.detach_owner();
            return false;
        }

        let mut q = lock(&self.queues);
        // 解锁期间可能被并发加入
        if q.contains(task.id()) {
            return false;
        }
        if parked {
            q.unexecuted.push_back(task.clone());
        } else {
            q.waiting.push_back(task.clone());
        }
        debug!("加入任务 {}", task.id());
        true
    }

    fn remove_locked(&self, q: &mut Queues, id: &str, steps: &mut Steps) -> Option<Arc<TaskRecord>> {
        let (slot, task) = q.take(id)?;
        if self.kind.is_rich() && slot != Slot::Unexecuted {
            // 第一次移除只是停放到未执行队列
            steps.abort(&task);
            steps.reset(&task, TaskStatus::Default);
            q.unexecuted.push_back(task.clone());
        } else {
            task.detach_owner();
            steps.abort(&task);
            steps.reset(&task, TaskStatus::Default);
        }
        info!("移除任务 {}", id);
        Some(task.record().clone())
    }

    fn fill_if_running(&self, steps: &mut Steps) {
        let mut q = lock(&self.queues);
        if !q.stopped {
            self.fill_slots_locked(&mut q, None, steps);
        }
    }

    /// 填满空闲的运行位置。过滤器拒绝的兜底候选占住位置但不启动，并结束本轮填充。
    /// 返回是否放入了任何任务。
    fn fill_slots_locked(&self, q: &mut Queues, current: Option<&Arc<TaskRecord>>, steps: &mut Steps) -> bool {
        let limit = self.kind.limit();
        let mut filled = false;
        while q.running.len() < limit {
            let Some(next) = q.find_next_task(current) else {
                break;
            };
            filled = true;
            q.running.push(next.clone());
            if q.passes(next.record()) {
                steps.start(&next);
            } else {
                debug!("任务 {} 未通过过滤器，占位但不启动", next.id());
                q.held.insert(next.id().to_string());
                steps.emit(Event::StopAll);
                break;
            }
        }
        filled
    }

    /// 移除任务后补位
    fn refill(&self, q: &mut Queues, current: Option<&Arc<TaskRecord>>, steps: &mut Steps) {
        if !q.stopped && self.auto_run.load(AtomicOrdering::SeqCst) {
            self.fill_slots_locked(q, current, steps);
        }
        if q.running.is_empty() && !q.stopped {
            if q.waiting.is_empty() {
                steps.emit(Event::FinishAll);
            } else {
                steps.emit(Event::StopAll);
            }
        }
    }

    fn hold_rejected(&self, q: &mut Queues, steps: &mut Steps) {
        let rejected: Vec<Arc<TaskExecutor>> = q.running.iter().filter(|t| !q.passes(t.record())).cloned().collect();
        for task in rejected {
            q.held.insert(task.id().to_string());
            if task.status().is_active() {
                steps.pause(&task);
            }
        }
    }

    fn start_all(&self) {
        // 等待队列全是 ERROR：先统一重置再调度，避免全局自动运行卡死
        let errored: Vec<Arc<TaskExecutor>> = {
            let q = lock(&self.queues);
            if q.running.len() < self.kind.limit() && q.all_waiting_errored() {
                q.waiting.iter().cloned().collect()
            } else {
                Vec::new()
            }
        };
        if !errored.is_empty() {
            info!("等待队列中 {} 个任务全部出错，重置为 TODO", errored.len());
            for task in &errored {
                task.reset_status(TaskStatus::Todo);
            }
        }

        let mut steps = Steps::default();
        {
            let mut q = lock(&self.queues);
            q.stopped = false;
            q.held.clear();
            for task in q.running.clone() {
                if !q.passes(task.record()) {
                    q.held.insert(task.id().to_string());
                } else if !task.status().is_active() {
                    steps.start(&task);
                }
            }
            self.fill_slots_locked(&mut q, None, &mut steps);
            if q.running.is_empty() {
                if q.waiting.is_empty() {
                    steps.emit(Event::FinishAll);
                } else {
                    steps.emit(Event::StopAll);
                }
            }
        }
        info!("启动任务管理器");
        self.run(steps);
    }

    fn promote(&self, q: &mut Queues, id: &str, steps: &mut Steps) -> bool {
        let Some((slot, task)) = q.locate(id) else {
            return false;
        };
        if slot == Slot::Running {
            q.held.remove(id);
            if !task.status().is_active() {
                steps.start(&task);
            }
            return true;
        }

        let _ = q.take(id);
        if slot == Slot::Unexecuted || task.status() == TaskStatus::Default {
            steps.reset(&task, TaskStatus::Todo);
        }
        if q.running.len() >= self.kind.limit() {
            if let Some(victim) = self.pick_victim(q, task.record()) {
                q.running.retain(|t| !Arc::ptr_eq(t, &victim));
                q.held.remove(victim.id());
                q.waiting.push_front(victim.clone());
                debug!("任务 {} 让出运行位置给 {}", victim.id(), id);
                steps.pause(&victim);
            }
        }
        q.running.push(task.clone());
        steps.start(&task);
        true
    }

    /// 串行总是挤掉当前任务；并行挤掉调度顺序上最靠后的任务
    fn pick_victim(&self, q: &Queues, incoming: &Arc<TaskRecord>) -> Option<Arc<TaskExecutor>> {
        if matches!(self.kind, ManagerKind::Serial | ManagerKind::RichSerial) {
            return q.running.first().cloned();
        }
        match &q.scheduler {
            Some(scheduler) => q
                .running
                .iter()
                .max_by(|a, b| scheduler(Some(incoming.as_ref()), a.record().as_ref(), b.record().as_ref()))
                .cloned(),
            None => q.running.last().cloned(),
        }
    }

    fn notify_task_finished(&self, task: &Arc<TaskExecutor>, add_back: bool) {
        let mut steps = Steps::default();
        {
            let mut q = lock(&self.queues);
            let id = task.id();
            let Some(pos) = q.running.iter().position(|t| Arc::ptr_eq(t, task)) else {
                // 已经被外部暂停或停止过
                if add_back && task.status() == TaskStatus::Todo {
                    if !q.contains(id) {
                        q.waiting.push_back(task.clone());
                    }
                } else if self.kind.is_rich() {
                    if let Some((_, parked)) = q.take(id) {
                        q.unexecuted.push_back(parked);
                    }
                } else if q.take(id).is_some() {
                    task.detach_owner();
                }
                return;
            };

            q.running.remove(pos);
            q.held.remove(id);

            let auto = !q.stopped && self.auto_run.load(AtomicOrdering::SeqCst);
            // 先选下一个再放回队尾，刚结束的任务不会在同一次调用里被选中
            let next = q.find_next_task(Some(task.record()));
            if add_back {
                q.waiting.push_back(task.clone());
            } else if self.kind.is_rich() {
                q.unexecuted.push_back(task.clone());
            } else {
                task.detach_owner();
            }
            match next {
                Some(next) => {
                    q.running.push(next.clone());
                    if auto && q.passes(next.record()) {
                        steps.start(&next);
                    } else {
                        q.held.insert(next.id().to_string());
                        steps.emit(Event::StopAll);
                    }
                }
                None => {
                    if q.all_waiting_errored() {
                        for errored in q.waiting.iter() {
                            steps.reset(errored, TaskStatus::Todo);
                        }
                    }
                    if !auto {
                        steps.emit(Event::StopAll);
                    }
                }
            }

            if q.running.is_empty() {
                if q.waiting.is_empty() {
                    steps.emit(Event::FinishAll);
                } else {
                    steps.emit(Event::StopAll);
                }
            }
        }
        self.run(steps);
    }

    fn is_held(&self, id: &str) -> bool {
        lock(&self.queues).held.contains(id)
    }
}

impl ExecutorListener for ManagerInner {
    fn on_start(&self, task: &Arc<TaskExecutor>) {
        self.listeners.emit(|l| l.on_start(task.record()));
    }

    fn on_pause(&self, task: &Arc<TaskExecutor>) {
        self.listeners.emit(|l| l.on_stop(task.record()));
        if self.is_held(task.id()) || task.status() == TaskStatus::Pausing {
            return;
        }
        self.notify_task_finished(task, true);
    }

    fn on_pause_finish(&self, task: &Arc<TaskExecutor>) {
        if self.is_held(task.id()) {
            return;
        }
        self.notify_task_finished(task, true);
    }

    fn on_abort(&self, task: &Arc<TaskExecutor>) {
        self.listeners.emit(|l| l.on_stop(task.record()));
        self.notify_task_finished(task, false);
    }

    fn on_complete(&self, task: &Arc<TaskExecutor>) {
        self.listeners.emit(|l| l.on_complete(task.record()));
        self.notify_task_finished(task, false);
    }

    fn on_error(&self, task: &Arc<TaskExecutor>, code: i32, retry: bool) {
        self.listeners.emit(|l| l.on_error(task.record(), code));
        self.notify_task_finished(task, retry);
    }

    fn on_progress(&self, task: &Arc<TaskExecutor>, completed: u64) {
        self.listeners.emit(|l| l.on_doing(task.record(), completed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::RecordingListener;

    fn ids(tasks: &[Arc<TaskExecutor>]) -> Vec<String> {
        tasks.iter().map(|t| t.id().to_string()).collect()
    }

    fn manager_with(kind: ManagerKind, names: &[&str]) -> (TaskManager, Arc<RecordingListener>, Vec<Arc<TaskExecutor>>) {
        let manager = TaskManager::new(kind);
        let recorder = Arc::new(RecordingListener::default());
        manager.add_listener(recorder.clone());
        let tasks: Vec<Arc<TaskExecutor>> = names.iter().map(|n| TaskExecutor::plain(*n)).collect();
        assert_eq!(manager.add_tasks(tasks.clone()), tasks.len());
        recorder.take();
        (manager, recorder, tasks)
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let manager = TaskManager::serial();
        assert!(manager.add_task(TaskExecutor::plain("a")));
        assert!(!manager.add_task(TaskExecutor::plain("a")));
        assert_eq!(manager.task_count(), 1);
        assert_eq!(manager.get_task("a").map(|t| t.status()), Some(TaskStatus::Todo));
    }

    #[test]
    fn test_task_belongs_to_one_manager() {
        let first = TaskManager::serial();
        let second = TaskManager::serial();
        let task = TaskExecutor::plain("a");
        assert!(first.add_task(task.clone()));
        assert!(!second.add_task(task.clone()));
        assert!(first.remove_task(&task));
        assert!(second.add_task(task));
    }

    #[test]
    fn test_parallel_complete_promotes_next_in_order() {
        let (manager, recorder, tasks) = manager_with(ManagerKind::Parallel { limit: 2 }, &["A", "B", "C"]);
        manager.start();
        assert_eq!(ids(&manager.running_tasks()), vec!["A", "B"]);
        assert_eq!(ids(&manager.waiting_tasks()), vec!["C"]);
        assert_eq!(recorder.take(), vec!["start:A", "start:B"]);

        assert!(tasks[0].end_success());
        assert_eq!(ids(&manager.running_tasks()), vec!["B", "C"]);
        assert!(manager.waiting_tasks().is_empty());
        assert_eq!(recorder.take(), vec!["complete:A", "start:C"]);
        assert!(!manager.contains("A"));
    }

    #[test]
    fn test_serial_runs_one_at_a_time_until_finish_all() {
        let (manager, recorder, tasks) = manager_with(ManagerKind::Serial, &["A", "B"]);
        manager.start();
        assert_eq!(ids(&manager.running_tasks()), vec!["A"]);
        assert_eq!(tasks[1].status(), TaskStatus::Todo);

        tasks[0].end_success();
        tasks[1].end_success();
        assert!(manager.is_empty());
        assert_eq!(
            recorder.take(),
            vec!["start:A", "complete:A", "start:B", "complete:B", "finish_all"]
        );
    }

    #[test]
    fn test_all_errored_waiting_tasks_reset_on_start() {
        let (manager, _recorder, tasks) = manager_with(ManagerKind::Serial, &["A", "B", "C"]);
        for task in &tasks {
            assert!(task.reset_status(TaskStatus::Error));
        }
        manager.start();
        assert_eq!(ids(&manager.running_tasks()), vec!["A"]);
        assert_eq!(tasks[0].status(), TaskStatus::Doing);
        assert_eq!(tasks[1].status(), TaskStatus::Todo);
        assert_eq!(tasks[2].status(), TaskStatus::Todo);
    }

    #[test]
    fn test_error_with_retry_goes_back_to_waiting() {
        let (manager, recorder, tasks) = manager_with(ManagerKind::Serial, &["A", "B"]);
        manager.start();
        tasks[0].end_error(5, true);
        assert_eq!(ids(&manager.running_tasks()), vec!["B"]);
        assert_eq!(ids(&manager.waiting_tasks()), vec!["A"]);
        assert_eq!(recorder.take(), vec!["start:A", "error:A:5", "start:B"]);

        // 只剩出错任务时重置为 TODO，但不会自动重跑
        tasks[1].end_success();
        assert_eq!(tasks[0].status(), TaskStatus::Todo);
        assert!(manager.running_tasks().is_empty());
        assert_eq!(recorder.take(), vec!["complete:B", "stop_all"]);
    }

    #[test]
    fn test_error_without_retry_is_discarded() {
        let (manager, _recorder, tasks) = manager_with(ManagerKind::Serial, &["A"]);
        manager.start();
        tasks[0].end_error(2, false);
        assert!(manager.is_empty());
        assert_eq!(tasks[0].status(), TaskStatus::Error);
    }

    #[test]
    fn test_serial_pause_resume_in_place() {
        let (manager, recorder, tasks) = manager_with(ManagerKind::Serial, &["A", "B"]);
        manager.start();
        manager.pause();
        assert_eq!(tasks[0].status(), TaskStatus::Todo);
        assert_eq!(ids(&manager.running_tasks()), vec!["A"]);
        assert_eq!(ids(&manager.waiting_tasks()), vec!["B"]);

        manager.resume();
        assert_eq!(tasks[0].status(), TaskStatus::Doing);
        assert_eq!(ids(&manager.running_tasks()), vec!["A"]);
        assert_eq!(recorder.take(), vec!["start:A", "stop:A", "start:A"]);
    }

    #[test]
    fn test_serial_stop_start_round_trip() {
        let (manager, recorder, tasks) = manager_with(ManagerKind::Serial, &["A", "B"]);
        manager.start();
        manager.stop();
        assert!(manager.running_tasks().is_empty());
        assert_eq!(ids(&manager.waiting_tasks()), vec!["A", "B"]);
        assert_eq!(tasks[0].status(), TaskStatus::Todo);

        manager.start();
        assert_eq!(tasks[0].status(), TaskStatus::Doing);
        assert_eq!(ids(&manager.running_tasks()), vec!["A"]);
        assert_eq!(recorder.take(), vec!["start:A", "stop:A", "stop_all", "start:A"]);
    }

    #[test]
    fn test_targeted_stop_and_pause() {
        let (manager, recorder, tasks) = manager_with(ManagerKind::Serial, &["A", "B"]);
        manager.start();
        manager.stop_task("A");
        assert_eq!(ids(&manager.waiting_tasks()), vec!["A", "B"]);
        assert!(manager.running_tasks().is_empty());
        assert!(manager.start_task("B"));
        manager.pause_task("B");
        assert_eq!(tasks[1].status(), TaskStatus::Todo);
        assert_eq!(ids(&manager.running_tasks()), vec!["B"]);
        assert_eq!(recorder.take(), vec!["start:A", "stop:A", "stop_all", "start:B", "stop:B"]);
    }

    #[test]
    fn test_targeted_start_evicts_running_task() {
        let (manager, _recorder, tasks) = manager_with(ManagerKind::Serial, &["A", "B", "C"]);
        manager.start();
        assert!(manager.start_task("C"));
        assert_eq!(ids(&manager.running_tasks()), vec!["C"]);
        assert_eq!(ids(&manager.waiting_tasks()), vec!["A", "B"]);
        assert_eq!(tasks[0].status(), TaskStatus::Todo);
        assert_eq!(tasks[2].status(), TaskStatus::Doing);
        assert!(!manager.start_task("missing"));
    }

    #[test]
    fn test_parallel_eviction_uses_scheduler_order() {
        let (manager, _recorder, tasks) = manager_with(ManagerKind::Parallel { limit: 2 }, &["A", "B", "C"]);
        // 按 id 倒序：C 优先级最高，A 最低
        manager.set_task_scheduler(Some(Arc::new(|_: Option<&TaskRecord>, a: &TaskRecord, b: &TaskRecord| {
            b.id().cmp(a.id())
        })));
        manager.start();
        assert_eq!(ids(&manager.running_tasks()), vec!["C", "B"]);
        manager.start_task("A");
        // 运行中 C、B 里顺序最靠后的是 B
        assert_eq!(ids(&manager.running_tasks()), vec!["C", "A"]);
        assert_eq!(tasks[1].status(), TaskStatus::Todo);
    }

    #[test]
    fn test_running_never_exceeds_limit() {
        let names: Vec<String> = (0..8).map(|i| format!("t{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (manager, _recorder, tasks) = manager_with(ManagerKind::Parallel { limit: 3 }, &refs);
        manager.start();
        for task in &tasks {
            assert!(manager.running_tasks().len() <= 3);
            if task.status() == TaskStatus::Doing {
                task.end_success();
            }
        }
        while let Some(task) = manager.running_tasks().first().cloned() {
            assert!(manager.running_tasks().len() <= 3);
            task.end_success();
        }
        assert!(manager.is_empty());
    }

    #[test]
    fn test_find_next_task_falls_back_to_filtered_task() {
        let (manager, _recorder, _tasks) = manager_with(ManagerKind::Serial, &["A", "B"]);
        manager.set_task_filter(Some(Arc::new(|r: &TaskRecord| r.id() == "B")));
        assert_eq!(manager.find_next_task().map(|t| t.id().to_string()), Some("B".to_string()));

        manager.set_task_filter(Some(Arc::new(|_: &TaskRecord| false)));
        // 只取走一个
        assert_eq!(manager.find_next_task().map(|t| t.id().to_string()), Some("A".to_string()));
        assert!(manager.find_next_task().is_none());
    }

    #[test]
    fn test_filtered_fallback_occupies_slot_without_starting() {
        let (manager, recorder, tasks) = manager_with(ManagerKind::Serial, &["A"]);
        manager.set_task_filter(Some(Arc::new(|_: &TaskRecord| false)));
        manager.start();
        assert_eq!(ids(&manager.running_tasks()), vec!["A"]);
        assert_eq!(tasks[0].status(), TaskStatus::Todo);
        assert!(recorder.take().contains(&"stop_all".to_string()));

        manager.set_task_filter(None);
        assert_eq!(tasks[0].status(), TaskStatus::Doing);
    }

    #[test]
    fn test_pause_by_filter_keeps_task_in_place() {
        let (manager, _recorder, tasks) = manager_with(ManagerKind::Parallel { limit: 2 }, &["A", "B"]);
        manager.start();
        manager.pause_by_filter(Arc::new(|r: &TaskRecord| r.id() != "A"));
        assert_eq!(tasks[0].status(), TaskStatus::Todo);
        assert_eq!(tasks[1].status(), TaskStatus::Doing);
        assert_eq!(ids(&manager.running_tasks()), vec!["A", "B"]);
    }

    #[test]
    fn test_stop_by_filter_moves_task_back_and_refills() {
        let (manager, _recorder, tasks) = manager_with(ManagerKind::Parallel { limit: 2 }, &["A", "B", "C"]);
        manager.start();
        manager.stop_by_filter(Arc::new(|r: &TaskRecord| r.id() != "A"));
        assert_eq!(ids(&manager.running_tasks()), vec!["B", "C"]);
        assert_eq!(ids(&manager.waiting_tasks()), vec!["A"]);
        assert_eq!(tasks[0].status(), TaskStatus::Todo);
        assert_eq!(tasks[2].status(), TaskStatus::Doing);
    }

    #[test]
    fn test_remove_running_task_frees_slot() {
        let (manager, recorder, tasks) = manager_with(ManagerKind::Serial, &["A", "B"]);
        manager.start();
        assert!(manager.remove_task_by_id("A"));
        assert_eq!(tasks[0].status(), TaskStatus::Default);
        assert_eq!(ids(&manager.running_tasks()), vec!["B"]);
        assert_eq!(recorder.take(), vec!["start:A", "remove:A", "start:B"]);
        assert!(!manager.remove_task_by_id("A"));
    }

    #[test]
    fn test_rich_serial_parks_and_requeues() {
        let manager = TaskManager::rich_serial();
        let recorder = Arc::new(RecordingListener::default());
        manager.add_listener(recorder.clone());
        let parked = TaskExecutor::plain("parked");
        let queued = TaskExecutor::plain("queued");
        queued.reset_status(TaskStatus::Todo);
        manager.add_tasks(vec![parked.clone(), queued.clone()]);
        assert_eq!(ids(&manager.unexecuted_tasks()), vec!["parked"]);
        assert_eq!(ids(&manager.waiting_tasks()), vec!["queued"]);

        manager.start();
        queued.end_error(8, false);
        // 出错不丢弃，停放到未执行队列
        assert_eq!(ids(&manager.unexecuted_tasks()), vec!["parked", "queued"]);
        assert!(manager.running_tasks().is_empty());

        assert!(manager.requeue("parked"));
        assert_eq!(parked.status(), TaskStatus::Doing);
        assert!(manager.set_running_task("queued"));
        assert_eq!(queued.status(), TaskStatus::Doing);
        assert_eq!(ids(&manager.running_tasks()), vec!["queued"]);
        assert_eq!(ids(&manager.waiting_tasks()), vec!["parked"]);
    }

    #[test]
    fn test_rich_serial_removal_parks_first() {
        let manager = TaskManager::rich_serial();
        let task = TaskExecutor::plain("a");
        task.reset_status(TaskStatus::Todo);
        manager.add_task(task.clone());
        assert!(manager.remove_task_by_id("a"));
        assert_eq!(ids(&manager.unexecuted_tasks()), vec!["a"]);
        assert_eq!(task.status(), TaskStatus::Default);
        assert!(manager.remove_task_by_id("a"));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_scheduler_receives_finished_task() {
        let (manager, _recorder, tasks) = manager_with(ManagerKind::Serial, &["g1-a", "g2-a", "g1-b"]);
        // 优先继续同一组
        manager.set_task_scheduler(Some(Arc::new(|current: Option<&TaskRecord>, a: &TaskRecord, b: &TaskRecord| {
            let group = |r: &TaskRecord| r.id().split('-').next().map(str::to_string);
            let same = |r: &TaskRecord| current.map_or(false, |c| group(c) == group(r));
            same(b).cmp(&same(a))
        })));
        manager.start();
        tasks[0].end_success();
        assert_eq!(ids(&manager.running_tasks()), vec!["g1-b"]);
    }

    #[test]
    fn test_snapshot_serializes() {
        let (manager, _recorder, _tasks) = manager_with(ManagerKind::Parallel { limit: 1 }, &["A", "B"]);
        manager.start();
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.running.len(), 1);
        assert_eq!(snapshot.waiting[0].id, "B");
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"parallel\""));
        assert!(json.contains("\"DOING\""));
    }

    #[test]
    fn test_progress_and_speed_reach_listeners() {
        let (manager, recorder, tasks) = manager_with(ManagerKind::Serial, &["A"]);
        manager.start();
        tasks[0].notify_progress(128);
        manager.report_speed(tasks[0].record(), 64);
        assert_eq!(recorder.take(), vec!["start:A", "doing:A:128", "speed:A:64"]);
    }

    #[test]
    fn test_direct_pause_of_only_task_returns_it_to_waiting() {
        let (manager, recorder, tasks) = manager_with(ManagerKind::Serial, &["A"]);
        manager.start();
        assert!(tasks[0].pause());
        assert_eq!(tasks[0].status(), TaskStatus::Todo);
        assert!(manager.running_tasks().is_empty());
        assert_eq!(ids(&manager.waiting_tasks()), vec!["A"]);
        assert_eq!(recorder.take(), vec!["start:A", "stop:A", "stop_all"]);

        manager.start();
        assert_eq!(ids(&manager.running_tasks()), vec!["A"]);
        assert_eq!(tasks[0].status(), TaskStatus::Doing);
    }

    #[test]
    fn test_direct_pause_hands_slot_to_next_task() {
        let (manager, recorder, tasks) = manager_with(ManagerKind::Serial, &["A", "B"]);
        manager.start();
        assert!(tasks[0].pause());
        assert_eq!(ids(&manager.running_tasks()), vec!["B"]);
        assert_eq!(ids(&manager.waiting_tasks()), vec!["A"]);
        assert_eq!(tasks[0].status(), TaskStatus::Todo);
        assert_eq!(recorder.take(), vec!["start:A", "stop:A", "start:B"]);
    }

    #[test]
    fn test_concurrent_completions_keep_limit_and_drain() {
        use std::thread;
        use std::time::{Duration, Instant};

        let names: Vec<String> = (0..30).map(|i| format!("t{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (manager, recorder, tasks) = manager_with(ManagerKind::Parallel { limit: 3 }, &refs);
        manager.start();

        let deadline = Instant::now() + Duration::from_secs(10);
        thread::scope(|s| {
            for _ in 0..6 {
                s.spawn(|| {
                    while !manager.is_empty() && Instant::now() < deadline {
                        let running = manager.running_tasks();
                        assert!(running.len() <= 3);
                        for task in running {
                            if task.status() == TaskStatus::Doing {
                                task.end_success();
                            }
                        }
                        thread::yield_now();
                    }
                });
            }
        });

        assert!(manager.is_empty());
        assert!(tasks.iter().all(|t| t.status() == TaskStatus::Done));
        let completed = recorder.events().iter().filter(|e| e.starts_with("complete:")).count();
        assert_eq!(completed, 30);
    }

    #[test]
    fn test_gradual_remove_while_pausing_stays_default() {
        use crate::core::executor::NoopHooks;
        let manager = TaskManager::serial();
        let a = TaskExecutor::gradual(Arc::new(TaskRecord::new("A", 0)), Arc::new(NoopHooks));
        let b = TaskExecutor::gradual(Arc::new(TaskRecord::new("B", 0)), Arc::new(NoopHooks));
        manager.add_tasks(vec![a.clone(), b.clone()]);
        manager.start();
        assert!(a.start_finish());
        assert!(a.pause());
        assert_eq!(a.status(), TaskStatus::Pausing);

        assert!(manager.remove_task_by_id("A"));
        assert_eq!(a.status(), TaskStatus::Default);
        assert_eq!(ids(&manager.running_tasks()), vec!["B"]);

        // 工作线程迟到的暂停收尾不能改写状态
        assert!(!a.pause_finish());
        assert_eq!(a.status(), TaskStatus::Default);
        assert!(!manager.contains("A"));
    }

    #[test]
    fn test_gradual_pause_waits_for_finish() {
        use crate::core::executor::NoopHooks;
        let manager = TaskManager::serial();
        let a = TaskExecutor::gradual(Arc::new(TaskRecord::new("A", 0)), Arc::new(NoopHooks));
        let b = TaskExecutor::gradual(Arc::new(TaskRecord::new("B", 0)), Arc::new(NoopHooks));
        manager.add_tasks(vec![a.clone(), b.clone()]);
        manager.start();
        assert_eq!(a.status(), TaskStatus::Starting);
        a.start_finish();
        assert!(a.pause());
        // 暂停未结束前仍占着运行位置
        assert_eq!(ids(&manager.running_tasks()), vec!["A"]);
        assert!(a.pause_finish());
        assert_eq!(ids(&manager.running_tasks()), vec!["B"]);
        assert_eq!(ids(&manager.waiting_tasks()), vec!["A"]);
        assert_eq!(b.status(), TaskStatus::Starting);
    }
}
