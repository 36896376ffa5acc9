//! 任务执行器：单个任务的状态机
//!
//! - `Lifecycle::Basic`：TODO/ERROR → DOING → DONE/ERROR/TODO
//! - `Lifecycle::Gradual`：在启停两侧插入 STARTING / PAUSING 两个过渡状态
//! - 演化：`evolve()` 之后所有状态切换都转交给新的执行器，新执行器的状态与回调会镜像回来

use log::{debug, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread::{self, ThreadId};
use std::time::Instant;

use super::record::{TaskRecord, TaskStatus};
use super::speed::{SpeedCalculator, WindowSpeed};
use super::sync::{lock, read, write};

/// 生命周期变体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Basic,
    Gradual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Start,
    StartFinish,
    Pause,
    PauseFinish,
    Abort,
    EndSuccess,
    EndError,
}

impl Lifecycle {
    /// 状态转换表：当前状态下是否允许该转换
    fn accepts(self, transition: Transition, from: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, transition) {
            (_, Transition::Start) => matches!(from, Todo | Error),
            (Lifecycle::Basic, Transition::StartFinish | Transition::PauseFinish) => false,
            (Lifecycle::Gradual, Transition::StartFinish) => from == Starting,
            (Lifecycle::Gradual, Transition::PauseFinish) => from == Pausing,
            (Lifecycle::Basic, Transition::Pause) => from == Doing,
            (Lifecycle::Gradual, Transition::Pause) => matches!(from, Doing | Starting),
            (Lifecycle::Basic, Transition::Abort) => matches!(from, Todo | Doing),
            (Lifecycle::Gradual, Transition::Abort) => matches!(from, Todo | Doing | Starting | Pausing),
            (_, Transition::EndSuccess) => from == Doing,
            (Lifecycle::Basic, Transition::EndError) => from == Doing,
            (Lifecycle::Gradual, Transition::EndError) => matches!(from, Doing | Starting),
        }
    }
}

/// 状态切换的钩子，返回 false 即否决本次切换
///
/// 钩子运行在调用方线程上，且持有执行器的切换锁：
/// 不要在钩子里同步调用同一个执行器的 start/pause/abort/end_*。
pub trait TaskHooks: Send + Sync {
    fn on_start(&self, _task: &Arc<TaskExecutor>) -> bool {
        true
    }

    fn on_start_finish(&self, _task: &Arc<TaskExecutor>) -> bool {
        true
    }

    fn on_pause(&self, _task: &Arc<TaskExecutor>) -> bool {
        true
    }

    fn on_pause_finish(&self, _task: &Arc<TaskExecutor>) -> bool {
        true
    }

    fn on_abort(&self, _task: &Arc<TaskExecutor>) -> bool {
        true
    }

    fn on_end_success(&self, _task: &Arc<TaskExecutor>) -> bool {
        true
    }

    fn on_end_error(&self, _task: &Arc<TaskExecutor>, _code: i32, _retry: bool) -> bool {
        true
    }
}

/// 不做任何事的钩子，纯状态机
pub struct NoopHooks;

impl TaskHooks for NoopHooks {}

/// 执行器事件监听。每次成功的状态切换在写入状态之后恰好触发一次回调。
pub trait ExecutorListener: Send + Sync {
    fn on_start(&self, _task: &Arc<TaskExecutor>) {}
    fn on_start_finish(&self, _task: &Arc<TaskExecutor>) {}
    fn on_pause(&self, _task: &Arc<TaskExecutor>) {}
    fn on_pause_finish(&self, _task: &Arc<TaskExecutor>) {}
    fn on_abort(&self, _task: &Arc<TaskExecutor>) {}
    fn on_complete(&self, _task: &Arc<TaskExecutor>) {}
    fn on_error(&self, _task: &Arc<TaskExecutor>, _code: i32, _retry: bool) {}
    fn on_progress(&self, _task: &Arc<TaskExecutor>, _completed: u64) {}
}

#[derive(Debug, Clone, Copy)]
enum ExecutorEvent {
    Start,
    StartFinish,
    Pause,
    PauseFinish,
    Abort,
    Complete,
    Error { code: i32, retry: bool },
    Progress(u64),
}

impl ExecutorEvent {
    fn deliver(self, listener: &dyn ExecutorListener, task: &Arc<TaskExecutor>) {
        match self {
            ExecutorEvent::Start => listener.on_start(task),
            ExecutorEvent::StartFinish => listener.on_start_finish(task),
            ExecutorEvent::Pause => listener.on_pause(task),
            ExecutorEvent::PauseFinish => listener.on_pause_finish(task),
            ExecutorEvent::Abort => listener.on_abort(task),
            ExecutorEvent::Complete => listener.on_complete(task),
            ExecutorEvent::Error { code, retry } => listener.on_error(task, code, retry),
            ExecutorEvent::Progress(size) => listener.on_progress(task, size),
        }
    }
}

/// 单个任务的执行器
pub struct TaskExecutor {
    record: Arc<TaskRecord>,
    lifecycle: Lifecycle,
    hooks: Arc<dyn TaskHooks>,
    speed: Mutex<Box<dyn SpeedCalculator>>,
    /// 所属管理器（弱引用，执行器不延长管理器寿命）
    owner: Mutex<Option<Weak<dyn ExecutorListener>>>,
    listeners: RwLock<Vec<Arc<dyn ExecutorListener>>>,
    delegate: RwLock<Option<Arc<TaskExecutor>>>,
    transition_lock: Mutex<()>,
    in_transition: Mutex<Option<ThreadId>>,
    /// 渐进式暂停结束后要落到的状态
    pause_target: Mutex<TaskStatus>,
}

impl TaskExecutor {
    pub fn new(record: Arc<TaskRecord>, hooks: Arc<dyn TaskHooks>) -> Arc<Self> {
        Self::with_lifecycle(record, Lifecycle::Basic, hooks)
    }

    pub fn gradual(record: Arc<TaskRecord>, hooks: Arc<dyn TaskHooks>) -> Arc<Self> {
        Self::with_lifecycle(record, Lifecycle::Gradual, hooks)
    }

    pub fn with_lifecycle(record: Arc<TaskRecord>, lifecycle: Lifecycle, hooks: Arc<dyn TaskHooks>) -> Arc<Self> {
        Arc::new(Self {
            record,
            lifecycle,
            hooks,
            speed: Mutex::new(Box::new(WindowSpeed::default())),
            owner: Mutex::new(None),
            listeners: RwLock::new(Vec::new()),
            delegate: RwLock::new(None),
            transition_lock: Mutex::new(()),
            in_transition: Mutex::new(None),
            pause_target: Mutex::new(TaskStatus::Todo),
        })
    }

    /// 纯状态机执行器，多用于测试和简单任务
    pub fn plain(id: impl Into<String>) -> Arc<Self> {
        Self::new(Arc::new(TaskRecord::new(id, 0)), Arc::new(NoopHooks))
    }

    pub fn set_speed_calculator(&self, calculator: Box<dyn SpeedCalculator>) {
        *lock(&self.speed) = calculator;
    }

    pub fn id(&self) -> &str {
        self.record.id()
    }

    pub fn record(&self) -> &Arc<TaskRecord> {
        &self.record
    }

    pub fn status(&self) -> TaskStatus {
        self.record.status()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn delegate(&self) -> Option<Arc<TaskExecutor>> {
        read(&self.delegate).clone()
    }

    pub fn is_evolved(&self) -> bool {
        read(&self.delegate).is_some()
    }

    // ================== 状态切换 ==================

    /// TODO|ERROR → DOING（渐进式为 STARTING）
    pub fn start(self: &Arc<Self>) -> bool {
        if let Some(next) = self.delegate() {
            return next.start();
        }
        let started = self.transition(Transition::Start, None, ExecutorEvent::Start, |hooks, task| {
            hooks.on_start(task)
        });
        if started {
            lock(&self.speed).reset();
        }
        started
    }

    /// STARTING → DOING，仅渐进式
    pub fn start_finish(self: &Arc<Self>) -> bool {
        if let Some(next) = self.delegate() {
            return next.start_finish();
        }
        self.transition(Transition::StartFinish, None, ExecutorEvent::StartFinish, |hooks, task| {
            hooks.on_start_finish(task)
        })
    }

    /// DOING → TODO（渐进式为 PAUSING）
    pub fn pause(self: &Arc<Self>) -> bool {
        self.pause_to(TaskStatus::Todo)
    }

    /// 暂停并在结束后落到指定状态
    pub fn pause_to(self: &Arc<Self>, post_status: TaskStatus) -> bool {
        if let Some(next) = self.delegate() {
            return next.pause_to(post_status);
        }
        self.transition(Transition::Pause, Some(post_status), ExecutorEvent::Pause, |hooks, task| {
            hooks.on_pause(task)
        })
    }

    /// PAUSING → 暂停时记下的目标状态，仅渐进式
    pub fn pause_finish(self: &Arc<Self>) -> bool {
        if let Some(next) = self.delegate() {
            return next.pause_finish();
        }
        self.transition(Transition::PauseFinish, None, ExecutorEvent::PauseFinish, |hooks, task| {
            hooks.on_pause_finish(task)
        })
    }

    /// TODO|DOING(|STARTING|PAUSING) → DONE
    pub fn abort(self: &Arc<Self>) -> bool {
        if let Some(next) = self.delegate() {
            return next.abort();
        }
        self.transition(Transition::Abort, None, ExecutorEvent::Abort, |hooks, task| hooks.on_abort(task))
    }

    /// DOING → DONE
    pub fn end_success(self: &Arc<Self>) -> bool {
        if let Some(next) = self.delegate() {
            return next.end_success();
        }
        self.transition(Transition::EndSuccess, None, ExecutorEvent::Complete, |hooks, task| {
            hooks.on_end_success(task)
        })
    }

    /// DOING → ERROR；`retry` 表示是否希望回到等待队列
    pub fn end_error(self: &Arc<Self>, code: i32, retry: bool) -> bool {
        if let Some(next) = self.delegate() {
            return next.end_error(code, retry);
        }
        self.transition(Transition::EndError, None, ExecutorEvent::Error { code, retry }, |hooks, task| {
            hooks.on_end_error(task, code, retry)
        })
    }

    fn transition<F>(
        self: &Arc<Self>,
        transition: Transition,
        post_status: Option<TaskStatus>,
        event: ExecutorEvent,
        hook: F,
    ) -> bool
    where
        F: FnOnce(&dyn TaskHooks, &Arc<Self>) -> bool,
    {
        let me = thread::current().id();
        if *lock(&self.in_transition) == Some(me) {
            warn!("任务 {} 在钩子或回调中重入 {:?}，已拒绝", self.id(), transition);
            return false;
        }

        let _guard = lock(&self.transition_lock);
        *lock(&self.in_transition) = Some(me);

        let from = self.status();
        let accepted = if !self.lifecycle.accepts(transition, from) {
            debug!("任务 {} 当前状态 {} 不允许 {:?}", self.id(), from, transition);
            false
        } else if !hook(self.hooks.as_ref(), self) {
            debug!("任务 {} 的 {:?} 被钩子否决", self.id(), transition);
            false
        } else {
            let target = self.target_status(transition, post_status);
            self.record.set_status(target);
            debug!("任务 {}: {} -> {}", self.id(), from, target);
            true
        };

        if accepted {
            self.dispatch(event);
        }
        *lock(&self.in_transition) = None;
        accepted
    }

    fn target_status(&self, transition: Transition, post_status: Option<TaskStatus>) -> TaskStatus {
        match (self.lifecycle, transition) {
            (Lifecycle::Basic, Transition::Start) => TaskStatus::Doing,
            (Lifecycle::Gradual, Transition::Start) => TaskStatus::Starting,
            (_, Transition::StartFinish) => TaskStatus::Doing,
            (Lifecycle::Basic, Transition::Pause) => post_status.unwrap_or(TaskStatus::Todo),
            (Lifecycle::Gradual, Transition::Pause) => {
                *lock(&self.pause_target) = post_status.unwrap_or(TaskStatus::Todo);
                TaskStatus::Pausing
            }
            (_, Transition::PauseFinish) => *lock(&self.pause_target),
            (_, Transition::Abort) | (_, Transition::EndSuccess) => TaskStatus::Done,
            (_, Transition::EndError) => TaskStatus::Error,
        }
    }

    // ================== 进度 ==================

    /// 工作线程汇报进度；计数写入记录后通知监听者
    pub fn notify_progress(self: &Arc<Self>, completed: u64) {
        self.record.set_completed_size(completed);
        self.dispatch(ExecutorEvent::Progress(completed));
    }

    /// 用当前已完成大小喂一次测速器
    pub fn sample_speed(&self, now: Instant) -> u64 {
        let completed = self.record.completed_size();
        lock(&self.speed).sample(completed, now)
    }

    // ================== 监听与归属 ==================

    pub fn add_listener(&self, listener: Arc<dyn ExecutorListener>) {
        write(&self.listeners).push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ExecutorListener>) {
        write(&self.listeners).retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn dispatch(self: &Arc<Self>, event: ExecutorEvent) {
        // 先拍快照再遍历，回调里可以安全地增删监听者
        let listeners: Vec<Arc<dyn ExecutorListener>> = read(&self.listeners).clone();
        for listener in &listeners {
            event.deliver(listener.as_ref(), self);
        }
        let owner = lock(&self.owner).as_ref().and_then(Weak::upgrade);
        if let Some(owner) = owner {
            event.deliver(owner.as_ref(), self);
        }
    }

    /// 绑定到管理器；已属于另一个仍存活的管理器时失败
    pub(crate) fn attach_owner(&self, owner: Weak<dyn ExecutorListener>) -> bool {
        let mut slot = lock(&self.owner);
        if let Some(current) = slot.as_ref() {
            if current.strong_count() > 0 && !Weak::ptr_eq(current, &owner) {
                return false;
            }
        }
        *slot = Some(owner);
        true
    }

    pub(crate) fn detach_owner(&self) {
        *lock(&self.owner) = None;
    }

    /// 管理器改写状态（入队置 TODO、移除置 DEFAULT、错误重置）。
    /// 正在运行的任务拒绝改写。
    ///
    /// 可能在本执行器自己的回调里被调用（例如出错回调触发管理器的错误重置），
    /// 此时切换锁已由当前线程持有，不能再次加锁。
    pub(crate) fn reset_status(&self, status: TaskStatus) -> bool {
        let reentrant = *lock(&self.in_transition) == Some(thread::current().id());
        let _guard = if reentrant { None } else { Some(lock(&self.transition_lock)) };
        let current = self.status();
        if current.is_active() {
            return current == status;
        }
        self.record.set_status(status);
        true
    }

    // ================== 演化 ==================

    /// 把后续所有状态切换永久转交给 `next`，不可撤销
    pub fn evolve(self: &Arc<Self>, next: Arc<TaskExecutor>) -> bool {
        if Arc::ptr_eq(self, &next) {
            return false;
        }
        {
            let mut slot = write(&self.delegate);
            if slot.is_some() {
                warn!("任务 {} 已经演化过，忽略再次演化", self.id());
                return false;
            }
            *slot = Some(next.clone());
        }
        next.add_listener(Arc::new(EvolutionMirror {
            origin: Arc::downgrade(self),
        }));
        info!("任务 {} 演化为 {}", self.id(), next.id());
        true
    }

    fn mirror_from(&self, next: &TaskExecutor) {
        if Arc::ptr_eq(&self.record, &next.record) {
            return;
        }
        self.record.set_status(next.status());
        self.record.set_completed_size(next.record.completed_size());
        if let Some(total) = next.record.total_size() {
            self.record.set_total_size(total);
        }
    }
}

impl fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("id", &self.id())
            .field("status", &self.status())
            .field("lifecycle", &self.lifecycle)
            .field("evolved", &self.is_evolved())
            .finish()
    }
}

/// 把演化目标的状态与回调镜像回原执行器
struct EvolutionMirror {
    origin: Weak<TaskExecutor>,
}

impl EvolutionMirror {
    fn forward(&self, next: &Arc<TaskExecutor>, event: ExecutorEvent) {
        if let Some(origin) = self.origin.upgrade() {
            origin.mirror_from(next);
            origin.dispatch(event);
        }
    }
}

impl ExecutorListener for EvolutionMirror {
    fn on_start(&self, task: &Arc<TaskExecutor>) {
        self.forward(task, ExecutorEvent::Start);
    }

    fn on_start_finish(&self, task: &Arc<TaskExecutor>) {
        self.forward(task, ExecutorEvent::StartFinish);
    }

    fn on_pause(&self, task: &Arc<TaskExecutor>) {
        self.forward(task, ExecutorEvent::Pause);
    }

    fn on_pause_finish(&self, task: &Arc<TaskExecutor>) {
        self.forward(task, ExecutorEvent::PauseFinish);
    }

    fn on_abort(&self, task: &Arc<TaskExecutor>) {
        self.forward(task, ExecutorEvent::Abort);
    }

    fn on_complete(&self, task: &Arc<TaskExecutor>) {
        self.forward(task, ExecutorEvent::Complete);
    }

    fn on_error(&self, task: &Arc<TaskExecutor>, code: i32, retry: bool) {
        self.forward(task, ExecutorEvent::Error { code, retry });
    }

    fn on_progress(&self, task: &Arc<TaskExecutor>, completed: u64) {
        self.forward(task, ExecutorEvent::Progress(completed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<String>>,
    }

    impl EventLog {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }

        fn push(&self, task: &Arc<TaskExecutor>, name: &str) {
            // 回调触发时状态必须已经写入
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:{}:{}", task.id(), name, task.status()));
        }
    }

    impl ExecutorListener for EventLog {
        fn on_start(&self, task: &Arc<TaskExecutor>) {
            self.push(task, "start");
        }
        fn on_start_finish(&self, task: &Arc<TaskExecutor>) {
            self.push(task, "start_finish");
        }
        fn on_pause(&self, task: &Arc<TaskExecutor>) {
            self.push(task, "pause");
        }
        fn on_pause_finish(&self, task: &Arc<TaskExecutor>) {
            self.push(task, "pause_finish");
        }
        fn on_abort(&self, task: &Arc<TaskExecutor>) {
            self.push(task, "abort");
        }
        fn on_complete(&self, task: &Arc<TaskExecutor>) {
            self.push(task, "complete");
        }
        fn on_error(&self, task: &Arc<TaskExecutor>, code: i32, retry: bool) {
            self.push(task, &format!("error({},{})", code, retry));
        }
    }

    fn todo(executor: &Arc<TaskExecutor>) -> &Arc<TaskExecutor> {
        assert!(executor.reset_status(TaskStatus::Todo));
        executor
    }

    #[test]
    fn test_basic_lifecycle() {
        let log = Arc::new(EventLog::default());
        let task = TaskExecutor::plain("a");
        task.add_listener(log.clone());

        // DEFAULT 不能直接启动
        assert!(!task.start());
        todo(&task);
        assert!(task.start());
        assert!(!task.start());
        assert!(task.pause());
        assert_eq!(task.status(), TaskStatus::Todo);
        assert!(task.start());
        assert!(task.end_error(5, true));
        assert!(task.start());
        assert!(task.end_success());
        assert!(!task.abort());

        assert_eq!(
            log.take(),
            vec![
                "a:start:DOING",
                "a:pause:TODO",
                "a:start:DOING",
                "a:error(5,true):ERROR",
                "a:start:DOING",
                "a:complete:DONE",
            ]
        );
    }

    #[test]
    fn test_pause_to_custom_status() {
        let task = TaskExecutor::plain("a");
        todo(&task).start();
        assert!(task.pause_to(TaskStatus::Error));
        assert_eq!(task.status(), TaskStatus::Error);
        assert_eq!(task.record().status(), TaskStatus::Error);
    }

    #[test]
    fn test_abort_from_todo_and_doing() {
        let task = TaskExecutor::plain("a");
        assert!(todo(&task).abort());
        assert_eq!(task.status(), TaskStatus::Done);

        let task = TaskExecutor::plain("b");
        todo(&task).start();
        assert!(task.abort());
        assert_eq!(task.status(), TaskStatus::Done);
    }

    #[test]
    fn test_gradual_lifecycle() {
        let log = Arc::new(EventLog::default());
        let task = TaskExecutor::gradual(Arc::new(TaskRecord::new("g", 0)), Arc::new(NoopHooks));
        task.add_listener(log.clone());
        todo(&task);

        assert!(task.start());
        assert_eq!(task.status(), TaskStatus::Starting);
        assert!(!task.end_success());
        assert!(task.start_finish());
        assert!(task.pause_to(TaskStatus::Error));
        assert_eq!(task.status(), TaskStatus::Pausing);
        assert!(task.pause_finish());
        assert_eq!(task.status(), TaskStatus::Error);

        // 启动过程中也可以中止
        assert!(task.start());
        assert!(task.abort());

        // 暂停收尾中被中止，迟到的收尾不再生效
        todo(&task);
        assert!(task.start());
        assert!(task.start_finish());
        assert!(task.pause());
        assert!(task.abort());
        assert!(!task.pause_finish());
        assert_eq!(task.status(), TaskStatus::Done);

        assert_eq!(
            log.take(),
            vec![
                "g:start:STARTING",
                "g:start_finish:DOING",
                "g:pause:PAUSING",
                "g:pause_finish:ERROR",
                "g:start:STARTING",
                "g:abort:DONE",
                "g:start:STARTING",
                "g:start_finish:DOING",
                "g:pause:PAUSING",
                "g:abort:DONE",
            ]
        );
    }

    #[test]
    fn test_basic_rejects_gradual_transitions() {
        let task = TaskExecutor::plain("a");
        todo(&task).start();
        assert!(!task.start_finish());
        assert!(!task.pause_finish());
        assert_eq!(task.status(), TaskStatus::Doing);
    }

    struct VetoStart;

    impl TaskHooks for VetoStart {
        fn on_start(&self, _task: &Arc<TaskExecutor>) -> bool {
            false
        }
    }

    #[test]
    fn test_hook_veto_keeps_status() {
        let log = Arc::new(EventLog::default());
        let task = TaskExecutor::new(Arc::new(TaskRecord::new("v", 0)), Arc::new(VetoStart));
        task.add_listener(log.clone());
        todo(&task);
        assert!(!task.start());
        assert_eq!(task.status(), TaskStatus::Todo);
        assert!(log.take().is_empty());
    }

    struct ReentrantHook {
        reentered: AtomicBool,
    }

    impl TaskHooks for ReentrantHook {
        fn on_start(&self, task: &Arc<TaskExecutor>) -> bool {
            // 同步重入必须被拒绝，而不是死锁
            self.reentered.store(task.end_success(), Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn test_reentrant_transition_is_rejected() {
        let hook = Arc::new(ReentrantHook {
            reentered: AtomicBool::new(true),
        });
        let task = TaskExecutor::new(Arc::new(TaskRecord::new("r", 0)), hook.clone());
        todo(&task);
        assert!(task.start());
        assert!(!hook.reentered.load(Ordering::SeqCst));
        assert_eq!(task.status(), TaskStatus::Doing);
    }

    #[test]
    fn test_reset_status_refuses_active_task() {
        let task = TaskExecutor::plain("a");
        todo(&task).start();
        assert!(!task.reset_status(TaskStatus::Default));
        assert_eq!(task.status(), TaskStatus::Doing);
    }

    #[test]
    fn test_evolve_delegates_and_mirrors() {
        let log = Arc::new(EventLog::default());
        let origin = TaskExecutor::plain("origin");
        origin.add_listener(log.clone());
        todo(&origin).start();

        let next = TaskExecutor::plain("next");
        todo(&next);
        assert!(origin.evolve(next.clone()));
        assert!(!origin.evolve(TaskExecutor::plain("third")));
        assert!(origin.is_evolved());

        // 原执行器上的调用全部转交
        assert!(!origin.end_success());
        assert!(origin.start());
        assert_eq!(next.status(), TaskStatus::Doing);
        assert_eq!(origin.status(), TaskStatus::Doing);

        next.notify_progress(42);
        assert_eq!(origin.record().completed_size(), 42);

        assert!(origin.end_success());
        assert_eq!(next.status(), TaskStatus::Done);
        assert_eq!(origin.status(), TaskStatus::Done);

        assert_eq!(
            log.take(),
            vec!["origin:start:DOING", "origin:start:DOING", "origin:complete:DONE"]
        );
    }

    #[test]
    fn test_owner_is_exclusive_while_alive() {
        let task = TaskExecutor::plain("a");
        let first: Arc<dyn ExecutorListener> = Arc::new(EventLog::default());
        let second: Arc<dyn ExecutorListener> = Arc::new(EventLog::default());
        assert!(task.attach_owner(Arc::downgrade(&first)));
        assert!(task.attach_owner(Arc::downgrade(&first)));
        assert!(!task.attach_owner(Arc::downgrade(&second)));
        drop(first);
        assert!(task.attach_owner(Arc::downgrade(&second)));
        task.detach_owner();
    }
}
