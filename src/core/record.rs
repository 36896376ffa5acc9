use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};

/// 任务状态
///
/// `Starting` / `Pausing` 只在渐进式生命周期中出现。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Default,
    Todo,
    Doing,
    Done,
    Error,
    Starting,
    Pausing,
}

impl TaskStatus {
    fn to_u8(self) -> u8 {
        match self {
            TaskStatus::Default => 0,
            TaskStatus::Todo => 1,
            TaskStatus::Doing => 2,
            TaskStatus::Done => 3,
            TaskStatus::Error => 4,
            TaskStatus::Starting => 5,
            TaskStatus::Pausing => 6,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => TaskStatus::Todo,
            2 => TaskStatus::Doing,
            3 => TaskStatus::Done,
            4 => TaskStatus::Error,
            5 => TaskStatus::Starting,
            6 => TaskStatus::Pausing,
            _ => TaskStatus::Default,
        }
    }

    /// 有工作线程正在运行（或正在启停）的状态
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Doing | TaskStatus::Starting | TaskStatus::Pausing)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Default => "DEFAULT",
            TaskStatus::Todo => "TODO",
            TaskStatus::Doing => "DOING",
            TaskStatus::Done => "DONE",
            TaskStatus::Error => "ERROR",
            TaskStatus::Starting => "STARTING",
            TaskStatus::Pausing => "PAUSING",
        };
        f.write_str(name)
    }
}

/// 单个任务的身份与状态
///
/// 状态只由所属执行器写入，其它线程只读；进度相关的数值都是原子量，
/// 测速线程无需持有任何锁即可读取。
#[derive(Debug)]
pub struct TaskRecord {
    id: String,
    kind: i32,
    status: AtomicU8,
    /// 未知时为 -1
    total_size: AtomicI64,
    completed_size: AtomicU64,
}

impl TaskRecord {
    pub fn new(id: impl Into<String>, kind: i32) -> Self {
        Self {
            id: id.into(),
            kind,
            status: AtomicU8::new(TaskStatus::Default.to_u8()),
            total_size: AtomicI64::new(-1),
            completed_size: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> i32 {
        self.kind
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: TaskStatus) {
        self.status.store(status.to_u8(), Ordering::Release);
    }

    pub fn total_size(&self) -> Option<u64> {
        let size = self.total_size.load(Ordering::Acquire);
        if size >= 0 {
            Some(size as u64)
        } else {
            None
        }
    }

    pub fn set_total_size(&self, size: u64) {
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        self.total_size.store(size, Ordering::Release);
    }

    pub fn completed_size(&self) -> u64 {
        self.completed_size.load(Ordering::Acquire)
    }

    pub fn set_completed_size(&self, size: u64) {
        self.completed_size.store(size, Ordering::Release);
    }

    /// 进度百分比，总大小未知时返回 None
    pub fn progress(&self) -> Option<f32> {
        match self.total_size() {
            Some(0) => Some(100.0),
            Some(total) => Some((self.completed_size() as f64 / total as f64 * 100.0) as f32),
            None => None,
        }
    }
}

/// 可序列化的任务快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub kind: i32,
    pub status: TaskStatus,
    pub total_size: Option<u64>,
    pub completed_size: u64,
}

impl From<&TaskRecord> for TaskSnapshot {
    fn from(record: &TaskRecord) -> Self {
        Self {
            id: record.id().to_string(),
            kind: record.kind(),
            status: record.status(),
            total_size: record.total_size(),
            completed_size: record.completed_size(),
        }
    }
}
