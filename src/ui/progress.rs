use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::error::DownloadErrorKind;
use crate::core::listener::ManagerListener;
use crate::core::record::TaskRecord;

const BAR_TEMPLATE: &str = "{prefix:.bold} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {msg}";
const SPINNER_TEMPLATE: &str = "{prefix:.bold} {spinner} {bytes} {msg}";

// 结构体：ProgressManager
// 每个任务一条进度条，由管理器事件驱动
pub struct ProgressManager {
    multi: MultiProgress,
    progress_bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressManager {
    pub fn new() -> Arc<Self> {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// 不输出到终端，测试用
    pub fn hidden() -> Arc<Self> {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Arc<Self> {
        Arc::new(ProgressManager {
            multi: MultiProgress::with_draw_target(target),
            progress_bars: Mutex::new(HashMap::new()),
        })
    }

    fn bars(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProgressBar>> {
        self.progress_bars.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 找到或创建任务的进度条
    fn bar_for(&self, task: &TaskRecord) -> ProgressBar {
        let mut bars = self.bars();
        if let Some(pb) = bars.get(task.id()) {
            return pb.clone();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_prefix(short_name(task.id()));
        apply_style(&pb, task.total_size());
        pb.set_message("等待中");
        bars.insert(task.id().to_string(), pb.clone());
        pb
    }

    /// 当前有进度条的任务数
    pub fn len(&self) -> usize {
        self.bars().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars().is_empty()
    }

    /// 某个任务进度条当前的位置
    pub fn position(&self, id: &str) -> Option<u64> {
        self.bars().get(id).map(|pb| pb.position())
    }

    /// 结束时清理所有进度条
    pub fn finish(&self) {
        for pb in self.bars().values() {
            if !pb.is_finished() {
                pb.abandon();
            }
        }
    }
}

impl ManagerListener for ProgressManager {
    fn on_add(&self, task: &TaskRecord) {
        self.bar_for(task);
    }

    fn on_add_all(&self, tasks: &[Arc<TaskRecord>]) {
        for task in tasks {
            self.bar_for(task);
        }
    }

    fn on_remove(&self, task: &TaskRecord) {
        if let Some(pb) = self.bars().remove(task.id()) {
            pb.finish_and_clear();
            self.multi.remove(&pb);
        }
    }

    fn on_remove_all(&self, tasks: &[Arc<TaskRecord>]) {
        for task in tasks {
            self.on_remove(task);
        }
    }

    fn on_start(&self, task: &TaskRecord) {
        self.bar_for(task).set_message("下载中");
    }

    fn on_stop(&self, task: &TaskRecord) {
        self.bar_for(task).set_message("已暂停");
    }

    fn on_doing(&self, task: &TaskRecord, completed: u64) {
        let pb = self.bar_for(task);
        if let Some(total) = task.total_size() {
            if pb.length() != Some(total) {
                apply_style(&pb, Some(total));
                pb.set_length(total);
            }
        }
        pb.set_position(completed);
    }

    fn on_speed_update(&self, task: &TaskRecord, bytes_per_second: u64) {
        let pb = self.bar_for(task);
        let downloaded = task.completed_size();
        let status = match task.total_size() {
            Some(total) if total > 0 => format!(
                "{}% | {} | ETA:{}",
                (downloaded as f64 / total as f64 * 100.0) as u32,
                format_speed(bytes_per_second),
                format_eta(total.saturating_sub(downloaded), bytes_per_second)
            ),
            _ => format_speed(bytes_per_second),
        };
        pb.set_message(status);
    }

    fn on_complete(&self, task: &TaskRecord) {
        let pb = self.bar_for(task);
        pb.set_position(task.completed_size());
        pb.finish_with_message("✓ 完成");
    }

    fn on_error(&self, task: &TaskRecord, code: i32) {
        let reason = DownloadErrorKind::from_code(code)
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| format!("错误码 {}", code));
        self.bar_for(task).set_message(format!("✗ {}", reason));
    }
}

fn apply_style(pb: &ProgressBar, total: Option<u64>) {
    let template = if total.is_some() { BAR_TEMPLATE } else { SPINNER_TEMPLATE };
    if let Ok(style) = ProgressStyle::with_template(template) {
        pb.set_style(style.progress_chars("=> "));
    }
}

/// URL 太长时只显示最后一段
fn short_name(id: &str) -> String {
    let name = id.trim_end_matches('/').rsplit('/').next().unwrap_or(id);
    if name.chars().count() > 24 {
        let tail: String = name.chars().rev().take(23).collect::<Vec<_>>().into_iter().rev().collect();
        format!("…{}", tail)
    } else {
        name.to_string()
    }
}

pub fn format_speed(speed: u64) -> String {
    if speed > 1024 * 1024 {
        format!("{:.2} MB/s", speed as f64 / (1024.0 * 1024.0))
    } else if speed > 1024 {
        format!("{:.2} KB/s", speed as f64 / 1024.0)
    } else {
        format!("{} B/s", speed)
    }
}

// 计算剩余时间
pub fn format_eta(remaining: u64, speed: u64) -> String {
    if speed == 0 || remaining == 0 {
        return "未知".to_string();
    }
    let seconds = remaining / speed;
    if seconds > 3600 {
        format!("{}h{}m", seconds / 3600, (seconds % 3600) / 60)
    } else if seconds > 60 {
        format!("{}m{}s", seconds / 60, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
