use actix::prelude::*;
use log::{debug, info};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::manager::TaskManager;
use super::record::TaskStatus;

/// ================== 测速 Actor ==================
/// 按固定间隔轮询管理器的运行队列，用各任务自己的测速器换算速度，
/// 再通过管理器监听者的 `on_speed_update` 广播出去。
/// 读取进度不需要管理器锁，已完成大小是原子计数。
pub struct SpeedMonitor {
    manager: TaskManager,
    interval: Duration,
    speeds: HashMap<String, u64>,
}

impl SpeedMonitor {
    pub fn new(manager: TaskManager, interval: Duration) -> Self {
        Self {
            manager,
            interval: interval.max(Duration::from_millis(10)),
            speeds: HashMap::new(),
        }
    }

    /// 采样一次，返回本轮上报的任务数
    pub fn sample(&mut self, now: Instant) -> usize {
        let running = self.manager.running_tasks();
        self.speeds.retain(|id, _| running.iter().any(|t| t.id() == id));

        let mut reported = 0;
        for task in running {
            if task.status() != TaskStatus::Doing {
                continue;
            }
            let speed = task.sample_speed(now);
            self.speeds.insert(task.id().to_string(), speed);
            self.manager.report_speed(task.record(), speed);
            reported += 1;
        }
        reported
    }
}

impl Actor for SpeedMonitor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("测速器启动，间隔 {:?}", self.interval);
        ctx.run_interval(self.interval, |act, _ctx| {
            let reported = act.sample(Instant::now());
            if reported > 0 {
                debug!("本轮测速 {} 个任务", reported);
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("测速器已停止");
    }
}

/// 查询最近一次采样的速度（id -> B/s）
pub struct QuerySpeeds;
impl Message for QuerySpeeds {
    type Result = HashMap<String, u64>;
}
impl Handler<QuerySpeeds> for SpeedMonitor {
    type Result = MessageResult<QuerySpeeds>;
    fn handle(&mut self, _msg: QuerySpeeds, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.speeds.clone())
    }
}

/// 立即采样一次
pub struct SampleNow;
impl Message for SampleNow {
    type Result = usize;
}
impl Handler<SampleNow> for SpeedMonitor {
    type Result = usize;
    fn handle(&mut self, _msg: SampleNow, _ctx: &mut Self::Context) -> Self::Result {
        self.sample(Instant::now())
    }
}

/// 停止测速
pub struct StopMonitor;
impl Message for StopMonitor {
    type Result = ();
}
impl Handler<StopMonitor> for SpeedMonitor {
    type Result = ();
    fn handle(&mut self, _msg: StopMonitor, ctx: &mut Self::Context) {
        ctx.stop();
    }
}
