use std::collections::VecDeque;
use std::fmt::Debug;
use std::time::{Duration, Instant};

/// 把单调递增的"已完成字节数"采样流换算成吞吐量（B/s）
pub trait SpeedCalculator: Send + Debug {
    /// 喂入一次采样，返回当前速度
    fn sample(&mut self, completed: u64, now: Instant) -> u64;

    /// 丢弃历史采样（任务重新开始时调用）
    fn reset(&mut self);
}

/// 瞬时速度：只看最近两次采样
#[derive(Debug, Default)]
pub struct InstantSpeed {
    last: Option<(Instant, u64)>,
}

impl InstantSpeed {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpeedCalculator for InstantSpeed {
    fn sample(&mut self, completed: u64, now: Instant) -> u64 {
        let speed = match self.last {
            Some((at, bytes)) => rate(completed.saturating_sub(bytes), now.duration_since(at)),
            None => 0,
        };
        self.last = Some((now, completed));
        speed
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

/// 滑动窗口平均速度
#[derive(Debug)]
pub struct WindowSpeed {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl WindowSpeed {
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.max(Duration::from_millis(1)),
            samples: VecDeque::new(),
        }
    }
}

impl Default for WindowSpeed {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

impl SpeedCalculator for WindowSpeed {
    fn sample(&mut self, completed: u64, now: Instant) -> u64 {
        // 计数器回退说明任务从头开始了
        if let Some(&(_, last)) = self.samples.back() {
            if completed < last {
                self.samples.clear();
            }
        }
        self.samples.push_back((now, completed));
        while let Some(&(at, _)) = self.samples.front() {
            if self.samples.len() > 2 && now.duration_since(at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        match (self.samples.front(), self.samples.back()) {
            (Some(&(t0, b0)), Some(&(t1, b1))) if t1 > t0 => rate(b1.saturating_sub(b0), t1.duration_since(t0)),
            _ => 0,
        }
    }

    fn reset(&mut self) {
        self.samples.clear();
    }
}

/// 指数滑动平均，平滑因子越大越贴近瞬时值
#[derive(Debug)]
pub struct SmoothedSpeed {
    factor: f64,
    speed: f64,
    inner: InstantSpeed,
}

impl SmoothedSpeed {
    pub fn new(factor: f64) -> Self {
        Self {
            factor: factor.clamp(0.01, 1.0),
            speed: 0.0,
            inner: InstantSpeed::new(),
        }
    }
}

impl SpeedCalculator for SmoothedSpeed {
    fn sample(&mut self, completed: u64, now: Instant) -> u64 {
        let had_history = self.inner.last.is_some();
        let instant = self.inner.sample(completed, now) as f64;
        if !had_history {
            return 0;
        }
        self.speed = if self.speed == 0.0 {
            instant
        } else {
            instant * self.factor + self.speed * (1.0 - self.factor)
        };
        self.speed.round() as u64
    }

    fn reset(&mut self) {
        self.speed = 0.0;
        self.inner.reset();
    }
}

fn rate(bytes: u64, elapsed: Duration) -> u64 {
    let millis = elapsed.as_millis();
    if millis == 0 {
        return 0;
    }
    (bytes as u128 * 1000 / millis) as u64
}
