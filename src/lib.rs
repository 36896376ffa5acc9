//! taskmill: 可暂停、可恢复的任务调度引擎
//!
//! - `core`: 任务记录、执行器状态机、串行 / 并行 / 带未执行队列的串行管理器、
//!   重试、测速，以及断点续传的 HTTP 下载任务
//! - `config`: TOML 配置
//! - `cli`: 命令行参数
//! - `ui`: 终端进度条
//! - `utils`: 日志和校验

pub mod cli;
pub mod config;
pub mod core;
pub mod ui;
pub mod utils;
