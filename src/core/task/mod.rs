//! `task` 模块包含了与单个下载任务相关的所有逻辑
//!
//! 主要包括：
//! - `bean`: 下载描述（URL、目录、文件名）
//! - `download`: 断点续传的下载过程和它的状态钩子
//! - `http`: HTTP 能力接口和 awc 实现
//! - `fs`: 文件系统能力和带缓冲的写入器
//! - `naming`: 文件名推导

pub mod bean;
pub mod download;
pub mod fs;
pub mod http;
pub mod naming;

// 导出核心组件，方便外部使用
pub use bean::{DownloadBean, DEFAULT_DOWNLOADING_SUFFIX};
pub use download::{DownloadOptions, DownloadTask};
pub use fs::{BufferedWriter, FileSystem, LocalFileSystem};
pub use http::{AwcClientFactory, AwcHttpClient, HttpClient, HttpClientFactory, HttpRequest, HttpResponse};
