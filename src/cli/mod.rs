//! CLI: 命令行接口和参数解析模块
//!
//! ## 支持的命令
//!
//! - 基本下载：`taskmill <url>`
//! - 批量下载：`taskmill -f urls.txt`
//! - 编辑配置：`taskmill -e`
//! - 指定配置：`taskmill -c config.conf <url>`
//! - 调度方式：`taskmill -s serial <url>...`
//!
//! ## 平台支持
//!
//! - Windows: `%APPDATA%/taskmill/taskmill.conf`
//! - macOS: `~/Library/Application Support/taskmill/taskmill.conf`
//! - Linux: `~/.config/taskmill/taskmill.conf`

use clap::Parser;
use std::borrow::Cow;
use std::env;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::core::error::DownloadError;

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/taskmill/taskmill.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/taskmill/taskmill.conf", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/taskmill/taskmill.conf", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 $EDITOR，其次 xdg-open，最后 nano
        let editor = env::var("EDITOR").ok();
        let opened = editor
            .map(|e| std::process::Command::new(e).arg(config_path).status().is_ok())
            .unwrap_or(false);
        if !opened && std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

/// taskmill 命令行参数
///
/// 示例用法：
///   taskmill https://example.com/file.zip
///   taskmill -e  # 编辑配置文件
///   taskmill -s rich_serial -f urls.txt
///   taskmill -j 4 -r 5 https://example.com/a.zip https://example.com/b.zip
#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskmill",
    version = env!("CARGO_PKG_VERSION"),
    about = "串行 / 并行调度的断点续传下载器",
    long_about = "按串行、并行或带未执行队列的串行方式调度下载任务，支持断点续传、重试退避和实时进度显示。\n\n示例：\n  taskmill https://example.com/file.zip\n  taskmill -e\n  taskmill -s serial -f urls.txt\n  taskmill -j 4 https://example.com/a.zip https://example.com/b.zip\n"
)]
pub struct Args {
    /// 要下载的URL列表（可同时指定多个）
    #[arg(required = false, help = "要下载的URL列表，可以同时指定多个URL。")]
    pub urls: Vec<String>,

    /// 包含URL列表的文件路径
    #[arg(short, long, help = "包含URL列表的文件路径，每行一个URL，# 开头为注释。")]
    pub file: Option<String>,

    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    /// 编辑配置文件（-e 或 --edit）
    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    /// 指定下载目录
    #[arg(long, short = 'd', help = "指定下载目录，覆盖配置文件中的设置。")]
    pub download_dir: Option<String>,

    /// 指定下载文件名，只在下载单个URL时生效
    #[arg(long, short = 'n', help = "指定下载文件名，覆盖自动推断，只在下载单个URL时生效。")]
    pub file_name: Option<String>,

    /// 并发数
    #[arg(long, short = 'j', help = "同时下载的任务数，隐含 parallel 调度。")]
    pub jobs: Option<usize>,

    /// 调度方式
    #[arg(long, short = 's', help = "调度方式：serial、parallel、rich_serial。")]
    pub scheduling: Option<String>,

    /// 每次启动的最多尝试次数
    #[arg(long = "retries", short = 'r', help = "每次启动最多尝试的次数。")]
    pub retry_count: Option<usize>,

    /// 结束时以 JSON 输出任务队列
    #[arg(long, help = "结束时以 JSON 打印各队列中的任务。")]
    pub json: bool,
}

impl Args {
    /// 加载或创建配置文件，合并命令行参数并校验
    pub fn load_config(&self) -> Result<Config, DownloadError> {
        let mut config = if Path::new(&self.config).exists() {
            Config::load(&self.config)
                .map_err(|e| DownloadError::permission_error(format!("无法读取配置文件: {}", e)))?
        } else {
            let config = Config::default();
            config
                .save_with_tutorial(&self.config)
                .map_err(|e| DownloadError::permission_error(format!("无法保存配置文件: {}", e)))?;
            config
        };

        config.merge_from_args(self);
        config
            .validate()
            .map_err(|e| DownloadError::config(format!("配置无效: {}", e)))?;
        Ok(config)
    }

    /// 命令行和URL文件中的全部URL
    pub fn get_urls(&self) -> Result<Vec<String>, DownloadError> {
        let mut urls = Vec::new();
        urls.extend_from_slice(&self.urls);

        if let Some(file_path) = &self.file {
            let content = fs::read_to_string(file_path)
                .map_err(|e| DownloadError::permission_error(format!("无法读取URL文件 {}: {}", file_path, e)))?;

            // 按行读取URL，忽略空行和注释
            for line in content.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    urls.push(line.to_string());
                }
            }
        }

        for url in &urls {
            if !crate::utils::validator::is_valid_url(url) {
                return Err(DownloadError::invalid_url(url.clone()));
            }
        }

        if urls.is_empty() {
            return Err(DownloadError::invalid_url(Cow::Borrowed(
                "未提供任何URL。请通过命令行参数或文件提供至少一个URL。",
            )));
        }

        Ok(urls)
    }
}
