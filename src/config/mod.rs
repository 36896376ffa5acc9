use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::Result;
use crate::core::error::DownloadError;
use crate::core::executor::Lifecycle;
use crate::core::manager::ManagerKind;
use crate::core::retry::{RetryBudget, RetryStrategy};
use crate::core::task::DownloadOptions;

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 默认下载目录
    pub download_dir: String,
    /// 下载中文件的后缀
    pub downloading_suffix: String,
    /// 调度方式：serial | parallel | rich_serial
    pub scheduling: String,
    /// 最大并发下载数（仅 parallel 生效）
    pub max_concurrent_downloads: usize,
    /// 加入任务后是否自动开始
    pub auto_run: bool,
    /// 网络超时时间（秒）
    pub timeout: u64,
    /// User-Agent
    pub user_agent: String,
    /// 每次启动最多尝试次数
    pub retry_count: usize,
    /// 无限重试，忽略 retry_count
    pub infinite_retry: bool,
    /// 重试延迟（毫秒）
    pub retry_delay_ms: u64,
    /// 最大重试延迟（毫秒）
    pub retry_max_delay_ms: u64,
    /// 重试用尽后回到等待队列
    pub requeue_on_error: bool,
    /// 写盘缓冲区大小（字节）
    pub buffer_size: usize,
    /// 进度刷新间隔（毫秒）
    pub progress_interval_ms: u64,
    /// 测速间隔（毫秒）
    pub speed_interval_ms: u64,
    /// 测速窗口（秒）
    pub speed_window_secs: u64,
    /// 剩余空间低于该值视为磁盘已满（MB）
    pub min_free_space_mb: u64,
    /// 启动和暂停是否分两步完成
    pub gradual_lifecycle: bool,
    /// 日志文件
    pub log_file: String,
    /// 日志级别
    pub log_level: String,
    /// 日志文件超过该大小后轮转（字节）
    pub log_max_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: "./downloads".to_string(),
            downloading_suffix: ".downloading".to_string(),
            scheduling: "parallel".to_string(),
            max_concurrent_downloads: 3,
            auto_run: true,
            timeout: 30,
            user_agent: format!("taskmill/{}", env!("CARGO_PKG_VERSION")),
            retry_count: 3,
            infinite_retry: false,
            retry_delay_ms: 1000,
            retry_max_delay_ms: 60_000,
            requeue_on_error: false,
            buffer_size: 64 * 1024,
            progress_interval_ms: 500,
            speed_interval_ms: 1000,
            speed_window_secs: 3,
            min_free_space_mb: 16,
            gradual_lifecycle: false,
            log_file: "taskmill.log".to_string(),
            log_level: "info".to_string(),
            log_max_size: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// 加载配置文件，不存在时写入默认配置
    pub fn load(path: &str) -> Result<Self, DownloadError> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            match toml::from_str(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    // 格式错误时不覆盖用户的文件
                    log::warn!("配置文件格式错误: {}，将使用默认配置", e);
                    Ok(Config::default())
                }
            }
        } else {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            Ok(config)
        }
    }

    /// 保存带教程的配置文件（唯一写入方法）
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), DownloadError> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let config_content = toml::to_string_pretty(self)
            .map_err(|e| DownloadError::config(format!("无法序列化配置: {}", e)))?;
        let full_content = format!("{}\n{}", Config::generate_tutorial_content(), config_content);
        fs::write(path, full_content)?;
        Ok(())
    }

    /// 生成配置文件教程内容，全部是注释，不与下面的配置项重复
    fn generate_tutorial_content() -> String {
        r#"# taskmill 配置文件
# ====================
#
# 这是一个 TOML 格式的配置文件。修改后保存即可，下次启动生效。
#
# 配置文件位置：
# - Windows: %APPDATA%/taskmill/taskmill.conf
# - macOS: ~/Library/Application Support/taskmill/taskmill.conf
# - Linux: ~/.config/taskmill/taskmill.conf
#
# 命令行参数会覆盖配置文件中的设置，优先级：命令行 > 配置文件 > 默认值
#
# 使用示例：
#   taskmill https://example.com/file.zip                       # 使用默认配置
#   taskmill -s serial -f urls.txt                              # 一个接一个下载
#   taskmill -j 5 https://example.com/a.zip https://example.com/b.zip
#   taskmill -d /path/to/downloads https://example.com/file.zip
#
# 运行中按键：p 暂停  r 继续  s 停止  q 退出
#
# ==================== 调度 ====================
#
# scheduling
#   serial       一次只运行一个任务
#   parallel     最多同时运行 max_concurrent_downloads 个任务
#   rich_serial  串行，失败的任务放到“未执行”队列，需要手动重新排队
# auto_run       加入任务后自动开始
#
# ==================== 重试 ====================
#
# retry_count          每次启动最多尝试几次
# infinite_retry       一直重试直到成功或被暂停
# retry_delay_ms       第一次重试前等待的毫秒数，之后按指数退避
# retry_max_delay_ms   退避上限
# requeue_on_error     重试用尽后回到等待队列；否则任务从管理器移除
#
# ==================== 下载 ====================
#
# downloading_suffix   下载中的文件名后缀，完成后去掉
# buffer_size          写盘缓冲区大小（字节）
# min_free_space_mb    剩余空间低于该值时报 NO_SPACE
# gradual_lifecycle    启动、暂停分两步完成（STARTING / PAUSING）
#
# ==================== 故障排除 ====================
#
# 问题：经常下载失败
# 解决：增加 retry_count 或 timeout，或打开 infinite_retry
#
# 问题：提示磁盘空间不足
# 解决：清理磁盘，或调小 min_free_space_mb
#
# ==================== 配置项 ====================
"#.to_string()
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.download_dir.is_empty() {
            return Err(DownloadError::config("下载目录不能为空"));
        }
        if self.downloading_suffix.is_empty() {
            return Err(DownloadError::config("下载中文件后缀不能为空"));
        }
        if self.parse_scheduling().is_none() {
            return Err(DownloadError::config(format!(
                "未知的调度方式: {}（可选 serial、parallel、rich_serial）",
                self.scheduling
            )));
        }
        if self.max_concurrent_downloads == 0 {
            return Err(DownloadError::config("并发下载数必须大于0"));
        }
        if self.timeout == 0 {
            return Err(DownloadError::config("超时时间必须大于0"));
        }
        if self.retry_count == 0 && !self.infinite_retry {
            return Err(DownloadError::config("重试次数必须大于0"));
        }
        if self.retry_max_delay_ms < self.retry_delay_ms {
            return Err(DownloadError::config("最大重试延迟不能小于重试延迟"));
        }
        if self.buffer_size == 0 {
            return Err(DownloadError::config("缓冲区大小必须大于0"));
        }
        if self.speed_interval_ms == 0 {
            return Err(DownloadError::config("测速间隔必须大于0"));
        }
        Ok(())
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(dir) = &args.download_dir {
            self.download_dir = dir.clone();
        }
        if let Some(jobs) = args.jobs {
            self.max_concurrent_downloads = jobs;
            // 指定了并发数但没指定调度方式时，按并行处理
            if args.scheduling.is_none() {
                self.scheduling = "parallel".to_string();
            }
        }
        if let Some(scheduling) = &args.scheduling {
            self.scheduling = scheduling.clone();
        }
        if let Some(retries) = args.retry_count {
            self.retry_count = retries;
        }
    }

    fn parse_scheduling(&self) -> Option<ManagerKind> {
        match self.scheduling.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "serial" => Some(ManagerKind::Serial),
            "parallel" => Some(ManagerKind::Parallel {
                limit: self.max_concurrent_downloads.max(1),
            }),
            "rich_serial" | "rich" => Some(ManagerKind::RichSerial),
            _ => None,
        }
    }

    /// 调度方式；无法识别时退回串行
    pub fn manager_kind(&self) -> ManagerKind {
        self.parse_scheduling().unwrap_or(ManagerKind::Serial)
    }

    /// 转换为下载任务参数
    pub fn download_options(&self) -> DownloadOptions {
        let retry = if self.infinite_retry {
            RetryBudget::Infinite
        } else {
            RetryBudget::finite(self.retry_count)
        };
        let strategy = RetryStrategy {
            base_delay: Duration::from_millis(self.retry_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            ..RetryStrategy::default()
        };
        DownloadOptions {
            retry,
            strategy,
            requeue_on_error: self.requeue_on_error,
            buffer_size: self.buffer_size,
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            min_free_space: self.min_free_space_mb * 1024 * 1024,
            read_timeout: Duration::from_secs(self.timeout),
            lifecycle: if self.gradual_lifecycle {
                Lifecycle::Gradual
            } else {
                Lifecycle::Basic
            },
        }
    }

    pub fn download_path(&self) -> PathBuf {
        PathBuf::from(&self.download_dir)
    }

    pub fn speed_interval(&self) -> Duration {
        Duration::from_millis(self.speed_interval_ms)
    }

    pub fn speed_window(&self) -> Duration {
        Duration::from_secs(self.speed_window_secs.max(1))
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 下载目录: {}\n\
            - 调度方式: {}\n\
            - 自动开始: {}\n\
            - 超时时间: {} 秒\n\
            - 重试次数: {}\n\
            - 失败后回队: {}\n\
            - 分步启停: {}",
            self.download_dir,
            self.manager_kind(),
            if self.auto_run { "启用" } else { "禁用" },
            self.timeout,
            if self.infinite_retry { "无限".to_string() } else { self.retry_count.to_string() },
            if self.requeue_on_error { "启用" } else { "禁用" },
            if self.gradual_lifecycle { "启用" } else { "禁用" }
        )
    }
}
