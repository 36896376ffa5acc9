use actix::prelude::*;
use clap::Parser;
use crossterm::{
    cursor, execute, terminal,
    event::{self, Event, KeyCode, KeyModifiers},
};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use taskmill::cli::{self, Args};
use taskmill::config::Config;
use taskmill::core::monitor::{SpeedMonitor, StopMonitor};
use taskmill::core::speed::WindowSpeed;
use taskmill::core::task::{AwcClientFactory, DownloadBean, DownloadTask, FileSystem, HttpClientFactory, LocalFileSystem};
use taskmill::core::{ManagerListener, TaskManager, TaskStatus};
use taskmill::ui::{self, DownloadSummary, ProgressManager};
use taskmill::utils::{logger, validator};

const KEYBOARD_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// 退出时最多等工作线程这么久
const WORKER_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// 所有任务跑完时置位
#[derive(Default)]
struct FinishFlag(AtomicBool);

impl ManagerListener for FinishFlag {
    fn on_finish_all(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn on_start(&self, _task: &taskmill::core::TaskRecord) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[actix::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.edit_config {
        // 先确保文件存在再打开
        args.load_config()?;
        cli::open_config_in_editor(&args.config);
        return Ok(());
    }

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("参数解析失败: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = logger::init(&config.log_file, &config.log_level, config.log_max_size) {
        eprintln!("无法初始化日志: {}", e);
    }
    info!(
        "taskmill {} 启动（提交 {}，构建于 {}）",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    );

    let urls = match args.get_urls() {
        Ok(urls) => urls,
        Err(e) => {
            error!("获取URL列表失败: {}", e);
            eprintln!("获取URL列表失败: {}", e);
            std::process::exit(1);
        }
    };
    validator::validate_config(&config)?;
    info!("配置文件路径: {}", args.config);
    info!("{}", config.get_summary());
    println!("{}", config.get_summary());

    let manager = TaskManager::new(config.manager_kind());
    manager.set_auto_run(config.auto_run);
    let progress = ProgressManager::new();
    let finished = Arc::new(FinishFlag::default());
    manager.add_listener(progress.clone());
    manager.add_listener(finished.clone());

    let beans = create_tasks(&manager, &args, &config, &urls);
    if beans.is_empty() {
        eprintln!("没有可下载的任务");
        return Ok(());
    }

    let monitor = SpeedMonitor::new(manager.clone(), config.speed_interval()).start();
    if config.auto_run {
        manager.start();
        println!("\n开始下载... (按 'p' 暂停, 'r' 继续, 's' 停止, 'q' 退出)");
    } else {
        println!("\n任务已加入队列 (按 'r' 开始, 'q' 退出)");
    }
    info!("共 {} 个任务，调度方式 {}", beans.len(), manager.kind());

    let started_at = Instant::now();
    run_key_loop(&manager, &finished).await?;

    monitor.do_send(StopMonitor);
    // 暂停只发出取消信号，工作线程自己刷新缓冲后退出
    manager.pause();
    wait_for_workers(&beans, WORKER_EXIT_TIMEOUT).await;
    progress.finish();

    let summary = summarize(&beans, started_at.elapsed());
    println!("{}", summary);
    info!("下载结束 - 成功: {}, 失败: {}", summary.success_count, summary.failed_count);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&manager.snapshot())?);
    }
    Ok(())
}

/// 为每个URL创建下载任务并加入管理器
fn create_tasks(manager: &TaskManager, args: &Args, config: &Config, urls: &[String]) -> Vec<Arc<DownloadBean>> {
    let http: Arc<dyn HttpClientFactory> = Arc::new(AwcClientFactory::new(
        config.user_agent.clone(),
        Duration::from_secs(config.timeout),
    ));
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());
    let options = config.download_options();

    let mut beans = Vec::new();
    for url in urls {
        let mut bean = DownloadBean::new(url.clone(), config.download_path())
            .downloading_suffix(config.downloading_suffix.clone());
        if urls.len() == 1 {
            if let Some(name) = &args.file_name {
                bean = bean.file_name_hint(name.clone());
            }
        }
        let bean = Arc::new(bean);
        let task = DownloadTask::executor(bean.clone(), options.clone(), http.clone(), fs.clone());
        task.set_speed_calculator(Box::new(WindowSpeed::new(config.speed_window())));
        if manager.add_task(task) {
            info!("创建下载任务: {}", url);
            ui::print_success(&format!("创建下载任务: {}", url));
            beans.push(bean);
        } else {
            ui::print_error(&format!("重复的URL，已忽略: {}", url));
        }
    }
    beans
}

/// 处理键盘输入，直到全部完成或用户退出
async fn run_key_loop(manager: &TaskManager, finished: &FinishFlag) -> anyhow::Result<()> {
    terminal::enable_raw_mode()?;
    execute!(std::io::stdout(), cursor::Hide)?;

    let result = loop {
        if finished.0.load(Ordering::SeqCst) || (manager.running_tasks().is_empty() && manager.waiting_tasks().is_empty()) {
            break Ok(());
        }
        match event::poll(KEYBOARD_POLL_INTERVAL) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) => match key.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') => {
                        info!("用户主动退出");
                        break Ok(());
                    }
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        break Ok(());
                    }
                    KeyCode::Char('p') | KeyCode::Char('P') => {
                        manager.pause();
                        info!("用户暂停全部任务");
                    }
                    KeyCode::Char('r') | KeyCode::Char('R') => {
                        manager.resume();
                        info!("用户继续全部任务");
                    }
                    KeyCode::Char('s') | KeyCode::Char('S') => {
                        manager.stop();
                        info!("用户停止全部任务");
                    }
                    _ => {}
                },
                Ok(_) => {}
                Err(e) => break Err(e.into()),
            },
            Ok(false) => {}
            Err(e) => break Err(e.into()),
        }
        // 让出线程给测速 Actor
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    execute!(std::io::stdout(), cursor::Show)?;
    terminal::disable_raw_mode()?;
    result
}

/// 等所有下载线程退出，超时后放弃
async fn wait_for_workers(beans: &[Arc<DownloadBean>], timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while beans.iter().any(|b| b.has_live_worker()) {
        if Instant::now() >= deadline {
            warn!("等待下载线程退出超时，部分缓冲可能未写入");
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn summarize(beans: &[Arc<DownloadBean>], elapsed: Duration) -> DownloadSummary {
    let success_count = beans
        .iter()
        .filter(|b| b.record().status() == TaskStatus::Done && b.final_path().map_or(false, |p| p.exists()))
        .count();
    let failed_count = beans.iter().filter(|b| b.record().status() == TaskStatus::Error).count();
    DownloadSummary {
        total_files: beans.len(),
        total_size: beans.iter().map(|b| b.record().completed_size()).sum(),
        elapsed_time: elapsed,
        success_count,
        failed_count,
        unfinished_count: beans.len() - success_count - failed_count,
    }
}
