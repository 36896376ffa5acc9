use anyhow::Result;
use std::path::Path;
use url::Url;

use crate::config::Config;

/// 只接受 http / https
pub fn is_valid_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

pub fn validate_jobs(jobs: usize) -> Result<()> {
    if jobs == 0 {
        anyhow::bail!("并发数必须大于0");
    }
    if jobs > 64 {
        anyhow::bail!("并发数不能超过64");
    }
    Ok(())
}

pub fn validate_output_path(path: &str) -> Result<()> {
    if path.is_empty() {
        anyhow::bail!("输出路径不能为空");
    }
    let path = Path::new(path);
    if path.exists() && !path.is_dir() {
        anyhow::bail!("输出路径不是目录: {}", path.display());
    }
    Ok(())
}

pub fn validate_urls(urls: &[String]) -> Result<()> {
    if urls.is_empty() {
        anyhow::bail!("URL列表不能为空");
    }
    if let Some(bad) = urls.iter().find(|u| !is_valid_url(u)) {
        anyhow::bail!("无效的URL: {}", bad);
    }
    Ok(())
}

/// 启动前的整体检查
pub fn validate_config(config: &Config) -> Result<()> {
    config.validate()?;
    validate_output_path(&config.download_dir)?;
    if let crate::core::ManagerKind::Parallel { limit } = config.manager_kind() {
        validate_jobs(limit)?;
    }
    Ok(())
}
