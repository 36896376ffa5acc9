//! 下载文件命名：Content-Disposition → URL 路径 → 随机名

use regex::Regex;
use std::sync::OnceLock;
use url::Url;
use uuid::Uuid;

fn extended_filename() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)filename\*\s*=\s*([\w-]+)?'[^']*'([^;]+)"#).ok())
        .as_ref()
}

fn plain_filename() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]*)"|([^;]+))"#).ok())
        .as_ref()
}

/// 从 Content-Disposition 里取文件名，`filename*` 优先
pub fn from_content_disposition(header: &str) -> Option<String> {
    if let Some(caps) = extended_filename().and_then(|re| re.captures(header)) {
        let raw = caps.get(2).map(|m| m.as_str().trim())?;
        if let Ok(decoded) = urlencoding::decode(raw) {
            if let Some(name) = sanitize(&decoded) {
                return Some(name);
            }
        }
    }
    let caps = plain_filename()?.captures(header)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
    sanitize(raw)
}

/// URL 路径的最后一段
pub fn from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment).ok()?;
    sanitize(&decoded)
}

pub fn random_name() -> String {
    format!("download-{}", Uuid::new_v4().simple())
}

/// 依次尝试响应头、URL，最后退回随机名
pub fn derive(content_disposition: Option<&str>, url: &str) -> String {
    content_disposition
        .and_then(from_content_disposition)
        .or_else(|| from_url(url))
        .unwrap_or_else(random_name)
}

/// 去掉路径成分和文件系统不接受的字符，空名返回 None
pub fn sanitize(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
