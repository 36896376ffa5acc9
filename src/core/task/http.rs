//! HTTP 能力接口，以及基于 awc 的默认实现
//!
//! awc 的客户端不是 `Send`，所以每个下载工作线程通过工厂各自创建一个。

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::debug;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use crate::core::error::{DownloadError, DownloadResult};

/// 响应体字节流
pub type BodyStream = Pin<Box<dyn Stream<Item = DownloadResult<Bytes>>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 从 `offset` 开始续传
    pub fn range_from(self, offset: u64) -> Self {
        self.header("Range", format!("bytes={}-", offset))
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Option<BodyStream>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: BodyStream) -> Self {
        self.body = Some(body);
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 缺失或无法解析时返回 None
    pub fn content_length(&self) -> Option<i64> {
        self.header("Content-Length").and_then(|v| v.trim().parse().ok())
    }

    pub fn is_chunked(&self) -> bool {
        self.header("Transfer-Encoding")
            .map_or(false, |v| v.to_ascii_lowercase().contains("chunked"))
    }

    /// 取走响应体，只能取一次
    pub fn take_body(&mut self) -> Option<BodyStream> {
        self.body.take()
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

#[async_trait(?Send)]
pub trait HttpClient {
    fn new_request(&self, url: &str) -> HttpRequest {
        HttpRequest::new(url)
    }

    /// `Ok(None)` 表示服务器没有给出响应；传输层失败返回 `Err`
    async fn execute(&self, request: HttpRequest) -> DownloadResult<Option<HttpResponse>>;
}

/// 在工作线程内部创建客户端
pub trait HttpClientFactory: Send + Sync {
    fn create(&self) -> Box<dyn HttpClient>;
}

/// ================== awc 实现 ==================
pub struct AwcHttpClient {
    client: awc::Client,
    timeout: Duration,
}

impl AwcHttpClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        let client = awc::Client::builder()
            .add_default_header(("User-Agent", user_agent.to_string()))
            // 整体超时会一直延续到响应体读取完毕，这里只限制等待响应头的时间
            .disable_timeout()
            .finish();
        Self { client, timeout }
    }
}

#[async_trait(?Send)]
impl HttpClient for AwcHttpClient {
    async fn execute(&self, request: HttpRequest) -> DownloadResult<Option<HttpResponse>> {
        let mut builder = self
            .client
            .get(request.url.as_str())
            .insert_header(("Accept-Encoding", "identity"));
        for (name, value) in &request.headers {
            builder = builder.insert_header((name.as_str(), value.as_str()));
        }

        let response = match tokio::time::timeout(self.timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(DownloadError::NetworkError(format!("{}", e).into())),
            Err(_) => return Err(DownloadError::NetworkError("等待响应超时".into())),
        };

        let mut converted = HttpResponse::new(response.status().as_u16());
        for (name, value) in response.headers().iter() {
            if let Ok(value) = value.to_str() {
                converted = converted.with_header(name.as_str(), value);
            }
        }
        debug!("{} -> {}", request.url, converted.status());

        let body = response.map(|chunk| chunk.map_err(|e| DownloadError::NetworkError(format!("{}", e).into())));
        Ok(Some(converted.with_body(Box::pin(body))))
    }
}

#[derive(Debug, Clone)]
pub struct AwcClientFactory {
    pub user_agent: String,
    pub timeout: Duration,
}

impl AwcClientFactory {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            timeout,
        }
    }
}

impl HttpClientFactory for AwcClientFactory {
    fn create(&self) -> Box<dyn HttpClient> {
        Box::new(AwcHttpClient::new(&self.user_agent, self.timeout))
    }
}
