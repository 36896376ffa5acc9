use std::borrow::Cow;
use std::fmt;
use std::io;
use thiserror::Error;

/// 下载失败的分类码，随 `end_error(code, retry)` 一路传到管理器监听器
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadErrorKind {
    NoUrl = 1,
    NoSpace = 2,
    IoError = 3,
    NoResponse = 4,
    StatusCode = 5,
    NoInputStream = 6,
    NoContentLength = 7,
    IoException = 8,
}

impl DownloadErrorKind {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::NoUrl),
            2 => Some(Self::NoSpace),
            3 => Some(Self::IoError),
            4 => Some(Self::NoResponse),
            5 => Some(Self::StatusCode),
            6 => Some(Self::NoInputStream),
            7 => Some(Self::NoContentLength),
            8 => Some(Self::IoException),
            _ => None,
        }
    }

    /// 致命错误：不进入重试循环
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::NoUrl | Self::NoSpace | Self::IoError)
    }

    pub fn is_retryable(self) -> bool {
        !self.is_fatal()
    }
}

impl fmt::Display for DownloadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoUrl => "NO_URL",
            Self::NoSpace => "NO_SPACE",
            Self::IoError => "IO_ERROR",
            Self::NoResponse => "NO_RESPONSE",
            Self::StatusCode => "STATUS_CODE",
            Self::NoInputStream => "NO_INPUT_STREAM",
            Self::NoContentLength => "NO_CONTENT_LENGTH",
            Self::IoException => "IO_EXCEPTION",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("网络错误: {0}")]
    NetworkError(Cow<'static, str>),

    #[error("IO错误: {0}")]
    IoError(#[from] io::Error),

    #[error("无效的URL: {0}")]
    InvalidUrl(Cow<'static, str>),

    #[error("服务器返回异常状态码: {0}")]
    StatusCode(u16),

    #[error("服务器没有响应")]
    NoResponse,

    #[error("响应没有内容流")]
    NoInputStream,

    #[error("无法确定内容长度")]
    NoContentLength,

    #[error("磁盘空间不足: 剩余空间低于 {required} 字节")]
    InsufficientSpace { required: u64 },

    #[error("本地读写自检失败: {0}")]
    LocalIoBroken(Cow<'static, str>),

    #[error("配置错误: {0}")]
    Config(Cow<'static, str>),

    #[error("权限错误: {0}")]
    PermissionError(Cow<'static, str>),

    #[error("下载被取消")]
    Cancelled,

    #[error("未知错误: {0}")]
    Unknown(Cow<'static, str>),
}

impl DownloadError {
    /// 映射到对外的错误分类码
    pub fn kind(&self) -> DownloadErrorKind {
        match self {
            DownloadError::InvalidUrl(_) => DownloadErrorKind::NoUrl,
            DownloadError::InsufficientSpace { .. } => DownloadErrorKind::NoSpace,
            DownloadError::LocalIoBroken(_) => DownloadErrorKind::IoError,
            DownloadError::NoResponse => DownloadErrorKind::NoResponse,
            DownloadError::StatusCode(_) => DownloadErrorKind::StatusCode,
            DownloadError::NoInputStream => DownloadErrorKind::NoInputStream,
            DownloadError::NoContentLength => DownloadErrorKind::NoContentLength,
            DownloadError::NetworkError(_)
            | DownloadError::IoError(_)
            | DownloadError::Config(_)
            | DownloadError::PermissionError(_)
            | DownloadError::Cancelled
            | DownloadError::Unknown(_) => DownloadErrorKind::IoException,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    pub fn invalid_url(msg: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::InvalidUrl(msg.into())
    }

    pub fn config(msg: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::Config(msg.into())
    }

    pub fn permission_error(msg: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::PermissionError(msg.into())
    }

    pub fn unknown(msg: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::Unknown(msg.into())
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;
