//! 工具：日志安装和参数校验

pub mod logger;
pub mod validator;
