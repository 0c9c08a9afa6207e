/// 自定义错误类型
///
/// 使用 thiserror 定义精确的错误类型，替代泛型的 anyhow::Error
/// 这样可以让调用者进行更精确的错误处理和恢复
use std::io;
use thiserror::Error;

/// Smart Proxy 的主要错误类型
#[derive(Error, Debug)]
pub enum ProxyError {
    /// 连接失败
    #[error("Failed to connect to {addr}: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 上游代理不可用（启动探测重试耗尽）
    #[error("Upstream proxy {addr} not available after {attempts} attempts: {reason}")]
    UpstreamUnavailable {
        addr: String,
        attempts: u32,
        reason: String,
    },

    /// 上游代理拒绝 CONNECT 握手
    #[error("Upstream proxy refused: {0}")]
    UpstreamRefused(String),

    /// 协议错误（请求行或响应行无法解析）
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 超时错误
    #[error("Operation timeout after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// I/O 错误
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 其他错误（保留与 anyhow 的兼容性）
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    /// 创建连接失败错误
    pub fn connection_failed(addr: impl Into<String>, source: io::Error) -> Self {
        Self::ConnectionFailed {
            addr: addr.into(),
            source,
        }
    }

    /// 创建上游不可用错误
    pub fn upstream_unavailable(
        addr: impl Into<String>,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::UpstreamUnavailable {
            addr: addr.into(),
            attempts,
            reason: reason.into(),
        }
    }

    /// 创建上游拒绝错误
    pub fn upstream_refused(msg: impl Into<String>) -> Self {
        Self::UpstreamRefused(msg.into())
    }

    /// 创建协议错误
    pub fn protocol_error(msg: impl Into<String>) -> Self {
        Self::ProtocolError(msg.into())
    }

    /// 创建配置错误
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// 创建超时错误
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout { duration }
    }

    /// 检查是否为超时错误
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// 检查是否为上游不可用
    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }

    /// 检查是否为上游拒绝
    pub fn is_upstream_refused(&self) -> bool {
        matches!(self, Self::UpstreamRefused(_))
    }

    /// 检查是否为配置错误
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError(_))
    }
}
