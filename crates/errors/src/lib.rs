//! latch-errors - 统一错误处理
//!
//! 会话子系统的错误分类：调用方参数错误、密码学原语故障、存储故障与超时。
//! "凭证不匹配" 不是错误，由 `Ok(None)` 表达。

use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 调用方参数非法，不应自动重试
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 随机源或哈希原语故障，当前调用失败，可重新发起
    #[error("Crypto failure: {0}")]
    CryptoFailure(String),

    /// 持久化层不可达或出错，调用方可退避重试
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// 超过调用方给定的截止时间
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn crypto_failure(msg: impl Into<String>) -> Self {
        Self::CryptoFailure(msg.into())
    }

    pub fn storage_failure(msg: impl Into<String>) -> Self {
        Self::StorageFailure(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 错误种类的短名称，用于日志与指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::CryptoFailure(_) => "crypto_failure",
            Self::StorageFailure(_) => "storage_failure",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }

    /// 是否值得由调用方退避后重试同一请求
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageFailure(_) | Self::Timeout(_))
    }

    /// 转换为 HTTP 状态码（供外部路由层映射使用）
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::CryptoFailure(_) => 500,
            Self::StorageFailure(_) => 503,
            Self::Timeout(_) => 504,
            Self::Internal(_) => 500,
        }
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;
