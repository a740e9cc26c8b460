//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型。

use thiserror::Error;

/// 取消原因
///
/// 对应 [`Context`](crate::Context) 结束的两种方式。
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CancelCause {
    /// 显式取消（自身或父上下文调用了 `cancel`）
    #[error("context canceled")]
    Canceled,

    /// 截止时间已到
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// 限流器错误类型
#[derive(Error, Debug)]
pub enum LimiterError {
    /// 单次请求数量超过突发上限
    #[error("突发上限超出: 请求 {requested}，上限 {burst_max}")]
    BurstExceeded { requested: f64, burst_max: f64 },

    /// 等待期间上下文结束
    #[error("等待被取消: {0}")]
    Cancelled(#[from] CancelCause),

    /// 请求数量非法（负数、NaN 或无穷大）
    #[error("请求数量非法: {0}")]
    InvalidQuantity(f64),

    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 当前线程不在 tokio 运行时中，无法启动补充任务
    #[error("未找到 tokio 运行时，无法启动补充任务")]
    RuntimeUnavailable,

    /// IO错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// YAML解析错误
    #[error("YAML解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML解析错误
    #[error("TOML解析错误: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl LimiterError {
    /// 是否为取消错误
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LimiterError::Cancelled(_))
    }

    /// 是否为突发上限错误
    pub fn is_burst_exceeded(&self) -> bool {
        matches!(self, LimiterError::BurstExceeded { .. })
    }

    /// 取消原因（仅取消错误有）
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        match self {
            LimiterError::Cancelled(cause) => Some(*cause),
            _ => None,
        }
    }

    /// 调用方能否原样重试
    ///
    /// 只有取消错误可以重试；其余错误需要先修改请求或配置。
    pub fn is_retryable(&self) -> bool {
        self.is_cancelled()
    }
}
