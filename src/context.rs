//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 取消上下文
//!
//! 基于 [`CancellationToken`] 的取消句柄，附带可选的截止时间。
//! 每个阻塞操作都接收一个 [`Context`]，超时统一通过截止时间表达，
//! 限流器内部没有独立的超时概念。

use crate::error::CancelCause;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 取消上下文
///
/// 克隆得到的是同一个上下文；[`Context::child`] 得到的子上下文会随父上下文一起结束，
/// 但取消子上下文不影响父上下文。
///
/// # 示例
/// ```rust
/// use ticketbucket::Context;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let root = Context::new();
///     let request = root.with_timeout(Duration::from_millis(10));
///     assert!(!request.is_done());
///
///     root.cancel();
///     assert!(request.is_done());
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// 创建根上下文（无截止时间）
    pub fn new() -> Self {
        Self::default()
    }

    /// 派生子上下文，继承父上下文的截止时间
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// 派生带超时的子上下文
    ///
    /// 超时过大以至于无法表示时，不设置新的截止时间。
    pub fn with_timeout(&self, timeout: std::time::Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// 派生带截止时间的子上下文
    ///
    /// 实际截止时间取父上下文截止时间与 `deadline` 中较早的一个。
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// 取消上下文及其所有子上下文
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// 截止时间
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 底层取消令牌
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// 结束原因；上下文仍然有效时返回 `None`
    ///
    /// 显式取消优先于截止时间。
    pub fn err(&self) -> Option<CancelCause> {
        if self.token.is_cancelled() {
            return Some(CancelCause::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }

    /// 上下文是否已结束
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// 等待上下文结束，返回结束原因
    pub async fn done(&self) -> CancelCause {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => CancelCause::Canceled,
                    _ = tokio::time::sleep_until(deadline) => CancelCause::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelCause::Canceled
            }
        }
    }
}

impl From<CancellationToken> for Context {
    fn from(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }
}
