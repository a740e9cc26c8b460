//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Ticketbucket - Process-local Token Bucket Admission Control
//!
//! A single [`Limiter`] owns a ticket balance that a background replenisher
//! credits at `rate` tickets per second. Callers block in [`Limiter::wait`] /
//! [`Limiter::wait_n`] until their tickets are reserved or their [`Context`]
//! ends.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use ticketbucket::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`Limiter`] - Token bucket with background replenishment
//! - [`Context`] - Cancellation handle with optional deadline
//! - [`LimiterConfig`] - Limiter parameters (YAML / TOML / JSON)
//! - [`LimiterError`] - Error types
//!
//! # Examples
//!
//! ```rust
//! use ticketbucket::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let lifetime = Context::new();
//!     let limiter = Limiter::new(&lifetime, 100.0).unwrap();
//!     limiter.set_tick(Duration::from_millis(1)).unwrap();
//!
//!     // 最多等待 50 毫秒
//!     let ctx = Context::new().with_timeout(Duration::from_millis(50));
//!     limiter.wait_n(&ctx, 20.0).await.unwrap();
//!
//!     // 超过突发上限立即失败
//!     let err = limiter.wait_n(&ctx, 101.0).await.unwrap_err();
//!     assert!(err.is_burst_exceeded());
//!
//!     lifetime.cancel();
//!     limiter.stopped().await;
//! }
//! ```
//!
//! # Features
//!
//! - **Partial reservation**: a blocked waiter absorbs tickets as they trickle in
//! - **Bounded recovery**: a single cycle never credits more than `rate * max_accumulation_interval`
//! - **Owned lifecycle**: the replenisher task can be cancelled and joined deterministically
//! - **Optional refund**: partially reserved tickets can be returned on cancellation

pub mod prelude;

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod limiter;

// 重新导出常用类型
pub use config::LimiterConfig;
pub use context::Context;
pub use error::{CancelCause, LimiterError};
pub use limiter::{Admission, Limiter, LimiterStats};
