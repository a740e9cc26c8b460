//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 测试通用工具模块
//!
//! 提供测试中常用的工具函数和辅助结构。

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use ticketbucket::{Context, Limiter, LimiterConfig};

/// 浮点数近似比较
pub fn approx(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-6
}

/// 创建空桶限流器
pub fn create_empty_limiter(lifetime: &Context, rate: f64, interval: Duration) -> Limiter {
    let config = LimiterConfig::new(rate)
        .with_interval(interval)
        .with_initial_tickets(0.0);
    Limiter::with_config(lifetime, config).unwrap()
}

/// 创建共享限流器
pub fn create_shared_limiter(lifetime: &Context, config: LimiterConfig) -> Arc<Limiter> {
    Arc::new(Limiter::with_config(lifetime, config).unwrap())
}

/// 初始化测试日志（重复调用无副作用）
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
