//! 并发测试
//!
//! 在多线程运行时上验证检查与扣减的原子性

use crate::common::create_shared_limiter;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ticketbucket::{Context, LimiterConfig};

/// 并发等待不会使令牌数变为负数
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tickets_never_negative() {
    let lifetime = Context::new();
    let limiter = create_shared_limiter(
        &lifetime,
        LimiterConfig::new(2000.0)
            .with_burst_max(50.0)
            .with_interval(Duration::from_millis(10))
            .with_tick(Duration::from_millis(1)),
    );

    let done = Arc::new(AtomicBool::new(false));
    let monitor = {
        let limiter = Arc::clone(&limiter);
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            let mut min_seen = f64::MAX;
            while !done.load(Ordering::SeqCst) {
                min_seen = min_seen.min(limiter.tickets());
                tokio::task::yield_now().await;
            }
            min_seen
        })
    };

    let mut handles = Vec::new();
    for _ in 0..8 {
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move {
            let ctx = Context::new();
            for _ in 0..25 {
                limiter.wait(&ctx).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    done.store(true, Ordering::SeqCst);

    let min_seen = monitor.await.unwrap();
    assert!(min_seen >= 0.0, "{}", min_seen);

    let stats = limiter.stats();
    assert_eq!(stats.admitted_requests, 200);
    assert!(stats.tickets >= 0.0);

    limiter.shutdown().await;
}

/// 没有补充时，并发调用方恰好瓜分初始令牌
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_over_admission() {
    let lifetime = Context::new();
    let limiter = create_shared_limiter(
        &lifetime,
        LimiterConfig::new(50.0)
            .with_interval(Duration::from_secs(3600))
            .with_tick(Duration::from_millis(2)),
    );
    let admitted = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(tokio::sync::Barrier::new(100));

    let mut handles = Vec::new();
    for _ in 0..100 {
        let limiter = Arc::clone(&limiter);
        let admitted = Arc::clone(&admitted);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let ctx = Context::new().with_timeout(Duration::from_millis(100));
            if limiter.wait(&ctx).await.is_ok() {
                admitted.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 50);
    assert!(limiter.tickets().abs() < 1e-9);

    let stats = limiter.stats();
    assert_eq!(stats.admitted_requests, 50);
    assert_eq!(stats.cancellations, 50);
}

/// 多个 wait_n 并发吸收部分令牌，总扣减量与成功请求一致
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_partial_reservations() {
    let lifetime = Context::new();
    let limiter = create_shared_limiter(
        &lifetime,
        LimiterConfig::new(500.0)
            .with_burst_max(20.0)
            .with_interval(Duration::from_millis(5))
            .with_tick(Duration::from_millis(1))
            .with_initial_tickets(0.0),
    );

    let mut handles = Vec::new();
    for worker in 0..6 {
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move {
            let ctx = Context::new().with_timeout(Duration::from_secs(10));
            let qty = 3.0 + worker as f64;
            for _ in 0..5 {
                limiter.wait_n(&ctx, qty).await.unwrap();
            }
            qty * 5.0
        }));
    }

    let mut expected = 0.0;
    for handle in handles {
        expected += handle.await.unwrap();
    }

    let stats = limiter.stats();
    assert_eq!(stats.admitted_requests, 30);
    assert!((stats.admitted_tickets - expected).abs() < 1e-6);
    assert!(stats.tickets >= 0.0);
    assert_eq!(stats.forfeited_tickets, 0.0);

    lifetime.cancel();
    limiter.stopped().await;
    assert!(!limiter.is_running());
}
