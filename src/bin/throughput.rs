//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 吞吐量演示
//!
//! 启动多个并发 worker 循环调用 `wait`，打印平均速度与瞬时速度。
//!
//! 运行方式: `cargo run --features cli --bin throughput -- --rate 10 --workers 2`

use anyhow::Context as _;
use clap::Parser;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ticketbucket::{Admission, Context, Limiter, LimiterConfig};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "throughput", about = "Exercise a ticketbucket limiter with concurrent workers")]
struct Args {
    /// 每秒补充的令牌数
    #[arg(long, default_value_t = 10.0)]
    rate: f64,

    /// 并发 worker 数
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// 每个 worker 的请求数
    #[arg(long, default_value_t = 100)]
    requests: u64,

    /// 轮询间隔（毫秒）
    #[arg(long, default_value_t = 200)]
    tick_ms: u64,

    /// 配置文件（yaml / toml / json），指定后忽略 --rate 与 --tick-ms
    #[arg(long)]
    config: Option<PathBuf>,
}

/// 最近 `window` 次准入的时间戳
struct Progress {
    start: Instant,
    admitted: AtomicU64,
    window: usize,
    recent: Mutex<VecDeque<Instant>>,
}

impl Progress {
    fn new(window: usize) -> Self {
        Self {
            start: Instant::now(),
            admitted: AtomicU64::new(0),
            window: window.max(1),
            recent: Mutex::new(VecDeque::with_capacity(window + 1)),
        }
    }

    fn record(&self) {
        let counter = self.admitted.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Instant::now();
        let elapsed = now.duration_since(self.start);

        let oldest = {
            let mut recent = self.recent.lock();
            recent.push_back(now);
            if recent.len() > self.window {
                recent.pop_front();
            }
            recent.front().copied().unwrap_or(now)
        };

        let average = counter as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        let instant_span = now.duration_since(oldest).as_secs_f64();
        let instant = if instant_span > 0.0 {
            self.window as f64 / instant_span
        } else {
            f64::INFINITY
        };

        println!(
            "counter {} time {:?}, speed avg: {:.2}/s \t instant speed: {:.2}/s",
            counter, elapsed, average, instant
        );
        if counter % self.window as u64 == 0 {
            println!(
                "________________________________________ ({}) {:?} --- {}",
                counter,
                elapsed,
                chrono::Utc::now()
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => LimiterConfig::from_file(path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => LimiterConfig::new(args.rate).with_tick(Duration::from_millis(args.tick_ms)),
    };

    let lifetime = Context::new();
    let limiter = Arc::new(Limiter::with_config(&lifetime, config.clone())?);
    let admission: Arc<dyn Admission> = limiter.clone();
    let progress = Arc::new(Progress::new(config.rate.ceil() as usize));

    println!(
        "=== 吞吐量演示: rate={}/s, workers={}, requests={} ===",
        config.rate, args.workers, args.requests
    );

    let mut handles = Vec::with_capacity(args.workers);
    for _ in 0..args.workers {
        let admission = Arc::clone(&admission);
        let progress = Arc::clone(&progress);
        let requests = args.requests;

        handles.push(tokio::spawn(async move {
            let ctx = Context::new();
            for _ in 0..requests {
                admission.wait(&ctx).await?;
                progress.record();
            }
            Ok::<_, ticketbucket::LimiterError>(())
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await? {
            println!("err limiter: {}", e);
        }
    }

    let stats = limiter.stats();
    lifetime.cancel();
    limiter.stopped().await;

    println!("\n{}", serde_json::to_string_pretty(&stats)?);
    println!("final");
    Ok(())
}
