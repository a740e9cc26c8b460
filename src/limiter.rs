//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 令牌桶限流器
//!
//! 共享令牌状态、后台补充任务以及阻塞式的准入协议（`wait` / `wait_n`）。

use crate::config::{validate_burst_max, validate_duration, validate_rate, LimiterConfig};
use crate::constants::{DEFAULT_QUANTITY, RESERVATION_EPSILON};
use crate::context::Context;
use crate::error::{CancelCause, LimiterError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

/// 准入 trait
///
/// 驱动程序可以面向 `Arc<dyn Admission>` 编写，而不依赖具体的限流器。
#[async_trait]
pub trait Admission: Send + Sync {
    /// 阻塞直到预留 `qty` 个令牌，或上下文结束
    async fn wait_n(&self, ctx: &Context, qty: f64) -> Result<(), LimiterError>;

    /// 阻塞直到预留 1 个令牌，或上下文结束
    async fn wait(&self, ctx: &Context) -> Result<(), LimiterError> {
        self.wait_n(ctx, DEFAULT_QUANTITY).await
    }
}

/// 一次轮询的预留结果
enum Reservation {
    /// 剩余需求已全部满足
    Complete,
    /// 令牌不足，取走了桶内全部令牌
    Partial(f64),
}

/// 桶状态
///
/// 所有可变字段（包括可调参数）都在同一把锁内读写。
struct BucketState {
    tickets: f64,
    rate: f64,
    burst_max: f64,
    interval: Duration,
    max_accumulation_interval: Duration,
    tick: Duration,
    refund_on_cancel: bool,
    last_liberation: Instant,
    last_liberation_at: DateTime<Utc>,
    admitted_tickets: f64,
    forfeited_tickets: f64,
    refunded_tickets: f64,
}

impl BucketState {
    fn new(config: &LimiterConfig, now: Instant) -> Self {
        Self {
            tickets: config.initial_tickets(),
            rate: config.rate,
            burst_max: config.burst_max(),
            interval: config.interval,
            max_accumulation_interval: config.max_accumulation_interval(),
            tick: config.tick,
            refund_on_cancel: config.refund_on_cancel,
            last_liberation: now,
            last_liberation_at: Utc::now(),
            admitted_tickets: 0.0,
            forfeited_tickets: 0.0,
            refunded_tickets: 0.0,
        }
    }

    /// 按流逝时间补充令牌，返回令牌数变化量
    ///
    /// 计入的时间不超过 `max_accumulation_interval`，结果不超过 `burst_max`。
    /// 若 `burst_max` 在上个周期后被调低，变化量可能为负。
    fn replenish(&mut self, now: Instant) -> f64 {
        let elapsed = now
            .saturating_duration_since(self.last_liberation)
            .min(self.max_accumulation_interval);
        let before = self.tickets;

        self.tickets = (self.tickets + self.rate * elapsed.as_secs_f64()).min(self.burst_max);
        self.last_liberation = now;
        self.last_liberation_at = Utc::now();

        self.tickets - before
    }

    /// 快速路径：令牌足够时一次性扣减
    fn try_take(&mut self, qty: f64) -> bool {
        if self.tickets < qty {
            return false;
        }
        self.tickets = (self.tickets - qty).max(0.0);
        self.admitted_tickets += qty;
        true
    }

    /// 慢速路径：满足剩余需求，或取走当前全部令牌
    ///
    /// 已有部分预留时，不超过 `RESERVATION_EPSILON` 的差额视为已满足。
    fn reserve(&mut self, remaining: f64, partially_reserved: bool) -> Reservation {
        let slack = if partially_reserved {
            RESERVATION_EPSILON
        } else {
            0.0
        };
        if self.tickets + slack >= remaining {
            self.tickets = (self.tickets - remaining).max(0.0);
            Reservation::Complete
        } else {
            let taken = self.tickets;
            self.tickets = 0.0;
            Reservation::Partial(taken)
        }
    }

    /// 退还部分预留，超出 `burst_max` 的部分记为丢失
    fn refund(&mut self, amount: f64) -> f64 {
        let room = (self.burst_max - self.tickets).max(0.0);
        let refunded = amount.min(room);

        self.tickets += refunded;
        self.refunded_tickets += refunded;
        self.forfeited_tickets += amount - refunded;

        refunded
    }
}

/// 计数器
#[derive(Debug, Default)]
struct Counters {
    admitted_requests: AtomicU64,
    burst_rejections: AtomicU64,
    cancellations: AtomicU64,
    replenish_cycles: AtomicU64,
}

/// 限流器与补充任务共享的部分
struct Shared {
    id: Uuid,
    state: Mutex<BucketState>,
    counters: Counters,
    running: AtomicBool,
}

/// 限流器统计快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimiterStats {
    /// 限流器ID
    pub id: Uuid,
    /// 当前令牌数
    pub tickets: f64,
    /// 每秒补充令牌数
    pub rate: f64,
    /// 突发上限
    pub burst_max: f64,
    /// 补充间隔（毫秒）
    pub interval_ms: u64,
    /// 单次补充最长计入时间（毫秒）
    pub max_accumulation_interval_ms: u64,
    /// 轮询间隔（毫秒）
    pub tick_ms: u64,
    /// 取消时是否退还
    pub refund_on_cancel: bool,
    /// 最后补充时间
    pub last_liberation: DateTime<Utc>,
    /// 成功准入的请求数
    pub admitted_requests: u64,
    /// 成功准入的令牌总数
    pub admitted_tickets: f64,
    /// 超出突发上限被拒绝的请求数
    pub burst_rejections: u64,
    /// 等待期间被取消的请求数
    pub cancellations: u64,
    /// 补充周期数
    pub replenish_cycles: u64,
    /// 因取消丢失的令牌数
    pub forfeited_tickets: f64,
    /// 因取消退还的令牌数
    pub refunded_tickets: f64,
    /// 补充任务是否仍在运行
    pub running: bool,
}

/// 令牌桶限流器
///
/// 令牌由后台补充任务按 `rate` 周期性补充，调用方通过 [`Limiter::wait_n`]
/// 预留令牌。令牌不足时调用方以 `tick` 为周期轮询，并逐步吸收新补充的令牌，
/// 直到凑满所需数量。
///
/// # 特性
/// - 所有状态读写都在同一把 `parking_lot::Mutex` 内完成
/// - 补充任务的生命周期绑定到构造时传入的 [`Context`]
/// - 调用方之间不保证先来先服务
///
/// # 示例
/// ```rust
/// use ticketbucket::{Context, Limiter};
///
/// #[tokio::main]
/// async fn main() {
///     let lifetime = Context::new();
///     let limiter = Limiter::new(&lifetime, 10.0).unwrap();
///
///     limiter.wait(&Context::new()).await.unwrap();
///     assert_eq!(limiter.tickets(), 9.0);
///
///     limiter.shutdown().await;
/// }
/// ```
pub struct Limiter {
    shared: Arc<Shared>,
    lifetime: Context,
    replenisher: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Limiter {
    /// 使用默认参数创建限流器
    ///
    /// # 参数
    /// - `lifetime`: 补充任务的生命周期上下文
    /// - `rate`: 每秒补充的令牌数，必须大于 0
    pub fn new(lifetime: &Context, rate: f64) -> Result<Self, LimiterError> {
        Self::with_config(lifetime, LimiterConfig::new(rate))
    }

    /// 使用配置创建限流器，并启动补充任务
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn with_config(lifetime: &Context, config: LimiterConfig) -> Result<Self, LimiterError> {
        config.validate()?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| LimiterError::RuntimeUnavailable)?;

        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            state: Mutex::new(BucketState::new(&config, Instant::now())),
            counters: Counters::default(),
            running: AtomicBool::new(true),
        });
        let lifetime = lifetime.child();
        let handle = runtime.spawn(replenish(Arc::clone(&shared), lifetime.clone()));

        info!(
            limiter = %shared.id,
            rate = config.rate,
            burst_max = config.burst_max(),
            interval_ms = config.interval.as_millis() as u64,
            "Limiter started"
        );

        Ok(Self {
            shared,
            lifetime,
            replenisher: tokio::sync::Mutex::new(Some(handle)),
        })
    }

    /// 等待 1 个令牌
    pub async fn wait(&self, ctx: &Context) -> Result<(), LimiterError> {
        self.wait_n(ctx, DEFAULT_QUANTITY).await
    }

    /// 等待 `qty` 个令牌
    ///
    /// # 返回
    /// - `Ok(())`: 已从桶中扣除恰好 `qty` 个令牌
    /// - `Err(BurstExceeded)`: `qty` 超过突发上限，状态不变
    /// - `Err(Cancelled)`: 等待期间上下文结束；已部分预留的令牌默认不退还
    /// - `Err(InvalidQuantity)`: `qty` 为负数、NaN 或无穷大
    #[instrument(level = "trace", skip(self, ctx), fields(limiter = %self.shared.id))]
    pub async fn wait_n(&self, ctx: &Context, qty: f64) -> Result<(), LimiterError> {
        if !qty.is_finite() || qty < 0.0 {
            return Err(LimiterError::InvalidQuantity(qty));
        }

        {
            let mut state = self.shared.state.lock();
            if qty > state.burst_max {
                let burst_max = state.burst_max;
                drop(state);
                self.shared
                    .counters
                    .burst_rejections
                    .fetch_add(1, Ordering::Relaxed);
                debug!(qty, burst_max, "Burst max exceeded");
                return Err(LimiterError::BurstExceeded {
                    requested: qty,
                    burst_max,
                });
            }

            if state.try_take(qty) {
                drop(state);
                self.shared
                    .counters
                    .admitted_requests
                    .fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        }

        let mut reserved = 0.0;
        loop {
            let tick = self.shared.state.lock().tick;
            tokio::select! {
                biased;
                cause = ctx.done() => return Err(self.abandon(reserved, cause)),
                _ = tokio::time::sleep(tick) => {}
            }
            if let Some(cause) = ctx.err() {
                return Err(self.abandon(reserved, cause));
            }

            let outcome = {
                let mut state = self.shared.state.lock();
                let outcome = state.reserve(qty - reserved, reserved > 0.0);
                if matches!(outcome, Reservation::Complete) {
                    state.admitted_tickets += qty;
                }
                outcome
            };

            match outcome {
                Reservation::Complete => {
                    self.shared
                        .counters
                        .admitted_requests
                        .fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Reservation::Partial(taken) => {
                    reserved += taken;
                    trace!(taken, reserved, remaining = qty - reserved, "Waiting for tickets");
                }
            }
        }
    }

    /// 取消时处理已部分预留的令牌
    fn abandon(&self, reserved: f64, cause: CancelCause) -> LimiterError {
        self.shared
            .counters
            .cancellations
            .fetch_add(1, Ordering::Relaxed);

        if reserved > 0.0 {
            let mut state = self.shared.state.lock();
            if state.refund_on_cancel {
                let refunded = state.refund(reserved);
                drop(state);
                debug!(%cause, reserved, refunded, "Wait cancelled, reservation refunded");
            } else {
                state.forfeited_tickets += reserved;
                drop(state);
                debug!(%cause, reserved, "Wait cancelled, reservation forfeited");
            }
        } else {
            debug!(%cause, "Wait cancelled");
        }

        LimiterError::Cancelled(cause)
    }

    // ------------------------------------------------------------------
    // Setters
    // ------------------------------------------------------------------

    /// 设置补充速率，从下个补充周期开始生效
    pub fn set_rate(&self, rate: f64) -> Result<&Self, LimiterError> {
        validate_rate(rate)?;
        self.shared.state.lock().rate = rate;
        debug!(limiter = %self.shared.id, rate, "Rate updated");
        Ok(self)
    }

    /// 设置突发上限
    ///
    /// 不会截断当前令牌数，下个补充周期才会按新上限截断。
    pub fn set_burst_max(&self, burst_max: f64) -> Result<&Self, LimiterError> {
        validate_burst_max(burst_max)?;
        self.shared.state.lock().burst_max = burst_max;
        debug!(limiter = %self.shared.id, burst_max, "Burst max updated");
        Ok(self)
    }

    /// 设置补充间隔，从下一次休眠开始生效
    pub fn set_interval(&self, interval: Duration) -> Result<&Self, LimiterError> {
        validate_duration("interval", interval)?;
        self.shared.state.lock().interval = interval;
        debug!(limiter = %self.shared.id, ?interval, "Interval updated");
        Ok(self)
    }

    /// 设置单次补充最长计入时间
    pub fn set_max_accumulation_interval(&self, max: Duration) -> Result<&Self, LimiterError> {
        validate_duration("max_accumulation_interval", max)?;
        self.shared.state.lock().max_accumulation_interval = max;
        debug!(limiter = %self.shared.id, ?max, "Max accumulation interval updated");
        Ok(self)
    }

    /// 设置轮询间隔，从等待方的下一次轮询开始生效
    pub fn set_tick(&self, tick: Duration) -> Result<&Self, LimiterError> {
        validate_duration("tick", tick)?;
        self.shared.state.lock().tick = tick;
        debug!(limiter = %self.shared.id, ?tick, "Tick updated");
        Ok(self)
    }

    /// 设置取消时是否退还部分预留
    pub fn set_refund_on_cancel(&self, refund: bool) -> &Self {
        self.shared.state.lock().refund_on_cancel = refund;
        self
    }

    // ------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn tickets(&self) -> f64 {
        self.shared.state.lock().tickets
    }

    pub fn rate(&self) -> f64 {
        self.shared.state.lock().rate
    }

    pub fn burst_max(&self) -> f64 {
        self.shared.state.lock().burst_max
    }

    pub fn interval(&self) -> Duration {
        self.shared.state.lock().interval
    }

    pub fn max_accumulation_interval(&self) -> Duration {
        self.shared.state.lock().max_accumulation_interval
    }

    pub fn tick(&self) -> Duration {
        self.shared.state.lock().tick
    }

    /// 最后一次补充的时刻
    pub fn last_liberation(&self) -> Instant {
        self.shared.state.lock().last_liberation
    }

    pub fn refund_on_cancel(&self) -> bool {
        self.shared.state.lock().refund_on_cancel
    }

    /// 补充任务是否仍在运行
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// 获取统计快照
    pub fn stats(&self) -> LimiterStats {
        let state = self.shared.state.lock();
        let counters = &self.shared.counters;
        LimiterStats {
            id: self.shared.id,
            tickets: state.tickets,
            rate: state.rate,
            burst_max: state.burst_max,
            interval_ms: state.interval.as_millis() as u64,
            max_accumulation_interval_ms: state.max_accumulation_interval.as_millis() as u64,
            tick_ms: state.tick.as_millis() as u64,
            refund_on_cancel: state.refund_on_cancel,
            last_liberation: state.last_liberation_at,
            admitted_requests: counters.admitted_requests.load(Ordering::Relaxed),
            admitted_tickets: state.admitted_tickets,
            burst_rejections: counters.burst_rejections.load(Ordering::Relaxed),
            cancellations: counters.cancellations.load(Ordering::Relaxed),
            replenish_cycles: counters.replenish_cycles.load(Ordering::Relaxed),
            forfeited_tickets: state.forfeited_tickets,
            refunded_tickets: state.refunded_tickets,
            running: self.is_running(),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// 停止补充任务并等待其退出
    ///
    /// 只取消限流器自身的生命周期，不影响构造时传入的上下文。
    /// 仍在等待的调用方需通过各自的上下文取消。
    pub async fn shutdown(&self) {
        self.lifetime.cancel();
        self.stopped().await;
    }

    /// 等待补充任务退出（不主动取消）
    ///
    /// 可重复调用；任务退出后立即返回。
    pub async fn stopped(&self) {
        let mut guard = self.replenisher.lock().await;
        // 句柄在 await 完成后才移除，调用方中途放弃时仍可再次等待
        if let Some(handle) = guard.as_mut() {
            let result = handle.await;
            *guard = None;
            if let Err(e) = result {
                warn!(limiter = %self.shared.id, "Replenisher task failed: {}", e);
            }
        }
    }
}

impl Drop for Limiter {
    fn drop(&mut self) {
        self.lifetime.cancel();
        if let Some(handle) = self.replenisher.get_mut().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Admission for Limiter {
    async fn wait_n(&self, ctx: &Context, qty: f64) -> Result<(), LimiterError> {
        Limiter::wait_n(self, ctx, qty).await
    }
}

/// 补充任务
///
/// 每个周期先休眠 `interval`，再检查生命周期；上下文结束是唯一的退出路径。
async fn replenish(shared: Arc<Shared>, lifetime: Context) {
    debug!(limiter = %shared.id, "Replenisher running");

    loop {
        let interval = shared.state.lock().interval;
        tokio::select! {
            biased;
            _ = lifetime.done() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if lifetime.is_done() {
            break;
        }

        let (credited, tickets) = {
            let mut state = shared.state.lock();
            let credited = state.replenish(Instant::now());
            (credited, state.tickets)
        };
        shared
            .counters
            .replenish_cycles
            .fetch_add(1, Ordering::Relaxed);
        trace!(limiter = %shared.id, credited, tickets, "Tickets replenished");
    }

    shared.running.store(false, Ordering::SeqCst);
    info!(limiter = %shared.id, "Replenisher stopped");
}

// ============================================================================
// 单元测试
// ============================================================================
