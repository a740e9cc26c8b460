//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for ticketbucket.
//!
//! All default parameters of a [`Limiter`](crate::Limiter) are defined here.

use std::time::Duration;

/// Default replenishment interval (1 second).
///
/// How often the background replenisher wakes up and credits tickets.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Default poll tick for blocked waiters (5 milliseconds).
///
/// Also the upper bound on how long a waiter takes to observe newly
/// credited tickets.
pub const DEFAULT_TICK: Duration = Duration::from_millis(5);

/// Quantity requested by [`Limiter::wait`](crate::Limiter::wait).
pub const DEFAULT_QUANTITY: f64 = 1.0;

/// Once part of a request is reserved, remaining amounts below this
/// threshold count as fully reserved.
///
/// Partial reservations accumulate floating point error; without the
/// threshold a waiter could poll forever for `1e-16` of a ticket.
pub const RESERVATION_EPSILON: f64 = 1e-9;
