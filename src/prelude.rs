//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from ticketbucket,
//! allowing users to import them with a single `use ticketbucket::prelude::*;`
//! statement instead of importing each type individually.

pub use crate::config::LimiterConfig;
pub use crate::context::Context;
pub use crate::error::{CancelCause, LimiterError};
pub use crate::limiter::{Admission, Limiter, LimiterStats};
