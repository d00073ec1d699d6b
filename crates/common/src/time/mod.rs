//! Time abstractions
//!
//! Clocks are re-exported from [`crate::testing::time`]. Suspension goes
//! through [`Sleeper`] so backoff loops can be driven without real time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use crate::testing::time::{Clock, SystemClock};

/// Something that can suspend the current task for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[async_trait]
impl<T: Sleeper + ?Sized> Sleeper for Arc<T> {
    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}
