//! Testing utilities and helpers
//!
//! - **[`time`]**: clock abstraction with a controllable [`MockClock`]
//! - **[`sleeper`]**: a [`RecordingSleeper`] that returns immediately and
//!   remembers every requested delay
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use crawlsync_common::testing::{MockClock, RecordingSleeper};
//! use crawlsync_common::time::Sleeper;
//!
//! # tokio_test::block_on(async {
//! let clock = MockClock::new();
//! let sleeper = RecordingSleeper::with_clock(clock.clone());
//! sleeper.sleep(Duration::from_millis(250)).await;
//! assert_eq!(sleeper.total(), Duration::from_millis(250));
//! assert_eq!(clock.elapsed(), Duration::from_millis(250));
//! # });
//! ```

pub mod sleeper;
pub mod time;

pub use sleeper::RecordingSleeper;
pub use time::{Clock, MockClock, SystemClock};
