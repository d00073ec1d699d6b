//! Tracing subscriber initialisation

use std::str::FromStr;

use crawlsync_domain::CrawlSyncError;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, coloured output
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = CrawlSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(CrawlSyncError::Config(format!("unknown log format '{other}'"))),
        }
    }
}

/// Install the global subscriber, filtered by `RUST_LOG`.
///
/// Returns `false` when a subscriber was already installed, in which case
/// the existing one is kept.
pub fn init_tracing(format: LogFormat) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init(),
        LogFormat::Pretty => subscriber.with(fmt::layer().with_target(true)).try_init(),
    };
    installed.is_ok()
}
