//! Shared test helpers for `crawlsync-core` integration tests.
//!
//! An in-memory store and a scripted GraphQL catalog stand in for SQLite and
//! the remote API so engine tests can focus on behaviour.

#![allow(dead_code)]

pub mod catalog;
pub mod store;

use std::sync::Arc;

use crawlsync_common::testing::{MockClock, RecordingSleeper};
use crawlsync_core::{RateGovernor, SyncEngine};
use crawlsync_domain::GovernorConfig;

pub use catalog::{project, FakeCatalog};
pub use store::MemoryStore;

/// Governor on a mock clock whose sleeps return immediately.
pub fn governor() -> (Arc<RateGovernor>, RecordingSleeper) {
    let clock = MockClock::new();
    let sleeper = RecordingSleeper::with_clock(clock.clone());
    let config = GovernorConfig {
        requests_per_second: 1_000,
        burst: 1_000,
        max_concurrent: 4,
        max_attempts: 3,
        base_delay_ms: 10,
        max_delay_ms: 100,
    };
    let governor = RateGovernor::with_runtime(&config, Arc::new(clock), Arc::new(sleeper.clone()))
        .expect("governor config");
    (Arc::new(governor), sleeper)
}

pub fn engine(catalog: &Arc<FakeCatalog>, store: &MemoryStore) -> SyncEngine {
    let (governor, _) = governor();
    SyncEngine::new(
        catalog.clone(),
        governor,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    )
}
