//! Structured events emitted by the sync engine
//!
//! Captures the JSON output of a `tracing_subscriber` fmt layer for one run
//! and checks the fields operators filter on.

mod support;

use std::io;
use std::sync::{Arc, Mutex};

use crawlsync_core::SyncRequest;
use crawlsync_domain::{GraphqlRequest, PageSchema, Realm};
use serde_json::Value;
use support::catalog::offset_schema;
use support::{engine, FakeCatalog, MemoryStore};
use tokio_util::sync::CancellationToken;
use tracing::Level;

/// Shared buffer the fmt layer writes JSON lines into
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn events(&self, message: &str) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap())
            .filter(|event| event["fields"]["message"] == message)
            .collect()
    }
}

fn request(schema: PageSchema) -> SyncRequest {
    let query = "query Projects($limit: Int!, $offset: Int) { search { total results { id } } }";
    SyncRequest::new("project", GraphqlRequest::new(Realm::Primary, query, schema))
        .with_page_size(50)
}

#[tokio::test]
async fn test_every_state_change_carries_counts_and_entity_type() {
    let logs = CapturedLogs::default();
    let sink = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(Level::DEBUG)
        .with_writer(move || sink.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let catalog = FakeCatalog::with_projects(120);
    let store = MemoryStore::new();
    let outcome = engine(&catalog, &store)
        .run(request(offset_schema()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.inserted, 120);

    let events = logs.events("sync state changed");
    let states: Vec<_> = events.iter().map(|e| e["fields"]["state"].clone()).collect();
    assert!(states.len() >= 5, "{states:?}");
    for event in &events {
        let fields = &event["fields"];
        assert_eq!(fields["entity_type"], "project", "{event}");
        for count in ["inserted", "updated", "unchanged", "deleted", "pages_committed"] {
            assert!(fields[count].is_u64(), "{count} missing from {event}");
        }
    }

    let last = events.last().unwrap();
    assert_eq!(last["fields"]["inserted"], 120);
    assert_eq!(last["fields"]["deleted"], 0);
}
