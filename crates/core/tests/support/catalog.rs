//! Scripted GraphQL catalog
//!
//! Serves a fixed list of project payloads through the transport port,
//! honouring the request's limit, offset or cursor, and window variables the
//! way a search API would. Responses go through the request's page schema so
//! decoding is exercised too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use crawlsync_core::{GraphqlTransport, TransportError};
use crawlsync_domain::{GraphqlRequest, Page, PageSchema, PaginationVariables, WindowRollover};
use serde_json::{json, Map, Value};

type CallHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Project `i`; higher indexes were created earlier, so index order is
/// newest first.
pub fn project(i: usize) -> Value {
    json!({
        "id": format!("p-{i:03}"),
        "name": format!("Project {i}"),
        "updatedOn": stamp(base_time() + Duration::hours(i as i64)),
        "createdOn": stamp(base_time() - Duration::minutes(i as i64)),
    })
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Cursor-paginated search schema (`after` variable)
pub fn cursor_schema() -> PageSchema {
    PageSchema::connection("/search")
        .items("/results")
        .updated_on("/updatedOn")
        .total("/total")
        .cursor("/cursor")
        .pagination(PaginationVariables {
            limit: "/limit".into(),
            offset: None,
            cursor: Some("/after".into()),
        })
}

/// Offset-paginated search schema
pub fn offset_schema() -> PageSchema {
    PageSchema::connection("/search").items("/results").updated_on("/updatedOn").total("/total")
}

/// Offset schema that rolls the `createdTo` window over on `createdOn`
pub fn windowed_schema() -> PageSchema {
    offset_schema().window(WindowRollover {
        variable: "/createdTo".into(),
        field: "/createdOn".into(),
    })
}

#[derive(Default)]
pub struct FakeCatalog {
    records: Mutex<Vec<Value>>,
    /// Persistent failures keyed by the first index a request asks for
    failures: Mutex<HashMap<usize, TransportError>>,
    requests: Mutex<Vec<Map<String, Value>>>,
    calls: AtomicUsize,
    hook: Mutex<Option<CallHook>>,
}

impl FakeCatalog {
    pub fn with_projects(count: usize) -> Arc<Self> {
        let catalog = Self::default();
        *catalog.records.lock().unwrap() = (0..count).map(project).collect();
        Arc::new(catalog)
    }

    pub fn set_records(&self, records: Vec<Value>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn edit(&self, index: usize, edit: impl FnOnce(&mut Value)) {
        edit(&mut self.records.lock().unwrap()[index]);
    }

    pub fn remove(&self, index: usize) -> Value {
        self.records.lock().unwrap().remove(index)
    }

    pub fn fail_at(&self, start: usize, error: TransportError) {
        self.failures.lock().unwrap().insert(start, error);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Called with the 1-based call number after each successful response
    pub fn on_call(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Arc::new(hook));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Map<String, Value>> {
        self.requests.lock().unwrap().clone()
    }

    fn start_index(request: &GraphqlRequest, variables: &Value) -> usize {
        let pagination = &request.schema.pagination;
        if let Some(cursor) = pagination.cursor.as_deref().and_then(|p| variables.pointer(p)) {
            return cursor.as_str().and_then(|c| c.parse().ok()).unwrap_or(0);
        }
        pagination
            .offset
            .as_deref()
            .and_then(|p| variables.pointer(p))
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize
    }
}

#[async_trait]
impl GraphqlTransport for FakeCatalog {
    async fn execute(&self, request: &GraphqlRequest) -> Result<Page, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.variables.clone());

        let variables = Value::Object(request.variables.clone());
        let limit = variables
            .pointer(&request.schema.pagination.limit)
            .and_then(Value::as_u64)
            .unwrap_or(500) as usize;
        let start = Self::start_index(request, &variables);

        if let Some(error) = self.failures.lock().unwrap().get(&start) {
            return Err(error.clone());
        }

        let bound = request
            .schema
            .window
            .as_ref()
            .and_then(|w| variables.pointer(&w.variable))
            .and_then(Value::as_str)
            .map(str::to_string);
        let visible: Vec<Value> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| bound.as_deref().map_or(true, |b| r["createdOn"].as_str().unwrap() <= b))
            .cloned()
            .collect();

        let from = start.min(visible.len());
        let to = (start + limit).min(visible.len());
        let cursor = if to < visible.len() { Value::from(to.to_string()) } else { Value::Null };
        let data = json!({
            "search": {
                "total": visible.len(),
                "cursor": cursor,
                "results": visible[from..to].to_vec(),
            }
        });

        let page = request.schema.decode(&data)?;
        let hook = self.hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(call);
        }
        Ok(page)
    }
}
