//! Outgoing GraphQL requests

use std::time::Duration;

use serde_json::{Map, Value};

use super::realm::Realm;
use super::schema::PageSchema;
use crate::errors::Result;
use crate::utils::set_pointer;

/// A single GraphQL call, constructed per request and never mutated in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphqlRequest {
    pub realm: Realm,
    pub query: String,
    pub variables: Map<String, Value>,
    /// Per-call timeout; the transport default applies when `None`
    pub timeout: Option<Duration>,
    /// How the response `data` is decoded into a [`super::Page`]
    pub schema: PageSchema,
}

impl GraphqlRequest {
    pub fn new(realm: Realm, query: impl Into<String>, schema: PageSchema) -> Self {
        Self { realm, query: query.into(), variables: Map::new(), timeout: None, schema }
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Copy of this request with `value` written at `pointer` in the variables.
    pub fn with_variable(&self, pointer: &str, value: Value) -> Result<Self> {
        let mut next = self.clone();
        set_pointer(&mut next.variables, pointer, value)?;
        Ok(next)
    }

    /// JSON body sent over the wire
    pub fn body(&self) -> Value {
        serde_json::json!({
            "query": self.query,
            "variables": Value::Object(self.variables.clone()),
        })
    }
}
