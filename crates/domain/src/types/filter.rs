//! Crawl scoping

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::Result;
use crate::utils::set_pointer;

/// Restriction applied on top of a query's own variables.
///
/// Bound under a pointer root (for example `/searchParams`) as `tags`,
/// `createdOn.from`/`createdOn.to` and any extra keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlFilter {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl CrawlFilter {
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { tags: tags.into_iter().map(Into::into).collect(), ..Self::default() }
    }

    pub fn created_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.created_after.is_none()
            && self.created_before.is_none()
            && self.extra.is_empty()
    }

    /// Write this filter into `variables` under `root`.
    pub fn bind(&self, variables: &mut Map<String, Value>, root: &str) -> Result<()> {
        if !self.tags.is_empty() {
            set_pointer(variables, &format!("{root}/tags"), serde_json::to_value(&self.tags)?)?;
        }
        if let Some(after) = self.created_after {
            set_pointer(variables, &format!("{root}/createdOn/from"), timestamp(after))?;
        }
        if let Some(before) = self.created_before {
            set_pointer(variables, &format!("{root}/createdOn/to"), timestamp(before))?;
        }
        for (key, value) in &self.extra {
            let escaped = key.replace('~', "~0").replace('/', "~1");
            set_pointer(variables, &format!("{root}/{escaped}"), value.clone())?;
        }
        Ok(())
    }
}

/// Whether a run covers the whole entity set.
///
/// Only `Full` crawls are eligible for deletion reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "filter", rename_all = "snake_case")]
pub enum CrawlScope {
    #[default]
    Full,
    Filtered(CrawlFilter),
}

impl CrawlScope {
    /// `Filtered` with an empty filter collapses to `Full`
    pub fn from_filter(filter: Option<CrawlFilter>) -> Self {
        match filter {
            Some(f) if !f.is_empty() => Self::Filtered(f),
            _ => Self::Full,
        }
    }

    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }

    pub const fn filter(&self) -> Option<&CrawlFilter> {
        match self {
            Self::Full => None,
            Self::Filtered(f) => Some(f),
        }
    }
}

/// Millisecond RFC 3339 with a `Z` suffix
pub fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}
