//! Parameters of one sync run

use crawlsync_domain::constants::DEFAULT_PAGE_SIZE;
use crawlsync_domain::{CrawlConfig, CrawlFilter, CrawlScope, GraphqlRequest};

use super::fingerprint::query_fingerprint;
use crate::errors::CrawlError;

/// What to crawl and how to reconcile it.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    /// Local record type the results are stored under
    pub entity_type: String,
    /// Query, base variables, realm and page schema
    pub request: GraphqlRequest,
    pub scope: CrawlScope,
    /// Pointer under which a filter scope is bound into the variables
    pub filter_root: String,
    pub page_size: u32,
    pub offset_ceiling: Option<u64>,
    pub max_items: Option<u64>,
    /// Continue from a stored checkpoint when one exists
    pub resume: bool,
    /// Overrides the computed query fingerprint
    pub fingerprint: Option<String>,
}

impl SyncRequest {
    pub fn new(entity_type: impl Into<String>, request: GraphqlRequest) -> Self {
        Self {
            entity_type: entity_type.into(),
            request,
            scope: CrawlScope::Full,
            filter_root: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            offset_ceiling: None,
            max_items: None,
            resume: true,
            fingerprint: None,
        }
    }

    /// Take page size and offset ceiling from configuration
    #[must_use]
    pub fn with_crawl_config(mut self, config: &CrawlConfig) -> Self {
        self.page_size = config.page_size;
        self.offset_ceiling = config.offset_ceiling;
        self
    }

    /// Restrict the crawl; an empty filter keeps it a full crawl
    #[must_use]
    pub fn with_filter(mut self, root: impl Into<String>, filter: CrawlFilter) -> Self {
        self.filter_root = root.into();
        self.scope = CrawlScope::from_filter(Some(filter));
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_offset_ceiling(mut self, ceiling: u64) -> Self {
        self.offset_ceiling = Some(ceiling);
        self
    }

    #[must_use]
    pub fn with_max_items(mut self, max_items: u64) -> Self {
        self.max_items = Some(max_items);
        self
    }

    #[must_use]
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn fingerprint(&self) -> String {
        self.fingerprint.clone().unwrap_or_else(|| {
            query_fingerprint(
                &self.entity_type,
                &self.request.query,
                &self.request.variables,
                &self.scope,
            )
        })
    }

    /// The request with the scope's filter written into its variables
    pub fn bound_request(&self) -> Result<GraphqlRequest, CrawlError> {
        let mut request = self.request.clone();
        if let Some(filter) = self.scope.filter() {
            filter
                .bind(&mut request.variables, &self.filter_root)
                .map_err(|e| CrawlError::InvalidRequest(format!("cannot bind filter: {e}")))?;
        }
        Ok(request)
    }
}
