//! Pull-based pagination over a GraphQL connection
//!
//! The paginator fetches one page per [`Paginator::next_page`] call, so the
//! caller commits a page before the next one is requested. Two modes:
//!
//! - **Cursor**: the schema declares a cursor field. The server's cursor is
//!   passed back verbatim and the crawl ends when it is absent.
//! - **Offset**: no cursor field. The offset advances by the number of items
//!   actually returned and the crawl ends on the first empty page. A reported
//!   `total` is informational only.
//!
//! Servers that refuse deep offsets (ElasticSearch stops at 10 000) are
//! handled by window rollover: before the offset would pass the ceiling, the
//! window variable is set to the last item's window field (inclusive) and the
//! offset restarts at zero. Records on that exact timestamp that were already
//! delivered are dropped from the new window. This requires the query to sort
//! by that field, newest first.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crawlsync_domain::types::filter::timestamp;
use crawlsync_domain::types::schema::parse_timestamp;
use crawlsync_domain::{CrawlPosition, GraphqlRequest, Page, Record};
use futures::Stream;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::{CrawlError, TransportError};
use crate::governor::RateGovernor;
use crate::transport::GraphqlTransport;

/// How the next page is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    Cursor,
    Offset,
}

crawlsync_domain::impl_label_conversions!(PageMode {
    Cursor => "cursor",
    Offset => "offset",
});

/// A page together with where it started and where the crawl goes next.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub page: Page,
    pub start: CrawlPosition,
    /// Position to persist once this page is committed
    pub next: CrawlPosition,
}

pub struct Paginator {
    transport: Arc<dyn GraphqlTransport>,
    governor: Arc<RateGovernor>,
    request: GraphqlRequest,
    mode: PageMode,
    page_size: u32,
    offset_ceiling: Option<u64>,
    max_items: Option<u64>,
    position: CrawlPosition,
    yielded: u64,
    truncated: bool,
    /// Offset at which the ceiling stopped an un-windowed crawl
    stalled_at: Option<u64>,
    reported_total: Option<u64>,
}

impl Paginator {
    /// # Errors
    /// [`CrawlError::InvalidRequest`] when the page size is zero or the
    /// schema names no variable to page with.
    pub fn new(
        transport: Arc<dyn GraphqlTransport>,
        governor: Arc<RateGovernor>,
        request: GraphqlRequest,
        page_size: u32,
    ) -> Result<Self, CrawlError> {
        if page_size == 0 {
            return Err(CrawlError::InvalidRequest("page size must be > 0".into()));
        }
        let pagination = &request.schema.pagination;
        let mode = if request.schema.cursor.is_some() {
            if pagination.cursor.is_none() && pagination.offset.is_none() {
                return Err(CrawlError::InvalidRequest(
                    "cursor pagination needs a cursor or offset variable".into(),
                ));
            }
            PageMode::Cursor
        } else {
            if pagination.offset.is_none() {
                return Err(CrawlError::InvalidRequest(
                    "schema has no cursor field and no offset variable".into(),
                ));
            }
            PageMode::Offset
        };

        Ok(Self {
            transport,
            governor,
            request,
            mode,
            page_size,
            offset_ceiling: None,
            max_items: None,
            position: CrawlPosition::start(),
            yielded: 0,
            truncated: false,
            stalled_at: None,
            reported_total: None,
        })
    }

    /// Continue from a committed position. `records_seen` counts against
    /// `max_items`.
    #[must_use]
    pub fn resume_from(mut self, position: CrawlPosition, records_seen: u64) -> Self {
        self.position = position;
        self.yielded = records_seen;
        self
    }

    #[must_use]
    pub fn with_offset_ceiling(mut self, ceiling: Option<u64>) -> Self {
        self.offset_ceiling = ceiling;
        self
    }

    /// Stop after `max_items` records in total
    #[must_use]
    pub fn with_max_items(mut self, max_items: Option<u64>) -> Self {
        self.max_items = max_items;
        self
    }

    pub const fn mode(&self) -> PageMode {
        self.mode
    }

    pub const fn position(&self) -> &CrawlPosition {
        &self.position
    }

    /// The server signalled the end of the result set
    pub const fn is_exhausted(&self) -> bool {
        self.position.exhausted
    }

    /// The crawl stopped early because `max_items` was reached
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Total reported by the first page this paginator fetched
    pub const fn reported_total(&self) -> Option<u64> {
        self.reported_total
    }

    /// Fetch the next page, or `None` once the crawl is over.
    ///
    /// The internal position advances when a page is returned; callers
    /// persist [`FetchedPage::next`] after committing the page.
    pub async fn next_page(&mut self) -> Result<Option<FetchedPage>, CrawlError> {
        loop {
            if self.position.exhausted || self.truncated {
                return Ok(None);
            }
            if let Some(offset) = self.stalled_at {
                return Err(CrawlError::OffsetCeiling { offset });
            }
            let remaining = self.max_items.map(|max| max.saturating_sub(self.yielded));
            if remaining == Some(0) {
                self.truncated = true;
                return Ok(None);
            }

            let limit = remaining.map_or(self.page_size, |r| {
                u32::try_from(r).map_or(self.page_size, |r| r.min(self.page_size))
            });
            let request = self.page_request(limit)?;
            let transport = &self.transport;
            let request = &request;
            let mut page = self.governor.call(move || transport.execute(request)).await?;

            if self.reported_total.is_none() {
                self.reported_total = page.total_count;
            }
            if let Some(remaining) = remaining {
                let keep = usize::try_from(remaining).unwrap_or(usize::MAX);
                if page.items.len() > keep {
                    page.items.truncate(keep);
                }
            }

            let start = self.position.clone();
            let next = self.advance(&start, &page)?;
            debug!(
                mode = %self.mode,
                offset = start.offset,
                items = page.len(),
                exhausted = next.exhausted,
                "fetched page"
            );
            self.position = next.clone();
            if page.is_empty() {
                return Ok(None);
            }

            // The inclusive window bound returns records already delivered
            let returned = page.len();
            if !start.window_overlap.is_empty() {
                page.items.retain(|item| !start.window_overlap.contains(&item.id));
            }
            self.yielded += page.len() as u64;
            if page.is_empty() {
                debug!(returned, "page held only records delivered before the window rolled");
                continue;
            }
            return Ok(Some(FetchedPage { page, start, next }));
        }
    }

    /// Step over the page at the current position after it failed for good.
    ///
    /// Only offset pagination can skip; a cursor cannot be guessed. Returns
    /// the skipped page's offset.
    pub fn skip_failed_page(&mut self) -> Option<u64> {
        if self.mode != PageMode::Offset || self.position.exhausted {
            return None;
        }
        let skipped = self.position.offset;
        let next = skipped + u64::from(self.page_size);
        if self.offset_ceiling.is_some_and(|ceiling| next + u64::from(self.page_size) > ceiling) {
            return None;
        }
        self.position.offset = next;
        Some(skipped)
    }

    /// Drive the paginator as a stream; it ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<FetchedPage, CrawlError>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut paginator = state?;
            match paginator.next_page().await {
                Ok(Some(page)) => Some((Ok(page), Some(paginator))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    fn page_request(&self, limit: u32) -> Result<GraphqlRequest, CrawlError> {
        let pagination = &self.request.schema.pagination;
        let mut request = bind(&self.request, &pagination.limit, Value::from(limit))?;

        match self.mode {
            PageMode::Cursor => {
                if let Some(cursor) = &self.position.cursor {
                    let pointer = pagination.cursor.as_ref().or(pagination.offset.as_ref());
                    if let Some(pointer) = pointer {
                        request = bind(&request, pointer, Value::from(cursor.as_str()))?;
                    }
                }
            }
            PageMode::Offset => {
                if let Some(pointer) = &pagination.offset {
                    request = bind(&request, pointer, Value::from(self.position.offset))?;
                }
            }
        }

        let window = self.request.schema.window.as_ref();
        if let (Some(bound), Some(window)) = (&self.position.window_bound, window) {
            request = bind(&request, &window.variable, bound.clone())?;
        }
        Ok(request)
    }

    fn advance(&mut self, start: &CrawlPosition, page: &Page) -> Result<CrawlPosition, CrawlError> {
        let returned = page.len() as u64;
        let mut next = CrawlPosition { offset: start.offset + returned, ..start.clone() };

        if page.is_empty() {
            next.exhausted = true;
            return Ok(next);
        }

        match self.mode {
            PageMode::Cursor => match &page.next_cursor {
                Some(cursor) => next.cursor = Some(cursor.clone()),
                None => next.exhausted = true,
            },
            PageMode::Offset => {
                let Some(ceiling) = self.offset_ceiling else {
                    return Ok(next);
                };
                if next.offset + u64::from(self.page_size) <= ceiling {
                    return Ok(next);
                }
                match self.window_bound(page)? {
                    Some((bound, overlap)) if start.window_bound.as_ref() != Some(&bound) => {
                        info!(
                            offset = next.offset,
                            ceiling,
                            bound = %bound,
                            overlap = overlap.len(),
                            "offset ceiling reached, rolling window"
                        );
                        next.offset = 0;
                        next.window_bound = Some(bound);
                        next.window_overlap = overlap;
                    }
                    Some((bound, _)) => {
                        warn!(
                            bound = %bound,
                            ceiling,
                            "every record up to the ceiling shares the window timestamp"
                        );
                        self.stalled_at = Some(next.offset);
                    }
                    None => self.stalled_at = Some(next.offset),
                }
            }
        }
        Ok(next)
    }

    /// New inclusive upper bound for the window: the last item's window
    /// field, plus the ids of the trailing items that share it.
    fn window_bound(&self, page: &Page) -> Result<Option<(Value, Vec<String>)>, CrawlError> {
        let Some(window) = &self.request.schema.window else {
            return Ok(None);
        };
        let Some(last) = page.items.last() else {
            return Ok(None);
        };
        let at = window_time(last, &window.field).ok_or_else(|| {
            TransportError::malformed(format!(
                "record '{}' has no timestamp at '{}' for window rollover",
                last.id, window.field
            ))
        })?;
        let overlap = page
            .items
            .iter()
            .rev()
            .take_while(|item| window_time(item, &window.field) == Some(at))
            .map(|item| item.id.clone())
            .collect();
        Ok(Some((timestamp(at), overlap)))
    }
}

fn window_time(record: &Record, field: &str) -> Option<DateTime<Utc>> {
    record.payload.pointer(field).and_then(Value::as_str).and_then(parse_timestamp)
}

fn bind(
    request: &GraphqlRequest,
    pointer: &str,
    value: Value,
) -> Result<GraphqlRequest, CrawlError> {
    request
        .with_variable(pointer, value)
        .map_err(|e| CrawlError::InvalidRequest(format!("cannot set '{pointer}': {e}")))
}

impl std::fmt::Debug for Paginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("mode", &self.mode)
            .field("page_size", &self.page_size)
            .field("position", &self.position)
            .field("yielded", &self.yielded)
            .finish_non_exhaustive()
    }
}
