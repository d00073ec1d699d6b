//! Domain types and models

pub mod checkpoint;
pub mod credential;
pub mod filter;
pub mod outcome;
pub mod page;
pub mod realm;
pub mod request;
pub mod schema;

pub use checkpoint::{Checkpoint, CrawlPosition};
pub use credential::Credential;
pub use filter::{CrawlFilter, CrawlScope};
pub use outcome::{RecordError, RunState, SyncOutcome};
pub use page::{GraphqlError, GraphqlErrorLocation, Page, Record};
pub use realm::Realm;
pub use request::GraphqlRequest;
pub use schema::{PageSchema, PaginationVariables, WindowRollover};
