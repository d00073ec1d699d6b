//! Port interface for executing GraphQL requests

use async_trait::async_trait;
use crawlsync_domain::{GraphqlRequest, Page};

use crate::errors::TransportError;

/// Executes one GraphQL request and decodes the response into a [`Page`].
///
/// Implementations attach the realm's bearer credential, refresh it once on
/// an unauthorized response, and classify every failure into a
/// [`TransportError`]. They do not retry anything else; that is the rate
/// governor's job.
#[async_trait]
pub trait GraphqlTransport: Send + Sync {
    async fn execute(&self, request: &GraphqlRequest) -> Result<Page, TransportError>;
}
