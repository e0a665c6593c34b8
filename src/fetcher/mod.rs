pub mod http_fetcher;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::RawFeedDocument;

/// Seam between the sync engine and the network.
///
/// Implementations must honour conditional semantics: when `etag` or
/// `last_modified` is supplied and the source reports no change, the
/// returned document carries status 304 and no body.
#[async_trait]
pub trait Fetcher {
    async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<DateTime<Utc>>,
    ) -> Result<RawFeedDocument>;
}
