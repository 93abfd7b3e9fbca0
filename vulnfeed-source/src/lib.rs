use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vulnfeed_types::{Continuation, DeadHostProofMap, Page, RequestDescriptor};

mod error;
pub mod fields;
pub mod http;

pub use error::FetchError;
pub use http::{HttpSource, HttpSourceConfig};

/// One network call against the host detection listing.
///
/// Implementations must be safe to call again with the same arguments so a
/// wrapping fetcher can retry.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the first page for `request`, or the page behind `continuation`.
    async fn fetch_page(
        &self,
        request: &RequestDescriptor,
        continuation: Option<&Continuation>,
    ) -> Result<Page, FetchError>;
}

/// Scan metadata needed to turn a finished scan into detections.
#[async_trait]
pub trait ScanDirectory: Send + Sync {
    /// IP addresses a scan was launched against.
    async fn scan_targets(&self, scan_id: &str) -> Result<Vec<String>, FetchError>;

    /// Hosts the scan found dead, with the proof to attach to their detections.
    async fn dead_hosts(
        &self,
        scan_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<DeadHostProofMap, FetchError>;
}

/// Split a scan target string ("10.0.0.1, 10.0.0.2,10.0.0.3") into addresses.
pub fn split_targets(target: &str) -> Vec<String> {
    target
        .replace(", ", ",")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
