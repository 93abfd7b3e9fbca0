//! Paginated retrieval of host detections.
//!
//! [`DetectionSource`] turns caller selectors into pagination runs against a
//! [`PageFetcher`](vulnfeed_source::PageFetcher), expands each host record
//! into detections and emits every device/vulnerability pair at most once.

pub mod config;
pub mod error;
pub mod expand;
pub mod fanout;
pub mod multiplex;
pub mod pagination;
pub mod seen;
pub mod source;

#[cfg(test)]
mod test_support;

pub use config::{DedupScope, PipelineConfig};
pub use error::{ExpandError, PipelineError};
pub use expand::expand;
pub use fanout::{FanOut, FanOutSummary};
pub use multiplex::{DetectionStream, RunReport, RunSummary, merge};
pub use pagination::{HostStream, PaginationSummary, fetch_all};
pub use seen::SeenSet;
pub use source::{DetectionSource, ScanResultStream, parse_scan_payload};
pub use tokio_util::sync::CancellationToken;
