pub mod detection;
pub mod finding;
pub mod host;
pub mod page;
pub mod request;
pub mod scan;
pub mod status;

pub use detection::{DetectionEvent, DetectionKey, DeviceRef, VulnerabilityRef};
pub use finding::{Finding, FindingKind};
pub use host::{CloudMetadata, HostRecord};
pub use page::{Continuation, DeadHostProofMap, Page};
pub use request::{DEFAULT_PAGE_SIZE, KernelFilter, RequestDescriptor, SelectorSet, TAG_PREFIX};
pub use scan::ScanPayload;
pub use status::DetectionStatus;
