use thiserror::Error;
use vulnfeed_source::FetchError;

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error(transparent)]
    MalformedHost(#[from] ExpandError),
    #[error("unit of work panicked: {0}")]
    PanicRecovered(String),
    #[error("cancelled")]
    Cancelled,
}

impl From<FetchError> for PipelineError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Schema(msg) => Self::Schema(msg),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// A host whose findings could not be turned into detections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
    #[error("host {host}: finding #{index} has no vulnerability id")]
    MissingVulnerabilityId { host: String, index: usize },
    #[error("host {host}: finding {vulnerability_id} has unknown status {status:?}")]
    UnknownStatus {
        host: String,
        vulnerability_id: String,
        status: String,
    },
}
