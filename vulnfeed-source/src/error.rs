#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("unexpected response payload: {0}")]
    Schema(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid collaborator configuration: {0}")]
    Config(String),
}

