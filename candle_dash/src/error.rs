use thiserror::Error;

/// Failure of a single fetch or a single record. None of these are fatal to the
/// dashboard; the scheduler decides per feed what each one means.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid record: {0}")]
    Validation(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("not authenticated for the realtime feed")]
    Unauthorized,
    #[error("realtime stream is not ready yet")]
    NotReady,
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FeedError::Decode(err.to_string())
        } else {
            FeedError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}
