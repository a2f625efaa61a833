use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatcherError {
    /// Transport failure talking to the schedule API (DNS, timeout, TLS).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The payload came back but is missing expected fields or is not JSON.
    #[error("parse error: {0}")]
    Parse(String),

    /// The viewer process could not be launched or terminated.
    #[error("viewer process error: {0}")]
    Process(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WatcherError>;
