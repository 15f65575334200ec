//! Crate-wide error type.
//!
//! Leaf operations (HTTP, filesystem, decoding) return [`Result`] and bubble
//! failures up with `?`. The ingestion cycle is the boundary where every
//! [`Error`] is logged and turned into a skip, so nothing here is ever fatal
//! to a running process.

use thiserror::Error;

/// Everything that can go wrong while fetching, transforming, or writing.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection, timeout, or body read failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered, but not with a 2xx.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Neither the RSS nor the Atom reader accepted the document.
    #[error("feed could not be parsed as RSS or Atom: {0}")]
    FeedParse(String),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the same request has a reasonable chance to succeed.
    ///
    /// Timeouts, connection failures, `429` and `5xx` answers are transient.
    /// Everything else (bad status, parse errors, local I/O) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Shorthand used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
