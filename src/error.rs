use std::io;
use thiserror::Error;

/// Custom result type alias for the crate
pub type Result<T> = std::result::Result<T, CreditError>;

/// Errors that can occur while crediting dependencies or deploying
#[derive(Debug, Error)]
pub enum CreditError {
    /// Network or connection failure on a single request
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote service asked us to wait longer than the caller allows
    #[error("Rate limited on {url}: reset in {wait_secs}s exceeds the remaining deadline")]
    RateLimited {
        /// Request URL
        url: String,
        /// Seconds until the advertised reset
        wait_secs: u64,
    },

    /// The remote service answered 404
    #[error("Not found: {url}")]
    UpstreamNotFound {
        /// Request URL
        url: String,
    },

    /// Any other non-2xx answer that is not rate limiting
    #[error("Upstream error: HTTP {status} from {url}: {message}")]
    Upstream {
        /// Request URL
        url: String,
        /// HTTP status code
        status: u16,
        /// Short excerpt of the response body
        message: String,
    },

    /// All attempts for a request failed
    #[error("Request to {url} failed after {attempts} attempts: {source}")]
    RequestExhausted {
        /// Request URL
        url: String,
        /// Number of attempts made
        attempts: u32,
        /// The last error observed
        #[source]
        source: Box<CreditError>,
    },

    /// A backoff sleep would have crossed the per-identifier deadline
    #[error("Deadline exceeded while requesting {url}")]
    DeadlineExceeded {
        /// Request URL
        url: String,
    },

    /// A response parsed but did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON parsing/serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Directory traversal errors
    #[error("Walkdir error: {0}")]
    Walkdir(#[from] walkdir::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// A deployment stage failed
    #[error("Deployment stage `{stage}` failed: {message}")]
    Pipeline {
        /// Stage name
        stage: String,
        /// What went wrong
        message: String,
    },

    /// The run was cancelled before this work started
    #[error("Cancelled")]
    Cancelled,

    /// A spawned task panicked or was aborted
    #[error("Task error: {0}")]
    Task(String),
}

impl From<reqwest::Error> for CreditError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl CreditError {
    /// Checks if this error is transient and retryable
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Upstream { .. } | Self::UpstreamNotFound { .. } | Self::Io(_)
        )
    }

    /// Checks whether the request ultimately failed with a 404
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::UpstreamNotFound { .. } => true,
            Self::RequestExhausted { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}
