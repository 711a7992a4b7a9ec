//! Probe error taxonomy
//!
//! Callers branch on these variants: `NotFound` skips a single bucket,
//! `Backend` skips the bucket with a warning, `Timeout`/`JobFailed` abort
//! the resource's cycle, `Query`/`DbTimeout` degrade the analytical cycle
//! to an empty result.

use thiserror::Error;

/// Errors raised while probing a backend
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Probed table (or partition) does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials rejected by the backend
    #[error("authentication failed for {context}: {message}")]
    Auth {
        /// What was being fetched
        context: String,
        /// Backend-provided detail
        message: String,
    },

    /// Transient backend failure (5xx, quota, malformed reply)
    #[error("backend error for {context} (status {status:?}): {message}")]
    Backend {
        /// What was being fetched
        context: String,
        /// HTTP status, when one was received
        status: Option<u16>,
        /// Backend-provided detail
        message: String,
    },

    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend reply did not parse
    #[error("malformed backend response: {0}")]
    Json(#[from] serde_json::Error),

    /// Async job exceeded the hard polling ceiling
    #[error("job {job_id} timed out after {waited_secs}s")]
    Timeout {
        /// The submitted job id
        job_id: String,
        /// Seconds waited since submission
        waited_secs: u64,
    },

    /// Backend rejected or lost the async job (distinct from Timeout)
    #[error("job {job_id} failed: {message}")]
    JobFailed {
        /// The submitted job id
        job_id: String,
        /// What went wrong
        message: String,
    },

    /// Analytical backend rejected the SQL
    #[error("query rejected: {0}")]
    Query(String),

    /// Analytical connection-level timeout
    #[error("query timed out: {0}")]
    DbTimeout(String),

    /// Resource URI did not resolve to a probeable target
    #[error("invalid resource target: {0}")]
    InvalidTarget(String),
}

impl ProbeError {
    /// True for failures worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { status, .. } => match status {
                Some(s) => (500..600).contains(&(*s as i32)) || *s == 429,
                None => false,
            },
            Self::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                match e.status() {
                    Some(s) => s.is_server_error() || s.as_u16() == 429,
                    None => false,
                }
            }
            _ => false,
        }
    }
}
