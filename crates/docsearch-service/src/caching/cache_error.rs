use std::error::Error;
use std::time::Duration;

use thiserror::Error;

/// An error that happens when refreshing a cached resource.
///
/// The error is cloneable, as a single refresh outcome is handed out to every caller that was
/// waiting on that refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The resource could not be fetched from its origin due to a transport problem,
    /// like connection loss, DNS resolution, or an unexpected status code.
    ///
    /// The attached string contains the root cause or the origin's status.
    #[error("download failed: {0}")]
    DownloadError(String),
    /// The resource could not be fetched from its origin due to a timeout.
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
    /// The resource was fetched successfully, but its contents could not be decoded.
    #[error("malformed: {0}")]
    Malformed(String),
    /// A refresh failed and there is no previously fetched value to fall back to.
    #[error("no previous value to fall back to: {0}")]
    NoPriorValue(Box<CacheError>),
    /// The refresh task went away without producing an outcome.
    #[error("internal error")]
    InternalError,
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl CacheError {
    /// Creates a [`DownloadError`](Self::DownloadError) from the innermost cause of `error`.
    pub fn download_error(mut error: &dyn Error) -> Self {
        while let Some(src) = error.source() {
            error = src;
        }

        let mut error_string = error.to_string();

        // Special-case a few error strings
        if error_string.contains("certificate verify failed") {
            error_string = "certificate verify failed".to_string();
        }

        if error_string.contains("SSL routines") {
            error_string = "SSL error".to_string();
        }

        Self::DownloadError(error_string)
    }
}

/// The outcome of a refresh: either `Ok(T)` or the reason why no value could be produced.
pub type CacheEntry<T = ()> = Result<T, CacheError>;
