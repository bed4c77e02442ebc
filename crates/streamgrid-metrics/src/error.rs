//! Error types for the scrape transport.

use thiserror::Error;

/// Result type alias for counter fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors that can occur while fetching a counter from one replica.
///
/// All variants are transient from the rater's point of view: a failed
/// fetch yields an absent sample for that replica and tick.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("http handshake failed: {0}")]
    Handshake(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("non-success status: {0}")]
    Status(u16),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("counter {0} not found in exposition")]
    MetricMissing(String),
}
