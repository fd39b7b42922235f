//! Typed failures of mention handling and completion streaming.

use thiserror::Error;

/// Failures a completion stream can surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    /// The provider could not be reached, or rejected the request, before producing anything.
    #[error("completion provider unavailable: {0}")]
    Unavailable(String),
    /// The stream broke after it started producing output.
    #[error("completion stream interrupted: {0}")]
    Stream(String),
}

/// Failures of a single mention event's handling.
#[derive(Debug, Error)]
pub enum MentionError {
    #[error("failed to fetch thread history: {0}")]
    HistoryFetch(#[source] anyhow::Error),
    #[error("failed to post placeholder: {0}")]
    Post(#[source] anyhow::Error),
    /// Never fatal; the text is retried with the next flush.
    #[error("failed to edit placeholder: {0}")]
    Edit(#[source] anyhow::Error),
    #[error("completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("completion stream interrupted: {0}")]
    ProviderStream(String),
}

impl From<CompletionError> for MentionError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Unavailable(message) => Self::ProviderUnavailable(message),
            CompletionError::Stream(message) => Self::ProviderStream(message),
        }
    }
}
