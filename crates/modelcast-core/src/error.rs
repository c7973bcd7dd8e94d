use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

/// Error produced by an asynchronous producer (a failed future or stream item).
pub type ProducerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum StreamError {
    /// A value entering or leaving the filter pipeline carried an id that is
    /// not the channel's key. Fatal to that emission only.
    #[error("model id is invalid: expected {expected}, got {actual}")]
    InvalidId { expected: String, actual: String },

    #[error("producer failed: {0}")]
    Producer(#[source] ProducerError),

    #[error("connection has been disposed")]
    Disposed,

    #[error("channel for {key} was closed by its registry")]
    Closed { key: String },
}

impl StreamError {
    #[must_use]
    pub fn invalid_id(expected: &impl std::fmt::Debug, actual: &impl std::fmt::Debug) -> Self {
        Self::InvalidId {
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }

    #[must_use]
    pub fn closed(key: &impl std::fmt::Debug) -> Self {
        Self::Closed {
            key: format!("{key:?}"),
        }
    }

    #[must_use]
    pub fn producer(error: impl Into<ProducerError>) -> Self {
        Self::Producer(error.into())
    }

    /// Whether this error is delivered to subscribers rather than returned at
    /// the call site.
    #[must_use]
    pub fn is_emission_error(&self) -> bool {
        matches!(self, Self::InvalidId { .. } | Self::Producer(_))
    }
}
