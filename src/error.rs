//! Error types for the paired fetch pipeline.
//!
//! Resolution and transport failures are carried as data inside a
//! [`FetchResult`](crate::types::FetchResult); they never abort a worker.
//! Configuration failures are raised at construction, before anything runs.

use std::sync::Arc;

use thiserror::Error;

/// The main error type for the pipeline.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A target could not be resolved into an address before fetching
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// The fetcher failed to complete a request
    #[error("Transport error: {0}")]
    Transport(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// Invalid concurrency, rate or buffer settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The pipeline was cancelled or its deadline elapsed
    #[error("Pipeline was cancelled")]
    Cancelled,

    /// A consumer failed to process an item
    #[error("Consumer error: {0}")]
    Consumer(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// A channel was closed unexpectedly
    #[error("Channel was closed unexpectedly")]
    ChannelClosed,

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

// Convenience constructors
impl Error {
    /// Create a transport error from any error type
    pub fn transport<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Transport(Arc::new(error))
    }

    /// Create a consumer error from any error type
    pub fn consumer<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Consumer(Arc::new(error))
    }

    /// Create a resolution error with a message
    pub fn resolution<S: Into<String>>(message: S) -> Self {
        Error::Resolution(message.into())
    }

    /// Create a configuration error with a message
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Error::Configuration(message.into())
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Whether this error is the cancellation path rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Custom(format!("Task panicked: {}", e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Custom(e.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Helper trait for converting foreign errors into our Error type
pub trait IntoError<T> {
    fn into_transport_error(self) -> Result<T>;
    fn into_consumer_error(self) -> Result<T>;
}

impl<T, E> IntoError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_transport_error(self) -> Result<T> {
        self.map_err(Error::transport)
    }

    fn into_consumer_error(self) -> Result<T> {
        self.map_err(Error::consumer)
    }
}
