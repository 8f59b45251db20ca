//! Error types for the FallWatch message bus

use thiserror::Error;

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur in bus operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BusError {
    /// Broker unreachable or session lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Publish request could not be queued
    #[error("Publish error: {0}")]
    Publish(String),

    /// Subscribe or unsubscribe request could not be queued
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Topic encoding or decoding errors
    #[error("Topic error: {0}")]
    Topic(#[from] crate::topic::TopicError),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The bus has been shut down
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

impl BusError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a publish error
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    /// Create a subscription error
    pub fn subscription(msg: impl Into<String>) -> Self {
        Self::Subscription(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a shutdown error
    pub fn shutdown(msg: impl Into<String>) -> Self {
        Self::Shutdown(msg.into())
    }
}
