//! Error types shared by the streaming, single and completable engines.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Terminal error delivered through `on_error`.
///
/// `Clone` because processors multicast one upstream failure to every
/// downstream subscriber; foreign errors are kept behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// A consumer called `request` with a non-positive count.
    #[error("illegal request: demand must be positive, got {0}")]
    IllegalRequest(i64),

    /// The producer refused the subscriber.
    #[error("subscription rejected: {0}")]
    Rejected(String),

    /// A bounded buffer filled up under `OverflowStrategy::Error`.
    #[error("buffer overflow: capacity {capacity} exceeded")]
    Overflow { capacity: usize },

    /// No terminal signal arrived in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The producer's source failed.
    #[error("source failed: {0}")]
    Source(Arc<dyn std::error::Error + Send + Sync>),
}

impl FlowError {
    /// Wrap any error as a source failure.
    pub fn from_source<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FlowError::Source(Arc::new(err))
    }

    /// Source failure carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        FlowError::Source(Arc::new(Message(message.into())))
    }

    pub fn is_illegal_request(&self) -> bool {
        matches!(self, FlowError::IllegalRequest(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FlowError::Timeout(_))
    }
}

impl From<anyhow::Error> for FlowError {
    fn from(err: anyhow::Error) -> Self {
        FlowError::Source(Arc::new(AnyhowSource(err)))
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

#[derive(Debug, Error)]
#[error("{0:#}")]
struct AnyhowSource(anyhow::Error);

/// Errors from loading a [`FlowConfig`](crate::config::FlowConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T, E = FlowError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            FlowError::IllegalRequest(-5).to_string(),
            "illegal request: demand must be positive, got -5"
        );
        assert_eq!(
            FlowError::Overflow { capacity: 4 }.to_string(),
            "buffer overflow: capacity 4 exceeded"
        );
        assert_eq!(FlowError::msg("disk gone").to_string(), "source failed: disk gone");
    }

    #[test]
    fn test_from_anyhow_keeps_context() {
        let err = anyhow::anyhow!("root cause").context("reading block");
        let flow: FlowError = err.into();
        let text = flow.to_string();
        assert!(text.contains("reading block"));
        assert!(text.contains("root cause"));
    }

    #[test]
    fn test_clone_shares_source() {
        let err = FlowError::from_source(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let copy = err.clone();
        match (&err, &copy) {
            (FlowError::Source(a), FlowError::Source(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("Expected Source errors"),
        }
        assert!(!copy.is_illegal_request());
    }
}
