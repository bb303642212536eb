//! Error types for the loading cache
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the loading cache.
///
/// The enum is `Clone` so a single load failure can be handed to the leader
/// and to every follower waiting on the same key.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The caller-supplied loader returned an error
    #[error("Load failed: {0}")]
    Load(Arc<anyhow::Error>),

    /// A follower gave up waiting for an in-flight load
    #[error("Timed out after {0:?} waiting for in-flight load")]
    Timeout(Duration),

    /// Rejected configuration, surfaced at construction only
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    // == Constructors ==
    /// Wraps a loader error.
    pub fn load(err: impl Into<anyhow::Error>) -> Self {
        CacheError::Load(Arc::new(err.into()))
    }

    /// Returns true if this error came from the loader.
    pub fn is_load(&self) -> bool {
        matches!(self, CacheError::Load(_))
    }

    /// Returns true if this error is a follower wait timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CacheError::Timeout(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the loading cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_message() {
        let err = CacheError::load(anyhow::anyhow!("backend down"));
        assert!(err.is_load());
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "Load failed: backend down");
    }

    #[test]
    fn test_cloned_load_error_shares_source() {
        let err = CacheError::load(anyhow::anyhow!("boom"));
        let copy = err.clone();

        match (err, copy) {
            (CacheError::Load(a), CacheError::Load(b)) => assert!(Arc::ptr_eq(&a, &b)),
            _ => panic!("expected load errors"),
        }
    }

    #[test]
    fn test_timeout_message() {
        let err = CacheError::Timeout(Duration::from_millis(250));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_invalid_config_message() {
        let err = CacheError::InvalidConfig("sample_size must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: sample_size must be > 0"
        );
    }
}
