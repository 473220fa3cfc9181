//! Error types surfaced to test code.

use crate::config::ConfigError;
use std::time::Duration;
use testbed_bus::DispatchError;
use thiserror::Error;

/// Errors returned by the client and the test bed facade.
#[derive(Debug, Error)]
pub enum TestBedError {
    /// No correlated reply arrived within the reply window.
    #[error(
        "Timeout of {}ms exceeded waiting for a reply on pattern {pattern}",
        .timeout.as_millis()
    )]
    Timeout { pattern: String, timeout: Duration },

    /// The server could not dispatch the message.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A typed payload or result did not (de)serialize.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl TestBedError {
    /// True for the timeout outcome of a call.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type for test bed operations.
pub type TestBedResult<T> = Result<T, TestBedError>;
