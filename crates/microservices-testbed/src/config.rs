//! Test bed configuration.
//!
//! Resolved once when the test bed is built. Values can come from code
//! (builder setters), from a serialized document, or from the environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default window a call waits for its reply.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 1500;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("unknown policy action '{0}' (expected throw, log or ignore)")]
    UnknownPolicyAction(String),
    #[error("unknown result selection '{0}' (expected first or last)")]
    UnknownResultSelection(String),
}

/// Response to an anomalous dispatch condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    /// Surface the error to whatever invoked dispatch.
    Throw,
    /// Emit a diagnostic and drop the message.
    Log,
    /// Drop the message silently.
    Ignore,
}

impl FromStr for PolicyAction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "throw" => Ok(Self::Throw),
            "log" => Ok(Self::Log),
            "ignore" => Ok(Self::Ignore),
            _ => Err(ConfigError::UnknownPolicyAction(s.to_string())),
        }
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Throw => write!(f, "throw"),
            Self::Log => write!(f, "log"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

/// How the server reacts to messages it cannot dispatch normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorPolicy {
    /// No binding for the message pattern (default: log)
    pub on_unknown_pattern: PolicyAction,
    /// Event binding hit by a call, or call binding hit by an event
    /// (default: throw)
    pub on_handler_kind_mismatch: PolicyAction,
}

impl Default for BehaviorPolicy {
    fn default() -> Self {
        Self {
            on_unknown_pattern: PolicyAction::Log,
            on_handler_kind_mismatch: PolicyAction::Throw,
        }
    }
}

impl BehaviorPolicy {
    /// Throw on every anomaly.
    pub fn strict() -> Self {
        Self {
            on_unknown_pattern: PolicyAction::Throw,
            on_handler_kind_mismatch: PolicyAction::Throw,
        }
    }
}

/// Which value of a streamed handler result becomes the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSelection {
    /// First emitted value; the rest of the stream is dropped.
    First,
    /// Last value before the stream completes.
    #[default]
    Last,
}

impl FromStr for ResultSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            _ => Err(ConfigError::UnknownResultSelection(s.to_string())),
        }
    }
}

/// Identifier a host framework uses to tell transports apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportId(pub String);

impl From<&str> for TransportId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Main test bed configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestBedConfig {
    /// Transport identifier reported by the server (optional)
    pub transport_id: Option<TransportId>,
    /// Reply window for calls in milliseconds (default: 1500)
    pub call_timeout_ms: u64,
    /// Dispatch anomaly handling
    pub behavior: BehaviorPolicy,
    /// Streamed result collapse (default: last)
    pub result_selection: ResultSelection,
}

impl Default for TestBedConfig {
    fn default() -> Self {
        Self {
            transport_id: None,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            behavior: BehaviorPolicy::default(),
            result_selection: ResultSelection::default(),
        }
    }
}

impl TestBedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TESTBED_TRANSPORT_ID`: Transport identifier (default: none)
    /// - `TESTBED_CALL_TIMEOUT_MS`: Reply window (default: 1500)
    /// - `TESTBED_ON_UNKNOWN_PATTERN`: throw | log | ignore (default: log)
    /// - `TESTBED_ON_KIND_MISMATCH`: throw | log | ignore (default: throw)
    /// - `TESTBED_RESULT_SELECTION`: first | last (default: last)
    ///
    /// Unparsable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            transport_id: env::var("TESTBED_TRANSPORT_ID").ok().map(TransportId),

            call_timeout_ms: env::var("TESTBED_CALL_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.call_timeout_ms),

            behavior: BehaviorPolicy {
                on_unknown_pattern: env::var("TESTBED_ON_UNKNOWN_PATTERN")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.behavior.on_unknown_pattern),

                on_handler_kind_mismatch: env::var("TESTBED_ON_KIND_MISMATCH")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.behavior.on_handler_kind_mismatch),
            },

            result_selection: env::var("TESTBED_RESULT_SELECTION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.result_selection),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "call timeout cannot be 0".into(),
            ));
        }
        Ok(())
    }

    /// Reply window for calls.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_behavior(mut self, behavior: BehaviorPolicy) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_result_selection(mut self, selection: ResultSelection) -> Self {
        self.result_selection = selection;
        self
    }

    pub fn with_transport_id(mut self, transport_id: impl Into<TransportId>) -> Self {
        self.transport_id = Some(transport_id.into());
        self
    }
}
