//! # Messages
//!
//! Everything that flows through the routing fabric is a [`Message`]. A
//! message with a correlation id is a call expecting exactly one reply; a
//! message without one is a fire-and-forget event.

use crate::correlation::CorrelationId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Whether a handler (or a message) expects a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerKind {
    /// Fire-and-forget, no reply.
    Event,
    /// Request expecting exactly one correlated reply.
    MessageCall,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => write!(f, "event"),
            Self::MessageCall => write!(f, "message call"),
        }
    }
}

/// Failure of a single dispatch attempt.
///
/// Travels back to the caller inside a reply when the call failed, so it must
/// stay cloneable and serializable.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchError {
    /// No binding exists for the pattern.
    #[error("No handler for pattern {pattern}")]
    UnknownPattern { pattern: String },

    /// The message kind does not match the binding kind.
    #[error(
        "The handler for pattern {pattern} is registered as {actual} but the message was sent as {expected}"
    )]
    HandlerKindMismatch {
        pattern: String,
        expected: HandlerKind,
        actual: HandlerKind,
    },

    /// The handler itself returned an error.
    #[error("Handler for pattern {pattern} failed: {reason}")]
    HandlerFailed { pattern: String, reason: String },

    /// A streamed handler result completed without producing a value.
    #[error("Handler for pattern {pattern} completed without a value")]
    EmptyResult { pattern: String },
}

impl DispatchError {
    /// Pattern of the message whose dispatch failed.
    pub fn pattern(&self) -> &str {
        match self {
            Self::UnknownPattern { pattern }
            | Self::HandlerKindMismatch { pattern, .. }
            | Self::HandlerFailed { pattern, .. }
            | Self::EmptyResult { pattern } => pattern,
        }
    }
}

/// A routed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Routing key.
    pub pattern: String,
    /// Payload.
    pub data: Value,
    /// Present on calls and their replies only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    /// Present on replies whose dispatch failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DispatchError>,
}

impl Message {
    /// Fire-and-forget event.
    pub fn event(pattern: impl Into<String>, data: Value) -> Self {
        Self {
            pattern: pattern.into(),
            data,
            correlation_id: None,
            error: None,
        }
    }

    /// Call expecting a reply correlated by `correlation_id`.
    pub fn call(pattern: impl Into<String>, data: Value, correlation_id: CorrelationId) -> Self {
        Self {
            pattern: pattern.into(),
            data,
            correlation_id: Some(correlation_id),
            error: None,
        }
    }

    /// Successful reply to `self`.
    pub fn reply(&self, data: Value) -> Self {
        Self {
            pattern: self.pattern.clone(),
            data,
            correlation_id: self.correlation_id,
            error: None,
        }
    }

    /// Failed reply to `self`.
    pub fn error_reply(&self, error: DispatchError) -> Self {
        Self {
            pattern: self.pattern.clone(),
            data: Value::Null,
            correlation_id: self.correlation_id,
            error: Some(error),
        }
    }

    /// Placeholder returned by history lookups for an unseen pattern.
    pub fn sentinel() -> Self {
        Self::event(String::new(), Value::Null)
    }

    /// Kind implied by the presence of a correlation id.
    pub fn kind(&self) -> HandlerKind {
        if self.correlation_id.is_some() {
            HandlerKind::MessageCall
        } else {
            HandlerKind::Event
        }
    }

    /// True when the message is a reply to the call `correlation_id` on
    /// `pattern`.
    pub fn answers(&self, pattern: &str, correlation_id: CorrelationId) -> bool {
        self.pattern == pattern && self.correlation_id == Some(correlation_id)
    }

    /// Payload of a reply, or the error it carries.
    pub fn into_result(self) -> Result<Value, DispatchError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}
