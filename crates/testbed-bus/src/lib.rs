//! # Test Bed Bus - In-Memory Routing Fabric
//!
//! The transport half of the microservices test bed. Messages never leave the
//! process: a client publishes on the request channel, a server answers on the
//! reply channel, and a history store watches both.
//!
//! ```text
//! ┌──────────────┐   requests    ┌──────────────┐
//! │    Client    │ ────────────→ │    Server    │
//! │              │ ←──────────── │              │
//! └──────────────┘    replies    └──────────────┘
//!         │                              │
//!         └──────────┐      ┌────────────┘
//!                    ▼      ▼
//!               ┌──────────────┐
//!               │   History    │
//!               └──────────────┘
//! ```
//!
//! ## Delivery
//!
//! - Every subscriber active at publish time receives the message
//! - A subscriber observes messages in publication order
//! - A closed channel drops publishes silently

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod channel;
pub mod correlation;
pub mod fabric;
pub mod history;
pub mod message;

// Re-export main types
pub use channel::{Channel, Subscription};
pub use correlation::CorrelationId;
pub use fabric::RoutingFabric;
pub use history::MessageHistory;
pub use message::{DispatchError, HandlerKind, Message};

/// Number of entries returned by a `recent_for_pattern` query when the caller
/// has no preference.
pub const DEFAULT_RECENT_COUNT: usize = 1;
