//! # Microservices Test Bed
//!
//! In-process stand-ins for a microservice transport. A test wires its
//! handlers into [`TestBedServer`], talks to them through [`TestBedClient`],
//! and inspects every message that crossed the fabric afterwards.
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`TestBedServer`] | Resolves patterns and applies the behavior policy |
//! | [`TestBedClient`] | Correlated calls with a reply window, plain events |
//! | [`MicroservicesTestBed`] | Owns one fabric, server, client and history |
//!
//! ## Usage
//!
//! ```ignore
//! let testbed = MicroservicesTestBed::new();
//! testbed.server().handlers().add_message_handler("echo", handler);
//! testbed.listen();
//!
//! let reply = testbed.send_call("echo", json!("hi")).await?;
//! let seen = testbed.recent_for_pattern("echo", 2);
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod pending;
pub mod server;
pub mod telemetry;
pub mod testbed;

// Re-export main types
pub use client::{ClientProxy, TestBedClient};
pub use config::{
    BehaviorPolicy, ConfigError, PolicyAction, ResultSelection, TestBedConfig, TransportId,
    DEFAULT_CALL_TIMEOUT_MS,
};
pub use error::{TestBedError, TestBedResult};
pub use handler::{
    handler_fn, HandlerBinding, HandlerOutput, HandlerRegistry, MessageHandler, PatternResolver,
};
pub use pending::{PendingCallStore, PendingStats};
pub use server::{CustomTransportStrategy, DispatchStats, TestBedServer};
pub use telemetry::init_test_tracing;
pub use testbed::{ClientFactory, ClientProviderOptions, MicroservicesTestBed};

// Bus types callers need alongside the endpoints
pub use testbed_bus::{
    CorrelationId, DispatchError, HandlerKind, Message, MessageHistory, RoutingFabric,
};
