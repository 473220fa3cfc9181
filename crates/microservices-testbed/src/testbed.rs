//! # Microservices Test Bed
//!
//! Composition root: one routing fabric, one server, one client and one
//! history store, wired together for a single test.
//!
//! ```text
//!        ┌─────────────────── MicroservicesTestBed ───────────────────┐
//!        │                                                             │
//!  app ──┼─→ TestBedClient ──requests──→ TestBedServer ──→ handlers    │
//!        │        ↑                           │                        │
//!        │        └──────────replies──────────┘                        │
//!        │                     │                                       │
//!        │              MessageHistory  ←── recent / last / clear      │
//!        └─────────────────────────────────────────────────────────────┘
//! ```

use crate::client::{ClientProxy, TestBedClient};
use crate::config::{TestBedConfig, TransportId};
use crate::error::TestBedResult;
use crate::server::{CustomTransportStrategy, TestBedServer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use testbed_bus::{Message, MessageHistory, RoutingFabric, Subscription, DEFAULT_RECENT_COUNT};
use tracing::{debug, info};

/// Factory handing out the one client of a test bed.
///
/// Every invocation returns a handle to the same shared instance.
pub type ClientFactory = Arc<dyn Fn() -> TestBedClient + Send + Sync>;

/// Registration of the shared client under an injection token.
#[derive(Clone)]
pub struct ClientProviderOptions {
    pub name: String,
    pub factory: ClientFactory,
}

impl fmt::Debug for ClientProviderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProviderOptions")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One isolated in-process messaging environment.
pub struct MicroservicesTestBed {
    config: TestBedConfig,
    fabric: RoutingFabric,
    server: TestBedServer,
    client: TestBedClient,
    history: Arc<MessageHistory>,
    _recording: [Subscription; 2],
}

impl MicroservicesTestBed {
    /// Test bed with the default configuration.
    pub fn new() -> Self {
        Self::build(TestBedConfig::default())
    }

    /// Test bed with a validated configuration.
    pub fn with_config(config: TestBedConfig) -> TestBedResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Test bed configured from `TESTBED_*` environment variables.
    pub fn from_env() -> TestBedResult<Self> {
        Self::with_config(TestBedConfig::from_env())
    }

    fn build(config: TestBedConfig) -> Self {
        let fabric = RoutingFabric::new();
        let history = Arc::new(MessageHistory::new());
        let recording = MessageHistory::attach(&history, &fabric);
        let server = TestBedServer::new(fabric.clone(), &config);
        let client = TestBedClient::new(fabric.clone(), config.call_timeout());

        info!(
            transport_id = ?config.transport_id,
            call_timeout_ms = config.call_timeout_ms,
            "Test bed created"
        );

        Self {
            config,
            fabric,
            server,
            client,
            history,
            _recording: recording,
        }
    }

    pub fn config(&self) -> &TestBedConfig {
        &self.config
    }

    pub fn fabric(&self) -> &RoutingFabric {
        &self.fabric
    }

    pub fn transport_id(&self) -> Option<&TransportId> {
        self.config.transport_id.as_ref()
    }

    /// The server, installable as the host's transport strategy.
    pub fn server(&self) -> TestBedServer {
        self.server.clone()
    }

    /// The shared client.
    pub fn client(&self) -> TestBedClient {
        self.client.clone()
    }

    /// Factory bound to this test bed: whoever constructs a client through it
    /// gets this instance.
    pub fn client_factory(&self) -> ClientFactory {
        let client = self.client.clone();
        Arc::new(move || client.clone())
    }

    /// Provider registration for the shared client under `name`.
    pub fn client_provider_options(&self, name: impl Into<String>) -> ClientProviderOptions {
        ClientProviderOptions {
            name: name.into(),
            factory: self.client_factory(),
        }
    }

    /// Start the server on the request channel.
    pub fn listen(&self) {
        let ready = Box::new(|| debug!("Test bed server ready"));
        self.server.listen(ready);
    }

    /// Send a call through the client and wait for its reply.
    pub async fn send_call(&self, pattern: &str, data: Value) -> TestBedResult<Value> {
        self.client.send(pattern, data).await
    }

    /// Emit an event through the client.
    pub async fn send_event(&self, pattern: &str, data: Value) -> TestBedResult<()> {
        self.client.emit(pattern, data).await
    }

    /// Up to `n` most recent messages seen for `pattern`, oldest first.
    pub fn recent_for_pattern(&self, pattern: &str, n: usize) -> Vec<Message> {
        self.history.recent_for_pattern(pattern, n)
    }

    /// Most recent message for `pattern` (as a one-element list).
    pub fn recent(&self, pattern: &str) -> Vec<Message> {
        self.recent_for_pattern(pattern, DEFAULT_RECENT_COUNT)
    }

    /// Most recent message for `pattern`, or the empty sentinel.
    pub fn last_for_pattern(&self, pattern: &str) -> Message {
        self.history.last_for_pattern(pattern)
    }

    pub fn clear_all(&self) {
        self.history.clear_all();
    }

    pub fn clear_for_pattern(&self, pattern: &str) {
        self.history.clear_for_pattern(pattern);
    }

    /// Shut the server down and close the fabric.
    pub fn close(&self) {
        self.server.close();
    }
}

impl Default for MicroservicesTestBed {
    fn default() -> Self {
        Self::new()
    }
}
