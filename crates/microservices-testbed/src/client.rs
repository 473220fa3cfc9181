//! # Test Bed Client
//!
//! Drop-in replacement for a production client proxy. Calls and events are
//! published on the routing fabric; there is no connection to establish.

use crate::error::TestBedResult;
use crate::pending::PendingCallStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use testbed_bus::{Message, RoutingFabric};
use tracing::debug;

/// Contract application code uses to talk to other services.
#[async_trait]
pub trait ClientProxy: Send + Sync {
    /// Establish the transport.
    async fn connect(&self) -> TestBedResult<()>;

    /// Release the transport.
    async fn close(&self);

    /// Send a call and wait for its reply.
    async fn send(&self, pattern: &str, data: Value) -> TestBedResult<Value>;

    /// Publish a fire-and-forget event.
    async fn emit(&self, pattern: &str, data: Value) -> TestBedResult<()>;
}

struct ClientInner {
    fabric: RoutingFabric,
    call_timeout: Duration,
    pending: PendingCallStore,
    connected: AtomicBool,
}

/// Client endpoint of the test bed.
///
/// Cloning yields another handle to the same client, so every clone shares
/// the same pending calls.
#[derive(Clone)]
pub struct TestBedClient {
    inner: Arc<ClientInner>,
}

impl TestBedClient {
    pub fn new(fabric: RoutingFabric, call_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                fabric,
                call_timeout,
                pending: PendingCallStore::new(),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Reply window applied to every call.
    pub fn call_timeout(&self) -> Duration {
        self.inner.call_timeout
    }

    /// Calls still waiting for a reply.
    pub fn pending(&self) -> &PendingCallStore {
        &self.inner.pending
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    /// True when both handles point at the same client.
    pub fn is_same_instance(&self, other: &TestBedClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Typed `send`: serializes `data` and deserializes the reply.
    pub async fn send_typed<T, I>(&self, pattern: &str, data: &I) -> TestBedResult<T>
    where
        T: DeserializeOwned,
        I: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(data)?;
        let reply = self.send(pattern, payload).await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Typed `emit`.
    pub async fn emit_typed<I>(&self, pattern: &str, data: &I) -> TestBedResult<()>
    where
        I: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(data)?;
        self.emit(pattern, payload).await
    }
}

#[async_trait]
impl ClientProxy for TestBedClient {
    async fn connect(&self) -> TestBedResult<()> {
        self.inner.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) {
        self.inner.connected.store(false, Ordering::Relaxed);
    }

    async fn send(&self, pattern: &str, data: Value) -> TestBedResult<Value> {
        let inner = &self.inner;
        let replies = inner.fabric.replies();
        let call = inner.pending.begin(pattern, inner.call_timeout, replies);

        let request = Message::call(pattern, data, call.correlation_id());
        let receivers = inner.fabric.requests().publish(request);
        debug!(
            pattern = pattern,
            correlation_id = %call.correlation_id(),
            receivers = receivers,
            "Call sent"
        );

        call.wait().await
    }

    async fn emit(&self, pattern: &str, data: Value) -> TestBedResult<()> {
        let event = Message::event(pattern, data);
        let receivers = self.inner.fabric.requests().publish(event);
        debug!(pattern = pattern, receivers = receivers, "Event emitted");
        Ok(())
    }
}
