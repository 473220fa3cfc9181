//! # Test Bed Server
//!
//! Consumes the request channel and dispatches each message to the handler
//! bound to its pattern. Calls get a reply on the reply channel carrying the
//! same pattern and correlation id; events get nothing back.
//!
//! ## Dispatch
//!
//! ```text
//! request ──→ resolve(pattern) ──none──→ on_unknown_pattern
//!                  │
//!                binding
//!                  │
//!             kind matches? ──no──→ on_handler_kind_mismatch
//!                  │
//!               invoke ──→ collapse stream (first | last)
//!                  │
//!        Event: done │ MessageCall: publish reply
//! ```

use crate::config::{BehaviorPolicy, PolicyAction, ResultSelection, TestBedConfig, TransportId};
use crate::handler::{HandlerOutput, HandlerRegistry, PatternResolver};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use testbed_bus::{DispatchError, HandlerKind, Message, RoutingFabric, Subscription};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Capacity of the surfaced-error broadcast.
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Contract a host framework expects from a pluggable transport.
pub trait CustomTransportStrategy: Send + Sync {
    /// Identifier the host uses to tell transports apart.
    fn transport_id(&self) -> Option<&TransportId>;

    /// Start consuming messages, then call `ready`.
    fn listen(&self, ready: Box<dyn FnOnce() + Send>);

    /// Stop consuming and release the transport.
    fn close(&self);
}

/// Dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Messages taken off the request channel or dispatched directly
    pub received: AtomicU64,
    /// Replies published
    pub replied: AtomicU64,
    /// Messages with no binding
    pub unknown_pattern: AtomicU64,
    /// Messages whose kind did not match their binding
    pub kind_mismatch: AtomicU64,
    /// Handlers that failed or produced an empty stream
    pub handler_failures: AtomicU64,
}

struct ServerInner {
    transport_id: Option<TransportId>,
    fabric: RoutingFabric,
    registry: Arc<HandlerRegistry>,
    resolver: RwLock<Arc<dyn PatternResolver>>,
    behavior: BehaviorPolicy,
    result_selection: ResultSelection,
    listener: Mutex<Option<Subscription>>,
    errors: broadcast::Sender<DispatchError>,
    stats: DispatchStats,
}

/// Server endpoint of the test bed.
///
/// Cloning yields another handle to the same server.
#[derive(Clone)]
pub struct TestBedServer {
    inner: Arc<ServerInner>,
}

impl TestBedServer {
    /// Create a server on `fabric`. Policies are fixed from `config` here.
    pub fn new(fabric: RoutingFabric, config: &TestBedConfig) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        let resolver: Arc<dyn PatternResolver> = registry.clone();
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(ServerInner {
                transport_id: config.transport_id.clone(),
                fabric,
                registry,
                resolver: RwLock::new(resolver),
                behavior: config.behavior,
                result_selection: config.result_selection,
                listener: Mutex::new(None),
                errors,
                stats: DispatchStats::default(),
            }),
        }
    }

    /// Built-in registry, consulted unless another resolver is injected.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    /// Dispatch through an external registration layer instead of the
    /// built-in registry.
    pub fn set_resolver(&self, resolver: Arc<dyn PatternResolver>) {
        *self.inner.resolver.write() = resolver;
        debug!("External pattern resolver bound");
    }

    /// Errors surfaced under the Throw policy and handler failures.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<DispatchError> {
        self.inner.errors.subscribe()
    }

    pub fn behavior(&self) -> BehaviorPolicy {
        self.inner.behavior
    }

    pub fn result_selection(&self) -> ResultSelection {
        self.inner.result_selection
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.inner.stats
    }

    pub fn is_listening(&self) -> bool {
        self.inner.listener.lock().is_some()
    }

    /// Dispatch one message and publish its reply if it is a call.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))` - a call was answered with `value`
    /// - `Ok(None)` - an event was handled, or the message was dropped by
    ///   policy
    /// - `Err(e)` - dispatch failed; for a call the error was also sent back
    ///   as the reply
    pub async fn dispatch(&self, message: Message) -> Result<Option<Value>, DispatchError> {
        let result = self.inner.process(&message).await;

        match &result {
            Ok(Some(value)) => {
                self.inner.stats.replied.fetch_add(1, Ordering::Relaxed);
                let reply = message.reply(value.clone());
                self.inner.fabric.replies().publish(reply);
            }
            Ok(None) => {}
            Err(e) => {
                if message.correlation_id.is_some() {
                    debug!(pattern = %message.pattern, error = %e, "Replying with dispatch error");
                    let reply = message.error_reply(e.clone());
                    self.inner.fabric.replies().publish(reply);
                } else {
                    error!(pattern = %message.pattern, error = %e, "Event dispatch failed");
                }
                let _ = self.inner.errors.send(e.clone());
            }
        }

        result
    }
}

impl ServerInner {
    async fn process(&self, message: &Message) -> Result<Option<Value>, DispatchError> {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let resolver = Arc::clone(&self.resolver.read());
        let Some(binding) = resolver.resolve(&message.pattern) else {
            self.stats.unknown_pattern.fetch_add(1, Ordering::Relaxed);
            return apply_policy(
                self.behavior.on_unknown_pattern,
                DispatchError::UnknownPattern {
                    pattern: message.pattern.clone(),
                },
            );
        };

        let expected = message.kind();
        if expected != binding.kind {
            self.stats.kind_mismatch.fetch_add(1, Ordering::Relaxed);
            return apply_policy(
                self.behavior.on_handler_kind_mismatch,
                DispatchError::HandlerKindMismatch {
                    pattern: message.pattern.clone(),
                    expected,
                    actual: binding.kind,
                },
            );
        }

        debug!(
            pattern = %message.pattern,
            kind = %binding.kind,
            correlation_id = ?message.correlation_id,
            "Dispatching message"
        );

        let output = binding
            .handler
            .handle(message.data.clone())
            .await
            .map_err(|e| {
                self.stats.handler_failures.fetch_add(1, Ordering::Relaxed);
                DispatchError::HandlerFailed {
                    pattern: message.pattern.clone(),
                    reason: format!("{e:#}"),
                }
            })?;

        let collapsed = collapse(output, self.result_selection).await;

        match binding.kind {
            // Event results are consumed and discarded, empty or not.
            HandlerKind::Event => Ok(None),
            HandlerKind::MessageCall => match collapsed {
                Some(value) => Ok(Some(value)),
                None => {
                    self.stats.handler_failures.fetch_add(1, Ordering::Relaxed);
                    Err(DispatchError::EmptyResult {
                        pattern: message.pattern.clone(),
                    })
                }
            },
        }
    }
}

fn apply_policy(
    action: PolicyAction,
    error: DispatchError,
) -> Result<Option<Value>, DispatchError> {
    match action {
        PolicyAction::Throw => Err(error),
        PolicyAction::Log => {
            warn!(pattern = %error.pattern(), error = %error, "Message dropped");
            Ok(None)
        }
        PolicyAction::Ignore => Ok(None),
    }
}

/// Reduce a handler output to one value. `None` for an empty stream.
async fn collapse(output: HandlerOutput, selection: ResultSelection) -> Option<Value> {
    match output {
        HandlerOutput::Value(value) => Some(value),
        HandlerOutput::Stream(mut stream) => match selection {
            ResultSelection::First => stream.next().await,
            ResultSelection::Last => {
                let mut last = None;
                while let Some(value) = stream.next().await {
                    last = Some(value);
                }
                last
            }
        },
    }
}

impl CustomTransportStrategy for TestBedServer {
    fn transport_id(&self) -> Option<&TransportId> {
        self.inner.transport_id.as_ref()
    }

    fn listen(&self, ready: Box<dyn FnOnce() + Send>) {
        {
            let mut listener = self.inner.listener.lock();
            if listener.is_some() {
                warn!("Test bed server is already listening");
            } else {
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        let (tx, rx) = mpsc::unbounded_channel();
                        let requests = self.inner.fabric.requests();
                        let subscription = requests.subscribe(move |message: &Message| {
                            let _ = tx.send(message.clone());
                        });
                        // Weak: the listener task must not keep the server alive.
                        handle.spawn(drive_dispatches(Arc::downgrade(&self.inner), rx));
                        *listener = Some(subscription);
                        info!(transport_id = ?self.inner.transport_id, "Test bed server listening");
                    }
                    Err(_) => {
                        error!("No async runtime, test bed server not listening");
                    }
                }
            }
        }
        ready();
    }

    fn close(&self) {
        let listener = self.inner.listener.lock().take();
        drop(listener);
        self.inner.fabric.close();
        info!("Test bed server closed");
    }
}

/// Dispatch every request in arrival order.
///
/// Each message becomes one future in a `FuturesUnordered`, which first polls
/// futures in push order, so handlers start in publication order while a
/// slow or nested call never blocks the messages behind it.
async fn drive_dispatches(
    server: Weak<ServerInner>,
    mut requests: mpsc::UnboundedReceiver<Message>,
) {
    let mut in_flight = FuturesUnordered::new();

    loop {
        tokio::select! {
            biased;
            received = requests.recv() => {
                let Some(message) = received else {
                    break;
                };
                let Some(inner) = server.upgrade() else {
                    break;
                };
                let server = TestBedServer { inner };
                in_flight.push(async move {
                    let _ = server.dispatch(message).await;
                });
            }
            Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
        }
    }

    // Requests already taken off the channel still get their dispatch.
    while in_flight.next().await.is_some() {}
    debug!("Test bed listener stopped");
}
