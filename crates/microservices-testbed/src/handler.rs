//! Handler bindings and the lookup seam the server dispatches through.
//!
//! The server never owns handlers. It asks a [`PatternResolver`] for the
//! binding of each incoming pattern; [`HandlerRegistry`] is the in-memory
//! resolver used when nothing else is injected.

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use testbed_bus::HandlerKind;
use tracing::debug;

/// What a handler produced: a plain value or a stream of values that the
/// server collapses to one.
pub enum HandlerOutput {
    Value(Value),
    Stream(BoxStream<'static, Value>),
}

impl HandlerOutput {
    /// Wrap a stream of values.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Value> + Send + 'static,
    {
        Self::Stream(stream.boxed())
    }

    /// Output of a handler with nothing to say.
    pub fn none() -> Self {
        Self::Value(Value::Null)
    }
}

impl From<Value> for HandlerOutput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for HandlerOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Application handling logic for one pattern.
///
/// Interceptors and decorators are just handlers wrapping other handlers; the
/// server only sees the outermost result.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, data: Value) -> anyhow::Result<HandlerOutput>;
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<HandlerOutput>> + Send + 'static,
{
    async fn handle(&self, data: Value) -> anyhow::Result<HandlerOutput> {
        (self.0)(data).await
    }
}

/// Build a handler from an async closure.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<HandlerOutput>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A pattern bound to handling logic plus its kind.
#[derive(Clone)]
pub struct HandlerBinding {
    pub pattern: String,
    pub kind: HandlerKind,
    pub handler: Arc<dyn MessageHandler>,
}

impl HandlerBinding {
    pub fn new(
        pattern: impl Into<String>,
        kind: HandlerKind,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            kind,
            handler,
        }
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("pattern", &self.pattern)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Lookup from pattern to binding, supplied by the registration layer.
pub trait PatternResolver: Send + Sync {
    fn resolve(&self, pattern: &str) -> Option<HandlerBinding>;
}

/// In-memory pattern → binding map.
#[derive(Default)]
pub struct HandlerRegistry {
    bindings: RwLock<HashMap<String, HandlerBinding>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `pattern`, replacing any previous binding.
    pub fn add_handler(
        &self,
        pattern: impl Into<String>,
        kind: HandlerKind,
        handler: Arc<dyn MessageHandler>,
    ) {
        let binding = HandlerBinding::new(pattern, kind, handler);
        debug!(pattern = %binding.pattern, kind = %binding.kind, "Handler bound");
        let key = binding.pattern.clone();
        self.bindings.write().insert(key, binding);
    }

    pub fn add_event_handler(&self, pattern: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.add_handler(pattern, HandlerKind::Event, handler);
    }

    pub fn add_message_handler(
        &self,
        pattern: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) {
        self.add_handler(pattern, HandlerKind::MessageCall, handler);
    }

    /// Unbind `pattern`.
    pub fn remove(&self, pattern: &str) -> Option<HandlerBinding> {
        self.bindings.write().remove(pattern)
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

impl PatternResolver for HandlerRegistry {
    fn resolve(&self, pattern: &str) -> Option<HandlerBinding> {
        self.bindings.read().get(pattern).cloned()
    }
}
