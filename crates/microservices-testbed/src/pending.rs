//! Pending Call Store - tracks in-flight calls awaiting a correlated reply.
//!
//! Flow:
//! 1. Client calls `begin()` with the pattern and the reply channel
//! 2. A per-call reply subscription is installed and the call is registered
//! 3. Client publishes the request carrying the correlation id
//! 4. `wait()` races the reply against the deadline
//! 5. Whichever branch loses is released: the subscription is removed and the
//!    timer is dropped with the timeout future

use crate::error::{TestBedError, TestBedResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use testbed_bus::{Channel, CorrelationId, Message, Subscription};
use tokio::sync::oneshot;
use tracing::{debug, warn};

type ReplySlot = Mutex<Option<oneshot::Sender<Message>>>;

/// A call waiting for its reply
struct PendingEntry {
    pattern: String,
    created_at: Instant,
}

/// Statistics for the pending call store
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total calls registered
    pub total_registered: AtomicU64,
    /// Total calls answered by a reply
    pub total_completed: AtomicU64,
    /// Total calls that hit their deadline
    pub total_timeouts: AtomicU64,
    /// Total calls dropped by the caller before settling
    pub total_abandoned: AtomicU64,
}

/// In-flight calls of one client.
#[derive(Default)]
pub struct PendingCallStore {
    pending: DashMap<CorrelationId, PendingEntry>,
    stats: Arc<PendingStats>,
}

impl PendingCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call on `pattern` and subscribe for its reply.
    ///
    /// The subscription is installed before the caller publishes, so a reply
    /// can never overtake it.
    pub(crate) fn begin(
        &self,
        pattern: &str,
        timeout: Duration,
        replies: &Channel,
    ) -> PendingCall<'_> {
        let correlation_id = CorrelationId::new();
        let (tx, rx) = oneshot::channel();
        let slot: Arc<ReplySlot> = Arc::new(Mutex::new(Some(tx)));

        // The callback only holds a weak reference: once the call settles,
        // late replies find nothing to fulfil.
        let weak_slot: Weak<ReplySlot> = Arc::downgrade(&slot);
        let expected = pattern.to_string();
        let subscription = replies.subscribe(move |reply: &Message| {
            if !reply.answers(&expected, correlation_id) {
                return;
            }
            let Some(slot) = weak_slot.upgrade() else {
                return;
            };
            let sender = slot.lock().take();
            if let Some(sender) = sender {
                let _ = sender.send(reply.clone());
            }
        });

        self.pending.insert(
            correlation_id,
            PendingEntry {
                pattern: pattern.to_string(),
                created_at: Instant::now(),
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            correlation_id = %correlation_id,
            pattern = pattern,
            timeout_ms = timeout.as_millis(),
            "Registered pending call"
        );

        PendingCall {
            store: self,
            pattern: pattern.to_string(),
            correlation_id,
            timeout,
            receiver: Some(rx),
            slot,
            subscription,
            settled: false,
        }
    }

    fn settle(&self, correlation_id: &CorrelationId, counter: &AtomicU64) {
        if let Some((_, entry)) = self.pending.remove(correlation_id) {
            counter.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %correlation_id,
                pattern = %entry.pattern,
                elapsed_ms = entry.created_at.elapsed().as_millis(),
                "Settled pending call"
            );
        }
    }

    /// Get number of calls currently awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a correlation ID is pending
    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

/// One in-flight call. Dropping it releases the reply subscription and
/// unregisters the call.
pub(crate) struct PendingCall<'a> {
    store: &'a PendingCallStore,
    pattern: String,
    correlation_id: CorrelationId,
    timeout: Duration,
    receiver: Option<oneshot::Receiver<Message>>,
    // Keeps the reply sender alive until the call settles.
    slot: Arc<ReplySlot>,
    subscription: Subscription,
    settled: bool,
}

impl PendingCall<'_> {
    pub(crate) fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Wait for the reply or the deadline, whichever comes first.
    pub(crate) async fn wait(mut self) -> TestBedResult<Value> {
        let Some(receiver) = self.receiver.take() else {
            return Err(self.timed_out());
        };

        let outcome = tokio::time::timeout(self.timeout, receiver).await;
        self.subscription.unsubscribe();
        self.slot.lock().take();

        match outcome {
            Ok(Ok(reply)) => {
                self.settled = true;
                self.store
                    .settle(&self.correlation_id, &self.store.stats.total_completed);
                reply.into_result().map_err(TestBedError::from)
            }
            // The sender lives in `slot` until here, so a closed receiver
            // cannot happen before the deadline.
            Ok(Err(_)) | Err(_) => Err(self.timed_out()),
        }
    }

    fn timed_out(&mut self) -> TestBedError {
        self.settled = true;
        self.store
            .settle(&self.correlation_id, &self.store.stats.total_timeouts);
        warn!(
            correlation_id = %self.correlation_id,
            pattern = %self.pattern,
            timeout_ms = self.timeout.as_millis(),
            "Call timed out"
        );
        TestBedError::Timeout {
            pattern: self.pattern.clone(),
            timeout: self.timeout,
        }
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.store
                .settle(&self.correlation_id, &self.store.stats.total_abandoned);
        }
    }
}
