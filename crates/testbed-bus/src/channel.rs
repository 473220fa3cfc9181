//! # Broadcast Channel
//!
//! A minimal in-process publish/subscribe channel: a list of callbacks plus a
//! delivery queue.
//!
//! Publishing delivers synchronously on the caller's task. If a callback
//! publishes again on the same channel (or another thread publishes while a
//! delivery is running), the message is queued and delivered by whoever is
//! already draining, so every subscriber sees messages in publication order.

use crate::message::Message;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Subscriber callback.
pub type Callback = Arc<dyn Fn(&Message) + Send + Sync>;

struct Subscriber {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct ChannelState {
    subscribers: Vec<Subscriber>,
    /// Messages waiting for delivery, each with the subscribers that were
    /// active when it was published.
    queue: VecDeque<(Message, Vec<Callback>)>,
    draining: bool,
    closed: bool,
    next_id: u64,
}

struct ChannelInner {
    name: &'static str,
    state: Mutex<ChannelState>,
    published: AtomicU64,
}

/// One-directional broadcast channel.
///
/// Cloning yields another handle to the same channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Create an open channel. `name` only appears in logs.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name,
                state: Mutex::new(ChannelState::default()),
                published: AtomicU64::new(0),
            }),
        }
    }

    /// Publish a message to every current subscriber.
    ///
    /// # Returns
    ///
    /// The number of subscribers the message was delivered (or queued) to.
    /// A closed channel drops the message and returns 0.
    pub fn publish(&self, message: Message) -> usize {
        let receivers = {
            let mut state = self.inner.state.lock();
            if state.closed {
                debug!(
                    channel = self.inner.name,
                    pattern = %message.pattern,
                    "Publish on closed channel dropped"
                );
                return 0;
            }

            let callbacks: Vec<Callback> = state
                .subscribers
                .iter()
                .map(|s| Arc::clone(&s.callback))
                .collect();
            let receivers = callbacks.len();

            self.inner.published.fetch_add(1, Ordering::Relaxed);
            debug!(
                channel = self.inner.name,
                pattern = %message.pattern,
                receivers = receivers,
                "Message published"
            );

            state.queue.push_back((message, callbacks));
            if state.draining {
                return receivers;
            }
            state.draining = true;
            receivers
        };

        self.drain();
        receivers
    }

    /// Deliver queued messages until the queue is empty.
    fn drain(&self) {
        let mut guard = DrainGuard {
            inner: &self.inner,
            finished: false,
        };

        loop {
            let next = {
                let mut state = self.inner.state.lock();
                match state.queue.pop_front() {
                    Some(entry) => entry,
                    None => {
                        state.draining = false;
                        guard.finished = true;
                        return;
                    }
                }
            };

            let (message, callbacks) = next;
            for callback in callbacks {
                callback(&message);
            }
        }
    }

    /// Register a callback for every message published from now on.
    ///
    /// A closed channel returns an inert subscription and never calls the
    /// callback.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.closed {
            debug!(
                channel = self.inner.name,
                "Subscribe on closed channel ignored"
            );
            return Subscription {
                id: 0,
                channel: Weak::new(),
            };
        }

        state.next_id += 1;
        let id = state.next_id;
        state.subscribers.push(Subscriber {
            id,
            callback: Arc::new(callback),
        });

        debug!(
            channel = self.inner.name,
            subscription = id,
            "New subscription created"
        );

        Subscription {
            id,
            channel: Arc::downgrade(&self.inner),
        }
    }

    /// Terminate every subscription. Later publishes are dropped.
    pub fn close(&self) {
        let (dropped, queued) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let queued = std::mem::take(&mut state.queue);
            (std::mem::take(&mut state.subscribers), queued)
        };

        debug!(
            channel = self.inner.name,
            subscriptions = dropped.len(),
            "Channel closed"
        );
        // Callbacks are dropped here, outside the lock.
        drop(queued);
        drop(dropped);
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    /// Total messages accepted for delivery.
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }
}

/// Resets the draining flag if a callback panics mid-delivery.
struct DrainGuard<'a> {
    inner: &'a ChannelInner,
    finished: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.inner.state.lock().draining = false;
        }
    }
}

/// Handle to a registered callback.
///
/// When dropped, the subscription is automatically removed.
pub struct Subscription {
    id: u64,
    channel: Weak<ChannelInner>,
}

impl Subscription {
    /// Remove the callback from its channel. Idempotent.
    pub fn unsubscribe(&mut self) {
        let Some(inner) = self.channel.upgrade() else {
            return;
        };
        self.channel = Weak::new();

        let removed = {
            let mut state = inner.state.lock();
            state
                .subscribers
                .iter()
                .position(|s| s.id == self.id)
                .map(|index| state.subscribers.remove(index))
        };

        if removed.is_some() {
            debug!(
                channel = inner.name,
                subscription = self.id,
                "Subscription dropped"
            );
        }
    }

    /// Whether the callback is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        let Some(inner) = self.channel.upgrade() else {
            return false;
        };
        let state = inner.state.lock();
        state.subscribers.iter().any(|s| s.id == self.id)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
