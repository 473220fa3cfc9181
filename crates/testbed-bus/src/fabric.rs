//! # Routing Fabric
//!
//! The pair of channels shared by one test bed: calls and events travel on
//! `requests`, answers travel on `replies`.

use crate::channel::Channel;
use tracing::debug;

/// Request and reply channels of one test bed instance.
#[derive(Clone)]
pub struct RoutingFabric {
    requests: Channel,
    replies: Channel,
}

impl RoutingFabric {
    /// Create a fabric with two open channels.
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: Channel::new("requests"),
            replies: Channel::new("replies"),
        }
    }

    /// Channel carrying calls and events towards the server.
    #[must_use]
    pub fn requests(&self) -> &Channel {
        &self.requests
    }

    /// Channel carrying replies back towards the client.
    #[must_use]
    pub fn replies(&self) -> &Channel {
        &self.replies
    }

    /// Close both channels.
    pub fn close(&self) {
        self.requests.close();
        self.replies.close();
        debug!("Routing fabric closed");
    }

    /// Whether both channels are closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.requests.is_closed() && self.replies.is_closed()
    }
}

impl Default for RoutingFabric {
    fn default() -> Self {
        Self::new()
    }
}
