//! Realtime push channel: Phoenix-over-websocket subscription to row changes.
//!
//! DESIGN
//! ======
//! [`RealtimeClient`] joins the channel and hands back a [`Subscription`]
//! once the server has acknowledged the join. A background task owns the
//! socket from then on, forwarding singleton-row updates and finally one
//! [`ChannelEvent::Failed`] when the channel dies. The synchronizer only
//! sees the [`RealtimeTransport`] trait, so tests can feed events directly.
//!
//! CANCELATION
//! ===========
//! Canceling or dropping a `Subscription` closes its event channel. The
//! socket task notices, sends `phx_leave`, closes the websocket and exits.

pub mod client;
pub mod protocol;

pub use client::RealtimeClient;

use tokio::sync::mpsc;

use crate::error::SubscriptionError;
use crate::state::ToggleState;

/// Event delivered by a live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The singleton row changed.
    Update(ToggleState),
    /// The channel ended. No further events follow.
    Failed(SubscriptionError),
}

/// A joined channel. Events arrive through [`Subscription::next`].
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<ChannelEvent>,
}

impl Subscription {
    #[must_use]
    pub fn new(events: mpsc::Receiver<ChannelEvent>) -> Self {
        Self { events }
    }

    /// Next event, or `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Refuse further events; the producer leaves the channel and stops.
    pub fn cancel(&mut self) {
        self.events.close();
    }
}

/// Opens push subscriptions to the singleton row.
#[async_trait::async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Resolve once the channel is joined, or fail with why it could not be.
    async fn subscribe(&self) -> Result<Subscription, SubscriptionError>;
}
