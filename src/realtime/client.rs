//! Websocket client for the Realtime endpoint.
//!
//! DESIGN
//! ======
//! `subscribe` connects, sends `phx_join`, and waits for the matching
//! `phx_reply`, all under the subscribe timeout. After that the socket moves
//! into a spawned task that heartbeats on the `phoenix` topic and forwards
//! `UPDATE`s for the configured row id.
//!
//! ERROR HANDLING
//! ==============
//! Every way the channel can die (error frame, close frame, socket error,
//! missed heartbeat reply) ends the task with exactly one
//! `ChannelEvent::Failed`. If the subscriber has gone away the task sends
//! `phx_leave` and exits quietly.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::protocol::{Inbound, PhoenixMessage, channel_topic, classify, rejection_reason};
use super::{ChannelEvent, RealtimeTransport, Subscription};
use crate::config::{BackendConfig, SyncTuning};
use crate::error::{ErrorCode, SubscriptionError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bounded; the synchronizer drains promptly and updates are tiny.
const EVENT_BUFFER: usize = 32;
/// How long a canceled channel may spend on `phx_leave` and the close handshake.
const LEAVE_TIMEOUT: Duration = Duration::from_secs(2);
/// Floor for the heartbeat period; `interval` panics on zero.
const MIN_HEARTBEAT: Duration = Duration::from_millis(100);

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Debug, Clone)]
pub struct RealtimeClient {
    url: String,
    topic: String,
    table: String,
    access_token: String,
    row_id: i64,
    subscribe_timeout: Duration,
    heartbeat_interval: Duration,
}

impl RealtimeClient {
    #[must_use]
    pub fn new(config: &BackendConfig, tuning: &SyncTuning) -> Self {
        Self {
            url: config.realtime_url(),
            topic: channel_topic(&config.channel),
            table: config.table.clone(),
            access_token: config.anon_key.clone(),
            row_id: config.row_id,
            subscribe_timeout: tuning.subscribe_timeout,
            heartbeat_interval: tuning.heartbeat_interval,
        }
    }

    async fn connect_and_join(&self, refs: &mut RefCounter) -> Result<(Socket, String), SubscriptionError> {
        let (mut socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;

        let join_ref = refs.next();
        send(&mut socket, &PhoenixMessage::join(&self.topic, &self.table, &self.access_token, &join_ref)).await?;
        await_join_reply(&mut socket, &self.topic, &join_ref).await?;
        Ok((socket, join_ref))
    }
}

#[async_trait::async_trait]
impl RealtimeTransport for RealtimeClient {
    async fn subscribe(&self) -> Result<Subscription, SubscriptionError> {
        let mut refs = RefCounter::default();
        let (socket, join_ref) = tokio::time::timeout(self.subscribe_timeout, self.connect_and_join(&mut refs))
            .await
            .map_err(|_| SubscriptionError::TimedOut)??;
        info!(topic = %self.topic, table = %self.table, "realtime channel joined");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let channel = ChannelLoop {
            topic: self.topic.clone(),
            join_ref,
            row_id: self.row_id,
            heartbeat_interval: self.heartbeat_interval.max(MIN_HEARTBEAT),
            refs,
        };
        tokio::spawn(channel.run(socket, tx));
        Ok(Subscription::new(rx))
    }
}

async fn await_join_reply(socket: &mut Socket, topic: &str, join_ref: &str) -> Result<(), SubscriptionError> {
    loop {
        let Some(message) = recv_frame(socket).await? else {
            continue;
        };
        match classify(&message, topic) {
            Inbound::Reply { reference, ok, response } if reference.as_deref() == Some(join_ref) => {
                if ok {
                    return Ok(());
                }
                return Err(SubscriptionError::ChannelError(rejection_reason(&response)));
            }
            Inbound::ChannelError(reason) | Inbound::SystemError(reason) => {
                return Err(SubscriptionError::ChannelError(reason));
            }
            Inbound::ChannelClosed => return Err(SubscriptionError::Closed("channel closed during join".to_owned())),
            _ => {}
        }
    }
}

// =============================================================================
// CHANNEL TASK
// =============================================================================

struct ChannelLoop {
    topic: String,
    join_ref: String,
    row_id: i64,
    heartbeat_interval: Duration,
    refs: RefCounter,
}

impl ChannelLoop {
    async fn run(mut self, mut socket: Socket, events: mpsc::Sender<ChannelEvent>) {
        let Some(failure) = self.pump(&mut socket, &events).await else {
            debug!(topic = %self.topic, "realtime subscriber gone; leaving channel");
            let reference = self.refs.next();
            let leave = PhoenixMessage::leave(&self.topic, &self.join_ref, &reference);
            let goodbye = async {
                send(&mut socket, &leave).await?;
                socket.close(None).await.map_err(|e| SubscriptionError::Closed(e.to_string()))
            };
            if let Ok(Err(e)) = tokio::time::timeout(LEAVE_TIMEOUT, goodbye).await {
                debug!(topic = %self.topic, error = %e, "channel leave not delivered");
            }
            return;
        };

        warn!(topic = %self.topic, error = %failure, code = failure.error_code(), "realtime channel ended");
        let _ = events.send(ChannelEvent::Failed(failure)).await;
        let _ = socket.close(None).await;
    }

    /// Returns the failure that ended the channel, or `None` if the
    /// subscriber dropped its receiver.
    async fn pump(&mut self, socket: &mut Socket, events: &mpsc::Sender<ChannelEvent>) -> Option<SubscriptionError> {
        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + self.heartbeat_interval, self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut pending_heartbeat: Option<String> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if pending_heartbeat.is_some() {
                        return Some(SubscriptionError::TimedOut);
                    }
                    let reference = self.refs.next();
                    if let Err(e) = send(socket, &PhoenixMessage::heartbeat(&reference)).await {
                        return Some(e);
                    }
                    pending_heartbeat = Some(reference);
                }
                () = events.closed() => return None,
                frame = recv_frame(socket) => {
                    let message = match frame {
                        Ok(Some(message)) => message,
                        Ok(None) => continue,
                        Err(e) => return Some(e),
                    };
                    match classify(&message, &self.topic) {
                        Inbound::Reply { reference, .. } => {
                            if reference.is_some() && reference == pending_heartbeat {
                                pending_heartbeat = None;
                            }
                        }
                        Inbound::Change(row) => {
                            if row.id != self.row_id {
                                debug!(id = row.id, "ignoring change for another row");
                                continue;
                            }
                            debug!(value = row.value, "realtime update");
                            if events.send(ChannelEvent::Update(row)).await.is_err() {
                                return None;
                            }
                        }
                        Inbound::ChannelError(reason) | Inbound::SystemError(reason) => {
                            return Some(SubscriptionError::ChannelError(reason));
                        }
                        Inbound::ChannelClosed => {
                            return Some(SubscriptionError::Closed("channel closed by server".to_owned()));
                        }
                        Inbound::Ignored => {}
                    }
                }
            }
        }
    }
}

// =============================================================================
// SOCKET HELPERS
// =============================================================================

#[derive(Debug, Default)]
struct RefCounter(u64);

impl RefCounter {
    fn next(&mut self) -> String {
        self.0 = self.0.saturating_add(1);
        self.0.to_string()
    }
}

async fn send(socket: &mut Socket, message: &PhoenixMessage) -> Result<(), SubscriptionError> {
    let text = message.encode().map_err(|e| SubscriptionError::ChannelError(e.to_string()))?;
    socket
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| SubscriptionError::Closed(e.to_string()))
}

/// Read one frame. `Ok(None)` for control frames and undecodable text.
async fn recv_frame(socket: &mut Socket) -> Result<Option<PhoenixMessage>, SubscriptionError> {
    let Some(message) = socket.next().await else {
        return Err(SubscriptionError::Closed("socket closed".to_owned()));
    };
    let text = match message.map_err(|e| SubscriptionError::Closed(e.to_string()))? {
        Message::Text(text) => text.as_str().to_owned(),
        Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Message::Close(frame) => {
            let reason = frame.map_or_else(|| "socket closed".to_owned(), |f| format!("{} {}", u16::from(f.code), f.reason.as_str()));
            return Err(SubscriptionError::Closed(reason));
        }
        _ => return Ok(None),
    };

    match PhoenixMessage::decode(&text) {
        Ok(message) => Ok(Some(message)),
        Err(e) => {
            debug!(error = %e, "skipping undecodable realtime frame");
            Ok(None)
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
