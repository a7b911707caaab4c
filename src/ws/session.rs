//! Per-connection session: registration, read loop, write loop.
//!
//! A session registers a [`Connection`] with the hub, then runs two tasks
//! that share nothing but the hub and a `watch` channel carrying the time
//! of the last pong. A second `watch` holds the [`SessionState`] the read
//! loop maintains, which the session moves to `Closed` once both loops are
//! done:
//!
//! - the **read loop** decodes control frames (`join_channel`,
//!   `leave_channel`, `ping`) into hub calls and records pongs;
//! - the **write loop** drains the mailbox, coalescing everything already
//!   queued into one newline-separated text frame, sends a ping every
//!   `ping_period`, and gives up when no pong arrived within `pong_wait`
//!   of the previous one.
//!
//! Whichever loop finishes first ends the session. If the reader stops,
//! the connection is unregistered, which closes the mailbox and lets the
//! writer send a close frame and exit. If the writer stops, the reader is
//! aborted and the connection is unregistered.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::time::Instant;

use super::messages::{ControlMessage, FrameError, decode_control};
use crate::config::GatewayConfig;
use crate::domain::{ChannelId, ConnectionId, Envelope};
use crate::hub::connection::DEFAULT_MAILBOX_CAPACITY;
use crate::hub::{Connection, Hub, Mailbox};

/// Timing and sizing limits applied to every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Outbound mailbox capacity.
    pub mailbox_capacity: usize,
    /// Interval between pings.
    pub ping_period: Duration,
    /// How long to wait for a pong before declaring the peer dead.
    pub pong_wait: Duration,
    /// Deadline for a single outbound write.
    pub write_wait: Duration,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Most envelopes coalesced into one outbound frame.
    pub max_batch: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            ping_period: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            max_message_size: 512,
            max_batch: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

impl From<&GatewayConfig> for SessionSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            mailbox_capacity: config.mailbox_capacity,
            ping_period: Duration::from_secs(config.ws_ping_period_secs),
            pong_wait: Duration::from_secs(config.ws_pong_wait_secs),
            write_wait: Duration::from_secs(config.ws_write_wait_secs),
            max_message_size: config.ws_max_message_size,
            max_batch: config.mailbox_capacity,
        }
    }
}

/// Lifecycle of one session.
///
/// `Connecting → Active(no channel) ⇄ Active(channel) → Closed`. `Closed`
/// is terminal; later transitions are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Upgraded but not yet registered.
    Connecting,
    /// Registered, optionally joined to a channel.
    Active {
        /// Current channel, if any.
        channel_id: Option<ChannelId>,
    },
    /// Transport closed or connection evicted.
    Closed,
}

impl SessionState {
    /// Marks the session registered with its initial channel.
    pub fn activate(&mut self, channel_id: Option<ChannelId>) {
        if *self == Self::Connecting {
            *self = Self::Active { channel_id };
        }
    }

    /// Applies a control request's effect on channel membership.
    pub fn apply(&mut self, control: &ControlMessage) {
        let Self::Active { channel_id } = self else {
            return;
        };
        match control {
            ControlMessage::JoinChannel(next) => *channel_id = Some(next.clone()),
            ControlMessage::LeaveChannel => *channel_id = None,
            ControlMessage::Ping => {}
        }
    }

    /// Moves to the terminal state.
    pub fn close(&mut self) {
        *self = Self::Closed;
    }

    /// Returns the current channel while active.
    #[must_use]
    pub fn channel_id(&self) -> Option<&ChannelId> {
        match self {
            Self::Active { channel_id } => channel_id.as_ref(),
            Self::Connecting | Self::Closed => None,
        }
    }
}

/// Drives one upgraded WebSocket until either side goes away.
pub async fn run_session(
    socket: WebSocket,
    hub: Hub,
    user_email: String,
    channel_id: Option<ChannelId>,
    settings: SessionSettings,
) {
    let mut state = SessionState::Connecting;
    let (connection, mailbox) =
        Connection::new(user_email.as_str(), channel_id.clone(), settings.mailbox_capacity);
    let id = connection.id();
    hub.register(connection).await;
    state.activate(channel_id);

    let (sink, stream) = socket.split();
    let (pong_tx, pong_rx) = watch::channel(Instant::now());
    let (state_tx, state_rx) = watch::channel(state);

    let mut writer = tokio::spawn(write_loop(sink, mailbox, pong_rx, settings));
    let mut reader = tokio::spawn(read_loop(stream, hub.clone(), id, state_tx, pong_tx));

    let ended_by = tokio::select! {
        _ = &mut reader => {
            hub.unregister(id).await;
            let _ = writer.await;
            "reader"
        }
        _ = &mut writer => {
            reader.abort();
            hub.unregister(id).await;
            "writer"
        }
    };

    let previous = state_rx.borrow().clone();
    let mut state = previous.clone();
    state.close();
    tracing::debug!(
        connection_id = %id,
        user_email = %user_email,
        ended_by,
        last_channel = ?previous.channel_id().map(ChannelId::as_str),
        state = ?state,
        "session closed"
    );
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    hub: Hub,
    id: ConnectionId,
    state: watch::Sender<SessionState>,
    pong_tx: watch::Sender<Instant>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_text(&hub, id, &state, text.as_str()).await,
            Ok(Message::Pong(_)) => {
                pong_tx.send_replace(Instant::now());
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_) | Message::Ping(_)) => {}
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "websocket read failed");
                break;
            }
        }
    }
}

async fn handle_text(
    hub: &Hub,
    id: ConnectionId,
    state: &watch::Sender<SessionState>,
    text: &str,
) {
    let control = match decode_control(text) {
        Ok(control) => control,
        Err(FrameError::UnknownType(msg_type)) => {
            tracing::warn!(connection_id = %id, msg_type = %msg_type, "unknown message type");
            return;
        }
        Err(e) => {
            tracing::warn!(connection_id = %id, error = %e, "ignoring malformed frame");
            return;
        }
    };

    match &control {
        ControlMessage::JoinChannel(channel_id) => hub.join(id, channel_id.clone()).await,
        ControlMessage::LeaveChannel => hub.leave(id).await,
        ControlMessage::Ping => hub.send_to(id, Envelope::pong()).await,
    }
    state.send_modify(|s| s.apply(&control));
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut mailbox: Mailbox,
    mut pong_rx: watch::Receiver<Instant>,
    settings: SessionSettings,
) {
    let id = mailbox.id();
    let start = Instant::now() + settings.ping_period;
    let mut ticker = tokio::time::interval_at(start, settings.ping_period);

    // Re-armed on every pong.
    let liveness = tokio::time::sleep_until(*pong_rx.borrow_and_update() + settings.pong_wait);
    tokio::pin!(liveness);
    let mut pongs_open = true;

    loop {
        tokio::select! {
            next = mailbox.recv() => {
                let Some(first) = next else {
                    tracing::debug!(connection_id = %id, "mailbox closed");
                    let _ = send(&mut sink, Message::Close(None), settings.write_wait).await;
                    return;
                };
                let batch = mailbox.drain_ready(first, settings.max_batch);
                let frame = encode_batch(id, &batch);
                if frame.is_empty() {
                    continue;
                }
                if !send(&mut sink, Message::text(frame), settings.write_wait).await {
                    return;
                }
            }
            _ = ticker.tick() => {
                if !send(&mut sink, Message::Ping(Bytes::new()), settings.write_wait).await {
                    return;
                }
            }
            changed = pong_rx.changed(), if pongs_open => {
                if changed.is_ok() {
                    let last_pong = *pong_rx.borrow_and_update();
                    liveness.as_mut().reset(last_pong + settings.pong_wait);
                } else {
                    pongs_open = false;
                }
            }
            () = &mut liveness => {
                tracing::info!(connection_id = %id, "no pong received, closing connection");
                let _ = send(&mut sink, Message::Close(None), settings.write_wait).await;
                return;
            }
        }
    }
}

/// Joins the JSON form of each envelope with `\n`, skipping any that fail
/// to serialize.
fn encode_batch(id: ConnectionId, batch: &[std::sync::Arc<Envelope>]) -> String {
    let mut frame = String::new();
    for envelope in batch {
        match envelope.to_json() {
            Ok(json) => {
                if !frame.is_empty() {
                    frame.push('\n');
                }
                frame.push_str(&json);
            }
            Err(e) => tracing::error!(
                connection_id = %id,
                envelope = envelope.type_str(),
                error = %e,
                "failed to encode envelope"
            ),
        }
    }
    frame
}

async fn send(
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
    deadline: Duration,
) -> bool {
    match tokio::time::timeout(deadline, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "websocket write failed");
            false
        }
        Err(_) => {
            tracing::warn!(?deadline, "websocket write timed out");
            false
        }
    }
}
