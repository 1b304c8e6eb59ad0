//! Reconnecting WebSocket transport for the presence client.
//!
//! [`PresenceClient::run`] owns the adapter and the lifecycle on a single
//! task. The host talks to it through a [`ClientHandle`]: pose changes and
//! introduce requests go in over a channel, link status comes out over a
//! `watch` channel.
//!
//! Every successful (re)connection re-sends `character-join`, so the relay
//! always sees a fresh identification. While offline, pose changes still
//! update the local participant and are carried by the next join.

use crate::adapter::{ClientPresenceAdapter, PresenceObserver};
use crate::error::ClientError;
use crate::lifecycle::{
    ConnectOutcome, ConnectionLifecycle, LinkSnapshot, ReconnectPolicy, RetryDecision,
};
use futures_util::{SinkExt, StreamExt};
use presence_core::{ParticipantRecord, ProtocolEvent, Rotation, Vec3};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay WebSocket URL, e.g. `ws://127.0.0.1:8835`
    pub url: String,
    /// Time between `character-ping`s while connected
    pub ping_interval: Duration,
    /// Reconnection backoff and cap
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8835".to_string(),
            ping_interval: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Requests from the host to the transport task.
#[derive(Debug)]
enum Intent {
    Move(Vec3),
    Rotate(Rotation),
    Introduce,
    Snapshot(oneshot::Sender<Vec<ParticipantRecord>>),
    Close,
}

/// Host-side handle to a running [`PresenceClient`].
#[derive(Debug, Clone)]
pub struct ClientHandle {
    intents: mpsc::UnboundedSender<Intent>,
    status: watch::Receiver<LinkSnapshot>,
}

impl ClientHandle {
    /// Moves the local participant.
    pub fn move_to(&self, position: Vec3) {
        self.submit(Intent::Move(position));
    }

    /// Turns the local participant.
    pub fn rotate_to(&self, rotation: Rotation) {
        self.submit(Intent::Rotate(rotation));
    }

    /// Asks the relay to resend its roster.
    pub fn introduce(&self) {
        self.submit(Intent::Introduce);
    }

    /// Closes the connection and stops the client.
    pub fn close(&self) {
        self.submit(Intent::Close);
    }

    /// Snapshot of the client's mirror, or `None` if the client has stopped.
    pub async fn participants(&self) -> Option<Vec<ParticipantRecord>> {
        let (tx, rx) = oneshot::channel();
        self.intents.send(Intent::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    /// The latest published link status.
    pub fn status(&self) -> LinkSnapshot {
        *self.status.borrow()
    }

    /// A receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<LinkSnapshot> {
        self.status.clone()
    }

    /// Waits until the published status satisfies `predicate`.
    ///
    /// Returns the matching snapshot, or `None` if the client stopped first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Option<LinkSnapshot>
    where
        F: FnMut(&LinkSnapshot) -> bool,
    {
        let mut status = self.status.clone();
        let matched = status
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .ok()
            .map(|snapshot| *snapshot);
        matched
    }

    fn submit(&self, intent: Intent) {
        if self.intents.send(intent).is_err() {
            debug!("Presence client already stopped");
        }
    }
}

/// How a connected session ended.
enum SessionEnd {
    /// The host asked to stop
    Closed,
    /// The link dropped
    Lost,
}

/// A presence client bound to one relay URL.
pub struct PresenceClient<O: PresenceObserver> {
    config: ClientConfig,
    adapter: ClientPresenceAdapter<O>,
    lifecycle: ConnectionLifecycle,
    intents: mpsc::UnboundedReceiver<Intent>,
    status: watch::Sender<LinkSnapshot>,
}

impl<O: PresenceObserver> PresenceClient<O> {
    /// Creates a client and the handle that controls it.
    ///
    /// Nothing connects until [`run`](Self::run) is awaited, so observers
    /// are in place before the first event arrives.
    pub fn new(config: ClientConfig, adapter: ClientPresenceAdapter<O>) -> (Self, ClientHandle) {
        let lifecycle = ConnectionLifecycle::new(config.reconnect.clone());
        let (intents_tx, intents_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(lifecycle.snapshot());
        let client = Self {
            config,
            adapter,
            lifecycle,
            intents: intents_rx,
            status: status_tx,
        };
        let handle = ClientHandle {
            intents: intents_tx,
            status: status_rx,
        };
        (client, handle)
    }

    /// Connects, keeps the link alive and reconnects until closed or the
    /// reconnection cap is reached.
    ///
    /// # Returns
    ///
    /// The adapter after a requested close, or [`ClientError::GaveUp`].
    pub async fn run(mut self) -> Result<ClientPresenceAdapter<O>, ClientError> {
        loop {
            self.lifecycle.begin_attempt()?;
            self.publish();
            debug!("🔌 Connecting to {}", self.config.url);

            let delay = match connect_async(self.config.url.as_str()).await {
                Ok((socket, _)) => {
                    match self.lifecycle.on_connected() {
                        ConnectOutcome::Connected => info!("✅ Connected to {}", self.config.url),
                        ConnectOutcome::Reconnected => info!(
                            "🔁 Reconnected to {} ({} reconnects)",
                            self.config.url,
                            self.lifecycle.reconnects()
                        ),
                    }
                    self.publish();

                    match self.session(socket).await {
                        SessionEnd::Closed => {
                            self.lifecycle.on_disconnected();
                            self.publish();
                            info!("👋 Presence client closed");
                            return Ok(self.adapter);
                        }
                        SessionEnd::Lost => {
                            self.lifecycle.on_disconnected();
                            self.publish();
                            warn!("⚠️ Lost connection to {}", self.config.url);
                            self.lifecycle.next_delay()
                        }
                    }
                }
                Err(e) => {
                    warn!("❌ connect_error: {}", e);
                    match self.lifecycle.on_attempt_failed() {
                        RetryDecision::RetryAfter(delay) => delay,
                        RetryDecision::GiveUp => {
                            self.publish();
                            let attempts = self.lifecycle.failed_attempts();
                            error!("💀 reconnect_failed after {} attempts", attempts);
                            return Err(ClientError::GaveUp { attempts });
                        }
                    }
                }
            };

            self.publish();
            info!(
                "⏳ reconnect_attempt {} in {:.1}s",
                self.lifecycle.failed_attempts() + 1,
                delay.as_secs_f64()
            );
            if !self.wait_offline(delay).await {
                info!("👋 Presence client closed while offline");
                return Ok(self.adapter);
            }
        }
    }

    /// Runs one connected session.
    async fn session(&mut self, socket: Socket) -> SessionEnd {
        let (mut sink, mut stream) = socket.split();

        let join = self.adapter.on_connected();
        if let Err(e) = send_event(&mut sink, &join).await {
            warn!("Failed to send join: {}", e);
            return SessionEnd::Lost;
        }

        let period = self.config.ping_interval;
        let mut pings = interval_at(Instant::now() + period, period);
        pings.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let outbound = tokio::select! {
                frame = stream.next() => match frame {
                    // Rejections are logged by the adapter.
                    Some(Ok(Message::Text(text))) => {
                        self.adapter.apply_inbound_text(text.as_str()).ok().flatten()
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("🔌 Relay closed the connection: {:?}", frame);
                        return SessionEnd::Lost;
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        return SessionEnd::Lost;
                    }
                    None => return SessionEnd::Lost,
                },
                intent = self.intents.recv() => match intent {
                    Some(Intent::Move(position)) => Some(self.adapter.move_to(position)),
                    Some(Intent::Rotate(rotation)) => Some(self.adapter.rotate_to(rotation)),
                    Some(Intent::Introduce) => Some(self.adapter.request_introduce()),
                    Some(Intent::Snapshot(reply)) => {
                        let _ = reply.send(self.adapter.participants());
                        None
                    }
                    Some(Intent::Close) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Closed;
                    }
                },
                _ = pings.tick() => Some(self.adapter.ping()),
            };

            if let Some(event) = outbound {
                if let Err(e) = send_event(&mut sink, &event).await {
                    warn!("Failed to send {}: {}", event.name(), e);
                    return SessionEnd::Lost;
                }
            }
        }
    }

    /// Sleeps for `delay` while still serving host intents.
    ///
    /// Returns false if the host asked to stop.
    async fn wait_offline(&mut self, delay: Duration) -> bool {
        let wake = sleep(delay);
        tokio::pin!(wake);
        loop {
            tokio::select! {
                _ = &mut wake => return true,
                intent = self.intents.recv() => match intent {
                    Some(Intent::Move(position)) => {
                        self.adapter.move_to(position);
                    }
                    Some(Intent::Rotate(rotation)) => {
                        self.adapter.rotate_to(rotation);
                    }
                    Some(Intent::Introduce) => {
                        debug!("Introduce dropped while offline");
                    }
                    Some(Intent::Snapshot(reply)) => {
                        let _ = reply.send(self.adapter.participants());
                    }
                    Some(Intent::Close) | None => return false,
                },
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.lifecycle.snapshot();
        debug!("Link status: {} ({} reconnects)", snapshot.status, snapshot.reconnects);
        self.status.send_replace(snapshot);
    }
}

async fn send_event<S>(sink: &mut S, event: &ProtocolEvent) -> Result<(), ClientError>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = event.encode()?;
    sink.send(Message::text(text))
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))
}
