//! Connection session: the single task that owns the push socket, its timers
//! and the subscription set.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::api::NotificationApi;
use crate::codec::{self, ClientFrame, ServerFrame};
use crate::config::Config;
use crate::heartbeat::{HeartbeatMonitor, HeartbeatTick, next_tick};
use crate::poll::{PollFallback, PollOutcome};
use crate::reconnect::{ReconnectScheduler, RetryDecision, sleep_until_retry};
use crate::store::SharedStore;
use crate::subscriptions::SubscriptionRegistry;
use crate::types::{
    ConnectionState, Error, ErrorKind, Event, Notification, Result, TokenSource,
};

// ---------------------------------------------------------------------------
// Type aliases for WebSocket split halves
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type WsRead = SplitStream<WsStream>;
type WsWrite = SplitSink<WsStream, tungstenite::Message>;

// ---------------------------------------------------------------------------
// Messages into the session task
// ---------------------------------------------------------------------------

/// Requests from the client handle.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    RequestHistory {
        limit: u32,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Reports from helper tasks. Socket reports carry the generation they were
/// started under; reports from a superseded generation are dropped.
enum Internal {
    Opened { generation: u64, ws: Box<WsStream> },
    OpenFailed { generation: u64, error: String },
    Frame { generation: u64, text: String },
    Closed {
        generation: u64,
        clean: bool,
        reason: Option<String>,
    },
    Polled(Result<PollOutcome>),
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

pub(crate) fn build_push_url(push_url: &str, token: &str) -> Result<String> {
    let mut u = url::Url::parse(push_url)?;
    u.query_pairs_mut().append_pair("token", token);
    Ok(u.to_string())
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

pub(crate) struct ConnectionSession {
    config: Config,
    get_token: TokenSource,
    api: NotificationApi,
    store: SharedStore,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: mpsc::Sender<Event>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    generation: u64,
    writer: Option<WsWrite>,
    reader: Option<JoinHandle<()>>,
    opener: Option<JoinHandle<()>>,
    poll_task: Option<JoinHandle<()>>,
    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectScheduler,
    poller: PollFallback,
    registry: SubscriptionRegistry,
    dropped_events: u64,
}

/// Receiving halves the session loop selects on.
pub(crate) struct SessionInbox {
    commands: mpsc::UnboundedReceiver<Command>,
    internal: mpsc::UnboundedReceiver<Internal>,
}

impl ConnectionSession {
    pub(crate) fn new(
        config: Config,
        get_token: TokenSource,
        api: NotificationApi,
        store: SharedStore,
        state_tx: watch::Sender<ConnectionState>,
        event_tx: mpsc::Sender<Event>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> (Self, SessionInbox) {
        let (internal_tx, internal) = mpsc::unbounded_channel();
        let session = Self {
            heartbeat: HeartbeatMonitor::new(
                config.heartbeat_interval,
                config.heartbeat_timeout_intervals,
            ),
            reconnect: ReconnectScheduler::new(
                config.reconnect_interval,
                config.max_reconnect_attempts,
            ),
            poller: PollFallback::new(
                config.poll_interval,
                config.poll_list,
                config.poll_page_size,
            ),
            config,
            get_token,
            api,
            store,
            state: ConnectionState::Disconnected,
            state_tx,
            event_tx,
            internal_tx,
            generation: 0,
            writer: None,
            reader: None,
            opener: None,
            poll_task: None,
            registry: SubscriptionRegistry::default(),
            dropped_events: 0,
        };
        (session, SessionInbox { commands, internal })
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

pub(crate) async fn run_session(
    mut s: ConnectionSession,
    mut inbox: SessionInbox,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                s.dispose().await;
                return;
            }

            cmd = inbox.commands.recv() => {
                match cmd {
                    Some(cmd) => s.handle_command(cmd).await,
                    None => {
                        s.dispose().await;
                        return;
                    }
                }
            }

            Some(event) = inbox.internal.recv() => {
                s.handle_internal(event).await;
            }

            _ = next_tick(s.heartbeat.timer_mut()) => {
                s.on_heartbeat_tick().await;
            }

            _ = sleep_until_retry(s.reconnect.retry_at()) => {
                s.on_retry_due();
            }

            _ = next_tick(s.poller.timer_mut()) => {
                s.on_poll_tick();
            }
        }
    }
}

impl ConnectionSession {
    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect().await,
            Command::Subscribe(topics) => {
                let added = self.registry.subscribe(topics);
                if self.state == ConnectionState::Connected && !added.is_empty() {
                    self.send_logged(&ClientFrame::Subscribe {
                        notification_types: added,
                    })
                    .await;
                }
            }
            Command::Unsubscribe(topics) => {
                let removed = self.registry.unsubscribe(topics);
                if self.state == ConnectionState::Connected && !removed.is_empty() {
                    self.send_logged(&ClientFrame::Unsubscribe {
                        notification_types: removed,
                    })
                    .await;
                }
            }
            Command::RequestHistory { limit, reply } => {
                let result = if self.state == ConnectionState::Connected {
                    self.send(&ClientFrame::RequestHistory { limit }).await
                } else {
                    Err(Error::NotConnected)
                };
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Opened { generation, ws } => {
                if self.is_current(generation) {
                    self.on_opened(*ws).await;
                } else {
                    debug!(generation, "discarding socket from superseded attempt");
                }
            }
            Internal::OpenFailed { generation, error } => {
                if self.is_current(generation) {
                    warn!(generation, error = %error, "push channel failed to open");
                    self.on_transport_failure(error);
                }
            }
            Internal::Frame { generation, text } => {
                if self.is_current(generation) {
                    self.on_frame(&text);
                } else {
                    trace!(generation, "dropping frame from superseded socket");
                }
            }
            Internal::Closed {
                generation,
                clean,
                reason,
            } => {
                if self.is_current(generation) {
                    self.on_closed(clean, reason);
                }
            }
            Internal::Polled(result) => self.on_polled(result),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.state != ConnectionState::Disconnected
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    fn connect(&mut self) {
        if !self.config.enabled {
            debug!("notifications disabled, ignoring connect");
            return;
        }
        if matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            debug!(state = %self.state, "connect ignored, already active");
            return;
        }
        let Some(token) = (self.get_token)() else {
            warn!("connect requested without a credential");
            self.emit(Event::Error {
                kind: ErrorKind::NoCredential,
                message: Error::NoCredential.to_string(),
            });
            return;
        };
        self.reconnect.reset();
        self.set_state(ConnectionState::Connecting);
        self.open(&token);
    }

    async fn disconnect(&mut self) {
        debug!(
            state = %self.state,
            retry_pending = self.reconnect.is_pending(),
            heartbeat_running = self.heartbeat.is_running(),
            "disconnecting"
        );
        self.reconnect.reset();
        self.heartbeat.stop();
        self.stop_polling();
        self.close_socket().await;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Start a socket open under a fresh generation.
    fn open(&mut self, token: &str) {
        self.abandon_socket();
        let generation = self.generation;
        let url = match build_push_url(&self.config.push_url, token) {
            Ok(url) => url,
            Err(e) => {
                self.on_transport_failure(e.to_string());
                return;
            }
        };
        debug!(generation, push_url = %self.config.push_url, "opening push channel");

        let tx = self.internal_tx.clone();
        let timeout = self.config.connect_timeout;
        self.opener = Some(tokio::spawn(async move {
            let event =
                match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)).await {
                    Ok(Ok((ws, _resp))) => Internal::Opened {
                        generation,
                        ws: Box::new(ws),
                    },
                    Ok(Err(e)) => Internal::OpenFailed {
                        generation,
                        error: e.to_string(),
                    },
                    Err(_) => Internal::OpenFailed {
                        generation,
                        error: format!("connect timed out after {}ms", timeout.as_millis()),
                    },
                };
            let _ = tx.send(event);
        }));
    }

    async fn on_opened(&mut self, ws: WsStream) {
        self.opener = None;
        let (writer, reader) = ws.split();
        self.writer = Some(writer);
        self.reader = Some(spawn_reader(
            reader,
            self.generation,
            self.internal_tx.clone(),
        ));
        self.reconnect.reset();
        self.stop_polling();
        self.set_state(ConnectionState::Connected);
        self.heartbeat.start();
        if let Some(frame) = self.registry.replay_frame() {
            debug!(topics = ?self.registry.topics(), "replaying subscriptions");
            self.send_logged(&frame).await;
        }
    }

    fn on_closed(&mut self, clean: bool, reason: Option<String>) {
        if clean {
            info!(reason = ?reason, "server closed push channel normally");
            self.abandon_socket();
            self.heartbeat.stop();
            self.reconnect.reset();
            self.set_state(ConnectionState::Disconnected);
            return;
        }
        warn!(reason = ?reason, "push channel closed abnormally");
        self.on_transport_failure(reason.unwrap_or_else(|| "connection closed".to_string()));
    }

    /// Failed open, abnormal close or stale heartbeat: retry or give up on push.
    fn on_transport_failure(&mut self, message: String) {
        self.abandon_socket();
        self.heartbeat.stop();
        self.emit(Event::Error {
            kind: ErrorKind::Transport,
            message,
        });
        match self.reconnect.on_failure() {
            RetryDecision::Scheduled { attempt, delay } => {
                info!(
                    attempt,
                    max_attempts = self.reconnect.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                self.set_state(ConnectionState::Reconnecting);
            }
            RetryDecision::Exhausted => {
                let max = self.reconnect.max_attempts();
                error!(max_attempts = max, "reconnect attempts exhausted, falling back to polling");
                self.set_state(ConnectionState::Failed);
                self.emit(Event::Error {
                    kind: ErrorKind::RetriesExhausted,
                    message: format!("Push connection failed after {max} attempts"),
                });
                self.poller.activate();
            }
        }
    }

    fn on_retry_due(&mut self) {
        if !self.reconnect.take_due() {
            return;
        }
        if self.state != ConnectionState::Reconnecting {
            debug!(state = %self.state, "retry fired outside reconnecting, ignoring");
            return;
        }
        let Some(token) = (self.get_token)() else {
            warn!("credential gone during reconnect, stopping");
            self.reconnect.reset();
            self.emit(Event::Error {
                kind: ErrorKind::NoCredential,
                message: Error::NoCredential.to_string(),
            });
            self.set_state(ConnectionState::Disconnected);
            return;
        };
        info!(attempt = self.reconnect.attempts(), "reconnecting");
        self.open(&token);
    }

    /// Drop the current socket and bump the generation so that anything its
    /// helper tasks already queued is ignored.
    fn abandon_socket(&mut self) {
        if let Some(h) = self.reader.take() {
            h.abort();
        }
        if let Some(h) = self.opener.take() {
            h.abort();
        }
        self.writer = None;
        self.generation += 1;
    }

    /// Send a normal close frame (code 1000) if a socket is open, then abandon it.
    async fn close_socket(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: Utf8Bytes::from_static("client disconnect"),
            };
            if let Err(e) = writer.send(tungstenite::Message::Close(Some(frame))).await {
                debug!(error = %e, "failed to send close frame");
            }
        }
        self.abandon_socket();
    }

    async fn dispose(&mut self) {
        self.reconnect.cancel();
        self.heartbeat.stop();
        self.stop_polling();
        self.close_socket().await;
        self.set_state(ConnectionState::Disconnected);
        info!(dropped_events = self.dropped_events, "notification session stopped");
    }

    // -----------------------------------------------------------------------
    // Inbound frames
    // -----------------------------------------------------------------------

    fn on_frame(&mut self, text: &str) {
        let frame = match codec::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };
        match frame {
            ServerFrame::Notification { notification } => self.ingest(notification),
            ServerFrame::HeartbeatAck => {
                trace!("heartbeat ack");
                self.heartbeat.on_ack();
            }
            ServerFrame::ConnectionStatus { status } => {
                info!(status = %status, "server connection status");
                self.emit(Event::ServerStatus(status));
            }
        }
    }

    fn ingest(&mut self, notification: Notification) {
        let inserted = self.store.lock().ingest(notification.clone());
        if inserted {
            debug!(id = notification.id, kind = %notification.kind, "notification ingested");
            self.emit(Event::Notification(notification));
        } else {
            trace!(id = notification.id, "duplicate notification ignored");
        }
    }

    // -----------------------------------------------------------------------
    // Heartbeat
    // -----------------------------------------------------------------------

    async fn on_heartbeat_tick(&mut self) {
        if self.state != ConnectionState::Connected {
            self.heartbeat.stop();
            return;
        }
        match self.heartbeat.on_tick() {
            HeartbeatTick::Send => self.send_logged(&ClientFrame::Heartbeat).await,
            HeartbeatTick::Stale => {
                warn!(
                    since_last_ack_ms = self
                        .heartbeat
                        .last_ack()
                        .map(|t| t.elapsed().as_millis() as u64),
                    "heartbeat ack overdue, forcing reconnect"
                );
                self.on_transport_failure("heartbeat timeout".to_string());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Polling fallback
    // -----------------------------------------------------------------------

    fn on_poll_tick(&mut self) {
        if !self.poller.should_fire(self.state) {
            if self.state == ConnectionState::Connected {
                self.stop_polling();
            }
            return;
        }
        if (self.get_token)().is_none() {
            debug!("no credential, skipping poll");
            return;
        }
        let round = self.poller.begin();
        let api = self.api.clone();
        let tx = self.internal_tx.clone();
        self.poll_task = Some(tokio::spawn(async move {
            let _ = tx.send(Internal::Polled(round.run(api).await));
        }));
    }

    fn on_polled(&mut self, result: Result<PollOutcome>) {
        self.poll_task = None;
        match result {
            Ok(outcome) => {
                // A round queued before polling stopped still carries
                // notifications, but its count is stale.
                if !self.poller.is_active() {
                    debug!(unread = outcome.unread, "ignoring count from stopped poll round");
                } else if self.poller.finish(Some(outcome.unread)) {
                    self.emit(Event::UnreadCount(outcome.unread));
                }
                if let Some(page) = outcome.page {
                    for notification in page.notifications {
                        self.ingest(notification);
                    }
                }
            }
            Err(e) => {
                if self.poller.is_active() {
                    self.poller.finish(None);
                }
                warn!(error = %e, "poll failed");
            }
        }
    }

    fn stop_polling(&mut self) {
        if let Some(h) = self.poll_task.take() {
            h.abort();
        }
        if self.poller.is_active() {
            debug!("polling stopped");
        }
        self.poller.deactivate();
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    async fn send(&mut self, frame: &ClientFrame) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::NotConnected);
        };
        let text = codec::encode(frame)?;
        writer.send(tungstenite::Message::Text(text.into())).await?;
        Ok(())
    }

    /// Send and log failures. A broken socket is reported by the reader task.
    async fn send_logged(&mut self, frame: &ClientFrame) {
        if let Err(e) = self.send(frame).await {
            warn!(error = %e, frame = ?frame, "failed to send frame");
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        let previous = self.state;
        if previous == state && state != ConnectionState::Reconnecting {
            return;
        }
        self.state = state;
        info!(from = %previous, to = %state, "connection state changed");
        self.state_tx.send_replace(state);
        self.emit(Event::StateChanged(state));
    }

    /// Non-blocking publish. A consumer that falls behind loses events rather
    /// than stalling the session; current state stays readable via the watch.
    fn emit(&mut self, event: Event) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped_events += 1;
                warn!(
                    total_dropped = self.dropped_events,
                    "event channel full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("event receiver gone");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Socket reader
// ---------------------------------------------------------------------------

fn spawn_reader(
    mut reader: WsRead,
    generation: u64,
    tx: mpsc::UnboundedSender<Internal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (clean, reason) = loop {
            match reader.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    let frame = Internal::Frame {
                        generation,
                        text: text.as_str().to_owned(),
                    };
                    if tx.send(frame).is_err() {
                        return;
                    }
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    let clean = frame.as_ref().is_some_and(|f| f.code == CloseCode::Normal);
                    break (clean, frame.map(|f| f.reason.as_str().to_owned()));
                }
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    warn!(generation, len = data.len(), "dropping binary frame");
                }
                Some(Ok(_)) => {
                    // Ping, pong and raw frames
                }
                Some(Err(e)) => break (false, Some(e.to_string())),
                None => break (false, Some("stream ended".to_string())),
            }
        };
        let _ = tx.send(Internal::Closed {
            generation,
            clean,
            reason,
        });
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
