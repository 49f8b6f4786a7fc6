//! Public entry point: [`NotificationClient`].

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ClearFilter, ListPage, ListQuery, NotificationApi};
use crate::config::Config;
use crate::connection::{Command, ConnectionSession, run_session};
use crate::store::{NotificationFilter, Page, Query, SharedStore};
use crate::types::{ConnectionState, Error, Event, NotificationId, Result, TokenSource};

/// Handle to a running notification session.
///
/// The session task owns the push socket, heartbeat, reconnect and polling
/// timers. This handle sends it commands, reads the shared store and receives
/// [`Event`]s through [`next`](NotificationClient::next).
///
/// Events may be dropped under backpressure if the consumer falls behind;
/// [`state`](NotificationClient::state) and the store always reflect the latest values.
///
/// Dropping the handle stops the session and closes the socket.
pub struct NotificationClient {
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::Receiver<Event>,
    state: watch::Receiver<ConnectionState>,
    store: SharedStore,
    api: NotificationApi,
    shutdown: CancellationToken,
}

impl NotificationClient {
    /// Validate `config`, spawn the session task and, if `auto_connect` is
    /// set, request a connection.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: Config, get_token: TokenSource) -> Result<Self> {
        config.validate()?;
        let api = NotificationApi::new(
            &config.api_base_url,
            config.request_timeout,
            get_token.clone(),
        )?;
        let store = SharedStore::new();
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let auto_connect = config.enabled && config.auto_connect;

        let (session, inbox) = ConnectionSession::new(
            config,
            get_token,
            api.clone(),
            store.clone(),
            state_tx,
            event_tx,
            cmd_rx,
        );
        tokio::spawn(run_session(session, inbox, shutdown.clone()));

        let client = Self {
            commands: cmd_tx,
            events: event_rx,
            state: state_rx,
            store,
            api,
            shutdown,
        };
        if auto_connect {
            client.connect()?;
        }
        Ok(client)
    }

    /// Open the push channel. No-op when already connected or connecting.
    ///
    /// Without a credential no attempt is made; an
    /// [`ErrorKind::NoCredential`](crate::ErrorKind::NoCredential) event is emitted instead.
    pub fn connect(&self) -> Result<()> {
        self.command(Command::Connect)
    }

    /// Close the push channel, cancel any pending retry and stop polling.
    pub fn disconnect(&self) -> Result<()> {
        self.command(Command::Disconnect)
    }

    /// Add topics. Recorded immediately and sent to the server when connected;
    /// replayed on every later connection.
    pub fn subscribe<I, S>(&self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command(Command::Subscribe(
            topics.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn unsubscribe<I, S>(&self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command(Command::Unsubscribe(
            topics.into_iter().map(Into::into).collect(),
        ))
    }

    /// Ask the server to replay recent notifications over the push channel.
    ///
    /// Returns [`Error::NotConnected`] unless the push channel is connected.
    pub async fn request_history(&self, limit: u32) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::RequestHistory { limit, reply })?;
        rx.await.map_err(|_| Error::Closed)?
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A watch on the connection state, for callers that only care about the latest value.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Receive the next event. Returns `None` once the session task has exited.
    pub async fn next(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn unread_count(&self) -> usize {
        self.store.lock().unread_count()
    }

    pub fn query(&self, query: &Query) -> Page {
        self.store.lock().query(query)
    }

    /// Mark one notification read locally, then on the server.
    ///
    /// The local change stands even if the request fails. Returns whether the
    /// notification was unread locally.
    pub async fn mark_read(&self, id: NotificationId) -> Result<bool> {
        let was_unread = self.store.lock().mark_read(id);
        self.api.mark_read(id).await?;
        Ok(was_unread)
    }

    /// Mark everything read locally, then on the server. Returns the local count changed.
    pub async fn mark_all_read(&self) -> Result<usize> {
        let changed = self.store.lock().mark_all_read();
        self.api.mark_all_read().await?;
        Ok(changed)
    }

    /// Remove matching notifications locally, then on the server. Returns the
    /// local count removed.
    pub async fn clear(&self, filter: &ClearFilter) -> Result<usize> {
        let local = NotificationFilter {
            kind: filter.kind.clone(),
            status: filter.status,
            ..Default::default()
        };
        let removed = self.store.lock().clear(&local);
        self.api.clear(filter).await?;
        Ok(removed)
    }

    /// Fetch one page over REST and merge it into the store.
    pub async fn refresh(&self, query: &ListQuery) -> Result<ListPage> {
        let page = self.api.list(query).await?;
        let mut store = self.store.lock();
        let added = page
            .notifications
            .iter()
            .filter(|n| store.ingest((*n).clone()))
            .count();
        drop(store);
        debug!(fetched = page.notifications.len(), added, "refreshed notifications");
        Ok(page)
    }

    /// Stop the session and close the socket.
    pub fn close(self) {
        self.shutdown.cancel();
    }

    fn command(&self, cmd: Command) -> Result<()> {
        self.commands.send(cmd).map_err(|_| Error::Closed)
    }
}

impl Drop for NotificationClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
