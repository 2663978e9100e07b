//! Relay client.
//!
//! [`RelayClient`] owns a background tokio task per connection cycle. The
//! public API talks to it over an mpsc command channel; the task owns the
//! transport, the reconnect loop and the notice limiter. State that both
//! sides need (subscription registry, connection state, notification
//! channels, timer accounting) lives in [`Shared`].
//!
//! A cycle starts with `connect()` from `disconnected` or `failed` and ends
//! with a normal close, an explicit `disconnect()`, or a `failed` state.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::confirmation::ActionConfirmation;
use crate::error::{RelayError, RelayResult};
use crate::event::{Event, Filter};
use crate::network::validate_relay_url;
use crate::relay::backoff::Backoff;
use crate::relay::dispatch::Dispatcher;
use crate::relay::message::ClientMessage;
use crate::relay::notice::NoticeLimiter;
use crate::relay::notify::{Eose, Notifier, PublishResult, ReconnectAttempt};
use crate::relay::subscriptions::{SubscriptionHandle, SubscriptionId, SubscriptionRegistry};
use crate::relay::timer::{TimerKind, Timers};
use crate::relay::transport::{
    is_normal_close, Connector, OutboundFrame, Transport, TransportEvent, CLOSE_ABNORMAL,
    CLOSE_NORMAL,
};
use crate::relay::{ConnectionChange, ConnectionState, RelayConfig};

/// How long `disconnect()` waits for the task before aborting it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Commands from public API to background task ─────────────────────────────

enum Command {
    /// Send REQ for subscriptions not yet declared on this connection
    Flush,
    Close(SubscriptionId),
    /// Connect now; skips any pending backoff delay
    Connect(oneshot::Sender<RelayResult<()>>),
    Disconnect,
}

// ─── Disconnect reasons for reconnection decision ────────────────────────────

enum DisconnectReason {
    UserRequested,
    Closed { code: u16, reason: String },
}

enum Opened {
    Open(Transport),
    Failed(RelayError),
    Stopped,
}

// ─── Shared state ────────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct Shared {
    registry: Mutex<SubscriptionRegistry>,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    state: AtomicU8,
    pub(crate) notifier: Notifier,
    timers: Timers,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Flush => f.write_str("Flush"),
            Command::Close(id) => write!(f, "Close({})", id),
            Command::Connect(_) => f.write_str("Connect"),
            Command::Disconnect => f.write_str("Disconnect"),
        }
    }
}

impl Shared {
    fn new(channel_capacity: usize) -> Self {
        Self {
            registry: Mutex::new(SubscriptionRegistry::new()),
            commands: Mutex::new(None),
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            notifier: Notifier::new(channel_capacity),
            timers: Timers::new(),
        }
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, SubscriptionRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commands(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Command>>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::SeqCst))
    }

    /// Move to `change.state`. Same-state transitions emit nothing.
    fn transition(&self, change: ConnectionChange) -> bool {
        let previous = ConnectionState::from(self.state.swap(change.state as u8, Ordering::SeqCst));
        if previous == change.state {
            return false;
        }
        tracing::info!("Relay connection {} -> {}", previous, change.state);
        self.notifier.connection_change(change);
        true
    }

    /// Hand a command to the running task, if there is one.
    fn send_command(&self, cmd: Command) -> RelayResult<()> {
        match self.commands().as_ref() {
            Some(tx) => tx.send(cmd).map_err(RelayError::from),
            None => Err(RelayError::NotConnected),
        }
    }

    pub(crate) fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let removed = self.registry().remove(id);
        if removed {
            tracing::debug!("Unsubscribed {}", id);
            // No task, no socket: nothing to close
            let _ = self.send_command(Command::Close(id.clone()));
        }
        removed
    }
}

// ─── Public RelayClient ──────────────────────────────────────────────────────

/// Client for a single NIP-01 relay.
///
/// ```ignore
/// let mut client = RelayClient::new(RelayConfig::new("wss://relay.example.com"))?;
/// let mut confirmations = client.confirmations();
/// client.connect().await?;
/// client.subscribe(vec![Filter::new().kinds(vec![30078])], |event| {
///     println!("{}", event.id);
/// })?;
/// ```
pub struct RelayClient {
    config: RelayConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    task_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RelayClient {
    /// Create a client using the `tokio-tungstenite` transport. Does not
    /// connect yet.
    #[cfg(feature = "ws-native")]
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        Self::with_connector(config, crate::relay::native::TungsteniteConnector)
    }

    /// Create a client over a custom transport.
    pub fn with_connector(config: RelayConfig, connector: impl Connector) -> RelayResult<Self> {
        validate_relay_url(&config.url)?;
        let shared = Arc::new(Shared::new(config.channel_capacity));
        Ok(Self {
            config,
            connector: Arc::new(connector),
            shared,
            task_handle: None,
        })
    }

    /// Connect to the relay.
    ///
    /// Resolves once the socket is open. From `connected` this is a no-op;
    /// while `reconnecting` it cuts the backoff short and resolves with the
    /// outcome of the next attempt. If the cycle ends before it can answer,
    /// a new cycle is started.
    pub async fn connect(&mut self) -> RelayResult<()> {
        match self.state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                if let Some(result) = self.join_running_cycle().await {
                    return result;
                }
                tracing::debug!("Relay task gone, starting a new cycle");
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {}
        }

        // A finished cycle leaves its task winding down
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        *self.shared.commands() = Some(cmd_tx);
        self.shared
            .transition(ConnectionChange::plain(ConnectionState::Connecting));

        let (reply_tx, reply_rx) = oneshot::channel();
        let session = Session {
            shared: Arc::clone(&self.shared),
            connector: Arc::clone(&self.connector),
            url: self.config.url.clone(),
            backoff: self.config.backoff(),
            connect_timeout: self.config.connect_timeout,
            auto_reconnect: self.config.auto_reconnect,
            max_reconnect_attempts: self.config.max_reconnect_attempts,
            cmd_rx,
            dispatcher: Dispatcher::new(NoticeLimiter::new(
                self.config.notice_limit,
                self.config.notice_window,
            )),
            reconnect: ReconnectContext::default(),
            // Set from the registry on open
            epoch: 0,
            waiters: vec![reply_tx],
        };

        tracing::info!("Connecting to relay {}", self.config.url);
        self.task_handle = Some(tokio::spawn(run_task(session)));

        reply_rx.await.map_err(|_| RelayError::ChannelClosed)?
    }

    /// Ask the running task to attempt now and wait for the outcome.
    /// `None` when the task has already exited.
    async fn join_running_cycle(&self) -> Option<RelayResult<()>> {
        let (tx, rx) = oneshot::channel();
        self.shared.send_command(Command::Connect(tx)).ok()?;
        rx.await.ok()
    }

    /// Close the connection and forget every subscription.
    ///
    /// Cancels any pending reconnect or connect timeout. Calling this while
    /// already disconnected does nothing beyond clearing the registry.
    pub async fn disconnect(&mut self) {
        let sender = self.shared.commands().take();
        if let Some(tx) = sender {
            let _ = tx.send(Command::Disconnect);
        }

        if let Some(mut handle) = self.task_handle.take() {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("Relay task did not stop in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }

        self.shared.registry().clear();
        self.shared
            .transition(ConnectionChange::plain(ConnectionState::Disconnected));
    }

    /// Disconnect and release the client.
    pub async fn dispose(mut self) {
        self.disconnect().await;
    }

    /// Register a subscription.
    ///
    /// The REQ goes out immediately when connected, otherwise on the next
    /// successful connection. `handler` runs on the connection task; a
    /// panic inside it is reported as a diagnostic and does not affect
    /// other subscriptions.
    pub fn subscribe<F>(&self, filters: Vec<Filter>, handler: F) -> RelayResult<SubscriptionHandle>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self
            .shared
            .registry()
            .insert(filters.clone(), Arc::new(handler))?;
        tracing::debug!("Subscribed {} ({} filter(s))", id, filters.len());

        // Without a task the REQ is sent on the next connect
        let _ = self.shared.send_command(Command::Flush);

        Ok(SubscriptionHandle::new(
            id,
            filters,
            Arc::downgrade(&self.shared),
        ))
    }

    /// Remove a subscription, sending CLOSE if connected. Returns `false`
    /// when the id was not registered.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        self.shared.unsubscribe(id)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the WebSocket is currently open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Relay URL this client was created for.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Configuration the client was created with.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Number of registered subscriptions, connected or not.
    pub fn subscription_count(&self) -> usize {
        self.shared.registry().len()
    }

    /// Connect-timeout and backoff timers currently alive.
    pub fn live_timers(&self) -> usize {
        self.shared.timers.live()
    }

    // ── Notification channels ───────────────────────────────────────────

    /// State transitions. Same-state transitions are not reported.
    pub fn connection_changes(&self) -> broadcast::Receiver<ConnectionChange> {
        self.shared.notifier.subscribe_connection()
    }

    /// Every scheduled reconnect attempt with its backoff delay.
    pub fn reconnect_attempts(&self) -> broadcast::Receiver<ReconnectAttempt> {
        self.shared.notifier.subscribe_reconnect_attempts()
    }

    /// Message-level errors and handler failures.
    pub fn diagnostics(&self) -> broadcast::Receiver<RelayError> {
        self.shared.notifier.subscribe_diagnostics()
    }

    /// End of stored events, per subscription.
    pub fn eose(&self) -> broadcast::Receiver<Eose> {
        self.shared.notifier.subscribe_eose()
    }

    /// Relay `OK` answers.
    pub fn publish_results(&self) -> broadcast::Receiver<PublishResult> {
        self.shared.notifier.subscribe_publish_results()
    }

    /// Rate-limited relay NOTICE text.
    pub fn notices(&self) -> broadcast::Receiver<String> {
        self.shared.notifier.subscribe_notices()
    }

    /// Action confirmations decoded from kind-30078 events.
    pub fn confirmations(&self) -> broadcast::Receiver<ActionConfirmation> {
        self.shared.notifier.subscribe_confirmations()
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

// ─── Background task ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ReconnectContext {
    attempts: u32,
}

struct Session {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    url: String,
    backoff: Backoff,
    connect_timeout: Duration,
    auto_reconnect: bool,
    max_reconnect_attempts: u32,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    dispatcher: Dispatcher,
    reconnect: ReconnectContext,
    /// Registry epoch of the current connection
    epoch: u64,
    /// `connect()` calls waiting on the next attempt
    waiters: Vec<oneshot::Sender<RelayResult<()>>>,
}

impl Session {
    fn reply_all(&mut self, result: RelayResult<()>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }

    fn fail(&mut self, error: RelayError) {
        tracing::error!("Relay connection failed: {}", error);
        self.shared.transition(ConnectionChange::failed(error.clone()));
        self.reply_all(Err(error));
    }
}

async fn run_task(mut session: Session) {
    // ── 1. Initial connection ────────────────────────────────────────────
    let mut transport = match open(&mut session).await {
        Opened::Open(transport) => transport,
        Opened::Failed(e) => {
            session.fail(e);
            return;
        }
        Opened::Stopped => {
            session.reply_all(Err(RelayError::NotConnected));
            return;
        }
    };

    loop {
        // ── 2. Connected ─────────────────────────────────────────────────
        session.reconnect.attempts = 0;
        session.epoch = session.shared.registry().begin_epoch();
        session
            .shared
            .transition(ConnectionChange::plain(ConnectionState::Connected));
        session.reply_all(Ok(()));

        // ── 3. Declare every live subscription ───────────────────────────
        flush_pending(&mut session, &mut transport).await;

        // ── 4. Inner select! loop ────────────────────────────────────────
        let reason = run_connected(&mut session, &mut transport).await;

        // ── 5. Post-disconnect decision ──────────────────────────────────
        match reason {
            DisconnectReason::UserRequested => return,
            DisconnectReason::Closed { code, reason } if is_normal_close(code) => {
                tracing::info!("Relay closed connection: {} {}", code, reason);
                session
                    .shared
                    .transition(ConnectionChange::plain(ConnectionState::Disconnected));
                return;
            }
            DisconnectReason::Closed { code, reason } => {
                tracing::warn!("Relay connection lost: {} {}", code, reason);
                if !session.auto_reconnect {
                    session.fail(RelayError::ConnectionClosed { code, reason });
                    return;
                }
                match reconnect(&mut session).await {
                    Some(next) => transport = next,
                    None => return,
                }
            }
        }
    }
}

/// The inner connected loop. Runs until the connection breaks.
async fn run_connected(session: &mut Session, transport: &mut Transport) -> DisconnectReason {
    loop {
        tokio::select! {
            // ── a) Incoming frame ────────────────────────────────────────
            event = transport.stream.next() => {
                match event {
                    Some(TransportEvent::Text(text)) => {
                        session.dispatcher.dispatch(&session.shared, &text);
                    }
                    Some(TransportEvent::Closed { code, reason }) => {
                        return DisconnectReason::Closed { code, reason };
                    }
                    Some(TransportEvent::Error(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        session.shared.notifier.diagnostic(RelayError::WebSocket(e.clone()));
                        return DisconnectReason::Closed { code: CLOSE_ABNORMAL, reason: e };
                    }
                    None => {
                        return DisconnectReason::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: "Stream ended".into(),
                        };
                    }
                }
            }

            // ── b) Command from public API ───────────────────────────────
            cmd = session.cmd_rx.recv() => {
                match cmd {
                    Some(Command::Flush) => flush_pending(session, transport).await,
                    Some(Command::Close(id)) => {
                        send_frame(transport, &ClientMessage::close(id.as_str())).await;
                    }
                    Some(Command::Connect(reply)) => {
                        let _ = reply.send(Ok(()));
                    }
                    Some(Command::Disconnect) | None => {
                        let _ = transport.sink.send(OutboundFrame::Close {
                            code: CLOSE_NORMAL,
                            reason: "Normal closure".into(),
                        }).await;
                        return DisconnectReason::UserRequested;
                    }
                }
            }
        }
    }
}

/// Back off and retry until a connection opens or the cycle ends.
async fn reconnect(session: &mut Session) -> Option<Transport> {
    loop {
        let delay = session.backoff.delay_for_attempt(session.reconnect.attempts);
        let next_attempt = session.reconnect.attempts + 1;

        // ── Wait out the backoff ─────────────────────────────────────────
        {
            let timer = session.shared.timers.start(TimerKind::Backoff, delay);
            tokio::pin!(timer);

            session
                .shared
                .transition(ConnectionChange::reconnecting(next_attempt, delay));
            session.shared.notifier.reconnect_attempt(next_attempt, delay);
            tracing::info!(
                "Reconnect attempt {} in {:?} (max {})",
                next_attempt,
                delay,
                session.max_reconnect_attempts
            );

            loop {
                tokio::select! {
                    () = &mut timer => break,
                    cmd = session.cmd_rx.recv() => {
                        match cmd {
                            Some(Command::Connect(reply)) => {
                                session.waiters.push(reply);
                                break;
                            }
                            // Registry already updated; REQs go out on open
                            Some(Command::Flush) | Some(Command::Close(_)) => {}
                            Some(Command::Disconnect) | None => return None,
                        }
                    }
                }
            }
        }

        session.reconnect.attempts = next_attempt;
        let max = session.max_reconnect_attempts;
        if max > 0 && session.reconnect.attempts > max {
            session.fail(RelayError::MaxReconnectAttempts(max));
            return None;
        }

        match open(session).await {
            Opened::Open(transport) => return Some(transport),
            Opened::Failed(e) => {
                tracing::warn!("Reconnect attempt {} failed: {}", next_attempt, e);
                session.reply_all(Err(e));
            }
            Opened::Stopped => return None,
        }
    }
}

/// One connection attempt, bounded by the connect timeout.
async fn open(session: &mut Session) -> Opened {
    let mut attempt: BoxFuture<'static, RelayResult<Transport>> =
        session.connector.connect(&session.url);
    let timer = session
        .shared
        .timers
        .start(TimerKind::ConnectTimeout, session.connect_timeout);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            result = &mut attempt => {
                return match result {
                    Ok(transport) => Opened::Open(transport),
                    Err(e) => Opened::Failed(e),
                };
            }
            () = &mut timer => return Opened::Failed(RelayError::ConnectionTimeout),
            cmd = session.cmd_rx.recv() => {
                match cmd {
                    Some(Command::Connect(reply)) => session.waiters.push(reply),
                    Some(Command::Flush) | Some(Command::Close(_)) => {}
                    Some(Command::Disconnect) | None => return Opened::Stopped,
                }
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Send REQ for every subscription not yet declared on this connection.
async fn flush_pending(session: &mut Session, transport: &mut Transport) {
    let frames = session.shared.registry().take_pending(session.epoch);
    for frame in &frames {
        send_frame(transport, frame).await;
    }
}

async fn send_frame(transport: &mut Transport, msg: &ClientMessage) {
    let json = match msg.to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("Failed to encode {}: {}", msg.subscription_id(), e);
            return;
        }
    };
    if let Err(e) = transport.sink.send(OutboundFrame::Text(json)).await {
        tracing::warn!("Send failed: {}", e);
    }
}
