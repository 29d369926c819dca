//! Broker connection manager
//!
//! ```text
//!   Disconnected ──start()──▶ Connecting ──queue declared + hook ok──▶ Ready
//!        ▲                        │                                    │
//!        │                  setup failure                     Closed event /
//!        │                        │                           publish error
//!        └──── reconnect timer ◀──┴────────────────────────────────────┘
//! ```
//!
//! At most one reconnect timer is pending at any time. `shutdown()` cancels
//! the timer, stops dispatching deliveries, waits for running handlers, then
//! closes the channel, then the connection.

use super::channel::InFlightHandlers;
use crate::broker::{
    BrokerChannel, BrokerConnection, BrokerError, BrokerResult, BrokerTransport,
    ChannelReadyHook, ConnectionEvent, JobMessage, ReadyChannel,
};
use crate::core::sync::handle_mutex_poison;
use futures::future::{BoxFuture, FutureExt};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// How long shutdown waits for running delivery handlers to ack
const HANDLER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Durable queue declared on every connection
    pub queue: String,
    pub reconnect_delay: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            queue: "jobpacer.jobs".to_string(),
            reconnect_delay: Duration::from_millis(5000),
        }
    }
}

/// One established connection with its channel and background tasks
struct Session {
    generation: u64,
    connection: Arc<dyn BrokerConnection>,
    channel: Arc<dyn BrokerChannel>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    handlers: InFlightHandlers,
}

struct ManagerInner {
    /// Role label used in log lines
    role: String,
    transport: Arc<dyn BrokerTransport>,
    hook: Arc<dyn ChannelReadyHook>,
    settings: BrokerSettings,
    state: watch::Sender<ConnectionState>,
    session: Mutex<Option<Session>>,
    reconnect_timer: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    connecting: AtomicBool,
    shutting_down: AtomicBool,
}

/// Keeps one connection, channel and durable queue alive for a role
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(
        role: impl Into<String>,
        transport: Arc<dyn BrokerTransport>,
        hook: Arc<dyn ChannelReadyHook>,
        settings: BrokerSettings,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ManagerInner {
                role: role.into(),
                transport,
                hook,
                settings,
                state,
                session: Mutex::new(None),
                reconnect_timer: Mutex::new(None),
                generation: AtomicU64::new(0),
                connecting: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// Make the first connection attempt; failures schedule a reconnect and never propagate
    pub async fn start(&self) {
        info!(
            "[{}] Connecting to broker at {}",
            self.inner.role,
            self.inner.transport.endpoint()
        );
        self.connect().await;
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn queue(&self) -> &str {
        &self.inner.settings.queue
    }

    /// Wait up to `timeout` for the ready state
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let mut state = self.inner.state.subscribe();
        let ready = matches!(
            tokio::time::timeout(timeout, state.wait_for(|s| *s == ConnectionState::Ready)).await,
            Ok(Ok(_))
        );
        ready
    }

    /// Publish a persistent job message
    ///
    /// Returns false when not connected or when the outbound buffer is full;
    /// callers retry later. A transport error tears the connection down and
    /// schedules a reconnect.
    pub async fn publish(&self, message: &JobMessage) -> bool {
        let body = match message.to_bytes() {
            Ok(body) => body,
            Err(e) => {
                error!(
                    "[{}] Failed to encode job {}: {}",
                    self.inner.role, message.job_id, e
                );
                return false;
            }
        };

        let Some((channel, generation)) = self.ready_channel() else {
            warn!(
                "[{}] Broker not ready, job {} not published",
                self.inner.role, message.job_id
            );
            return false;
        };

        match channel
            .publish(&self.inner.settings.queue, body, true)
            .await
        {
            Ok(true) => {
                debug!("[{}] Published job {}", self.inner.role, message.job_id);
                true
            }
            Ok(false) => {
                warn!(
                    "[{}] Outbound buffer full, job {} not published",
                    self.inner.role, message.job_id
                );
                false
            }
            Err(e) => {
                warn!(
                    "[{}] Publishing job {} failed: {}",
                    self.inner.role, message.job_id, e
                );
                self.handle_disconnect(generation).await;
                false
            }
        }
    }

    /// Cancel any pending reconnect, then close channel and connection
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);

        match handle_mutex_poison(self.inner.reconnect_timer.lock(), |message| {
            BrokerError::Internal { message }
        }) {
            Ok(mut timer) => {
                if let Some(handle) = timer.take() {
                    handle.abort();
                    debug!("[{}] Pending reconnect cancelled", self.inner.role);
                }
            }
            Err(e) => error!("[{}] {}", self.inner.role, e),
        }

        if let Some(session) = self.take_session(None) {
            self.close_session(session).await;
        }
        self.set_state(ConnectionState::Disconnected);
        info!("[{}] Broker connection closed", self.inner.role);
    }

    fn connect(&self) -> BoxFuture<'static, ()> {
        let manager = self.clone();
        async move {
            let inner = &manager.inner;
            if inner.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            if inner.connecting.swap(true, Ordering::SeqCst) {
                debug!("[{}] Connection attempt already in progress", inner.role);
                return;
            }

            manager.set_state(ConnectionState::Connecting);
            let result = manager.establish().await;
            inner.connecting.store(false, Ordering::SeqCst);

            match result {
                Ok(_) if inner.shutting_down.load(Ordering::SeqCst) => {
                    if let Some(session) = manager.take_session(None) {
                        manager.close_session(session).await;
                    }
                    manager.set_state(ConnectionState::Disconnected);
                }
                Ok(generation) => {
                    if manager.mark_ready(generation) {
                        info!(
                            "[{}] Broker ready, queue '{}' declared",
                            inner.role, inner.settings.queue
                        );
                    } else {
                        // Lost during setup; the disconnect path already tore it down
                        debug!(
                            "[{}] Connection {} closed before becoming ready",
                            inner.role, generation
                        );
                        manager.schedule_reconnect();
                    }
                }
                Err(e) => {
                    warn!(
                        "[{}] Broker connection to {} failed: {}",
                        inner.role,
                        inner.transport.endpoint(),
                        e
                    );
                    if let Some(session) = manager.take_session(None) {
                        manager.close_session(session).await;
                    }
                    manager.set_state(ConnectionState::Disconnected);
                    manager.schedule_reconnect();
                }
            }
        }
        .boxed()
    }

    /// Connect, open a channel, declare the durable queue, then run the hook
    ///
    /// Returns the generation of the stored session.
    async fn establish(&self) -> BrokerResult<u64> {
        let connection = self.inner.transport.connect().await?;
        let events = connection.subscribe_events();

        let channel = match self.open_channel(&connection).await {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    debug!("[{}] Closing half-open connection: {}", self.inner.role, close_err);
                }
                return Err(e);
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let tasks = Arc::new(Mutex::new(Vec::new()));
        let handlers = InFlightHandlers::default();

        {
            let mut session = handle_mutex_poison(self.inner.session.lock(), |message| {
                BrokerError::Internal { message }
            })?;
            *session = Some(Session {
                generation,
                connection,
                channel: channel.clone(),
                tasks: tasks.clone(),
                handlers: handlers.clone(),
            });
        }

        // Spawned after the session is stored so a Closed event always finds it
        let watcher = tokio::spawn(self.clone().watch_events(events, generation));
        handle_mutex_poison(tasks.lock(), |message| BrokerError::Internal { message })?
            .push(watcher);

        let ready = ReadyChannel::new(
            channel,
            self.inner.settings.queue.clone(),
            tasks,
            handlers,
        );
        self.inner.hook.on_channel_ready(&ready).await?;
        Ok(generation)
    }

    /// Enter the ready state only while `generation` is still the live session
    fn mark_ready(&self, generation: u64) -> bool {
        let session = match handle_mutex_poison(self.inner.session.lock(), |message| {
            BrokerError::Internal { message }
        }) {
            Ok(session) => session,
            Err(e) => {
                error!("[{}] {}", self.inner.role, e);
                return false;
            }
        };
        if session.as_ref().map(|s| s.generation) != Some(generation) {
            return false;
        }
        self.set_state(ConnectionState::Ready);
        true
    }

    async fn open_channel(
        &self,
        connection: &Arc<dyn BrokerConnection>,
    ) -> BrokerResult<Arc<dyn BrokerChannel>> {
        let channel = connection.create_channel().await?;
        channel
            .declare_queue(&self.inner.settings.queue, true)
            .await?;
        Ok(channel)
    }

    async fn watch_events(
        self,
        mut events: broadcast::Receiver<ConnectionEvent>,
        generation: u64,
    ) {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::Error { message }) => {
                    warn!("[{}] Broker connection error: {}", self.inner.role, message);
                }
                Ok(ConnectionEvent::Closed { reason }) => {
                    warn!("[{}] Broker connection closed: {}", self.inner.role, reason);
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        // Teardown aborts this task, so run it detached
        let manager = self.clone();
        tokio::spawn(async move {
            manager.handle_disconnect(generation).await;
        });
    }

    async fn handle_disconnect(&self, generation: u64) {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let Some(session) = self.take_session(Some(generation)) else {
            return;
        };
        self.set_state(ConnectionState::Disconnected);
        self.close_session(session).await;
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&self) {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let mut timer = match handle_mutex_poison(self.inner.reconnect_timer.lock(), |message| {
            BrokerError::Internal { message }
        }) {
            Ok(timer) => timer,
            Err(e) => {
                error!("[{}] Cannot schedule reconnect: {}", self.inner.role, e);
                return;
            }
        };
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("[{}] Reconnect already scheduled", self.inner.role);
            return;
        }

        let delay = self.inner.settings.reconnect_delay;
        info!("[{}] Reconnecting to broker in {:?}", self.inner.role, delay);
        let manager = self.clone();
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.clear_reconnect_timer();
            manager.connect().await;
        }));
    }

    fn clear_reconnect_timer(&self) {
        if let Ok(mut timer) = handle_mutex_poison(self.inner.reconnect_timer.lock(), |message| {
            BrokerError::Internal { message }
        }) {
            timer.take();
        }
    }

    fn ready_channel(&self) -> Option<(Arc<dyn BrokerChannel>, u64)> {
        if !self.is_connected() {
            return None;
        }
        let session = handle_mutex_poison(self.inner.session.lock(), |message| {
            BrokerError::Internal { message }
        })
        .ok()?;
        session
            .as_ref()
            .map(|s| (s.channel.clone(), s.generation))
    }

    /// Remove the current session, optionally only if it is still `generation`
    fn take_session(&self, generation: Option<u64>) -> Option<Session> {
        let mut session = match handle_mutex_poison(self.inner.session.lock(), |message| {
            BrokerError::Internal { message }
        }) {
            Ok(session) => session,
            Err(e) => {
                error!("[{}] {}", self.inner.role, e);
                return None;
            }
        };
        match (session.as_ref(), generation) {
            (Some(current), Some(expected)) if current.generation != expected => None,
            _ => session.take(),
        }
    }

    async fn close_session(&self, session: Session) {
        if let Ok(mut tasks) = handle_mutex_poison(session.tasks.lock(), |message| {
            BrokerError::Internal { message }
        }) {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        // On shutdown the channel stays open until running handlers have acked
        if self.inner.shutting_down.load(Ordering::SeqCst) && session.handlers.running() > 0 {
            debug!(
                "[{}] Waiting for {} running handler(s)",
                self.inner.role,
                session.handlers.running()
            );
            if !session.handlers.wait_idle(HANDLER_DRAIN_TIMEOUT).await {
                warn!(
                    "[{}] {} handler(s) still running after {:?}, closing channel",
                    self.inner.role,
                    session.handlers.running(),
                    HANDLER_DRAIN_TIMEOUT
                );
            }
        }
        if let Err(e) = session.channel.close().await {
            debug!("[{}] Closing channel: {}", self.inner.role, e);
        }
        if let Err(e) = session.connection.close().await {
            debug!("[{}] Closing connection: {}", self.inner.role, e);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            debug!("[{}] Broker state {} -> {}", self.inner.role, previous, state);
        }
    }
}
