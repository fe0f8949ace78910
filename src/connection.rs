//! Connection manager for a single listening room.
//!
//! [`RoomConnection::init`] validates the room id, derives the room URL from
//! the configured [`PageOrigin`], and spawns a background connection task
//! that owns the transport. The task is the only writer of inbound
//! mutations: it multiplexes outgoing frames, incoming frames, the heartbeat
//! deadline and the shutdown signal with `tokio::select!`, so frames are
//! applied to the [`RoomStore`] strictly in arrival order.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = RoomConfig::new(PageOrigin::parse("https://rooms.example.com")?);
//! let mut room = RoomConnection::init(WebSocketConnector, config, "friday-night")?;
//! let mut snapshots = room.subscribe();
//!
//! snapshots.wait_for(|s| s.ready).await?;
//! room.send_chat_message("hello")?;
//!
//! while snapshots.changed().await.is_ok() {
//!     let snapshot = snapshots.borrow_and_update().clone();
//!     render(&snapshot);
//!     if !snapshot.ready {
//!         break;
//!     }
//! }
//! room.close().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::endpoint::{validate_room_id, PageOrigin};
use crate::error::{Result, RoomError};
use crate::protocol::{ClientCommand, RoomId, ServerEvent, TrackId};
use crate::store::{ConnectionState, RoomSnapshot, RoomStore};
use crate::transport::{Connector, Transport};

/// Default delay between two heartbeat pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Default timeout for the graceful shutdown in [`RoomConnection::close`].
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lower bound applied to the heartbeat interval.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`RoomConnection`].
///
/// Only the page origin is required; everything else has a default.
///
/// ```
/// use listening_room_client::{PageOrigin, RoomConfig};
/// use std::time::Duration;
///
/// let config = RoomConfig::new(PageOrigin::new("127.0.0.1:3030", false))
///     .with_heartbeat_interval(Duration::from_secs(5))
///     .with_connect_timeout(Duration::from_secs(10));
/// assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Origin of the page hosting the room. Determines host and scheme of
    /// the room URL.
    pub origin: PageOrigin,
    /// Delay between the end of one heartbeat ping and the next one.
    ///
    /// Defaults to **15 seconds**. Clamped to at least 1 ms.
    pub heartbeat_interval: Duration,
    /// How long [`RoomConnection::close`] waits for the transport to close
    /// before aborting the connection task.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Upper bound on establishing the transport. `None` waits as long as
    /// the connector does.
    pub connect_timeout: Option<Duration>,
}

impl RoomConfig {
    /// Create a configuration for rooms served from `origin`.
    pub fn new(origin: PageOrigin) -> Self {
        Self {
            origin,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            connect_timeout: None,
        }
    }

    /// Set the heartbeat interval. Values below 1 ms are clamped.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(MIN_HEARTBEAT_INTERVAL);
        self
    }

    /// Set the graceful shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Bound the time spent establishing the transport.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

// ── Connection handle ───────────────────────────────────────────────

/// Owned handle to one room membership.
///
/// Dropping the handle aborts the connection task and marks the snapshot
/// closed. Prefer [`close`](RoomConnection::close), which lets the
/// transport say goodbye first.
pub struct RoomConnection {
    room_id: RoomId,
    url: String,
    store: Arc<RoomStore>,
    frame_tx: mpsc::UnboundedSender<String>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl RoomConnection {
    /// Start connecting to `room_id` and return immediately.
    ///
    /// The returned handle starts out [`Idle`](ConnectionState::Idle); the
    /// background task moves it to `Connecting` and, once `connector`
    /// succeeds, to `Connected` with `ready == true`. Must be called from
    /// within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidRoomId`] if `room_id` cannot be used as a
    /// URL path segment. Connection failures are not returned here; they
    /// show up as a `Closed` snapshot with a `disconnect_reason`.
    pub fn init<C: Connector>(
        connector: C,
        config: RoomConfig,
        room_id: impl Into<RoomId>,
    ) -> Result<Self> {
        let room_id = room_id.into();
        validate_room_id(&room_id)?;
        let url = config.origin.room_url(&room_id);

        let store = Arc::new(RoomStore::new(room_id.clone()));
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<String>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(connection_task(
            connector,
            url.clone(),
            Arc::clone(&store),
            frame_rx,
            shutdown_rx,
            TaskSettings {
                heartbeat_interval: config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL),
                connect_timeout: config.connect_timeout,
            },
        ));

        info!(room_id = %room_id, url = %url, "room connection initialized");

        Ok(Self {
            room_id,
            url,
            store,
            frame_tx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    // ── Outbound commands ───────────────────────────────────────────

    /// Post a chat line. The server's broadcast is the only confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::NotConnected`] if the connection is not open.
    pub fn send_chat_message(&self, message: impl Into<String>) -> Result<()> {
        self.send(ClientCommand::ChatMessage {
            message: message.into(),
        })
    }

    /// Select this participant's playback device.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::NotConnected`] if the connection is not open.
    pub fn send_set_device(&self, device_id: impl Into<String>) -> Result<()> {
        self.send(ClientCommand::SetDevice {
            device_id: device_id.into(),
        })
    }

    /// Enqueue a track in this participant's queue.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::NotConnected`] if the connection is not open.
    pub fn send_queue_song(&self, track_id: impl Into<TrackId>) -> Result<()> {
        self.send(ClientCommand::QueueSong {
            track_id: track_id.into(),
        })
    }

    /// Join the room's playback rotation.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::NotConnected`] if the connection is not open.
    pub fn send_join_queue(&self) -> Result<()> {
        self.send(ClientCommand::JoinQueue)
    }

    /// Send a keep-alive ping with a caller-chosen nonce, in addition to the
    /// automatic heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::NotConnected`] if the connection is not open.
    pub fn send_keep_alive(&self, data: impl Into<String>) -> Result<()> {
        self.send(ClientCommand::KeepAlivePing { data: data.into() })
    }

    /// Close the connection.
    ///
    /// Marks the snapshot closed (`ready == false`) before anything else,
    /// stops the heartbeat, and closes the transport. Waits at most the
    /// configured shutdown timeout, then aborts the task. Safe to call more
    /// than once and before the transport ever opened.
    pub async fn close(&mut self) {
        if self.store.transition(ConnectionState::Closed, None) {
            info!(room_id = %self.room_id, "closing room connection");
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("room connection task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("room connection task did not exit within timeout; aborting");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("room connection task aborted: {join_err}");
                    }
                }
            }
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Room this connection belongs to.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// URL the connection task dials.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// `true` while the transport is open.
    pub fn is_ready(&self) -> bool {
        self.store.is_ready()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.store.state()
    }

    /// Clone of the current room snapshot.
    pub fn snapshot(&self) -> RoomSnapshot {
        self.store.get()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<RoomSnapshot> {
        self.store.subscribe()
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send(&self, command: ClientCommand) -> Result<()> {
        if !self.store.is_ready() {
            return Err(RoomError::NotConnected);
        }
        let frame = command.to_frame()?;
        debug!(tag = command.tag(), "queueing room command");
        self.frame_tx
            .send(frame)
            .map_err(|_| RoomError::NotConnected)
    }
}

impl std::fmt::Debug for RoomConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomConnection")
            .field("room_id", &self.room_id)
            .field("url", &self.url)
            .field("state", &self.state())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for RoomConnection {
    fn drop(&mut self) {
        // No executor to drive a graceful close here; abort the task so the
        // transport and heartbeat die with it.
        self.store.transition(ConnectionState::Closed, None);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Connection task ─────────────────────────────────────────────────

struct TaskSettings {
    heartbeat_interval: Duration,
    connect_timeout: Option<Duration>,
}

/// Fresh opaque nonce for a heartbeat ping.
fn heartbeat_nonce() -> String {
    Uuid::new_v4().simple().to_string()
}

async fn connect<C: Connector>(
    connector: &C,
    url: &str,
    timeout: Option<Duration>,
) -> Result<C::Transport> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, connector.connect(url))
            .await
            .map_err(|_| RoomError::Timeout)?,
        None => connector.connect(url).await,
    }
}

/// Establish the transport, then run the connected loop until shutdown,
/// server close, or a transport failure.
async fn connection_task<C: Connector>(
    connector: C,
    url: String,
    store: Arc<RoomStore>,
    frame_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
    settings: TaskSettings,
) {
    if store.state() == ConnectionState::Closed {
        debug!("room connection closed before it started");
        return;
    }
    store.transition(ConnectionState::Connecting, None);

    let mut transport = tokio::select! {
        result = connect(&connector, &url, settings.connect_timeout) => match result {
            Ok(transport) => transport,
            Err(e) => {
                error!(url = %url, "room connect failed: {e}");
                store.transition(ConnectionState::Closed, Some(format!("connect failed: {e}")));
                return;
            }
        },
        _ = &mut shutdown_rx => {
            debug!("room connection closed while connecting");
            store.transition(ConnectionState::Closed, None);
            return;
        }
    };

    if !store.transition(ConnectionState::Connected, None) {
        // close() won the race against the connector.
        let _ = transport.close().await;
        return;
    }
    info!(url = %url, "room connection open");

    connected_loop(
        &mut transport,
        &store,
        frame_rx,
        shutdown_rx,
        settings.heartbeat_interval,
    )
    .await;

    debug!("room connection task exited");
}

async fn connected_loop(
    transport: &mut impl Transport,
    store: &RoomStore,
    mut frame_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
    heartbeat_interval: Duration,
) {
    // Re-armed only after a ping has been written, so a slow write delays
    // the next ping instead of stacking them.
    let heartbeat = tokio::time::sleep(heartbeat_interval);
    tokio::pin!(heartbeat);

    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                let Some(frame) = frame else {
                    debug!("room handle dropped, closing transport");
                    let _ = transport.close().await;
                    store.transition(ConnectionState::Closed, None);
                    break;
                };
                if let Err(e) = transport.send(frame).await {
                    fail(store, format!("transport send error: {e}"));
                    break;
                }
            }

            _ = &mut shutdown_rx => {
                debug!("room shutdown requested");
                // Commands accepted before close() still go out ahead of the close.
                if let Err(e) = flush_pending(transport, &mut frame_rx).await {
                    warn!("queued room commands lost on close: {e}");
                }
                if let Err(e) = transport.close().await {
                    debug!("room transport close failed: {e}");
                }
                store.transition(ConnectionState::Closed, None);
                break;
            }

            () = &mut heartbeat => {
                let nonce = heartbeat_nonce();
                let ping = ClientCommand::KeepAlivePing { data: nonce.clone() };
                match ping.to_frame() {
                    Ok(frame) => {
                        if let Err(e) = transport.send(frame).await {
                            fail(store, format!("heartbeat send error: {e}"));
                            break;
                        }
                        debug!(nonce = %nonce, "heartbeat ping sent");
                    }
                    Err(e) => error!("failed to encode heartbeat ping: {e}"),
                }
                heartbeat.as_mut().reset(Instant::now() + heartbeat_interval);
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match ServerEvent::from_frame(&text) {
                        Ok(event) => store.apply_event(event),
                        Err(e) => {
                            debug!("dropping unrecognized room frame: {e}; raw: {text}");
                        }
                    },
                    Some(Err(e)) => {
                        fail(store, format!("transport receive error: {e}"));
                        break;
                    }
                    None => {
                        info!("room server closed the connection");
                        store.transition(ConnectionState::Closed, None);
                        break;
                    }
                }
            }
        }
    }
}

/// Write every frame still queued in `frame_rx`, in order.
async fn flush_pending(
    transport: &mut impl Transport,
    frame_rx: &mut mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    frame_rx.close();
    while let Ok(frame) = frame_rx.try_recv() {
        transport.send(frame).await?;
    }
    Ok(())
}

fn fail(store: &RoomStore, reason: String) {
    error!("room connection failed: {reason}");
    store.transition(ConnectionState::Closed, Some(reason));
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Connector whose connect never completes.
    struct StalledConnector;

    struct NeverTransport;

    #[async_trait]
    impl Transport for NeverTransport {
        async fn send(&mut self, _frame: String) -> Result<()> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for StalledConnector {
        type Transport = NeverTransport;

        async fn connect(&self, _url: &str) -> Result<NeverTransport> {
            std::future::pending().await
        }
    }

    fn local_config() -> RoomConfig {
        RoomConfig::new(PageOrigin::new("127.0.0.1:3030", false))
    }

    #[test]
    fn config_defaults() {
        let config = local_config();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert!(config.connect_timeout.is_none());
    }

    #[test]
    fn zero_heartbeat_interval_is_clamped() {
        let config = local_config().with_heartbeat_interval(Duration::ZERO);
        assert_eq!(config.heartbeat_interval, MIN_HEARTBEAT_INTERVAL);
    }

    #[test]
    fn heartbeat_nonces_are_fresh() {
        let a = heartbeat_nonce();
        let b = heartbeat_nonce();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn init_rejects_unusable_room_id() {
        let err = RoomConnection::init(StalledConnector, local_config(), "a/b").unwrap_err();
        assert!(matches!(err, RoomError::InvalidRoomId(_)));
    }

    #[tokio::test]
    async fn init_derives_url_from_origin() {
        let config = RoomConfig::new(PageOrigin::new("rooms.example.com", true));
        let mut room = RoomConnection::init(StalledConnector, config, "lobby").unwrap();
        assert_eq!(room.url(), "wss://rooms.example.com/chat/lobby");
        assert_eq!(room.room_id(), "lobby");
        room.close().await;
    }

    #[tokio::test]
    async fn close_while_connecting_is_clean() {
        let mut room = RoomConnection::init(StalledConnector, local_config(), "lobby").unwrap();
        tokio::task::yield_now().await;
        assert!(!room.is_ready());

        room.close().await;
        let snapshot = room.snapshot();
        assert_eq!(snapshot.state, ConnectionState::Closed);
        assert!(!snapshot.ready);
        assert!(snapshot.disconnect_reason.is_none());
    }

    #[tokio::test]
    async fn send_before_open_is_not_connected() {
        let mut room = RoomConnection::init(StalledConnector, local_config(), "lobby").unwrap();
        assert!(matches!(room.send_join_queue(), Err(RoomError::NotConnected)));
        room.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_closes_with_reason() {
        let config = local_config().with_connect_timeout(Duration::from_secs(2));
        let room = RoomConnection::init(StalledConnector, config, "lobby").unwrap();
        let mut rx = room.subscribe();

        let snapshot = rx
            .wait_for(|s| s.state == ConnectionState::Closed)
            .await
            .unwrap()
            .clone();
        assert!(snapshot.disconnect_reason.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn debug_impl_names_room() {
        let mut room = RoomConnection::init(StalledConnector, local_config(), "lobby").unwrap();
        let debug_str = format!("{room:?}");
        assert!(debug_str.contains("RoomConnection"));
        assert!(debug_str.contains("lobby"));
        room.close().await;
    }
}
