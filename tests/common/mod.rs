#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for listening room client integration tests.
//!
//! [`MockServer`] scripts the server side of a [`MockTransport`]: frames
//! pushed into it come out of `recv()` in order, and every frame the client
//! writes is recorded.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use listening_room_client::{
    ChatMessage, ClientCommand, Connector, PageOrigin, RoomConfig, RoomError, ServerEvent,
    Transport,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

// ── MockTransport ───────────────────────────────────────────────────

type Incoming = Option<Result<String, RoomError>>;

/// Channel-backed transport driven by a [`MockServer`].
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    sent_at: Arc<StdMutex<Vec<Instant>>>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
    send_delay: Arc<StdMutex<Duration>>,
    writes_in_flight: Arc<AtomicUsize>,
    max_writes_in_flight: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), RoomError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RoomError::TransportClosed);
        }
        if self.fail_sends.load(Ordering::Acquire) {
            return Err(RoomError::TransportSend("broken pipe".into()));
        }

        let in_flight = self.writes_in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_writes_in_flight.fetch_max(in_flight, Ordering::AcqRel);
        let delay = *self.send_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.writes_in_flight.fetch_sub(1, Ordering::AcqRel);

        self.sent.lock().unwrap().push(frame);
        self.sent_at.lock().unwrap().push(Instant::now());
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, RoomError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            // The server handle went away without closing: stay silent.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), RoomError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ── MockServer ──────────────────────────────────────────────────────

/// Server side of a [`MockTransport`].
#[derive(Clone)]
pub struct MockServer {
    incoming: mpsc::UnboundedSender<Incoming>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    sent_at: Arc<StdMutex<Vec<Instant>>>,
    pub closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
    send_delay: Arc<StdMutex<Duration>>,
    max_writes_in_flight: Arc<AtomicUsize>,
}

impl MockServer {
    pub fn new() -> (Self, MockTransport) {
        let (tx, rx) = mpsc::unbounded_channel();
        let server = Self {
            incoming: tx,
            sent: Arc::default(),
            sent_at: Arc::default(),
            closed: Arc::default(),
            fail_sends: Arc::default(),
            send_delay: Arc::default(),
            max_writes_in_flight: Arc::default(),
        };
        let transport = MockTransport {
            incoming: rx,
            sent: Arc::clone(&server.sent),
            sent_at: Arc::clone(&server.sent_at),
            closed: Arc::clone(&server.closed),
            fail_sends: Arc::clone(&server.fail_sends),
            send_delay: Arc::clone(&server.send_delay),
            writes_in_flight: Arc::default(),
            max_writes_in_flight: Arc::clone(&server.max_writes_in_flight),
        };
        (server, transport)
    }

    /// Deliver a raw text frame to the client.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.incoming.send(Some(Ok(frame.into())));
    }

    /// Deliver a typed event to the client.
    pub fn push_event(&self, event: &ServerEvent) {
        self.push(serde_json::to_string(event).unwrap());
    }

    /// Close the connection cleanly from the server side.
    pub fn hang_up(&self) {
        let _ = self.incoming.send(None);
    }

    /// Make the next `recv()` fail with a transport error.
    pub fn break_connection(&self, reason: &str) {
        let _ = self
            .incoming
            .send(Some(Err(RoomError::TransportReceive(reason.into()))));
    }

    /// Make every following client write fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::Release);
    }

    /// Make every following client write take `delay` before it lands.
    pub fn slow_sends(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = delay;
    }

    /// Highest number of client writes that were ever in progress at once.
    pub fn max_writes_in_flight(&self) -> usize {
        self.max_writes_in_flight.load(Ordering::Acquire)
    }

    /// Times at which heartbeat pings finished writing.
    pub fn ping_times(&self) -> Vec<Instant> {
        let sent = self.sent.lock().unwrap();
        let sent_at = self.sent_at.lock().unwrap();
        sent.iter()
            .zip(sent_at.iter())
            .filter(|(frame, _)| frame.starts_with(r#"{"KeepAlivePing""#))
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Sent frames decoded as commands.
    pub fn sent_commands(&self) -> Vec<ClientCommand> {
        self.sent_frames()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    /// Sent frames that are not heartbeat pings.
    pub fn sent_user_commands(&self) -> Vec<ClientCommand> {
        self.sent_commands()
            .into_iter()
            .filter(|cmd| !matches!(cmd, ClientCommand::KeepAlivePing { .. }))
            .collect()
    }

    pub fn ping_count(&self) -> usize {
        self.sent_commands().len() - self.sent_user_commands().len()
    }

    /// Wait until at least `count` frames have been written.
    pub async fn wait_for_sent(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.sent.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("client did not write the expected frames");
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Connector that hands out one prepared [`MockTransport`].
pub struct MockConnector {
    transport: StdMutex<Option<MockTransport>>,
    fail_with: Option<String>,
    pub dialed: Arc<StdMutex<Vec<String>>>,
    pub attempts: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport: StdMutex::new(Some(transport)),
            fail_with: None,
            dialed: Arc::new(StdMutex::new(Vec::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A connector whose connect always fails.
    pub fn refusing(reason: &str) -> Self {
        Self {
            transport: StdMutex::new(None),
            fail_with: Some(reason.into()),
            dialed: Arc::new(StdMutex::new(Vec::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, url: &str) -> Result<MockTransport, RoomError> {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        self.dialed.lock().unwrap().push(url.to_string());
        if let Some(reason) = &self.fail_with {
            return Err(RoomError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                reason.clone(),
            )));
        }
        self.transport
            .lock()
            .unwrap()
            .take()
            .ok_or(RoomError::TransportClosed)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

pub fn local_config() -> RoomConfig {
    RoomConfig::new(PageOrigin::new("127.0.0.1:3030", false))
}

pub fn chat_event(text: &str) -> ServerEvent {
    ServerEvent::ChatMessage(ChatMessage::text(text))
}

pub fn presences_queue_event(queue: &[&str], presences: &[&str]) -> ServerEvent {
    ServerEvent::PresencesQueueMessage {
        queue: queue.iter().map(|s| s.to_string()).collect(),
        presences: presences.iter().map(|s| s.to_string()).collect(),
    }
}
