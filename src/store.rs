//! Observable room state.
//!
//! [`RoomStore`] holds the single [`RoomSnapshot`] for a connection and
//! publishes it through a [`tokio::sync::watch`] channel. Every mutation runs
//! inside one `send_modify` call, so an observer either sees the snapshot
//! before a mutation or after it, never in between. Only the connection
//! manager mutates the store; everyone else reads.

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::protocol::{ChatMessage, RoomId, ServerEvent, TrackId, UserId};

/// Lifecycle of a single room connection.
///
/// `Idle → Connecting → Connected → Closed`, with `Connecting → Closed` on
/// an immediate failure. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Created but the connection task has not started dialing.
    #[default]
    Idle,
    /// The transport is being established.
    Connecting,
    /// The transport is open and the heartbeat is running.
    Connected,
    /// The transport is gone. A new connection needs a new `init`.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if moving from `self` to `next` is a legal edge.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::{Closed, Connected, Connecting, Idle};
        matches!(
            (self, next),
            (Idle, Connecting) | (Idle, Closed) | (Connecting, Connected | Closed) | (Connected, Closed)
        )
    }
}

/// Point-in-time view of a room.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomSnapshot {
    /// Room this snapshot belongs to.
    pub room_id: RoomId,
    /// Connection lifecycle state.
    pub state: ConnectionState,
    /// `true` strictly between a successful open and close or failure.
    pub ready: bool,
    /// Chat log in arrival order. Never shrinks or reorders.
    pub messages: Vec<ChatMessage>,
    /// Authoritative playback queue from the latest server update.
    pub queue: Vec<TrackId>,
    /// Participants present as of the same update as `queue`.
    pub presences: Vec<UserId>,
    /// Bumped once per `UserQueueChange` signal. Only useful for diffing.
    pub queue_change_counter: u64,
    /// Bumped once per applied mutation of any kind.
    pub version: u64,
    /// Nonce of the most recent heartbeat echo from the server.
    pub last_pong: Option<String>,
    /// Why the connection ended, when it ended on a failure.
    pub disconnect_reason: Option<String>,
}

impl RoomSnapshot {
    /// Empty snapshot for `room_id` in the [`ConnectionState::Idle`] state.
    pub fn new(room_id: impl Into<RoomId>) -> Self {
        Self {
            room_id: room_id.into(),
            ..Default::default()
        }
    }

    /// Chat texts in arrival order.
    pub fn message_texts(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|m| m.message.as_str())
    }

    /// Apply the mutation rule for one inbound event.
    pub(crate) fn apply_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::ChatMessage(message) => self.messages.push(message),
            ServerEvent::PresencesQueueMessage { queue, presences } => {
                self.queue = queue;
                self.presences = presences;
            }
            ServerEvent::UserQueueChange => self.queue_change_counter += 1,
            ServerEvent::KeepAlivePong { data } => self.last_pong = Some(data),
        }
        self.version += 1;
    }

    /// Move to `next` if the edge is legal. Returns `false` and leaves the
    /// snapshot untouched otherwise.
    pub(crate) fn transition(&mut self, next: ConnectionState, reason: Option<String>) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.ready = next == ConnectionState::Connected;
        if next == ConnectionState::Closed {
            self.disconnect_reason = reason;
        }
        self.version += 1;
        true
    }
}

/// Single-writer observable container for a [`RoomSnapshot`].
#[derive(Debug)]
pub struct RoomStore {
    tx: watch::Sender<RoomSnapshot>,
}

impl RoomStore {
    /// Create a store holding an idle snapshot for `room_id`.
    pub fn new(room_id: impl Into<RoomId>) -> Self {
        let (tx, _rx) = watch::channel(RoomSnapshot::new(room_id));
        Self { tx }
    }

    /// Clone of the current snapshot.
    pub fn get(&self) -> RoomSnapshot {
        self.tx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    ///
    /// The receiver starts out marking the current snapshot as seen; call
    /// [`changed`](watch::Receiver::changed) to wait for the next mutation.
    pub fn subscribe(&self) -> watch::Receiver<RoomSnapshot> {
        self.tx.subscribe()
    }

    /// Returns `true` while the connection is open.
    pub fn is_ready(&self) -> bool {
        self.tx.borrow().ready
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.tx.borrow().state
    }

    pub(crate) fn apply_event(&self, event: ServerEvent) {
        self.tx.send_modify(|snapshot| snapshot.apply_event(event));
    }

    /// Apply a lifecycle transition and notify observers if it took effect.
    pub(crate) fn transition(&self, next: ConnectionState, reason: Option<String>) -> bool {
        let mut from = ConnectionState::Idle;
        let applied = self.tx.send_if_modified(|snapshot| {
            from = snapshot.state;
            snapshot.transition(next, reason)
        });
        if applied {
            debug!(?from, to = ?next, "room connection state changed");
        } else if from != next {
            warn!(?from, to = ?next, "refusing illegal connection state transition");
        }
        applied
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn chat(text: &str) -> ServerEvent {
        ServerEvent::ChatMessage(ChatMessage::text(text))
    }

    #[test]
    fn chat_messages_append_in_arrival_order_without_dedup() {
        let mut snapshot = RoomSnapshot::new("room");
        for text in ["hi", "hi", "there"] {
            snapshot.apply_event(chat(text));
        }
        assert_eq!(
            snapshot.message_texts().collect::<Vec<_>>(),
            vec!["hi", "hi", "there"]
        );
    }

    #[test]
    fn presences_queue_replaces_both_lists() {
        let mut snapshot = RoomSnapshot::new("room");
        snapshot.apply_event(ServerEvent::PresencesQueueMessage {
            queue: vec!["t1".into(), "t2".into()],
            presences: vec!["u1".into()],
        });
        snapshot.apply_event(ServerEvent::PresencesQueueMessage {
            queue: vec!["t3".into()],
            presences: vec![],
        });
        assert_eq!(snapshot.queue, vec!["t3".to_string()]);
        assert!(snapshot.presences.is_empty());
    }

    #[test]
    fn queue_change_counter_only_moves_on_signal() {
        let mut snapshot = RoomSnapshot::new("room");
        snapshot.apply_event(chat("a"));
        snapshot.apply_event(ServerEvent::KeepAlivePong { data: "n".into() });
        assert_eq!(snapshot.queue_change_counter, 0);
        snapshot.apply_event(ServerEvent::UserQueueChange);
        snapshot.apply_event(ServerEvent::UserQueueChange);
        assert_eq!(snapshot.queue_change_counter, 2);
    }

    #[test]
    fn pong_records_nonce() {
        let mut snapshot = RoomSnapshot::new("room");
        snapshot.apply_event(ServerEvent::KeepAlivePong { data: "abc".into() });
        assert_eq!(snapshot.last_pong.as_deref(), Some("abc"));
        assert!(snapshot.messages.is_empty());
    }

    #[test]
    fn every_mutation_bumps_version() {
        let mut snapshot = RoomSnapshot::new("room");
        snapshot.apply_event(chat("a"));
        snapshot.apply_event(ServerEvent::UserQueueChange);
        assert!(snapshot.transition(ConnectionState::Connecting, None));
        assert_eq!(snapshot.version, 3);
    }

    #[test]
    fn closed_is_terminal() {
        let mut snapshot = RoomSnapshot::new("room");
        assert!(snapshot.transition(ConnectionState::Connecting, None));
        assert!(snapshot.transition(ConnectionState::Connected, None));
        assert!(snapshot.ready);
        assert!(snapshot.transition(ConnectionState::Closed, Some("gone".into())));
        assert!(!snapshot.ready);
        assert!(!snapshot.transition(ConnectionState::Connected, None));
        assert!(!snapshot.transition(ConnectionState::Connecting, None));
        assert_eq!(snapshot.state, ConnectionState::Closed);
        assert_eq!(snapshot.disconnect_reason.as_deref(), Some("gone"));
    }

    #[test]
    fn connecting_can_fail_straight_to_closed() {
        assert!(ConnectionState::Connecting.can_transition_to(ConnectionState::Closed));
        assert!(!ConnectionState::Idle.can_transition_to(ConnectionState::Connected));
        assert!(!ConnectionState::Closed.can_transition_to(ConnectionState::Closed));
    }

    #[tokio::test]
    async fn observers_are_notified_of_each_mutation() {
        let store = RoomStore::new("room");
        let mut rx = store.subscribe();

        store.apply_event(chat("hello"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().messages.len(), 1);

        store.apply_event(ServerEvent::UserQueueChange);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().queue_change_counter, 1);
    }

    #[tokio::test]
    async fn refused_transition_does_not_notify() {
        let store = RoomStore::new("room");
        let mut rx = store.subscribe();

        assert!(!store.transition(ConnectionState::Connected, None));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.state(), ConnectionState::Idle);
    }
}
