//! # Listening Room Client
//!
//! Client-side synchronization layer for a collaborative listening room.
//!
//! A [`RoomConnection`] owns one persistent connection to the room server's
//! `/chat/<room_id>` endpoint. Inbound frames (chat lines, queue and presence
//! updates, queue-change signals) are folded into an observable
//! [`RoomSnapshot`]; local intents (chat, set device, queue a song, join the
//! queue) are written out as JSON text frames. A heartbeat keeps the
//! connection alive while it is open.
//!
//! ## Features
//!
//! - **Observable state**: subscribe to whole-snapshot updates through a
//!   [`tokio::sync::watch`] receiver
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   [`WebSocketConnector`]
//! - **Lenient inbound, strict outbound**: unknown server frames are dropped,
//!   sends on a closed connection return [`RoomError::NotConnected`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use listening_room_client::{PageOrigin, RoomConfig, RoomConnection, WebSocketConnector};
//!
//! let config = RoomConfig::new(PageOrigin::parse("https://rooms.example.com")?);
//! let mut room = RoomConnection::init(WebSocketConnector, config, "friday-night")?;
//! let mut snapshots = room.subscribe();
//! snapshots.wait_for(|s| s.ready).await?;
//!
//! room.send_join_queue()?;
//! room.send_chat_message("queued up!")?;
//!
//! room.close().await;
//! ```

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod store;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use connection::{RoomConfig, RoomConnection, DEFAULT_HEARTBEAT_INTERVAL};
pub use endpoint::PageOrigin;
pub use error::RoomError;
pub use protocol::{ChatMessage, ClientCommand, ServerEvent};
pub use store::{ConnectionState, RoomSnapshot, RoomStore};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
