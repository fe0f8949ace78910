//! Error types for the listening room client.

use thiserror::Error;

/// Errors that can occur when using the listening room client.
#[derive(Debug, Error)]
pub enum RoomError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted to send a command while the room connection is not open.
    #[error("not connected to room")]
    NotConnected,

    /// The room id cannot be used as a URL path segment.
    #[error("invalid room id: {0:?}")]
    InvalidRoomId(String),

    /// The page origin could not be parsed into a scheme and host.
    #[error("invalid page origin: {0:?}")]
    InvalidOrigin(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for listening room client operations.
pub type Result<T> = std::result::Result<T, RoomError>;
