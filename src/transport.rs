//! Transport abstraction for the listening room protocol.
//!
//! The [`Transport`] trait is a bidirectional text frame channel between the
//! client and the room server. The [`Connector`] trait turns a room URL into
//! a connected transport; [`RoomConnection`](crate::RoomConnection) calls it
//! from its background task so that `init` never blocks.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use listening_room_client::error::RoomError;
//! use listening_room_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), RoomError> {
//!         // Write one JSON text frame
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, RoomError>> {
//!         // Return the next JSON text frame, or None once the peer closed
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), RoomError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::RoomError;

/// A bidirectional text frame transport.
///
/// Each call to [`send`](Transport::send) writes one complete JSON frame and
/// each call to [`recv`](Transport::recv) yields one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe: the connection task
/// polls it inside `tokio::select!` next to the heartbeat timer and the
/// command channel. Cancelling a pending `recv` must not lose a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Write a JSON text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::TransportSend`] if the frame could not be written,
    /// or [`RoomError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, frame: String) -> Result<(), RoomError>;

    /// Receive the next JSON text frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the server closed the connection cleanly
    async fn recv(&mut self) -> Option<Result<String, RoomError>>;

    /// Close the transport gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), RoomError>;
}

/// Opens a [`Transport`] to a room URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport produced by a successful connect.
    type Transport: Transport;

    /// Establish a connection to `url`.
    ///
    /// # Errors
    ///
    /// Any error here moves the room connection from `Connecting` straight to
    /// `Closed`.
    async fn connect(&self, url: &str) -> Result<Self::Transport, RoomError>;
}
