//! WebSocket transport built on `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] is the default [`Connector`] for
//! [`RoomConnection::init`](crate::RoomConnection::init); it dials `ws://` or
//! `wss://` room URLs and wraps the stream in a [`WebSocketTransport`].
//!
//! # Feature gate
//!
//! Only available with the `transport-websocket` feature (on by default).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::RoomError;
use crate::transport::{Connector, Transport};

/// The underlying WebSocket stream type.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over one WebSocket connection.
///
/// Text frames are passed through untouched. Binary frames are skipped,
/// ping/pong control frames are left to tungstenite.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Io`] if the URL is invalid or the handshake fails.
    /// The [`ErrorKind`](std::io::ErrorKind) of an underlying I/O error is
    /// preserved.
    pub async fn connect(url: &str) -> Result<Self, RoomError> {
        tracing::debug!(url = %url, "dialing room WebSocket");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            RoomError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "room WebSocket connected");

        Ok(Self {
            stream,
            closed: false,
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), RoomError> {
        if self.closed {
            return Err(RoomError::TransportClosed);
        }
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| RoomError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, RoomError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Some(Err(RoomError::TransportReceive(e.to_string()))),
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "room server sent close frame");
                    return None;
                }
                Message::Binary(bytes) => {
                    tracing::warn!(len = bytes.len(), "skipping binary frame from room server");
                }
                // tungstenite answers pings itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), RoomError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| RoomError::TransportSend(e.to_string()))
    }
}

/// [`Connector`] that dials room URLs with [`WebSocketTransport::connect`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, url: &str) -> Result<WebSocketTransport, RoomError> {
        WebSocketTransport::connect(url).await
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
    use tokio::net::TcpListener;

    type ServerStream = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Accept one WebSocket connection on a local port, hand it to `handler`,
    /// and return the `ws://` address.
    async fn room_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(ServerStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}/chat/lobby")
    }

    #[test]
    fn transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_rejects_malformed_url() {
        let err = WebSocketTransport::connect("chat/lobby").await.unwrap_err();
        assert!(matches!(err, RoomError::Io(_)));
    }

    #[tokio::test]
    async fn connector_reports_unreachable_host() {
        let err = WebSocketConnector
            .connect("ws://127.0.0.1:1/chat/lobby")
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::Io(_)));
    }

    #[tokio::test]
    async fn frames_arrive_in_order_and_binary_is_skipped() {
        let url = room_server(|mut ws| async move {
            ws.send(Message::Text(r#""UserQueueChange""#.into()))
                .await
                .unwrap();
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text(r#"{"ChatMessage":{"message":"hi"}}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketConnector.connect(&url).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#""UserQueueChange""#
        );
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"ChatMessage":{"message":"hi"}}"#
        );
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn sent_frames_reach_the_server() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let url = room_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = tx.send(text.to_string());
            }
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send(r#"{"JoinQueue":null}"#.to_string())
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), r#"{"JoinQueue":null}"#);
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn send_after_close_is_an_error_and_close_is_idempotent() {
        let url = room_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
            .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, RoomError::TransportClosed));
    }
}
