//! WebSocket transport using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries the room protocol's JSON text messages over
//! a WebSocket. Both `ws://` and `wss://` URLs are supported; TLS is handled
//! transparently via [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! Only available with the `transport-websocket` feature (on by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), watchparty_client::WatchPartyError> {
//! use watchparty_client::{Transport, WebSocketTransport};
//!
//! let url = "ws://localhost:8080/ws?room=general&username=Ana&action=join";
//! let mut transport = WebSocketTransport::connect(url).await?;
//!
//! if let Some(Ok(msg)) = transport.recv().await {
//!     println!("received: {msg}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, protocol::Message};

use crate::error::WatchPartyError;
use crate::transport::Transport;

/// Type alias for the underlying WebSocket stream.
///
/// Public so callers can build a [`WebSocketTransport`] from an existing
/// stream via [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection to the room server.
///
/// For custom TLS, proxies or headers, build the stream yourself and use
/// [`WebSocketTransport::from_stream`].
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe. Dropping its future before it
/// completes does not lose a message.
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
    /// - [`WatchPartyError::HandshakeRejected`] if the server answered the
    ///   upgrade with a non-101 HTTP status.
    /// - [`WatchPartyError::Io`] for anything else. When the underlying error
    ///   is an I/O error its [`ErrorKind`](std::io::ErrorKind) is preserved.
    pub async fn connect(url: &str) -> Result<Self, WatchPartyError> {
        tracing::debug!(url = %url, "connecting to room server");

        let (stream, _response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| match e {
                    tungstenite::Error::Http(response) => WatchPartyError::HandshakeRejected {
                        status: response.status().as_u16(),
                    },
                    tungstenite::Error::Io(io) => WatchPartyError::Io(io),
                    other => WatchPartyError::Io(std::io::Error::other(other)),
                })?;

        tracing::info!(url = %url, "room server connection established");

        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// [`connect`](Self::connect) with a deadline.
    ///
    /// # Errors
    ///
    /// Returns [`WatchPartyError::Timeout`] if the deadline elapses, or any
    /// error that [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, WatchPartyError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| WatchPartyError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), WatchPartyError> {
        if self.closed {
            return Err(WatchPartyError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| WatchPartyError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, WatchPartyError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(WatchPartyError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("room server sent a binary frame, skipping");
                }
                // Never produced by the read half.
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), WatchPartyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| WatchPartyError::TransportSend(e.to_string()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, WatchPartyError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, WatchPartyError::Io(_)));
    }

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns its base URL.
    async fn start_room_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}/ws?room=general&username=ana&action=join")
    }

    #[tokio::test]
    async fn refused_upgrade_reports_http_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut tcp, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = tcp.read(&mut buf).await;
            tcp.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
        });

        let err = WebSocketTransport::connect(&format!("ws://{addr}/ws"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, WatchPartyError::HandshakeRejected { status: 404 }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn recv_yields_server_messages_then_none_on_close() {
        let url = start_room_server(|mut ws| async move {
            ws.send(Message::Text(
                r#"{"type":"identity","user_id":"u1","is_host":true}"#.into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"new_video"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();

        let first = transport.recv().await.unwrap().unwrap();
        assert!(first.contains("identity"));
        // The binary frame is skipped.
        let second = transport.recv().await.unwrap().unwrap();
        assert_eq!(second, r#"{"type":"new_video"}"#);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_reaches_server() {
        let url = start_room_server(|mut ws| async move {
            // Echo one message back, as the room server broadcasts to its sender.
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let chat = r#"{"type":"chat","username":"ana","content":"hi"}"#;
        transport.send(chat.to_string()).await.unwrap();

        assert_eq!(transport.recv().await.unwrap().unwrap(), chat);
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_room_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        // Second close is a no-op.
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, WatchPartyError::TransportClosed));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Non-routable address.
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            std::time::Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WatchPartyError::Timeout));
    }
}
