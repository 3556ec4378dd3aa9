//! The WebSocket transport contract (§6) and its default implementation.
//!
//! The engine treats the transport as a black-box duplex byte channel: it
//! never touches TLS, framing, or ping/pong directly. §9 suggests modeling
//! the source's callback-based transport API as "a channel the engine task
//! reads in a loop" — `recv()` below is exactly that; `TungsteniteTransport`
//! is the concrete default built on `tokio-tungstenite`, same as the
//! connection loop this crate was built from.

use crate::error::GatewayError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// One inbound occurrence from the transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A message frame. `binary` distinguishes a zlib-stream chunk from a
    /// plain text frame; the codec only attempts decompression on the
    /// former when compression is enabled.
    Message { data: Vec<u8>, binary: bool },
    /// The transport closed, locally or remotely.
    Closed { code: u16, reason: String },
    /// A transport-level error that doesn't carry a close frame.
    Error(String),
}

/// Duplex byte channel the engine drives its protocol over (§6).
///
/// Implementations are not required to be `Clone`; the engine owns
/// exactly one transport instance per connection (§3 invariant: "at most
/// one live transport... per engine at any instant").
#[async_trait]
pub trait GatewayTransport: Send {
    /// Send one frame. Binary framing is used when `binary` is set (ETF
    /// or a zlib-stream chunk); text framing otherwise.
    async fn send(&mut self, bytes: Vec<u8>, binary: bool) -> Result<(), GatewayError>;

    /// Close the transport with the given code/reason.
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), GatewayError>;

    /// Await the next event. Returns `None` once the stream is exhausted
    /// (equivalent to an unannounced close).
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Default transport: a single `tokio-tungstenite` WebSocket connection.
pub struct TungsteniteTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TungsteniteTransport {
    pub async fn connect(url: &str) -> Result<Self, GatewayError> {
        let (stream, _response) = connect_async(url).await?;
        Ok(Self { stream })
    }
}

#[async_trait]
impl GatewayTransport for TungsteniteTransport {
    async fn send(&mut self, bytes: Vec<u8>, binary: bool) -> Result<(), GatewayError> {
        let message = if binary {
            WsMessage::Binary(bytes.into())
        } else {
            WsMessage::Text(
                String::from_utf8(bytes)
                    .map_err(|e| GatewayError::Encode(e.to_string()))?
                    .into(),
            )
        };
        self.stream.send(message).await.map_err(GatewayError::from)
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), GatewayError> {
        let frame = CloseFrame {
            code: code.into(),
            reason: reason.to_string().into(),
        };
        self.stream
            .send(WsMessage::Close(Some(frame)))
            .await
            .map_err(GatewayError::from)
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => {
                    return Some(TransportEvent::Message {
                        data: text.as_str().as_bytes().to_vec(),
                        binary: false,
                    })
                }
                Ok(WsMessage::Binary(data)) => {
                    return Some(TransportEvent::Message {
                        data: data.to_vec(),
                        binary: true,
                    })
                }
                Ok(WsMessage::Close(frame)) => {
                    let (code, reason) = frame
                        .map(|f: CloseFrame| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((0, String::new()));
                    return Some(TransportEvent::Closed { code, reason });
                }
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => continue,
                Err(e) => return Some(TransportEvent::Error(e.to_string())),
            }
        }
    }
}
