//! Pluggable transports: plain TCP, TLS, and WebSocket, consumed by the
//! client through one interface. Each transport splits into a read half
//! (owned by the packet reader task) and a write half (owned by the
//! client event loop).

pub mod mock;
pub mod packet_io;
pub mod tcp;
pub mod tls;
pub mod websocket;

pub use packet_io::{PacketReader, PacketWriter};
pub use tcp::TcpTransport;
pub use tls::{TlsConfig, TlsTransport};
pub use websocket::WebSocketTransport;

use crate::error::{MqttError, Result};
use futures::stream::{SplitSink, SplitStream};
use mock::{MockConnector, MockTransport};
use std::sync::Arc;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How to reach the broker.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    Tcp {
        host: String,
        port: u16,
    },
    Tls {
        host: String,
        port: u16,
        tls: TlsConfig,
    },
    /// `ws://` or `wss://` URL of the broker's WebSocket listener.
    WebSocket {
        url: String,
    },
    /// In-memory transport for tests; see [`mock::broker_pair`].
    Mock(MockConnector),
}

impl TransportConfig {
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    #[must_use]
    pub fn tls(host: impl Into<String>, port: u16, config: Arc<rustls::ClientConfig>) -> Self {
        let host = host.into();
        Self::Tls {
            host: host.clone(),
            port,
            tls: TlsConfig::new(host, config),
        }
    }

    #[must_use]
    pub fn websocket(url: impl Into<String>) -> Self {
        Self::WebSocket { url: url.into() }
    }

    /// Opens a fresh connection. Called for the initial connect and again
    /// for every reconnect attempt.
    pub async fn open(&self) -> Result<TransportType> {
        match self {
            Self::Tcp { host, port } => {
                let transport = TcpTransport::connect(host, *port).await?;
                Ok(TransportType::Tcp(transport))
            }
            Self::Tls { host, port, tls } => {
                let transport = TlsTransport::connect(host, *port, tls).await?;
                Ok(TransportType::Tls(Box::new(transport)))
            }
            Self::WebSocket { url } => {
                let transport = WebSocketTransport::connect(url).await?;
                Ok(TransportType::WebSocket(Box::new(transport)))
            }
            Self::Mock(connector) => {
                let transport = connector.open()?;
                Ok(TransportType::Mock(transport))
            }
        }
    }
}

/// A connected transport, ready to be split into halves.
pub enum TransportType {
    Tcp(TcpTransport),
    Tls(Box<TlsTransport>),
    WebSocket(Box<WebSocketTransport>),
    Mock(MockTransport),
}

impl TransportType {
    #[must_use]
    pub fn into_split(self) -> (TransportReader, TransportWriter) {
        match self {
            Self::Tcp(t) => {
                let (r, w) = t.into_split();
                (TransportReader::Tcp(r), TransportWriter::Tcp(w))
            }
            Self::Tls(t) => {
                let (r, w) = t.into_split();
                (TransportReader::Tls(r), TransportWriter::Tls(w))
            }
            Self::WebSocket(t) => {
                let (sink, stream) = t.into_split();
                (
                    TransportReader::WebSocket(stream),
                    TransportWriter::WebSocket(sink),
                )
            }
            Self::Mock(t) => {
                let (r, w) = t.into_split();
                (TransportReader::Mock(r), TransportWriter::Mock(w))
            }
        }
    }
}

/// Read half of a connected transport. Yields raw bytes; packet framing
/// happens in [`PacketReader`].
pub enum TransportReader {
    Tcp(OwnedReadHalf),
    Tls(ReadHalf<TlsStream<TcpStream>>),
    WebSocket(SplitStream<WsStream>),
    Mock(ReadHalf<tokio::io::DuplexStream>),
}

impl TransportReader {
    /// Reads more bytes into `buf`, returning the number appended. Zero
    /// means the peer closed the connection.
    pub async fn read_into(&mut self, buf: &mut bytes::BytesMut) -> Result<usize> {
        use futures::StreamExt;
        use tokio::io::AsyncReadExt;

        match self {
            Self::Tcp(r) => Ok(r.read_buf(buf).await?),
            Self::Tls(r) => Ok(r.read_buf(buf).await?),
            Self::Mock(r) => Ok(r.read_buf(buf).await?),
            Self::WebSocket(stream) => loop {
                match stream.next().await {
                    // empty frames must not read as end of stream
                    Some(Ok(WsMessage::Binary(data))) if data.is_empty() => {}
                    Some(Ok(WsMessage::Binary(data))) => {
                        buf.extend_from_slice(&data);
                        return Ok(data.len());
                    }
                    // control frames carry no MQTT bytes
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                    Some(Ok(WsMessage::Text(_))) => {
                        return Err(MqttError::MalformedPacket(
                            "Broker sent a text WebSocket frame".to_string(),
                        ));
                    }
                    Some(Ok(WsMessage::Close(_))) | None => return Ok(0),
                    Some(Err(e)) => return Err(MqttError::Io(e.to_string())),
                }
            },
        }
    }
}

/// Write half of a connected transport.
pub enum TransportWriter {
    Tcp(OwnedWriteHalf),
    Tls(WriteHalf<TlsStream<TcpStream>>),
    WebSocket(SplitSink<WsStream, WsMessage>),
    Mock(WriteHalf<tokio::io::DuplexStream>),
}

impl TransportWriter {
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        use futures::SinkExt;
        use tokio::io::AsyncWriteExt;

        match self {
            Self::Tcp(w) => Ok(w.write_all(bytes).await?),
            Self::Tls(w) => Ok(w.write_all(bytes).await?),
            Self::Mock(w) => Ok(w.write_all(bytes).await?),
            Self::WebSocket(sink) => sink
                .send(WsMessage::Binary(bytes.to_vec()))
                .await
                .map_err(|e| MqttError::Io(e.to_string())),
        }
    }

    pub async fn flush(&mut self) -> Result<()> {
        use futures::SinkExt;
        use tokio::io::AsyncWriteExt;

        match self {
            Self::Tcp(w) => Ok(w.flush().await?),
            Self::Tls(w) => Ok(w.flush().await?),
            Self::Mock(w) => Ok(w.flush().await?),
            Self::WebSocket(sink) => sink.flush().await.map_err(|e| MqttError::Io(e.to_string())),
        }
    }

    /// Closes the write side; the peer observes end of stream.
    pub async fn close(&mut self) -> Result<()> {
        use futures::SinkExt;
        use tokio::io::AsyncWriteExt;

        match self {
            Self::Tcp(w) => Ok(w.shutdown().await?),
            Self::Tls(w) => Ok(w.shutdown().await?),
            Self::Mock(w) => Ok(w.shutdown().await?),
            Self::WebSocket(sink) => sink.close().await.map_err(|e| MqttError::Io(e.to_string())),
        }
    }
}
