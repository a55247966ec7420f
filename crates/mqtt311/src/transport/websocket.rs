use crate::error::{MqttError, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// MQTT over WebSocket: packets ride inside binary frames on an
/// HTTP-Upgrade stream, with the `mqtt` subprotocol offered.
pub struct WebSocketTransport {
    stream: WsStream,
}

impl WebSocketTransport {
    pub async fn connect(url: &str) -> Result<Self> {
        let mut request = url
            .into_client_request()
            .map_err(|e| MqttError::Configuration(format!("Invalid WebSocket URL: {e}")))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("mqtt"));

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| MqttError::Io(e.to_string()))?;
        tracing::debug!(url, status = %response.status(), "WebSocket transport connected");
        Ok(Self { stream })
    }

    #[must_use]
    pub fn into_split(self) -> (SplitSink<WsStream, WsMessage>, SplitStream<WsStream>) {
        self.stream.split()
    }
}
