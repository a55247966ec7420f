use crate::error::{MqttError, Result};
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// TLS parameters. Certificate and ALPN configuration are supplied by the
/// caller through the `rustls::ClientConfig`; only the SNI name is ours.
#[derive(Clone)]
pub struct TlsConfig {
    pub server_name: String,
    pub config: Arc<rustls::ClientConfig>,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl TlsConfig {
    #[must_use]
    pub fn new(server_name: impl Into<String>, config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            server_name: server_name.into(),
            config,
        }
    }
}

/// TLS transport over TCP.
pub struct TlsTransport {
    stream: TlsStream<TcpStream>,
}

impl TlsTransport {
    pub async fn connect(host: &str, port: u16, tls: &TlsConfig) -> Result<Self> {
        let tcp = TcpStream::connect((host, port)).await?;
        tcp.set_nodelay(true)?;

        let server_name = ServerName::try_from(tls.server_name.clone())
            .map_err(|e| MqttError::Configuration(format!("Invalid TLS server name: {e}")))?;

        let connector = TlsConnector::from(tls.config.clone());
        let stream = connector.connect(server_name, tcp).await?;
        tracing::debug!(host, port, "TLS transport connected");
        Ok(Self { stream })
    }

    #[must_use]
    pub fn into_split(self) -> (ReadHalf<TlsStream<TcpStream>>, WriteHalf<TlsStream<TcpStream>>) {
        tokio::io::split(self.stream)
    }
}
