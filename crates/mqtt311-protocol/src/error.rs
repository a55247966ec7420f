use crate::types::ConnectReturnCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MqttError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Malformed UTF-8 string")]
    MalformedString,

    #[error("Unknown packet type: {0}")]
    UnknownPacketType(u8),

    #[error("Invalid fixed-header flags for {packet}: 0x{flags:02X}")]
    InvalidFlags { packet: &'static str, flags: u8 },

    #[error("Invalid QoS: {0}")]
    InvalidQoS(u8),

    #[error("Packet too large: size {size} exceeds maximum {max}")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Connection refused: {0:?}")]
    ConnectionRefused(ConnectReturnCode),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Timeout")]
    Timeout,

    #[error("Keep alive timeout")]
    KeepAliveTimeout,

    #[error("No packet identifier available")]
    NoAvailablePacketIdentifier,

    #[error("Client shut down")]
    ClientShutdown,

    #[error("Invalid topic name: {0}")]
    InvalidTopicName(String),

    #[error("Invalid topic filter: {0}")]
    InvalidTopicFilter(String),

    #[error("Invalid client ID: {0}")]
    InvalidClientId(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MqttError {
    /// True for CONNACK refusals that will not succeed on retry with the
    /// same credentials (bad user name or password, not authorized).
    #[must_use]
    pub fn is_auth_refusal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused(
                ConnectReturnCode::BadCredentials | ConnectReturnCode::NotAuthorized
            )
        )
    }

    /// True for codec-level failures that are fatal for the connection.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedPacket(_)
                | Self::MalformedString
                | Self::UnknownPacketType(_)
                | Self::InvalidFlags { .. }
                | Self::InvalidQoS(_)
                | Self::PacketTooLarge { .. }
        )
    }
}

impl From<std::io::Error> for MqttError {
    fn from(err: std::io::Error) -> Self {
        MqttError::Io(err.to_string())
    }
}
