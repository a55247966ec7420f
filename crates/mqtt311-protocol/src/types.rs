use crate::error::{MqttError, Result};
use crate::validation::{validate_client_id, validate_topic_name};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    pub fn try_from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(MqttError::InvalidQoS(other)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}

/// CONNACK return code (MQTT 3.1.1, table 3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadCredentials = 4,
    NotAuthorized = 5,
}

impl ConnectReturnCode {
    pub fn try_from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Accepted),
            1 => Ok(Self::UnacceptableProtocolVersion),
            2 => Ok(Self::IdentifierRejected),
            3 => Ok(Self::ServerUnavailable),
            4 => Ok(Self::BadCredentials),
            5 => Ok(Self::NotAuthorized),
            other => Err(MqttError::MalformedPacket(format!(
                "Invalid CONNACK return code: {other}"
            ))),
        }
    }

    #[must_use]
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

impl From<ConnectReturnCode> for u8 {
    fn from(code: ConnectReturnCode) -> Self {
        code as u8
    }
}

/// An application message, as handed to listeners and accepted by publish.
///
/// The `dup` flag is managed by the protocol engine; it is never set by
/// application code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
}

impl Message {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
            dup: false,
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// A requested subscription: topic filter plus maximum QoS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic_filter: String,
    pub qos: QoS,
}

impl Subscription {
    #[must_use]
    pub fn new(topic_filter: impl Into<String>, qos: QoS) -> Self {
        Self {
            topic_filter: topic_filter.into(),
            qos,
        }
    }
}

/// Broker response for one subscription in a SUBSCRIBE request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionResult {
    Granted(QoS),
    Failed,
}

impl SubscriptionResult {
    pub fn try_from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Granted(QoS::AtMostOnce)),
            1 => Ok(Self::Granted(QoS::AtLeastOnce)),
            2 => Ok(Self::Granted(QoS::ExactlyOnce)),
            0x80 => Ok(Self::Failed),
            other => Err(MqttError::MalformedPacket(format!(
                "Invalid SUBACK return code: 0x{other:02X}"
            ))),
        }
    }

    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

impl From<SubscriptionResult> for u8 {
    fn from(result: SubscriptionResult) -> Self {
        match result {
            SubscriptionResult::Granted(qos) => qos as u8,
            SubscriptionResult::Failed => 0x80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<Vec<u8>>,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.password = Some(password.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl Will {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// Reconnect behavior after an unexpected transport close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectPolicy {
    Never,
    Retry {
        /// `None` retries forever.
        max_attempts: Option<u32>,
        initial_backoff: Duration,
        max_backoff: Duration,
        jitter: bool,
    },
}

impl ReconnectPolicy {
    #[must_use]
    pub fn retry_forever() -> Self {
        Self::Retry {
            max_attempts: None,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            jitter: true,
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub client_id: String,
    pub clean_session: bool,
    /// Zero disables keep-alive pings.
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    /// Zero disables timer-based retransmission; unacknowledged publishes
    /// are still retransmitted on reconnect when the session is present.
    pub publish_retry_interval: Duration,
    pub subscription_timeout: Duration,
    pub max_inflight: usize,
    pub reconnect: ReconnectPolicy,
    pub credentials: Option<Credentials>,
    pub will: Option<Will>,
}

impl ConnectOptions {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            clean_session: true,
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            publish_retry_interval: Duration::from_secs(5),
            subscription_timeout: Duration::from_secs(5),
            max_inflight: 20,
            reconnect: ReconnectPolicy::Never,
            credentials: None,
            will: None,
        }
    }

    #[must_use]
    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_publish_retry_interval(mut self, interval: Duration) -> Self {
        self.publish_retry_interval = interval;
        self
    }

    #[must_use]
    pub fn with_subscription_timeout(mut self, timeout: Duration) -> Self {
        self.subscription_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_inflight(mut self, max_inflight: usize) -> Self {
        self.max_inflight = max_inflight;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_will(mut self, will: Will) -> Self {
        self.will = Some(will);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_client_id(&self.client_id)?;
        if let Some(will) = &self.will {
            validate_topic_name(&will.topic)?;
        }
        if self.max_inflight == 0 {
            return Err(MqttError::Configuration(
                "max_inflight must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
