use crate::encoding::{decode_binary, decode_string, encode_binary, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::{Credentials, QoS, Will};
use bytes::{Buf, BufMut};

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

mod flags {
    pub const USERNAME: u8 = 0x80;
    pub const PASSWORD: u8 = 0x40;
    pub const WILL_RETAIN: u8 = 0x20;
    pub const WILL_QOS_SHIFT: u8 = 3;
    pub const WILL: u8 = 0x04;
    pub const CLEAN_SESSION: u8 = 0x02;
    pub const RESERVED: u8 = 0x01;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive_secs: u16,
    pub will: Option<Will>,
    pub credentials: Option<Credentials>,
}

impl ConnectPacket {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            clean_session: true,
            keep_alive_secs: 0,
            will: None,
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    #[must_use]
    pub fn with_will(mut self, will: Will) -> Self {
        self.will = Some(will);
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn connect_flags(&self) -> u8 {
        let mut value = 0;
        if self.clean_session {
            value |= flags::CLEAN_SESSION;
        }
        if let Some(will) = &self.will {
            value |= flags::WILL;
            value |= u8::from(will.qos) << flags::WILL_QOS_SHIFT;
            if will.retain {
                value |= flags::WILL_RETAIN;
            }
        }
        if let Some(credentials) = &self.credentials {
            value |= flags::USERNAME;
            if credentials.password.is_some() {
                value |= flags::PASSWORD;
            }
        }
        value
    }
}

impl MqttPacket for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, PROTOCOL_NAME)?;
        buf.put_u8(PROTOCOL_LEVEL);
        buf.put_u8(self.connect_flags());
        buf.put_u16(self.keep_alive_secs);

        encode_string(buf, &self.client_id)?;
        if let Some(will) = &self.will {
            encode_string(buf, &will.topic)?;
            encode_binary(buf, &will.payload)?;
        }
        if let Some(credentials) = &self.credentials {
            encode_string(buf, &credentials.username)?;
            if let Some(password) = &credentials.password {
                encode_binary(buf, password)?;
            }
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        let protocol_name = decode_string(buf)?;
        if protocol_name != PROTOCOL_NAME {
            return Err(MqttError::MalformedPacket(format!(
                "Unexpected protocol name: {protocol_name:?}"
            )));
        }

        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "CONNECT missing protocol level".to_string(),
            ));
        }
        let level = buf.get_u8();
        if level != PROTOCOL_LEVEL {
            return Err(MqttError::MalformedPacket(format!(
                "Unsupported protocol level: {level}"
            )));
        }

        if buf.remaining() < 3 {
            return Err(MqttError::MalformedPacket(
                "CONNECT missing flags or keep alive".to_string(),
            ));
        }
        let connect_flags = buf.get_u8();
        if connect_flags & flags::RESERVED != 0 {
            return Err(MqttError::MalformedPacket(
                "CONNECT reserved flag bit set".to_string(),
            ));
        }
        let keep_alive_secs = buf.get_u16();

        let client_id = decode_string(buf)?;

        let will = if connect_flags & flags::WILL != 0 {
            let qos = QoS::try_from_u8((connect_flags >> flags::WILL_QOS_SHIFT) & 0x03)?;
            let topic = decode_string(buf)?;
            let payload = decode_binary(buf)?;
            Some(Will {
                topic,
                payload,
                qos,
                retain: connect_flags & flags::WILL_RETAIN != 0,
            })
        } else {
            if connect_flags & (flags::WILL_RETAIN | (0x03 << flags::WILL_QOS_SHIFT)) != 0 {
                return Err(MqttError::MalformedPacket(
                    "CONNECT will QoS or retain set without will flag".to_string(),
                ));
            }
            None
        };

        let credentials = if connect_flags & flags::USERNAME != 0 {
            let username = decode_string(buf)?;
            let password = if connect_flags & flags::PASSWORD != 0 {
                Some(decode_binary(buf)?)
            } else {
                None
            };
            Some(Credentials { username, password })
        } else {
            if connect_flags & flags::PASSWORD != 0 {
                return Err(MqttError::MalformedPacket(
                    "CONNECT password flag set without username flag".to_string(),
                ));
            }
            None
        };

        Ok(Self {
            client_id,
            clean_session: connect_flags & flags::CLEAN_SESSION != 0,
            keep_alive_secs,
            will,
            credentials,
        })
    }
}
