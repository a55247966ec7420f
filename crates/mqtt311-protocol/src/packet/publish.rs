use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::{Message, QoS};
use crate::validation::validate_topic_name;
use bytes::{Buf, BufMut, Bytes};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    /// Present exactly when `qos` is above `AtMostOnce`.
    pub packet_id: Option<u16>,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
            dup: false,
            packet_id: None,
        }
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }

    #[must_use]
    pub fn with_packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = Some(packet_id);
        self
    }

    #[must_use]
    pub fn message(&self) -> Message {
        Message {
            topic: self.topic.clone(),
            payload: self.payload.to_vec(),
            qos: self.qos,
            retain: self.retain,
            dup: self.dup,
        }
    }
}

impl From<Message> for PublishPacket {
    fn from(message: Message) -> Self {
        Self {
            topic: message.topic,
            payload: message.payload.into(),
            qos: message.qos,
            retain: message.retain,
            dup: message.dup,
            packet_id: None,
        }
    }
}

impl MqttPacket for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        (u8::from(self.dup) << 3) | (u8::from(self.qos) << 1) | u8::from(self.retain)
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        validate_topic_name(&self.topic)?;
        if self.dup && self.qos == QoS::AtMostOnce {
            return Err(MqttError::MalformedPacket(
                "DUP must not be set on a QoS 0 PUBLISH".to_string(),
            ));
        }

        encode_string(buf, &self.topic)?;

        match (self.qos, self.packet_id) {
            (QoS::AtMostOnce, None) => {}
            (QoS::AtMostOnce, Some(_)) => {
                return Err(MqttError::MalformedPacket(
                    "QoS 0 PUBLISH must not carry a packet identifier".to_string(),
                ));
            }
            (_, Some(id)) if id != 0 => buf.put_u16(id),
            (_, _) => {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH above QoS 0 requires a non-zero packet identifier".to_string(),
                ));
            }
        }

        buf.put_slice(&self.payload);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        let flags = fixed_header.flags;
        let qos = QoS::try_from_u8((flags >> 1) & 0x03)?;
        let dup = flags & 0x08 != 0;
        let retain = flags & 0x01 != 0;

        if dup && qos == QoS::AtMostOnce {
            return Err(MqttError::MalformedPacket(
                "DUP must not be set on a QoS 0 PUBLISH".to_string(),
            ));
        }

        let topic = decode_string(buf)?;
        validate_topic_name(&topic)?;

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            if buf.remaining() < 2 {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH missing packet identifier".to_string(),
                ));
            }
            let id = buf.get_u16();
            if id == 0 {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH packet identifier must be non-zero".to_string(),
                ));
            }
            Some(id)
        };

        let payload = buf.copy_to_bytes(buf.remaining());

        Ok(Self {
            topic,
            payload,
            qos,
            retain,
            dup,
            packet_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn round_trip(packet: &PublishPacket) -> PublishPacket {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        PublishPacket::decode_body(&mut buf, &fixed_header).unwrap()
    }

    #[test]
    fn qos0_publish_bytes() {
        let packet = PublishPacket::new("a", Bytes::from_static(b"x"), QoS::AtMostOnce);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x30, 0x04, 0x00, 0x01, b'a', b'x']);
    }

    #[test]
    fn qos1_round_trip() {
        let packet = PublishPacket::new("a/b", Bytes::from_static(b"payload"), QoS::AtLeastOnce)
            .with_packet_id(42)
            .with_retain(true);
        let decoded = round_trip(&packet);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn qos2_dup_round_trip() {
        let packet = PublishPacket::new("a/b/c", Bytes::new(), QoS::ExactlyOnce)
            .with_packet_id(7)
            .with_dup(true);
        let decoded = round_trip(&packet);
        assert_eq!(decoded, packet);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn empty_payload_allowed() {
        let packet = PublishPacket::new("a", Bytes::new(), QoS::AtMostOnce);
        let decoded = round_trip(&packet);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn rejects_dup_on_qos0() {
        let mut buf = BytesMut::from(&[0x00, 0x01, b'a'][..]);
        let fixed_header = FixedHeader::new(PacketType::Publish, 0x08, 3);
        assert!(PublishPacket::decode_body(&mut buf, &fixed_header).is_err());

        let packet = PublishPacket::new("a", Bytes::new(), QoS::AtMostOnce).with_dup(true);
        let mut out = BytesMut::new();
        assert!(packet.encode(&mut out).is_err());
    }

    #[test]
    fn rejects_qos3() {
        let mut buf = BytesMut::from(&[0x00, 0x01, b'a', 0x00, 0x01][..]);
        let fixed_header = FixedHeader::new(PacketType::Publish, 0x06, 5);
        assert_eq!(
            PublishPacket::decode_body(&mut buf, &fixed_header),
            Err(MqttError::InvalidQoS(3))
        );
    }

    #[test]
    fn rejects_wildcard_topic() {
        let packet = PublishPacket::new("a/+", Bytes::new(), QoS::AtMostOnce);
        let mut buf = BytesMut::new();
        assert!(matches!(
            packet.encode(&mut buf),
            Err(MqttError::InvalidTopicName(_))
        ));

        let mut body = BytesMut::from(&[0x00, 0x03, b'a', b'/', b'#'][..]);
        let fixed_header = FixedHeader::new(PacketType::Publish, 0x00, 5);
        assert!(PublishPacket::decode_body(&mut body, &fixed_header).is_err());
    }

    #[test]
    fn rejects_missing_packet_identifier() {
        let packet = PublishPacket::new("a", Bytes::new(), QoS::AtLeastOnce);
        let mut buf = BytesMut::new();
        assert!(packet.encode(&mut buf).is_err());

        let mut body = BytesMut::from(&[0x00, 0x01, b'a', 0x00, 0x00][..]);
        let fixed_header = FixedHeader::new(PacketType::Publish, 0x02, 5);
        assert!(PublishPacket::decode_body(&mut body, &fixed_header).is_err());
    }
}
