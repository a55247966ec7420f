use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::validation::validate_topic_filter;
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub topic_filters: Vec<String>,
}

impl UnsubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            topic_filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_filter(mut self, filter: impl Into<String>) -> Self {
        self.topic_filters.push(filter.into());
        self
    }
}

impl MqttPacket for UnsubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
    }

    fn flags(&self) -> u8 {
        0x02
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE packet identifier must be non-zero".to_string(),
            ));
        }
        if self.topic_filters.is_empty() {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }

        buf.put_u16(self.packet_id);
        for filter in &self.topic_filters {
            validate_topic_filter(filter)?;
            encode_string(buf, filter)?;
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        if packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE packet identifier must be non-zero".to_string(),
            ));
        }

        let mut topic_filters = Vec::new();
        while buf.has_remaining() {
            let filter = decode_string(buf)?;
            validate_topic_filter(&filter)?;
            topic_filters.push(filter);
        }

        if topic_filters.is_empty() {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }

        Ok(Self {
            packet_id,
            topic_filters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn unsubscribe_round_trip() {
        let packet = UnsubscribePacket::new(77)
            .add_filter("sensors/+/temperature")
            .add_filter("alerts/#");

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf[0], 0xA2);

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = UnsubscribePacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn rejects_empty_filter_list() {
        let packet = UnsubscribePacket::new(77);
        let mut buf = BytesMut::new();
        assert!(packet.encode(&mut buf).is_err());
    }
}
