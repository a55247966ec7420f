use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::SubscriptionResult;
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    /// One result per requested filter, in request order.
    pub results: Vec<SubscriptionResult>,
}

impl SubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, results: Vec<SubscriptionResult>) -> Self {
        Self { packet_id, results }
    }
}

impl MqttPacket for SubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::SubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "SUBACK packet identifier must be non-zero".to_string(),
            ));
        }
        if self.results.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBACK must contain at least one return code".to_string(),
            ));
        }
        buf.put_u16(self.packet_id);
        for result in &self.results {
            buf.put_u8(u8::from(*result));
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "SUBACK missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        if packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "SUBACK packet identifier must be non-zero".to_string(),
            ));
        }

        let mut results = Vec::with_capacity(buf.remaining());
        while buf.has_remaining() {
            results.push(SubscriptionResult::try_from_u8(buf.get_u8())?);
        }

        if results.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBACK must contain at least one return code".to_string(),
            ));
        }

        Ok(Self { packet_id, results })
    }
}
