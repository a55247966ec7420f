use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::{QoS, Subscription};
use crate::validation::validate_topic_filter;
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub subscriptions: Vec<Subscription>,
}

impl SubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            subscriptions: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_subscription(mut self, filter: impl Into<String>, qos: QoS) -> Self {
        self.subscriptions.push(Subscription::new(filter, qos));
        self
    }
}

impl MqttPacket for SubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }

    fn flags(&self) -> u8 {
        0x02
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE packet identifier must be non-zero".to_string(),
            ));
        }
        if self.subscriptions.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }

        buf.put_u16(self.packet_id);
        for subscription in &self.subscriptions {
            validate_topic_filter(&subscription.topic_filter)?;
            encode_string(buf, &subscription.topic_filter)?;
            buf.put_u8(u8::from(subscription.qos));
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        if packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE packet identifier must be non-zero".to_string(),
            ));
        }

        let mut subscriptions = Vec::new();
        while buf.has_remaining() {
            let filter = decode_string(buf)?;
            validate_topic_filter(&filter)?;
            if !buf.has_remaining() {
                return Err(MqttError::MalformedPacket(
                    "SUBSCRIBE missing requested QoS".to_string(),
                ));
            }
            let qos = QoS::try_from_u8(buf.get_u8())?;
            subscriptions.push(Subscription {
                topic_filter: filter,
                qos,
            });
        }

        if subscriptions.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }

        Ok(Self {
            packet_id,
            subscriptions,
        })
    }
}
