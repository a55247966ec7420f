//! The acknowledgement packets whose body is a single packet identifier:
//! PUBACK, PUBREC, PUBREL, PUBCOMP, and UNSUBACK.

use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use bytes::{Buf, BufMut};

macro_rules! define_ack_packet {
    ($(#[$meta:meta])* $name:ident, $packet_type:expr, $flags:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub packet_id: u16,
        }

        impl $name {
            #[must_use]
            pub fn new(packet_id: u16) -> Self {
                Self { packet_id }
            }
        }

        impl MqttPacket for $name {
            fn packet_type(&self) -> PacketType {
                $packet_type
            }

            fn flags(&self) -> u8 {
                $flags
            }

            fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
                if self.packet_id == 0 {
                    return Err(MqttError::MalformedPacket(format!(
                        "{} packet identifier must be non-zero",
                        $packet_type.name()
                    )));
                }
                buf.put_u16(self.packet_id);
                Ok(())
            }

            fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
                if fixed_header.remaining_length != 2 || buf.remaining() < 2 {
                    return Err(MqttError::MalformedPacket(format!(
                        "{} body must be exactly two bytes",
                        $packet_type.name()
                    )));
                }
                let packet_id = buf.get_u16();
                if packet_id == 0 {
                    return Err(MqttError::MalformedPacket(format!(
                        "{} packet identifier must be non-zero",
                        $packet_type.name()
                    )));
                }
                Ok(Self { packet_id })
            }
        }
    };
}

define_ack_packet!(
    /// QoS 1 publish acknowledgement.
    PubAckPacket,
    PacketType::PubAck,
    0x00
);

define_ack_packet!(
    /// First response of the QoS 2 handshake.
    PubRecPacket,
    PacketType::PubRec,
    0x00
);

define_ack_packet!(
    /// QoS 2 release; fixed-header flags are 0b0010 by specification.
    PubRelPacket,
    PacketType::PubRel,
    0x02
);

define_ack_packet!(
    /// Final packet of the QoS 2 handshake.
    PubCompPacket,
    PacketType::PubComp,
    0x00
);

define_ack_packet!(
    /// UNSUBSCRIBE acknowledgement.
    UnsubAckPacket,
    PacketType::UnsubAck,
    0x00
);

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn puback_round_trip() {
        let packet = PubAckPacket::new(123);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x40, 0x02, 0x00, 0x7B]);

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = PubAckPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn pubrel_uses_reserved_flag_bit() {
        let packet = PubRelPacket::new(7);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf[0], 0x62);
    }

    #[test]
    fn zero_packet_identifier_rejected() {
        let mut buf = BytesMut::new();
        assert!(PubAckPacket::new(0).encode(&mut buf).is_err());

        let mut body = BytesMut::from(&[0x00, 0x00][..]);
        let fixed_header = FixedHeader::new(PacketType::PubComp, 0x00, 2);
        assert!(PubCompPacket::decode_body(&mut body, &fixed_header).is_err());
    }

    #[test]
    fn truncated_body_rejected() {
        let mut body = BytesMut::from(&[0x01][..]);
        let fixed_header = FixedHeader::new(PacketType::PubRec, 0x00, 1);
        assert!(PubRecPacket::decode_body(&mut body, &fixed_header).is_err());
    }

    #[test]
    fn unsuback_round_trip() {
        let packet = UnsubAckPacket::new(888);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(fixed_header.packet_type, PacketType::UnsubAck);
        let decoded = UnsubAckPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded.packet_id, 888);
    }
}
