use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::ConnectReturnCode;
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl ConnAckPacket {
    #[must_use]
    pub fn new(session_present: bool, return_code: ConnectReturnCode) -> Self {
        Self {
            session_present,
            return_code,
        }
    }
}

impl MqttPacket for ConnAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::ConnAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(u8::from(self.session_present));
        buf.put_u8(u8::from(self.return_code));
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        if fixed_header.remaining_length != 2 || buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "CONNACK body must be exactly two bytes".to_string(),
            ));
        }

        let ack_flags = buf.get_u8();
        if ack_flags & 0xFE != 0 {
            return Err(MqttError::MalformedPacket(format!(
                "CONNACK reserved acknowledge flags set: 0x{ack_flags:02X}"
            )));
        }
        let return_code = ConnectReturnCode::try_from_u8(buf.get_u8())?;

        Ok(Self {
            session_present: ack_flags & 0x01 != 0,
            return_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn connack_round_trip() {
        let packet = ConnAckPacket::new(true, ConnectReturnCode::Accepted);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x20, 0x02, 0x01, 0x00]);

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = ConnAckPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn connack_refused() {
        let mut buf = BytesMut::from(&[0x00, 0x05][..]);
        let fixed_header = FixedHeader::new(PacketType::ConnAck, 0x00, 2);
        let decoded = ConnAckPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert!(!decoded.session_present);
        assert_eq!(decoded.return_code, ConnectReturnCode::NotAuthorized);
    }

    #[test]
    fn connack_rejects_reserved_flags() {
        let mut buf = BytesMut::from(&[0x02, 0x00][..]);
        let fixed_header = FixedHeader::new(PacketType::ConnAck, 0x00, 2);
        assert!(ConnAckPacket::decode_body(&mut buf, &fixed_header).is_err());
    }

    #[test]
    fn connack_rejects_unknown_return_code() {
        let mut buf = BytesMut::from(&[0x00, 0x06][..]);
        let fixed_header = FixedHeader::new(PacketType::ConnAck, 0x00, 2);
        assert!(ConnAckPacket::decode_body(&mut buf, &fixed_header).is_err());
    }
}
