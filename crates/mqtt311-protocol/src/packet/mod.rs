//! Typed MQTT 3.1.1 control packets and the codec entry points.
//!
//! `serialize` and `parse` are pure: they transform between `Packet`
//! values and bytes, hold no state across packets, and perform no I/O.
//! Framing whole packets out of a byte stream belongs to the transport
//! layer; it can use [`decode_header_prefix`] to find packet boundaries.

pub mod ack;
pub mod connack;
pub mod connect;
pub mod publish;
pub mod suback;
pub mod subscribe;
pub mod unsubscribe;

pub use ack::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, UnsubAckPacket};
pub use connack::ConnAckPacket;
pub use connect::ConnectPacket;
pub use publish::PublishPacket;
pub use suback::SubAckPacket;
pub use subscribe::SubscribePacket;
pub use unsubscribe::UnsubscribePacket;

use crate::encoding::{decode_variable_length, encode_variable_length};
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    pub fn try_from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Connect),
            2 => Ok(Self::ConnAck),
            3 => Ok(Self::Publish),
            4 => Ok(Self::PubAck),
            5 => Ok(Self::PubRec),
            6 => Ok(Self::PubRel),
            7 => Ok(Self::PubComp),
            8 => Ok(Self::Subscribe),
            9 => Ok(Self::SubAck),
            10 => Ok(Self::Unsubscribe),
            11 => Ok(Self::UnsubAck),
            12 => Ok(Self::PingReq),
            13 => Ok(Self::PingResp),
            14 => Ok(Self::Disconnect),
            other => Err(MqttError::UnknownPacketType(other)),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::ConnAck => "CONNACK",
            Self::Publish => "PUBLISH",
            Self::PubAck => "PUBACK",
            Self::PubRec => "PUBREC",
            Self::PubRel => "PUBREL",
            Self::PubComp => "PUBCOMP",
            Self::Subscribe => "SUBSCRIBE",
            Self::SubAck => "SUBACK",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::UnsubAck => "UNSUBACK",
            Self::PingReq => "PINGREQ",
            Self::PingResp => "PINGRESP",
            Self::Disconnect => "DISCONNECT",
        }
    }

    /// The flag bits MQTT 3.1.1 fixes for this packet type, or `None` for
    /// PUBLISH whose flags carry DUP/QoS/RETAIN.
    #[must_use]
    pub fn fixed_flags(self) -> Option<u8> {
        match self {
            Self::Publish => None,
            Self::PubRel | Self::Subscribe | Self::Unsubscribe => Some(0x02),
            _ => Some(0x00),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    #[must_use]
    pub fn new(packet_type: PacketType, flags: u8, remaining_length: u32) -> Self {
        Self {
            packet_type,
            flags,
            remaining_length,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(((self.packet_type as u8) << 4) | (self.flags & 0x0F));
        encode_variable_length(buf, self.remaining_length)
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket("Empty buffer".to_string()));
        }
        let byte = buf.get_u8();
        let packet_type = PacketType::try_from_u8(byte >> 4)?;
        let flags = byte & 0x0F;
        let remaining_length = decode_variable_length(buf)?;

        if let Some(expected) = packet_type.fixed_flags() {
            if flags != expected {
                return Err(MqttError::InvalidFlags {
                    packet: packet_type.name(),
                    flags,
                });
            }
        }

        Ok(Self {
            packet_type,
            flags,
            remaining_length,
        })
    }
}

/// Attempts to read a fixed header from the start of `bytes` without
/// consuming anything. Returns `None` while the header is incomplete,
/// otherwise the header plus its encoded size.
pub fn decode_header_prefix(bytes: &[u8]) -> Result<Option<(FixedHeader, usize)>> {
    if bytes.is_empty() {
        return Ok(None);
    }

    let mut remaining_length = 0u32;
    let mut multiplier = 1u32;
    for i in 0..4 {
        let Some(&byte) = bytes.get(1 + i) else {
            return Ok(None);
        };
        remaining_length += u32::from(byte & 0x7F) * multiplier;
        if byte & 0x80 == 0 {
            let mut header_bytes = &bytes[..2 + i];
            let header = FixedHeader::decode(&mut header_bytes)?;
            return Ok(Some((header, 2 + i)));
        }
        multiplier = multiplier.saturating_mul(128);
    }

    Err(MqttError::MalformedPacket(
        "Remaining length exceeds four bytes".to_string(),
    ))
}

/// Common shape of every typed packet: a type, fixed-header flags, and a
/// body codec. `encode` prepends the fixed header.
pub trait MqttPacket: Sized {
    fn packet_type(&self) -> PacketType;

    fn flags(&self) -> u8 {
        0
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()>;

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self>;

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;

        #[allow(clippy::cast_possible_truncation)]
        let header = FixedHeader::new(self.packet_type(), self.flags(), body.len() as u32);
        header.encode(buf)?;
        buf.put_slice(&body);
        Ok(())
    }
}

/// A parsed MQTT 3.1.1 control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Box<ConnectPacket>),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::ConnAck(_) => PacketType::ConnAck,
            Self::Publish(_) => PacketType::Publish,
            Self::PubAck(_) => PacketType::PubAck,
            Self::PubRec(_) => PacketType::PubRec,
            Self::PubRel(_) => PacketType::PubRel,
            Self::PubComp(_) => PacketType::PubComp,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::SubAck(_) => PacketType::SubAck,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::UnsubAck(_) => PacketType::UnsubAck,
            Self::PingReq => PacketType::PingReq,
            Self::PingResp => PacketType::PingResp,
            Self::Disconnect => PacketType::Disconnect,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Self::Connect(p) => p.encode(buf),
            Self::ConnAck(p) => p.encode(buf),
            Self::Publish(p) => p.encode(buf),
            Self::PubAck(p) => p.encode(buf),
            Self::PubRec(p) => p.encode(buf),
            Self::PubRel(p) => p.encode(buf),
            Self::PubComp(p) => p.encode(buf),
            Self::Subscribe(p) => p.encode(buf),
            Self::SubAck(p) => p.encode(buf),
            Self::Unsubscribe(p) => p.encode(buf),
            Self::UnsubAck(p) => p.encode(buf),
            Self::PingReq => encode_empty(buf, PacketType::PingReq),
            Self::PingResp => encode_empty(buf, PacketType::PingResp),
            Self::Disconnect => encode_empty(buf, PacketType::Disconnect),
        }
    }

    /// Decodes one packet body. `buf` must hold exactly
    /// `fixed_header.remaining_length` bytes; the transport framer
    /// guarantees this.
    pub fn decode_body<B: Buf>(fixed_header: &FixedHeader, buf: &mut B) -> Result<Self> {
        let packet = match fixed_header.packet_type {
            PacketType::Connect => {
                Self::Connect(Box::new(ConnectPacket::decode_body(buf, fixed_header)?))
            }
            PacketType::ConnAck => Self::ConnAck(ConnAckPacket::decode_body(buf, fixed_header)?),
            PacketType::Publish => Self::Publish(PublishPacket::decode_body(buf, fixed_header)?),
            PacketType::PubAck => Self::PubAck(PubAckPacket::decode_body(buf, fixed_header)?),
            PacketType::PubRec => Self::PubRec(PubRecPacket::decode_body(buf, fixed_header)?),
            PacketType::PubRel => Self::PubRel(PubRelPacket::decode_body(buf, fixed_header)?),
            PacketType::PubComp => Self::PubComp(PubCompPacket::decode_body(buf, fixed_header)?),
            PacketType::Subscribe => {
                Self::Subscribe(SubscribePacket::decode_body(buf, fixed_header)?)
            }
            PacketType::SubAck => Self::SubAck(SubAckPacket::decode_body(buf, fixed_header)?),
            PacketType::Unsubscribe => {
                Self::Unsubscribe(UnsubscribePacket::decode_body(buf, fixed_header)?)
            }
            PacketType::UnsubAck => Self::UnsubAck(UnsubAckPacket::decode_body(buf, fixed_header)?),
            PacketType::PingReq => decode_empty(fixed_header, Self::PingReq)?,
            PacketType::PingResp => decode_empty(fixed_header, Self::PingResp)?,
            PacketType::Disconnect => decode_empty(fixed_header, Self::Disconnect)?,
        };

        if buf.has_remaining() {
            return Err(MqttError::MalformedPacket(format!(
                "{} body has {} trailing bytes",
                fixed_header.packet_type.name(),
                buf.remaining()
            )));
        }

        Ok(packet)
    }

    /// Decodes one complete packet (fixed header plus body) from `buf`.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let fixed_header = FixedHeader::decode(buf)?;
        let remaining = fixed_header.remaining_length as usize;
        if buf.remaining() < remaining {
            return Err(MqttError::MalformedPacket(format!(
                "{} remaining length {} overruns buffer of {}",
                fixed_header.packet_type.name(),
                remaining,
                buf.remaining()
            )));
        }
        let mut body = buf.copy_to_bytes(remaining);
        Self::decode_body(&fixed_header, &mut body)
    }

}

fn encode_empty<B: BufMut>(buf: &mut B, packet_type: PacketType) -> Result<()> {
    FixedHeader::new(packet_type, 0, 0).encode(buf)
}

fn decode_empty(fixed_header: &FixedHeader, packet: Packet) -> Result<Packet> {
    if fixed_header.remaining_length != 0 {
        return Err(MqttError::MalformedPacket(format!(
            "{} must have an empty body",
            fixed_header.packet_type.name()
        )));
    }
    Ok(packet)
}
