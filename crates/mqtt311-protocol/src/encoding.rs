//! Encoding primitives shared by all packet bodies: the base-128 variable
//! length integer used for remaining length, and length-prefixed fields.

use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};

/// Largest value representable in a four-byte variable length integer.
pub const MAX_REMAINING_LENGTH: u32 = 268_435_455;

pub fn encode_variable_length<B: BufMut>(buf: &mut B, value: u32) -> Result<()> {
    if value > MAX_REMAINING_LENGTH {
        return Err(MqttError::PacketTooLarge {
            size: value as usize,
            max: MAX_REMAINING_LENGTH as usize,
        });
    }

    let mut remaining = value;
    loop {
        let mut byte = (remaining % 128) as u8;
        remaining /= 128;
        if remaining > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if remaining == 0 {
            return Ok(());
        }
    }
}

pub fn decode_variable_length<B: Buf>(buf: &mut B) -> Result<u32> {
    let mut value = 0u32;
    let mut multiplier = 1u32;

    for i in 0..4 {
        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "Truncated remaining length".to_string(),
            ));
        }
        let byte = buf.get_u8();
        value += u32::from(byte & 0x7F) * multiplier;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        if i == 3 {
            break;
        }
        multiplier *= 128;
    }

    Err(MqttError::MalformedPacket(
        "Remaining length exceeds four bytes".to_string(),
    ))
}

/// Number of bytes `encode_variable_length` produces for `value`.
#[must_use]
pub fn variable_length_size(value: u32) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

pub fn encode_string<B: BufMut>(buf: &mut B, value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > usize::from(u16::MAX) {
        return Err(MqttError::MalformedPacket(format!(
            "String of {} bytes exceeds the 65535 byte field limit",
            bytes.len()
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u16(bytes.len() as u16);
    buf.put_slice(bytes);
    Ok(())
}

pub fn decode_string<B: Buf>(buf: &mut B) -> Result<String> {
    let bytes = decode_binary(buf)?;
    String::from_utf8(bytes).map_err(|_| MqttError::MalformedString)
}

pub fn encode_binary<B: BufMut>(buf: &mut B, value: &[u8]) -> Result<()> {
    if value.len() > usize::from(u16::MAX) {
        return Err(MqttError::MalformedPacket(format!(
            "Binary field of {} bytes exceeds the 65535 byte field limit",
            value.len()
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u16(value.len() as u16);
    buf.put_slice(value);
    Ok(())
}

pub fn decode_binary<B: Buf>(buf: &mut B) -> Result<Vec<u8>> {
    if buf.remaining() < 2 {
        return Err(MqttError::MalformedPacket(
            "Truncated length prefix".to_string(),
        ));
    }
    let len = usize::from(buf.get_u16());
    if buf.remaining() < len {
        return Err(MqttError::MalformedPacket(format!(
            "Field length {len} overruns packet body"
        )));
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    Ok(bytes)
}
