//! Packet framing over a transport: accumulate bytes until a whole
//! fixed-header-delimited packet is available, and batch outbound packets
//! into one write per dispatch round.

use crate::error::{MqttError, Result};
use crate::transport::{TransportReader, TransportWriter};
use bytes::{Buf, BytesMut};
use mqtt311_protocol::packet::decode_header_prefix;
use mqtt311_protocol::Packet;

const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// Reads whole MQTT packets from a transport's read half.
pub struct PacketReader {
    reader: TransportReader,
    buf: BytesMut,
}

impl PacketReader {
    #[must_use]
    pub fn new(reader: TransportReader) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
        }
    }

    /// Reads the next packet. `Err(ConnectionClosed)` when the peer closes
    /// the stream cleanly between packets.
    pub async fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some((header, header_len)) = decode_header_prefix(&self.buf)? {
                let total = header_len + header.remaining_length as usize;
                if self.buf.len() >= total {
                    let mut frame = self.buf.split_to(total);
                    frame.advance(header_len);
                    let packet = Packet::decode_body(&header, &mut frame)?;
                    tracing::trace!(packet_type = header.packet_type.name(), "Read packet");
                    return Ok(packet);
                }
            }

            let read = self.reader.read_into(&mut self.buf).await?;
            if read == 0 {
                if self.buf.is_empty() {
                    return Err(MqttError::ConnectionClosed);
                }
                return Err(MqttError::MalformedPacket(
                    "Connection closed mid-packet".to_string(),
                ));
            }
        }
    }
}

/// Buffers encoded packets and writes them out in a single flush, so all
/// packets produced by one dispatch round reach the transport atomically.
pub struct PacketWriter {
    writer: TransportWriter,
    buf: BytesMut,
}

impl PacketWriter {
    #[must_use]
    pub fn new(writer: TransportWriter) -> Self {
        Self {
            writer,
            buf: BytesMut::new(),
        }
    }

    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        tracing::trace!(packet_type = packet.packet_type().name(), "Queued packet");
        packet.encode(&mut self.buf)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes everything queued since the last flush.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let bytes = self.buf.split();
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.flush().await?;
        self.writer.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::broker_pair;
    use crate::transport::TransportConfig;
    use mqtt311_protocol::packet::{PubAckPacket, PublishPacket};
    use mqtt311_protocol::QoS;

    async fn connected_pair() -> (PacketReader, PacketWriter, crate::transport::mock::BrokerLink) {
        let (connector, mut broker) = broker_pair();
        let config = TransportConfig::Mock(connector);
        let transport = config.open().await.unwrap();
        let (reader, writer) = transport.into_split();
        let link = broker.accept().await.unwrap();
        (PacketReader::new(reader), PacketWriter::new(writer), link)
    }

    #[tokio::test]
    async fn frames_packets_split_across_reads() {
        let (mut reader, _writer, mut link) = connected_pair().await;

        let publish = PublishPacket::new("a/b", &b"hello"[..], QoS::AtLeastOnce).with_packet_id(3);
        let mut bytes = BytesMut::new();
        Packet::Publish(publish.clone()).encode(&mut bytes).unwrap();

        // drip-feed one byte at a time
        for chunk in bytes.chunks(1) {
            link.write_raw(chunk).await.unwrap();
        }

        let packet = reader.read_packet().await.unwrap();
        assert_eq!(packet, Packet::Publish(publish));
    }

    #[tokio::test]
    async fn frames_multiple_packets_in_one_read() {
        let (mut reader, _writer, mut link) = connected_pair().await;

        let mut bytes = BytesMut::new();
        Packet::PubAck(PubAckPacket::new(1)).encode(&mut bytes).unwrap();
        Packet::PubAck(PubAckPacket::new(2)).encode(&mut bytes).unwrap();
        Packet::PingResp.encode(&mut bytes).unwrap();
        link.write_raw(&bytes).await.unwrap();

        assert_eq!(
            reader.read_packet().await.unwrap(),
            Packet::PubAck(PubAckPacket::new(1))
        );
        assert_eq!(
            reader.read_packet().await.unwrap(),
            Packet::PubAck(PubAckPacket::new(2))
        );
        assert_eq!(reader.read_packet().await.unwrap(), Packet::PingResp);
    }

    #[tokio::test]
    async fn writer_batches_until_flush() {
        let (_reader, mut writer, mut link) = connected_pair().await;

        writer
            .write_packet(&Packet::PubAck(PubAckPacket::new(1)))
            .unwrap();
        writer.write_packet(&Packet::PingReq).unwrap();
        assert!(!writer.is_empty());
        writer.flush().await.unwrap();
        assert!(writer.is_empty());

        assert_eq!(
            link.read_packet().await.unwrap(),
            Packet::PubAck(PubAckPacket::new(1))
        );
        assert_eq!(link.read_packet().await.unwrap(), Packet::PingReq);
    }

    #[tokio::test]
    async fn clean_close_reports_connection_closed() {
        let (mut reader, _writer, link) = connected_pair().await;
        drop(link);
        assert_eq!(
            reader.read_packet().await,
            Err(MqttError::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn close_mid_packet_is_malformed() {
        let (mut reader, _writer, mut link) = connected_pair().await;
        link.write_raw(&[0x40, 0x02, 0x00]).await.unwrap();
        drop(link);
        assert!(matches!(
            reader.read_packet().await,
            Err(MqttError::MalformedPacket(_))
        ));
    }
}
