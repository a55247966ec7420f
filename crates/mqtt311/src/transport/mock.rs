//! In-memory transport for tests. [`broker_pair`] yields a connector for
//! the client side and a broker handle the test drives by hand; every
//! client (re)connect produces a fresh [`BrokerLink`].

use crate::error::{MqttError, Result};
use crate::transport::{PacketReader, TransportReader};
use bytes::BytesMut;
use mqtt311_protocol::Packet;
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Creates a linked connector/broker pair.
#[must_use]
pub fn broker_pair() -> (MockConnector, MockBroker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MockConnector { links: tx }, MockBroker { incoming: rx })
}

/// Client-side factory handed to the transport configuration.
#[derive(Debug, Clone)]
pub struct MockConnector {
    links: mpsc::UnboundedSender<DuplexStream>,
}

impl MockConnector {
    pub(crate) fn open(&self) -> Result<MockTransport> {
        let (client_io, broker_io) = tokio::io::duplex(PIPE_CAPACITY);
        self.links
            .send(broker_io)
            .map_err(|_| MqttError::Io("mock broker is gone".to_string()))?;
        Ok(MockTransport { io: client_io })
    }
}

pub struct MockTransport {
    io: DuplexStream,
}

impl MockTransport {
    #[must_use]
    pub fn into_split(self) -> (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>) {
        tokio::io::split(self.io)
    }
}

/// Test-side broker: accepts the connections the client opens.
pub struct MockBroker {
    incoming: mpsc::UnboundedReceiver<DuplexStream>,
}

impl MockBroker {
    /// Waits for the client's next connection attempt.
    pub async fn accept(&mut self) -> Option<BrokerLink> {
        let io = self.incoming.recv().await?;
        let (read, write) = tokio::io::split(io);
        Some(BrokerLink {
            reader: PacketReader::new(TransportReader::Mock(read)),
            write,
        })
    }
}

/// One broker-side connection: read what the client sent, script replies.
pub struct BrokerLink {
    reader: PacketReader,
    write: WriteHalf<DuplexStream>,
}

impl BrokerLink {
    pub async fn read_packet(&mut self) -> Result<Packet> {
        self.reader.read_packet().await
    }

    /// Writes one packet and flushes it immediately.
    pub async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf)?;
        self.write_raw(&buf).await
    }

    /// Writes raw bytes, for malformed-input and partial-frame tests.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.write.write_all(bytes).await?;
        self.write.flush().await?;
        Ok(())
    }

    /// Closes the broker's write side; the client observes end of stream.
    pub async fn close(mut self) -> Result<()> {
        Ok(self.write.shutdown().await?)
    }
}
