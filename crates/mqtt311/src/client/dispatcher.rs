//! Routes inbound PUBLISH packets to registered listeners and owns the
//! inbound QoS 2 state (held packet identifiers awaiting PUBREL), so a
//! broker retransmission never reaches listeners twice.

use mqtt311_protocol::packet::{PubAckPacket, PubCompPacket, PubRecPacket, PublishPacket};
use mqtt311_protocol::qos2::{self, InboundQos2Action};
use mqtt311_protocol::{Message, Packet, QoS};
use std::collections::HashSet;

type Listener = Box<dyn Fn(&Message) + Send>;

pub(crate) struct Dispatcher {
    /// Listener ids are monotonically assigned and never reused, which
    /// makes removal after the listener is gone a safe no-op.
    listeners: Vec<(u64, Listener)>,
    held: HashSet<u16>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Vec::new(),
            held: HashSet::new(),
        }
    }

    pub(crate) fn add_listener(&mut self, id: u64, callback: Listener) {
        self.listeners.push((id, callback));
    }

    pub(crate) fn remove_listener(&mut self, id: u64) {
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    /// Held QoS 2 state survives a reconnect only when the broker kept
    /// the session.
    pub(crate) fn connected(&mut self, session_present: bool) {
        if !session_present {
            self.held.clear();
        }
    }

    pub(crate) fn clear(&mut self) {
        self.listeners.clear();
        self.held.clear();
    }

    pub(crate) fn handle_publish(&mut self, publish: &PublishPacket, out: &mut Vec<Packet>) {
        match publish.qos {
            QoS::AtMostOnce => self.deliver(publish),
            QoS::AtLeastOnce => {
                let Some(packet_id) = publish.packet_id else {
                    return;
                };
                self.deliver(publish);
                out.push(Packet::PubAck(PubAckPacket::new(packet_id)));
            }
            QoS::ExactlyOnce => {
                let Some(packet_id) = publish.packet_id else {
                    return;
                };
                let already_held = self.held.contains(&packet_id);
                if already_held {
                    tracing::debug!(packet_id, "Duplicate QoS 2 PUBLISH suppressed");
                }
                for action in qos2::handle_incoming_publish(packet_id, already_held) {
                    match action {
                        InboundQos2Action::Deliver { .. } => self.deliver(publish),
                        InboundQos2Action::Hold { packet_id } => {
                            self.held.insert(packet_id);
                        }
                        InboundQos2Action::SendPubRec { packet_id } => {
                            out.push(Packet::PubRec(PubRecPacket::new(packet_id)));
                        }
                        InboundQos2Action::Release { .. }
                        | InboundQos2Action::SendPubComp { .. } => {}
                    }
                }
            }
        }
    }

    pub(crate) fn handle_pubrel(&mut self, packet_id: u16, out: &mut Vec<Packet>) {
        for action in qos2::handle_incoming_pubrel(packet_id, self.held.contains(&packet_id)) {
            match action {
                InboundQos2Action::Release { packet_id } => {
                    self.held.remove(&packet_id);
                }
                InboundQos2Action::SendPubComp { packet_id } => {
                    out.push(Packet::PubComp(PubCompPacket::new(packet_id)));
                }
                _ => {}
            }
        }
    }

    fn deliver(&self, publish: &PublishPacket) {
        if self.listeners.is_empty() {
            return;
        }
        let message = publish.message();
        for (_, listener) in &self.listeners {
            listener(&message);
        }
    }
}
