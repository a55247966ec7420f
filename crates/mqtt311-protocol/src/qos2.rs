//! Inbound QoS 2 handshake decisions, expressed as pure functions so the
//! exactly-once delivery rules can be tested without any I/O.
//!
//! The caller owns the set of held packet identifiers (PUBLISHes received
//! but not yet released by PUBREL) and feeds its membership in.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundQos2Action {
    /// Invoke listeners for the message.
    Deliver { packet_id: u16 },
    /// Add the identifier to the held set.
    Hold { packet_id: u16 },
    /// Remove the identifier from the held set.
    Release { packet_id: u16 },
    SendPubRec { packet_id: u16 },
    SendPubComp { packet_id: u16 },
}

/// A QoS 2 PUBLISH arrived. A duplicate delivery (identifier already held)
/// must not reach listeners a second time, but still gets a PUBREC.
#[must_use]
pub fn handle_incoming_publish(packet_id: u16, already_held: bool) -> Vec<InboundQos2Action> {
    if already_held {
        vec![InboundQos2Action::SendPubRec { packet_id }]
    } else {
        vec![
            InboundQos2Action::Deliver { packet_id },
            InboundQos2Action::Hold { packet_id },
            InboundQos2Action::SendPubRec { packet_id },
        ]
    }
}

/// A PUBREL arrived. An unknown identifier still gets a PUBCOMP so a
/// broker retransmitting after our PUBCOMP was lost can finish the flow.
#[must_use]
pub fn handle_incoming_pubrel(packet_id: u16, held: bool) -> Vec<InboundQos2Action> {
    if held {
        vec![
            InboundQos2Action::Release { packet_id },
            InboundQos2Action::SendPubComp { packet_id },
        ]
    } else {
        vec![InboundQos2Action::SendPubComp { packet_id }]
    }
}
