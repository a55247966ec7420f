//! Outbound publish flows for all three QoS levels.
//!
//! QoS 0 completes at the first flush. QoS 1 holds its identifier until
//! PUBACK; QoS 2 walks PUBLISH -> PUBREC -> PUBREL -> PUBCOMP. Both
//! retransmit on a retry timer and survive a transport drop by parking
//! until the next `connected` event.

use crate::client::request::{Request, RequestContext, RequestKind, RequestResult, Response};
use mqtt311_protocol::packet::{PubRelPacket, PublishPacket};
use mqtt311_protocol::{Message, MqttError, Packet, QoS};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flight {
    AwaitingPuback,
    AwaitingPubrec,
    AwaitingPubcomp,
    /// Transport dropped; waiting for `connected` to resume.
    Parked(Resume),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Puback,
    Pubrec,
    Pubcomp,
}

pub(crate) struct PublishRequest {
    message: Message,
    retry_interval: Duration,
    packet_id: Option<u16>,
    flight: Flight,
}

impl PublishRequest {
    pub(crate) fn new(message: Message, retry_interval: Duration) -> Self {
        Self {
            message,
            retry_interval,
            packet_id: None,
            flight: Flight::AwaitingPuback,
        }
    }

    fn publish_packet(&self, dup: bool) -> PublishPacket {
        let mut packet = PublishPacket::new(
            self.message.topic.clone(),
            self.message.payload.clone(),
            self.message.qos,
        )
        .with_retain(self.message.retain)
        .with_dup(dup);
        if let Some(id) = self.packet_id {
            packet = packet.with_packet_id(id);
        }
        packet
    }

    fn arm_retry(&self, ctx: &mut RequestContext<'_>) {
        if !self.retry_interval.is_zero() {
            ctx.schedule(self.retry_interval);
        }
    }

    fn matches(&self, packet_id: u16) -> bool {
        self.packet_id == Some(packet_id)
    }
}

impl Request for PublishRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::Publish
    }

    fn start(&mut self, ctx: &mut RequestContext<'_>) -> RequestResult {
        match self.message.qos {
            QoS::AtMostOnce => {
                if !ctx.is_active() {
                    return RequestResult::Failed(MqttError::NotConnected);
                }
                ctx.emit(Packet::Publish(self.publish_packet(false)));
                RequestResult::Done(Response::Done)
            }
            QoS::AtLeastOnce | QoS::ExactlyOnce => {
                let id = match ctx.claim_packet_id() {
                    Ok(id) => id,
                    Err(e) => return RequestResult::Failed(e),
                };
                self.packet_id = Some(id);
                self.flight = if self.message.qos == QoS::AtLeastOnce {
                    Flight::AwaitingPuback
                } else {
                    Flight::AwaitingPubrec
                };
                ctx.emit(Packet::Publish(self.publish_packet(false)));
                self.arm_retry(ctx);
                RequestResult::Pending
            }
        }
    }

    fn on_packet(&mut self, packet: &Packet, ctx: &mut RequestContext<'_>) -> RequestResult {
        match (packet, self.flight) {
            (Packet::PubAck(ack), Flight::AwaitingPuback) if self.matches(ack.packet_id) => {
                RequestResult::Done(Response::Done)
            }
            (Packet::PubRec(rec), Flight::AwaitingPubrec) if self.matches(rec.packet_id) => {
                self.flight = Flight::AwaitingPubcomp;
                ctx.emit(Packet::PubRel(PubRelPacket::new(rec.packet_id)));
                self.arm_retry(ctx);
                RequestResult::Pending
            }
            (Packet::PubComp(comp), Flight::AwaitingPubcomp) if self.matches(comp.packet_id) => {
                RequestResult::Done(Response::Done)
            }
            _ => RequestResult::Pending,
        }
    }

    fn on_timer(&mut self, ctx: &mut RequestContext<'_>) -> RequestResult {
        match self.flight {
            Flight::AwaitingPuback | Flight::AwaitingPubrec => {
                ctx.emit(Packet::Publish(self.publish_packet(true)));
                self.arm_retry(ctx);
            }
            Flight::AwaitingPubcomp => {
                if let Some(id) = self.packet_id {
                    ctx.emit(Packet::PubRel(PubRelPacket::new(id)));
                }
                self.arm_retry(ctx);
            }
            Flight::Parked(_) => {}
        }
        RequestResult::Pending
    }

    fn on_disconnected(&mut self, ctx: &mut RequestContext<'_>) -> RequestResult {
        ctx.cancel_timer();
        self.flight = match self.flight {
            Flight::AwaitingPuback => Flight::Parked(Resume::Puback),
            Flight::AwaitingPubrec => Flight::Parked(Resume::Pubrec),
            Flight::AwaitingPubcomp => Flight::Parked(Resume::Pubcomp),
            parked @ Flight::Parked(_) => parked,
        };
        RequestResult::Pending
    }

    fn on_connected(
        &mut self,
        session_present: bool,
        ctx: &mut RequestContext<'_>,
    ) -> RequestResult {
        let Flight::Parked(resume) = self.flight else {
            return RequestResult::Pending;
        };

        if session_present {
            // the broker kept our state; continue where we left off
            match resume {
                Resume::Puback => {
                    self.flight = Flight::AwaitingPuback;
                    ctx.emit(Packet::Publish(self.publish_packet(true)));
                }
                Resume::Pubrec => {
                    self.flight = Flight::AwaitingPubrec;
                    ctx.emit(Packet::Publish(self.publish_packet(true)));
                }
                Resume::Pubcomp => {
                    self.flight = Flight::AwaitingPubcomp;
                    if let Some(id) = self.packet_id {
                        ctx.emit(Packet::PubRel(PubRelPacket::new(id)));
                    }
                }
            }
        } else {
            // fresh session: the flow restarts from the beginning
            self.flight = if self.message.qos == QoS::AtLeastOnce {
                Flight::AwaitingPuback
            } else {
                Flight::AwaitingPubrec
            };
            ctx.emit(Packet::Publish(self.publish_packet(false)));
        }
        self.arm_retry(ctx);
        RequestResult::Pending
    }
}
