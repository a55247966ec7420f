use crate::client::request::{Request, RequestContext, RequestKind, RequestResult, Response};
use mqtt311_protocol::packet::UnsubscribePacket;
use mqtt311_protocol::{MqttError, Packet};
use std::time::Duration;

/// UNSUBSCRIBE flow, symmetric to subscribe over UNSUBACK.
pub(crate) struct UnsubscribeRequest {
    topic_filters: Vec<String>,
    timeout: Duration,
    packet_id: Option<u16>,
}

impl UnsubscribeRequest {
    pub(crate) fn new(topic_filters: Vec<String>, timeout: Duration) -> Self {
        Self {
            topic_filters,
            timeout,
            packet_id: None,
        }
    }
}

impl Request for UnsubscribeRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::Unsubscribe
    }

    fn start(&mut self, ctx: &mut RequestContext<'_>) -> RequestResult {
        if !ctx.is_active() {
            return RequestResult::Failed(MqttError::NotConnected);
        }
        let id = match ctx.claim_packet_id() {
            Ok(id) => id,
            Err(e) => return RequestResult::Failed(e),
        };
        self.packet_id = Some(id);

        let packet = UnsubscribePacket {
            packet_id: id,
            topic_filters: self.topic_filters.clone(),
        };
        ctx.emit(Packet::Unsubscribe(packet));
        ctx.schedule(self.timeout);
        RequestResult::Pending
    }

    fn on_packet(&mut self, packet: &Packet, _ctx: &mut RequestContext<'_>) -> RequestResult {
        let Packet::UnsubAck(unsuback) = packet else {
            return RequestResult::Pending;
        };
        if Some(unsuback.packet_id) != self.packet_id {
            return RequestResult::Pending;
        }
        RequestResult::Done(Response::Done)
    }

    fn on_disconnected(&mut self, _ctx: &mut RequestContext<'_>) -> RequestResult {
        RequestResult::Failed(MqttError::ConnectionClosed)
    }

    fn on_timer(&mut self, _ctx: &mut RequestContext<'_>) -> RequestResult {
        RequestResult::Failed(MqttError::Timeout)
    }
}
