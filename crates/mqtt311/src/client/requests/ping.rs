use crate::client::request::{Request, RequestContext, RequestKind, RequestResult, Response};
use mqtt311_protocol::{MqttError, Packet};
use std::time::Duration;

/// Keep-alive probe issued by the supervisor. A missing PINGRESP fails
/// with `KeepAliveTimeout`, which the supervisor escalates to a transport
/// close.
pub(crate) struct PingRequest {
    timeout: Duration,
}

impl PingRequest {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Request for PingRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::Ping
    }

    fn start(&mut self, ctx: &mut RequestContext<'_>) -> RequestResult {
        if !ctx.is_active() {
            return RequestResult::Failed(MqttError::NotConnected);
        }
        ctx.emit(Packet::PingReq);
        ctx.schedule(self.timeout);
        RequestResult::Pending
    }

    fn on_packet(&mut self, packet: &Packet, _ctx: &mut RequestContext<'_>) -> RequestResult {
        if matches!(packet, Packet::PingResp) {
            RequestResult::Done(Response::Done)
        } else {
            RequestResult::Pending
        }
    }

    fn on_disconnected(&mut self, _ctx: &mut RequestContext<'_>) -> RequestResult {
        RequestResult::Failed(MqttError::ConnectionClosed)
    }

    fn on_timer(&mut self, _ctx: &mut RequestContext<'_>) -> RequestResult {
        RequestResult::Failed(MqttError::KeepAliveTimeout)
    }
}
