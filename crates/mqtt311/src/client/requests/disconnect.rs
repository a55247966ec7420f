use crate::client::request::{Request, RequestContext, RequestKind, RequestResult, Response};
use mqtt311_protocol::Packet;

/// Graceful DISCONNECT: emit the packet and complete. The supervisor
/// closes the write side once the packet has been flushed.
pub(crate) struct DisconnectRequest;

impl Request for DisconnectRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::Disconnect
    }

    fn can_run_disconnected(&self) -> bool {
        true
    }

    fn start(&mut self, ctx: &mut RequestContext<'_>) -> RequestResult {
        ctx.emit(Packet::Disconnect);
        RequestResult::Done(Response::Done)
    }
}
