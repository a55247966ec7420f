use crate::client::request::{Request, RequestContext, RequestKind, RequestResult, Response};
use mqtt311_protocol::packet::ConnectPacket;
use mqtt311_protocol::{ConnectOptions, MqttError, Packet};
use std::time::Duration;

/// CONNECT handshake: emit the packet, wait for CONNACK within the
/// connect timeout.
pub(crate) struct ConnectRequest {
    packet: ConnectPacket,
    timeout: Duration,
}

impl ConnectRequest {
    pub(crate) fn new(options: &ConnectOptions) -> Self {
        let mut packet = ConnectPacket::new(options.client_id.clone())
            .with_clean_session(options.clean_session)
            .with_keep_alive(options.keep_alive.as_secs().try_into().unwrap_or(u16::MAX));
        if let Some(will) = &options.will {
            packet = packet.with_will(will.clone());
        }
        if let Some(credentials) = &options.credentials {
            packet = packet.with_credentials(credentials.clone());
        }
        Self {
            packet,
            timeout: options.connect_timeout,
        }
    }
}

impl Request for ConnectRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::Connect
    }

    fn can_run_disconnected(&self) -> bool {
        true
    }

    fn start(&mut self, ctx: &mut RequestContext<'_>) -> RequestResult {
        ctx.emit(Packet::Connect(Box::new(self.packet.clone())));
        ctx.schedule(self.timeout);
        RequestResult::Pending
    }

    fn on_packet(&mut self, packet: &Packet, _ctx: &mut RequestContext<'_>) -> RequestResult {
        let Packet::ConnAck(connack) = packet else {
            return RequestResult::Pending;
        };

        if connack.return_code.is_accepted() {
            RequestResult::Done(Response::Connected {
                session_present: connack.session_present,
            })
        } else {
            RequestResult::Failed(MqttError::ConnectionRefused(connack.return_code))
        }
    }

    fn on_disconnected(&mut self, _ctx: &mut RequestContext<'_>) -> RequestResult {
        RequestResult::Failed(MqttError::ConnectionClosed)
    }

    fn on_timer(&mut self, _ctx: &mut RequestContext<'_>) -> RequestResult {
        RequestResult::Failed(MqttError::Timeout)
    }
}
