use crate::client::request::{Request, RequestContext, RequestKind, RequestResult, Response};
use mqtt311_protocol::packet::SubscribePacket;
use mqtt311_protocol::{MqttError, Packet, Subscription};
use std::time::Duration;

/// SUBSCRIBE flow. Subscriptions do not survive a transport drop at this
/// layer: a disconnect while the SUBACK is outstanding fails the request.
pub(crate) struct SubscribeRequest {
    subscriptions: Vec<Subscription>,
    timeout: Duration,
    packet_id: Option<u16>,
}

impl SubscribeRequest {
    pub(crate) fn new(subscriptions: Vec<Subscription>, timeout: Duration) -> Self {
        Self {
            subscriptions,
            timeout,
            packet_id: None,
        }
    }
}

impl Request for SubscribeRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::Subscribe
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

        let packet = SubscribePacket {
            packet_id: id,
            subscriptions: self.subscriptions.clone(),
        };
        ctx.emit(Packet::Subscribe(packet));
        ctx.schedule(self.timeout);
        RequestResult::Pending
    }

    fn on_packet(&mut self, packet: &Packet, _ctx: &mut RequestContext<'_>) -> RequestResult {
        let Packet::SubAck(suback) = packet else {
            return RequestResult::Pending;
        };
        if Some(suback.packet_id) != self.packet_id {
            return RequestResult::Pending;
        }
        RequestResult::Done(Response::Subscribed(suback.results.clone()))
    }

    fn on_disconnected(&mut self, _ctx: &mut RequestContext<'_>) -> RequestResult {
        RequestResult::Failed(MqttError::ConnectionClosed)
    }

    fn on_timer(&mut self, _ctx: &mut RequestContext<'_>) -> RequestResult {
        RequestResult::Failed(MqttError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::request::TimerOp;
    use crate::client::requests::test_util::Harness;
    use mqtt311_protocol::packet::SubAckPacket;
    use mqtt311_protocol::{QoS, SubscriptionResult};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn request() -> SubscribeRequest {
        SubscribeRequest::new(
            vec![
                Subscription::new("a/+", QoS::AtLeastOnce),
                Subscription::new("b/#", QoS::ExactlyOnce),
            ],
            TIMEOUT,
        )
    }

    #[test]
    fn start_emits_subscribe_with_claimed_id() {
        let mut harness = Harness::new();
        let mut request = request();

        assert_eq!(
            harness.call(|ctx| request.start(ctx)),
            RequestResult::Pending
        );
        let id = harness.last_claimed_id.unwrap();
        match &harness.out[0] {
            Packet::Subscribe(p) => {
                assert_eq!(p.packet_id, id);
                assert_eq!(p.subscriptions.len(), 2);
            }
            other => panic!("expected SUBSCRIBE, got {other:?}"),
        }
        assert_eq!(harness.last_timer_op, Some(TimerOp::Schedule(TIMEOUT)));
    }

    #[test]
    fn suback_resolves_results_in_order() {
        let mut harness = Harness::new();
        let mut request = request();
        harness.call(|ctx| request.start(ctx));
        let id = harness.last_claimed_id.unwrap();

        let suback = Packet::SubAck(SubAckPacket::new(
            id,
            vec![
                SubscriptionResult::Granted(QoS::AtLeastOnce),
                SubscriptionResult::Failed,
            ],
        ));
        assert_eq!(
            harness.call(|ctx| request.on_packet(&suback, ctx)),
            RequestResult::Done(Response::Subscribed(vec![
                SubscriptionResult::Granted(QoS::AtLeastOnce),
                SubscriptionResult::Failed,
            ]))
        );
    }

    #[test]
    fn suback_for_other_id_ignored() {
        let mut harness = Harness::new();
        let mut request = request();
        harness.call(|ctx| request.start(ctx));
        let id = harness.last_claimed_id.unwrap();

        let suback = Packet::SubAck(SubAckPacket::new(
            id + 1,
            vec![SubscriptionResult::Granted(QoS::AtMostOnce)],
        ));
        assert_eq!(
            harness.call(|ctx| request.on_packet(&suback, ctx)),
            RequestResult::Pending
        );
    }

    #[test]
    fn timeout_fails() {
        let mut harness = Harness::new();
        let mut request = request();
        harness.call(|ctx| request.start(ctx));

        assert_eq!(
            harness.call(|ctx| request.on_timer(ctx)),
            RequestResult::Failed(MqttError::Timeout)
        );
    }

    #[test]
    fn disconnect_fails() {
        let mut harness = Harness::new();
        let mut request = request();
        harness.call(|ctx| request.start(ctx));

        assert_eq!(
            harness.call(|ctx| request.on_disconnected(ctx)),
            RequestResult::Failed(MqttError::ConnectionClosed)
        );
    }

    #[test]
    fn start_fails_when_not_active() {
        let mut harness = Harness::inactive();
        let mut request = request();
        assert_eq!(
            harness.call(|ctx| request.start(ctx)),
            RequestResult::Failed(MqttError::NotConnected)
        );
    }
}
