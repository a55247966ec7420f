//! Per-request state machines.

mod connect;
mod disconnect;
mod ping;
mod publish;
mod subscribe;
mod unsubscribe;

pub(crate) use connect::ConnectRequest;
pub(crate) use disconnect::DisconnectRequest;
pub(crate) use ping::PingRequest;
pub(crate) use publish::PublishRequest;
pub(crate) use subscribe::SubscribeRequest;
pub(crate) use unsubscribe::UnsubscribeRequest;

#[cfg(test)]
pub(crate) mod test_util {
    use crate::client::request::{RequestContext, TimerOp};
    use mqtt311_protocol::{Packet, PacketIdAllocator};

    /// Drives a request callback by hand and captures its effects.
    pub(crate) struct Harness {
        pub(crate) out: Vec<Packet>,
        pub(crate) ids: PacketIdAllocator,
        pub(crate) last_timer_op: Option<TimerOp>,
        pub(crate) last_claimed_id: Option<u16>,
        pub(crate) active: bool,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            Self {
                out: Vec::new(),
                ids: PacketIdAllocator::new(),
                last_timer_op: None,
                last_claimed_id: None,
                active: true,
            }
        }

        pub(crate) fn inactive() -> Self {
            Self {
                active: false,
                ..Self::new()
            }
        }

        pub(crate) fn call<R>(
            &mut self,
            f: impl FnOnce(&mut RequestContext<'_>) -> R,
        ) -> R {
            self.out.clear();
            let mut ctx = RequestContext::new(self.active, &mut self.out, &mut self.ids);
            let result = f(&mut ctx);
            let (timer_op, claimed) = ctx.take_effects();
            self.last_timer_op = timer_op;
            if claimed.is_some() {
                self.last_claimed_id = claimed;
            }
            result
        }
    }
}
