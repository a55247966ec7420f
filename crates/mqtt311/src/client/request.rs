//! The request abstraction: every operation the client multiplexes over
//! the connection (connect, publish, subscribe, unsubscribe, ping,
//! disconnect) is a state machine driven by protocol events. A request
//! emits packets and timer operations through [`RequestContext`] and
//! reports whether it is still in flight via [`RequestResult`].

use mqtt311_protocol::{MqttError, Packet, PacketIdAllocator, Result, SubscriptionResult};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Value a request resolves with.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Response {
    Connected { session_present: bool },
    Subscribed(Vec<SubscriptionResult>),
    Done,
}

/// Outcome of one event delivered to a request.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RequestResult {
    /// Stay in flight.
    Pending,
    /// Complete successfully and leave the in-flight set.
    Done(Response),
    /// Complete with an error and leave the in-flight set.
    Failed(MqttError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Connect,
    Publish,
    Subscribe,
    Unsubscribe,
    Ping,
    Disconnect,
}

/// One protocol operation. Default handlers ignore the event and stay
/// pending; each variant overrides the transitions it cares about.
pub(crate) trait Request: Send {
    fn kind(&self) -> RequestKind;

    /// Whether this request may start while the connection is not Active.
    fn can_run_disconnected(&self) -> bool {
        false
    }

    fn start(&mut self, ctx: &mut RequestContext<'_>) -> RequestResult;

    fn on_packet(&mut self, _packet: &Packet, _ctx: &mut RequestContext<'_>) -> RequestResult {
        RequestResult::Pending
    }

    fn on_connected(
        &mut self,
        _session_present: bool,
        _ctx: &mut RequestContext<'_>,
    ) -> RequestResult {
        RequestResult::Pending
    }

    fn on_disconnected(&mut self, _ctx: &mut RequestContext<'_>) -> RequestResult {
        RequestResult::Pending
    }

    fn on_timer(&mut self, _ctx: &mut RequestContext<'_>) -> RequestResult {
        RequestResult::Pending
    }
}

/// Timer operation requested during one callback. A request owns at most
/// one timer; scheduling replaces any armed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerOp {
    Schedule(Duration),
    Cancel,
}

/// Capabilities handed to a request during a callback: emit packets into
/// the current dispatch round, claim a packet identifier, and manage the
/// request's timer. The engine applies the side effects afterwards.
pub(crate) struct RequestContext<'a> {
    active: bool,
    out: &'a mut Vec<Packet>,
    ids: &'a mut PacketIdAllocator,
    timer_op: Option<TimerOp>,
    claimed_id: Option<u16>,
}

impl<'a> RequestContext<'a> {
    pub(crate) fn new(
        active: bool,
        out: &'a mut Vec<Packet>,
        ids: &'a mut PacketIdAllocator,
    ) -> Self {
        Self {
            active,
            out,
            ids,
            timer_op: None,
            claimed_id: None,
        }
    }

    /// Whether the connection is Active (CONNACK accepted).
    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    /// Queues a packet for the current dispatch round's single flush.
    pub(crate) fn emit(&mut self, packet: Packet) {
        self.out.push(packet);
    }

    /// Allocates a packet identifier owned by this request until it
    /// completes.
    pub(crate) fn claim_packet_id(&mut self) -> Result<u16> {
        let id = self.ids.allocate()?;
        self.claimed_id = Some(id);
        Ok(id)
    }

    pub(crate) fn schedule(&mut self, delay: Duration) {
        self.timer_op = Some(TimerOp::Schedule(delay));
    }

    pub(crate) fn cancel_timer(&mut self) {
        self.timer_op = Some(TimerOp::Cancel);
    }

    pub(crate) fn take_effects(self) -> (Option<TimerOp>, Option<u16>) {
        (self.timer_op, self.claimed_id)
    }
}

/// A submitted request plus its completion promise. An entry lives in
/// exactly one of the pending queue, the in-flight set, or nowhere once
/// completed.
pub(crate) struct Entry {
    pub(crate) id: u64,
    pub(crate) request: Box<dyn Request>,
    pub(crate) reply: Option<oneshot::Sender<Result<Response>>>,
    /// Identifier claimed by the request; released on completion.
    pub(crate) packet_id: Option<u16>,
    pub(crate) timer: Option<TimerHandle>,
    pub(crate) timer_generation: u64,
}

pub(crate) struct TimerHandle {
    pub(crate) generation: u64,
    pub(crate) task: JoinHandle<()>,
}

impl Entry {
    pub(crate) fn new(
        id: u64,
        request: Box<dyn Request>,
        reply: Option<oneshot::Sender<Result<Response>>>,
    ) -> Self {
        Self {
            id,
            request,
            reply,
            packet_id: None,
            timer: None,
            timer_generation: 0,
        }
    }

    pub(crate) fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.task.abort();
        }
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
