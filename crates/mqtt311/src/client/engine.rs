//! The request engine: owns the pending queue and the in-flight set,
//! admits requests under the in-flight cap, dispatches protocol events to
//! each in-flight state machine, and enforces packet identifier
//! discipline (an identifier is released only when its request
//! completes).
//!
//! All mutation happens on the client event loop; the engine itself is
//! plain single-threaded state.

use crate::client::events::Event;
use crate::client::request::{
    Entry, Request, RequestContext, RequestKind, RequestResult, Response, TimerHandle, TimerOp,
};
use mqtt311_protocol::{MqttError, Packet, PacketIdAllocator, Result};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

/// What one engine call produced: packets for this dispatch round's
/// single flush, plus completion summaries the supervisor reacts to.
#[derive(Default)]
pub(crate) struct EngineOutput {
    pub(crate) packets: Vec<Packet>,
    pub(crate) completed: Vec<Completed>,
}

/// A completed request: its result, and the caller's promise when one
/// exists. The supervisor resolves the promise only after the round's
/// packets have been flushed, so a caller never observes completion
/// before its packet reached the transport.
pub(crate) struct Completed {
    pub(crate) kind: RequestKind,
    pub(crate) result: Result<Response>,
    pub(crate) reply: Option<oneshot::Sender<Result<Response>>>,
}

impl Completed {
    /// Sends the result to the caller, keeping a summary for lifecycle
    /// handling.
    pub(crate) fn resolve(self) -> (RequestKind, Result<Option<bool>>) {
        let summary = match &self.result {
            Ok(Response::Connected { session_present }) => Ok(Some(*session_present)),
            Ok(_) => Ok(None),
            Err(error) => Err(error.clone()),
        };
        if let Some(reply) = self.reply {
            let _ = reply.send(self.result);
        }
        (self.kind, summary)
    }
}

pub(crate) struct RequestEngine {
    queue: VecDeque<Entry>,
    inflight: Vec<Entry>,
    ids: PacketIdAllocator,
    max_inflight: usize,
    active: bool,
    next_entry_id: u64,
    events: mpsc::UnboundedSender<Event>,
}

impl RequestEngine {
    pub(crate) fn new(max_inflight: usize, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            queue: VecDeque::new(),
            inflight: Vec::new(),
            ids: PacketIdAllocator::new(),
            max_inflight,
            active: false,
            next_entry_id: 1,
            events,
        }
    }

    pub(crate) fn submit(
        &mut self,
        request: Box<dyn Request>,
        reply: Option<oneshot::Sender<Result<Response>>>,
        out: &mut EngineOutput,
    ) {
        let id = self.next_entry_id;
        self.next_entry_id += 1;
        self.queue.push_back(Entry::new(id, request, reply));
        self.pump(out);
    }

    /// Admits queued entries into the in-flight set. While Active the
    /// queue drains head-first under the in-flight cap; while not, only
    /// requests that may run disconnected (connect, disconnect) are
    /// started. Those lifecycle requests also bypass the cap, so a
    /// reconnect CONNECT can never starve behind parked publishes.
    pub(crate) fn pump(&mut self, out: &mut EngineOutput) {
        loop {
            let index = if self.active && self.inflight.len() < self.max_inflight {
                if self.queue.is_empty() {
                    return;
                }
                0
            } else {
                match self
                    .queue
                    .iter()
                    .position(|e| e.request.can_run_disconnected())
                {
                    Some(index) => index,
                    None => return,
                }
            };

            let Some(mut entry) = self.queue.remove(index) else {
                return;
            };
            let mut ctx = RequestContext::new(self.active, &mut out.packets, &mut self.ids);
            let result = entry.request.start(&mut ctx);
            let (timer_op, claimed) = ctx.take_effects();
            if claimed.is_some() {
                entry.packet_id = claimed;
            }

            match result {
                RequestResult::Pending => {
                    self.apply_timer_op(&mut entry, timer_op);
                    self.inflight.push(entry);
                }
                result => self.complete(entry, result, out),
            }
        }
    }

    pub(crate) fn handle_packet(&mut self, packet: &Packet, out: &mut EngineOutput) {
        self.dispatch(out, |request, ctx| request.on_packet(packet, ctx));
        self.pump(out);
    }

    pub(crate) fn handle_connected(&mut self, session_present: bool, out: &mut EngineOutput) {
        self.active = true;
        self.dispatch(out, |request, ctx| {
            request.on_connected(session_present, ctx)
        });
        self.pump(out);
    }

    pub(crate) fn handle_disconnected(&mut self, out: &mut EngineOutput) {
        self.active = false;
        self.dispatch(out, |request, ctx| request.on_disconnected(ctx));
        self.pump(out);
    }

    /// Delivers a fired timer to its entry. Stale firings (cancelled or
    /// re-armed timers) are identified by generation and dropped.
    pub(crate) fn handle_timer(&mut self, entry_id: u64, generation: u64, out: &mut EngineOutput) {
        let Some(index) = self.inflight.iter().position(|e| {
            e.id == entry_id
                && e.timer
                    .as_ref()
                    .is_some_and(|timer| timer.generation == generation)
        }) else {
            return;
        };

        let mut entry = self.inflight.remove(index);
        entry.timer = None;

        let mut ctx = RequestContext::new(self.active, &mut out.packets, &mut self.ids);
        let result = entry.request.on_timer(&mut ctx);
        let (timer_op, _) = ctx.take_effects();

        match result {
            RequestResult::Pending => {
                self.apply_timer_op(&mut entry, timer_op);
                self.inflight.insert(index, entry);
            }
            result => self.complete(entry, result, out),
        }
        self.pump(out);
    }

    /// Fails every queued and in-flight entry; no further events are
    /// delivered afterwards.
    pub(crate) fn shutdown(&mut self) {
        for mut entry in self.queue.drain(..).chain(self.inflight.drain(..)) {
            entry.cancel_timer();
            if let Some(packet_id) = entry.packet_id.take() {
                self.ids.release(packet_id);
            }
            if let Some(reply) = entry.reply.take() {
                let _ = reply.send(Err(MqttError::ClientShutdown));
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    #[cfg(test)]
    pub(crate) fn queued_len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub(crate) fn allocated_ids(&self) -> usize {
        self.ids.allocated()
    }

    fn dispatch<F>(&mut self, out: &mut EngineOutput, mut f: F)
    where
        F: FnMut(&mut dyn Request, &mut RequestContext<'_>) -> RequestResult,
    {
        let inflight = std::mem::take(&mut self.inflight);
        let mut survivors = Vec::with_capacity(inflight.len());

        for mut entry in inflight {
            let mut ctx = RequestContext::new(self.active, &mut out.packets, &mut self.ids);
            let result = f(entry.request.as_mut(), &mut ctx);
            let (timer_op, claimed) = ctx.take_effects();
            if claimed.is_some() {
                entry.packet_id = claimed;
            }

            match result {
                RequestResult::Pending => {
                    self.apply_timer_op(&mut entry, timer_op);
                    survivors.push(entry);
                }
                result => self.complete(entry, result, out),
            }
        }

        self.inflight = survivors;
    }

    fn apply_timer_op(&mut self, entry: &mut Entry, op: Option<TimerOp>) {
        match op {
            None => {}
            Some(TimerOp::Cancel) => entry.cancel_timer(),
            Some(TimerOp::Schedule(delay)) => {
                entry.cancel_timer();
                entry.timer_generation += 1;
                let generation = entry.timer_generation;
                let entry_id = entry.id;
                let events = self.events.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(Event::Timer {
                        entry_id,
                        generation,
                    });
                });
                entry.timer = Some(TimerHandle { generation, task });
            }
        }
    }

    fn complete(&mut self, mut entry: Entry, result: RequestResult, out: &mut EngineOutput) {
        entry.cancel_timer();
        if let Some(packet_id) = entry.packet_id.take() {
            self.ids.release(packet_id);
        }

        let kind = entry.request.kind();
        let result = match result {
            RequestResult::Done(response) => Ok(response),
            RequestResult::Failed(error) => {
                tracing::debug!(?kind, %error, "Request failed");
                Err(error)
            }
            RequestResult::Pending => unreachable!("pending entries are not completed"),
        };
        out.completed.push(Completed {
            kind,
            result,
            reply: entry.reply.take(),
        });
    }
}
