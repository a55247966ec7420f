//! Events processed by the client event loop. External callers only ever
//! post [`Command`]s; everything else is produced by the loop's own
//! helper tasks (reader, keep-alive ticker, timers, reconnect delays).

use crate::client::request::{Request, Response};
use mqtt311_protocol::{Message, MqttError, Packet, Result};
use tokio::sync::oneshot;

pub(crate) enum Event {
    Command(Command),
    /// Packet decoded by the reader task. `epoch` identifies which
    /// connection produced it; stale events are dropped.
    Inbound { epoch: u64, packet: Packet },
    /// The reader task hit a read or decode error, or end of stream.
    TransportError { epoch: u64, error: MqttError },
    /// A request's scheduled timer fired.
    Timer { entry_id: u64, generation: u64 },
    KeepAliveTick { epoch: u64 },
    /// A reconnect backoff delay elapsed.
    ReconnectAttempt,
}

pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<()>>,
    },
    Submit {
        request: Box<dyn Request>,
        reply: oneshot::Sender<Result<Response>>,
    },
    AddListener {
        id: u64,
        callback: Box<dyn Fn(&Message) + Send>,
    },
    RemoveListener {
        id: u64,
    },
    Shutdown,
}

impl From<Command> for Event {
    fn from(command: Command) -> Self {
        Event::Command(command)
    }
}
