//! The connection supervisor and client event loop. One task per client
//! owns the engine, the dispatcher, the connection state, and the
//! transport write half; a reader task per connection and one-shot timer
//! tasks feed events back through the loop's channel, so all protocol
//! state mutation is single-threaded.

use crate::client::dispatcher::Dispatcher;
use crate::client::engine::{Completed, EngineOutput, RequestEngine};
use crate::client::events::{Command, Event};
use crate::client::request::RequestKind;
use crate::client::requests::{ConnectRequest, DisconnectRequest, PingRequest};
use crate::transport::{PacketReader, PacketWriter, TransportConfig};
use mqtt311_protocol::{ConnectOptions, MqttError, Packet, ReconnectPolicy};
use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Disconnected,
    Connecting,
    Active { session_present: bool },
    Closing,
}

pub(crate) struct Supervisor {
    options: ConnectOptions,
    transport: TransportConfig,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    engine: RequestEngine,
    dispatcher: Dispatcher,
    state: ConnectionState,
    /// Incremented per connection; events from older connections are
    /// dropped.
    epoch: u64,
    writer: Option<PacketWriter>,
    reader_task: Option<JoinHandle<()>>,
    keepalive_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
    last_write: Instant,
    ping_outstanding: bool,
    reconnect_attempt: u32,
    /// Cleared by a user disconnect, shutdown, or an auth-class refusal.
    auto_reconnect: bool,
    pending_connects: Vec<tokio::sync::oneshot::Sender<mqtt311_protocol::Result<()>>>,
    pending_disconnects: Vec<tokio::sync::oneshot::Sender<mqtt311_protocol::Result<()>>>,
    shutting_down: bool,
}

impl Supervisor {
    pub(crate) fn spawn(
        transport: TransportConfig,
        options: ConnectOptions,
    ) -> mpsc::UnboundedSender<Event> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let supervisor = Self::new(transport, options, events_tx.clone(), events_rx);
        tokio::spawn(supervisor.run());
        events_tx
    }

    fn new(
        transport: TransportConfig,
        options: ConnectOptions,
        events_tx: mpsc::UnboundedSender<Event>,
        events_rx: mpsc::UnboundedReceiver<Event>,
    ) -> Self {
        let engine = RequestEngine::new(options.max_inflight, events_tx.clone());
        Self {
            options,
            transport,
            events_tx,
            events_rx,
            engine,
            dispatcher: Dispatcher::new(),
            state: ConnectionState::Disconnected,
            epoch: 0,
            writer: None,
            reader_task: None,
            keepalive_task: None,
            reconnect_task: None,
            last_write: Instant::now(),
            ping_outstanding: false,
            reconnect_attempt: 0,
            auto_reconnect: false,
            pending_connects: Vec::new(),
            pending_disconnects: Vec::new(),
            shutting_down: false,
        }
    }

    async fn run(mut self) {
        tracing::debug!(client_id = %self.options.client_id, "Client event loop started");
        while let Some(event) = self.events_rx.recv().await {
            let mut out = EngineOutput::default();
            let stop = self.handle_event(event, &mut out).await;
            self.drain(out).await;
            if stop {
                break;
            }
        }
        tracing::debug!(client_id = %self.options.client_id, "Client event loop stopped");
    }

    async fn handle_event(&mut self, event: Event, out: &mut EngineOutput) -> bool {
        match event {
            Event::Command(command) => return self.handle_command(command, out).await,
            Event::Inbound { epoch, packet } => {
                if epoch != self.epoch {
                    return false;
                }
                match &packet {
                    Packet::Publish(publish) => {
                        self.dispatcher.handle_publish(publish, &mut out.packets);
                    }
                    Packet::PubRel(pubrel) => {
                        self.dispatcher.handle_pubrel(pubrel.packet_id, &mut out.packets);
                    }
                    _ => {}
                }
                self.engine.handle_packet(&packet, out);
            }
            Event::TransportError { epoch, error } => {
                if epoch == self.epoch {
                    self.handle_unexpected_close(error, out);
                }
            }
            Event::Timer {
                entry_id,
                generation,
            } => {
                self.engine.handle_timer(entry_id, generation, out);
            }
            Event::KeepAliveTick { epoch } => self.handle_keepalive_tick(epoch, out),
            Event::ReconnectAttempt => {
                self.reconnect_task = None;
                if self.state == ConnectionState::Disconnected
                    && self.auto_reconnect
                    && !self.shutting_down
                {
                    self.try_connect(out).await;
                }
            }
        }
        false
    }

    async fn handle_command(&mut self, command: Command, out: &mut EngineOutput) -> bool {
        match command {
            Command::Connect { reply } => match self.state {
                ConnectionState::Active { .. } => {
                    let _ = reply.send(Ok(()));
                }
                ConnectionState::Connecting | ConnectionState::Closing => {
                    self.pending_connects.push(reply);
                }
                ConnectionState::Disconnected => {
                    self.pending_connects.push(reply);
                    self.auto_reconnect = true;
                    self.reconnect_attempt = 0;
                    if let Some(task) = self.reconnect_task.take() {
                        task.abort();
                    }
                    self.try_connect(out).await;
                }
            },
            Command::Disconnect { reply } => match self.state {
                ConnectionState::Disconnected => {
                    let _ = reply.send(Ok(()));
                }
                ConnectionState::Closing => self.pending_disconnects.push(reply),
                ConnectionState::Connecting | ConnectionState::Active { .. } => {
                    self.pending_disconnects.push(reply);
                    self.auto_reconnect = false;
                    if let Some(task) = self.reconnect_task.take() {
                        task.abort();
                    }
                    self.state = ConnectionState::Closing;
                    tracing::debug!("Disconnecting");
                    self.engine.submit(Box::new(DisconnectRequest), None, out);
                }
            },
            Command::Submit { request, reply } => {
                self.engine.submit(request, Some(reply), out);
            }
            Command::AddListener { id, callback } => {
                self.dispatcher.add_listener(id, callback);
            }
            Command::RemoveListener { id } => self.dispatcher.remove_listener(id),
            Command::Shutdown => {
                self.shutdown();
                return true;
            }
        }
        false
    }

    /// Writes pending packets and reacts to request completions until the
    /// round has fully settled. Packets produced by one event are flushed
    /// together.
    async fn drain(&mut self, mut out: EngineOutput) {
        loop {
            let packets = std::mem::take(&mut out.packets);
            if !packets.is_empty() {
                self.write_packets(packets, &mut out).await;
            }
            if out.completed.is_empty() {
                if out.packets.is_empty() {
                    break;
                }
                continue;
            }
            let completed = std::mem::take(&mut out.completed);
            for completion in completed {
                self.on_request_completed(completion, &mut out).await;
            }
        }
    }

    async fn write_packets(&mut self, packets: Vec<Packet>, out: &mut EngineOutput) {
        let Some(writer) = self.writer.as_mut() else {
            tracing::debug!(count = packets.len(), "Dropping packets, no transport");
            return;
        };

        for packet in &packets {
            if let Err(error) = writer.write_packet(packet) {
                tracing::error!(%error, "Failed to encode outbound packet");
            }
        }
        match writer.flush().await {
            Ok(()) => self.last_write = Instant::now(),
            Err(error) => {
                tracing::warn!(%error, "Transport write failed");
                self.handle_unexpected_close(error, out);
            }
        }
    }

    async fn on_request_completed(&mut self, completion: Completed, out: &mut EngineOutput) {
        let (kind, summary) = completion.resolve();
        match (kind, summary) {
            (RequestKind::Connect, Ok(session_present)) => {
                self.on_connected(session_present.unwrap_or(false), out);
            }
            (RequestKind::Connect, Err(error)) => self.fail_connect(&error, out),
            (RequestKind::Ping, Ok(_)) => self.ping_outstanding = false,
            (RequestKind::Ping, Err(error)) => {
                self.ping_outstanding = false;
                if error == MqttError::KeepAliveTimeout {
                    tracing::error!("Keep-alive timeout, closing transport");
                    self.handle_unexpected_close(error, out);
                }
            }
            (RequestKind::Disconnect, _) => self.finish_disconnect(out).await,
            _ => {}
        }
    }

    fn on_connected(&mut self, session_present: bool, out: &mut EngineOutput) {
        self.state = ConnectionState::Active { session_present };
        self.reconnect_attempt = 0;
        self.engine.handle_connected(session_present, out);
        self.dispatcher.connected(session_present);
        self.start_keepalive();
        for reply in self.pending_connects.drain(..) {
            let _ = reply.send(Ok(()));
        }
        tracing::info!(session_present, "Connected");
    }

    fn fail_connect(&mut self, error: &MqttError, out: &mut EngineOutput) {
        tracing::warn!(%error, "Connect failed");
        self.teardown_transport(out);
        self.state = ConnectionState::Disconnected;
        for reply in self.pending_connects.drain(..) {
            let _ = reply.send(Err(error.clone()));
        }
        self.maybe_schedule_reconnect(error);
    }

    async fn finish_disconnect(&mut self, out: &mut EngineOutput) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(error) = writer.close().await {
                tracing::debug!(%error, "Error closing transport");
            }
        }
        self.teardown_transport(out);
        self.state = ConnectionState::Disconnected;
        for reply in self.pending_disconnects.drain(..) {
            let _ = reply.send(Ok(()));
        }
        tracing::info!("Disconnected");

        // a connect() issued while we were closing starts a new session
        if !self.pending_connects.is_empty() {
            self.auto_reconnect = true;
            self.reconnect_attempt = 0;
            self.try_connect(out).await;
        }
    }

    fn handle_unexpected_close(&mut self, error: MqttError, out: &mut EngineOutput) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        tracing::warn!(%error, "Connection lost");
        self.teardown_transport(out);
        self.state = ConnectionState::Disconnected;
        self.maybe_schedule_reconnect(&error);
    }

    /// Aborts the per-connection tasks and tells the engine the transport
    /// is gone; in-flight requests decide for themselves whether to fail
    /// or park until reconnect.
    fn teardown_transport(&mut self, out: &mut EngineOutput) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.keepalive_task.take() {
            task.abort();
        }
        self.writer = None;
        self.ping_outstanding = false;
        self.engine.handle_disconnected(out);
    }

    async fn try_connect(&mut self, out: &mut EngineOutput) {
        self.state = ConnectionState::Connecting;
        tracing::debug!("Opening transport");
        let opened =
            tokio::time::timeout(self.options.connect_timeout, self.transport.open()).await;
        match opened {
            Ok(Ok(transport)) => {
                self.attach_transport(transport);
                let request = ConnectRequest::new(&self.options);
                self.engine.submit(Box::new(request), None, out);
            }
            Ok(Err(error)) => self.fail_connect(&error, out),
            Err(_) => self.fail_connect(&MqttError::Timeout, out),
        }
    }

    fn attach_transport(&mut self, transport: crate::transport::TransportType) {
        self.epoch += 1;
        let epoch = self.epoch;
        let (reader_half, writer_half) = transport.into_split();
        self.writer = Some(PacketWriter::new(writer_half));
        self.last_write = Instant::now();
        self.ping_outstanding = false;

        let mut reader = PacketReader::new(reader_half);
        let events = self.events_tx.clone();
        self.reader_task = Some(tokio::spawn(async move {
            loop {
                match reader.read_packet().await {
                    Ok(packet) => {
                        if events.send(Event::Inbound { epoch, packet }).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        let _ = events.send(Event::TransportError { epoch, error });
                        break;
                    }
                }
            }
        }));
    }

    fn start_keepalive(&mut self) {
        if let Some(task) = self.keepalive_task.take() {
            task.abort();
        }
        let keep_alive = self.options.keep_alive;
        if keep_alive.is_zero() {
            tracing::debug!("Keep-alive disabled");
            return;
        }

        let period = (keep_alive / 4).max(Duration::from_millis(100));
        let epoch = self.epoch;
        let events = self.events_tx.clone();
        self.keepalive_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                if events.send(Event::KeepAliveTick { epoch }).is_err() {
                    break;
                }
            }
        }));
    }

    fn handle_keepalive_tick(&mut self, epoch: u64, out: &mut EngineOutput) {
        if epoch != self.epoch
            || !matches!(self.state, ConnectionState::Active { .. })
            || self.ping_outstanding
        {
            return;
        }

        let idle = self.last_write.elapsed();
        if idle >= self.ping_threshold() {
            tracing::debug!(idle_ms = idle.as_millis() as u64, "Transport idle, pinging");
            self.ping_outstanding = true;
            let request = PingRequest::new(self.options.keep_alive / 2);
            self.engine.submit(Box::new(request), None, out);
        }
    }

    fn ping_threshold(&self) -> Duration {
        self.options.keep_alive * 3 / 4
    }

    fn maybe_schedule_reconnect(&mut self, error: &MqttError) {
        if self.shutting_down || !self.auto_reconnect {
            return;
        }
        if error.is_auth_refusal() {
            tracing::warn!("Authentication refused by broker, reconnect disabled");
            self.auto_reconnect = false;
            return;
        }
        let ReconnectPolicy::Retry { max_attempts, .. } = &self.options.reconnect else {
            return;
        };
        if let Some(max) = max_attempts {
            if self.reconnect_attempt >= *max {
                tracing::warn!(attempts = self.reconnect_attempt, "Reconnect attempts exhausted");
                return;
            }
        }
        if self.reconnect_task.is_some() {
            return;
        }

        let delay = self.backoff_delay(self.reconnect_attempt);
        self.reconnect_attempt += 1;
        tracing::info!(
            attempt = self.reconnect_attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        let events = self.events_tx.clone();
        self.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::ReconnectAttempt);
        }));
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let ReconnectPolicy::Retry {
            initial_backoff,
            max_backoff,
            jitter,
            ..
        } = &self.options.reconnect
        else {
            return Duration::ZERO;
        };

        let delay = initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
            .min(*max_backoff);
        if *jitter {
            delay
                .mul_f64(rand::thread_rng().gen_range(1.0..1.5))
                .min(*max_backoff)
        } else {
            delay
        }
    }

    fn shutdown(&mut self) {
        tracing::debug!("Client shutting down");
        self.shutting_down = true;
        self.auto_reconnect = false;
        if let Some(task) = self.reconnect_task.take() {
            task.abort();
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.keepalive_task.take() {
            task.abort();
        }
        self.writer = None;
        self.engine.shutdown();
        self.dispatcher.clear();
        for reply in self.pending_connects.drain(..) {
            let _ = reply.send(Err(MqttError::ClientShutdown));
        }
        for reply in self.pending_disconnects.drain(..) {
            let _ = reply.send(Err(MqttError::ClientShutdown));
        }
        self.state = ConnectionState::Disconnected;
    }
}
