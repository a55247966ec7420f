//! The client facade. Methods may be called from any task or thread;
//! every call is posted as a message to the client's event loop, and
//! completion comes back through a oneshot promise.

mod dispatcher;
mod engine;
mod events;
mod request;
mod requests;
mod supervisor;

use crate::error::{MqttError, Result};
use crate::transport::TransportConfig;
use events::{Command, Event};
use mqtt311_protocol::validation::{validate_topic_filter, validate_topic_name};
use mqtt311_protocol::{ConnectOptions, Message, Subscription, SubscriptionResult};
use request::{Request, Response};
use requests::{PublishRequest, SubscribeRequest, UnsubscribeRequest};
use std::sync::atomic::{AtomicU64, Ordering};
use supervisor::Supervisor;
use tokio::sync::{mpsc, oneshot};

/// An MQTT 3.1.1 client. Dropping the client shuts it down and fails all
/// outstanding requests.
pub struct MqttClient {
    events: mpsc::UnboundedSender<Event>,
    options: ConnectOptions,
    next_listener_id: AtomicU64,
}

impl MqttClient {
    /// Creates a client; no connection is opened until [`connect`] is
    /// called.
    ///
    /// [`connect`]: MqttClient::connect
    pub fn new(transport: TransportConfig, options: ConnectOptions) -> Result<Self> {
        options.validate()?;
        let events = Supervisor::spawn(transport, options.clone());
        Ok(Self {
            events,
            options,
            next_listener_id: AtomicU64::new(1),
        })
    }

    /// Opens the transport and performs the CONNECT handshake. Idempotent
    /// while connected; concurrent calls share the same outcome.
    pub async fn connect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { reply })?;
        rx.await.map_err(|_| MqttError::ClientShutdown)?
    }

    /// Sends DISCONNECT and closes the transport. No-op when already
    /// disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Disconnect { reply })?;
        rx.await.map_err(|_| MqttError::ClientShutdown)?
    }

    /// Publishes a message at its QoS level. The future resolves when the
    /// delivery handshake for that level completes.
    pub async fn publish(&self, message: Message) -> Result<()> {
        validate_topic_name(&message.topic)?;
        let request = PublishRequest::new(message, self.options.publish_retry_interval);
        match self.request(Box::new(request)).await? {
            Response::Done => Ok(()),
            other => Err(unexpected_response(&other)),
        }
    }

    /// Subscribes to one or more topic filters, resolving with the
    /// broker's per-filter results in request order.
    pub async fn subscribe(
        &self,
        subscriptions: Vec<Subscription>,
    ) -> Result<Vec<SubscriptionResult>> {
        if subscriptions.is_empty() {
            return Err(MqttError::Configuration(
                "subscribe requires at least one topic filter".to_string(),
            ));
        }
        for subscription in &subscriptions {
            validate_topic_filter(&subscription.topic_filter)?;
        }

        let request = SubscribeRequest::new(subscriptions, self.options.subscription_timeout);
        match self.request(Box::new(request)).await? {
            Response::Subscribed(results) => Ok(results),
            other => Err(unexpected_response(&other)),
        }
    }

    /// Removes one or more subscriptions.
    pub async fn unsubscribe(&self, topic_filters: Vec<String>) -> Result<()> {
        if topic_filters.is_empty() {
            return Err(MqttError::Configuration(
                "unsubscribe requires at least one topic filter".to_string(),
            ));
        }
        for filter in &topic_filters {
            validate_topic_filter(filter)?;
        }

        let request = UnsubscribeRequest::new(topic_filters, self.options.subscription_timeout);
        match self.request(Box::new(request)).await? {
            Response::Done => Ok(()),
            other => Err(unexpected_response(&other)),
        }
    }

    /// Registers a callback invoked for every inbound application
    /// message. The callback runs on the client's event loop and must not
    /// block.
    pub fn add_message_listener(
        &self,
        callback: impl Fn(&Message) + Send + 'static,
    ) -> ListenerHandle {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.send(Command::AddListener {
            id,
            callback: Box::new(callback),
        });
        ListenerHandle {
            id,
            events: self.events.clone(),
        }
    }

    /// Terminates the client: every queued and in-flight request fails
    /// with `ClientShutdown` and no further events are delivered.
    pub fn shutdown(&self) {
        let _ = self.send(Command::Shutdown);
    }

    async fn request(&self, request: Box<dyn Request>) -> Result<Response> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Submit { request, reply })?;
        rx.await.map_err(|_| MqttError::ClientShutdown)?
    }

    fn send(&self, command: Command) -> Result<()> {
        self.events
            .send(Event::Command(command))
            .map_err(|_| MqttError::ClientShutdown)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Command(Command::Shutdown));
    }
}

fn unexpected_response(response: &Response) -> MqttError {
    MqttError::Configuration(format!("unexpected internal response: {response:?}"))
}

/// Handle returned by [`MqttClient::add_message_listener`]; detaches the
/// listener on [`stop`](ListenerHandle::stop). Stopping after client
/// shutdown is a no-op.
pub struct ListenerHandle {
    id: u64,
    events: mpsc::UnboundedSender<Event>,
}

impl ListenerHandle {
    pub fn stop(&self) {
        let _ = self
            .events
            .send(Event::Command(Command::RemoveListener { id: self.id }));
    }
}
