#![warn(clippy::pedantic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod client;
pub mod error;
pub mod transport;

pub use client::{ListenerHandle, MqttClient};
pub use error::{MqttError, Result};
pub use mqtt311_protocol::{
    ConnectOptions, ConnectReturnCode, Credentials, Message, QoS, ReconnectPolicy, Subscription,
    SubscriptionResult, Will,
};
pub use transport::TransportConfig;
