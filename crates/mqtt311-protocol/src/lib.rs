#![warn(clippy::pedantic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod encoding;
pub mod error;
pub mod packet;
pub mod packet_id;
pub mod qos2;
pub mod types;
pub mod validation;

pub use error::{MqttError, Result};
pub use packet::{FixedHeader, MqttPacket, Packet, PacketType};
pub use packet_id::PacketIdAllocator;
pub use types::{
    ConnectOptions, ConnectReturnCode, Credentials, Message, QoS, ReconnectPolicy, Subscription,
    SubscriptionResult, Will,
};
pub use validation::{
    topic_matches_filter, validate_client_id, validate_topic_filter, validate_topic_name,
};
