pub use mqtt311_protocol::error::{MqttError, Result};
