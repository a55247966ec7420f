//! Topic name, topic filter, and client identifier validation
//! (MQTT 3.1.1 sections 4.7 and 3.1.3.1).

use crate::error::{MqttError, Result};

const MAX_TOPIC_LENGTH: usize = 65_535;
const MAX_CLIENT_ID_LENGTH: usize = 23;

/// Validates a topic name for publishing: non-empty, no wildcards, no NUL.
pub fn validate_topic_name(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(MqttError::InvalidTopicName(
            "topic name is empty".to_string(),
        ));
    }
    if topic.len() > MAX_TOPIC_LENGTH {
        return Err(MqttError::InvalidTopicName(format!(
            "topic name exceeds {MAX_TOPIC_LENGTH} bytes"
        )));
    }
    if topic.contains(['+', '#']) {
        return Err(MqttError::InvalidTopicName(topic.to_string()));
    }
    if topic.contains('\0') {
        return Err(MqttError::InvalidTopicName(
            "topic name contains NUL".to_string(),
        ));
    }
    Ok(())
}

/// Validates a subscription topic filter. `+` must occupy a whole level;
/// `#` must occupy the last level.
pub fn validate_topic_filter(filter: &str) -> Result<()> {
    if filter.is_empty() {
        return Err(MqttError::InvalidTopicFilter(
            "topic filter is empty".to_string(),
        ));
    }
    if filter.len() > MAX_TOPIC_LENGTH {
        return Err(MqttError::InvalidTopicFilter(format!(
            "topic filter exceeds {MAX_TOPIC_LENGTH} bytes"
        )));
    }
    if filter.contains('\0') {
        return Err(MqttError::InvalidTopicFilter(
            "topic filter contains NUL".to_string(),
        ));
    }

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    for (i, level) in levels.iter().enumerate() {
        if level.contains('+') && *level != "+" {
            return Err(MqttError::InvalidTopicFilter(filter.to_string()));
        }
        if level.contains('#') && (*level != "#" || i != last) {
            return Err(MqttError::InvalidTopicFilter(filter.to_string()));
        }
    }
    Ok(())
}

/// Validates a client identifier: 1 to 23 UTF-8 encoded bytes.
pub fn validate_client_id(client_id: &str) -> Result<()> {
    if client_id.is_empty() {
        return Err(MqttError::InvalidClientId(
            "client ID is empty".to_string(),
        ));
    }
    if client_id.len() > MAX_CLIENT_ID_LENGTH {
        return Err(MqttError::InvalidClientId(format!(
            "client ID exceeds {MAX_CLIENT_ID_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Whether `topic` matches the subscription `filter` under MQTT matching
/// rules. Filters starting with a wildcard do not match topics beginning
/// with `$`.
#[must_use]
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            // "a/#" also matches the parent topic "a"
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_name_validation() {
        assert!(validate_topic_name("a/b/c").is_ok());
        assert!(validate_topic_name("/").is_ok());
        assert!(validate_topic_name("$SYS/broker").is_ok());
        assert!(validate_topic_name("").is_err());
        assert!(validate_topic_name("a/+/b").is_err());
        assert!(validate_topic_name("a/#").is_err());
        assert!(validate_topic_name("a\0b").is_err());
    }

    #[test]
    fn topic_filter_validation() {
        assert!(validate_topic_filter("a/b/c").is_ok());
        assert!(validate_topic_filter("+/b/#").is_ok());
        assert!(validate_topic_filter("#").is_ok());
        assert!(validate_topic_filter("+").is_ok());
        assert!(validate_topic_filter("").is_err());
        assert!(validate_topic_filter("a+/b").is_err());
        assert!(validate_topic_filter("a/#/b").is_err());
        assert!(validate_topic_filter("a/b#").is_err());
    }

    #[test]
    fn client_id_validation() {
        assert!(validate_client_id("client-1").is_ok());
        assert!(validate_client_id(&"a".repeat(23)).is_ok());
        assert!(validate_client_id("").is_err());
        assert!(validate_client_id(&"a".repeat(24)).is_err());
    }

    #[test]
    fn exact_matching() {
        assert!(topic_matches_filter("a/b/c", "a/b/c"));
        assert!(!topic_matches_filter("a/b/c", "a/b"));
        assert!(!topic_matches_filter("a/b", "a/b/c"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(topic_matches_filter("a/b/c", "a/+/c"));
        assert!(topic_matches_filter("a/b", "+/+"));
        assert!(!topic_matches_filter("a/b/c", "a/+"));
        assert!(!topic_matches_filter("a", "a/+"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(topic_matches_filter("a/b/c", "a/#"));
        assert!(topic_matches_filter("a", "a/#"));
        assert!(topic_matches_filter("a/b/c/d", "#"));
        assert!(!topic_matches_filter("b/c", "a/#"));
    }

    #[test]
    fn dollar_topics_do_not_match_leading_wildcards() {
        assert!(!topic_matches_filter("$SYS/broker", "#"));
        assert!(!topic_matches_filter("$SYS/broker", "+/broker"));
        assert!(topic_matches_filter("$SYS/broker", "$SYS/broker"));
        assert!(topic_matches_filter("$SYS/broker", "$SYS/#"));
    }
}
