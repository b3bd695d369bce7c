//! Topic name and topic filter validation
//!
//! Publishing requires a concrete topic name; subscribing accepts a filter with the
//! MQTT `+` and `#` wildcards in the positions the protocol allows.

use thiserror::Error;

/// Longest topic the MQTT wire encoding can carry
pub const MAX_TOPIC_LEN: usize = 65_535;

/// Topic validation errors
#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("Topic cannot be empty")]
    Empty,
    #[error("Topic exceeds 65535 bytes")]
    TooLong,
    #[error("Topic contains a NUL character")]
    NulCharacter,
    #[error("Wildcards are not allowed in a publish topic: '{0}'")]
    WildcardInName(String),
    #[error("Misplaced wildcard in topic filter: '{0}'")]
    MisplacedWildcard(String),
}

fn validate_common(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(TopicError::TooLong);
    }
    if topic.contains('\0') {
        return Err(TopicError::NulCharacter);
    }
    Ok(())
}

/// Validate a concrete topic used for publishing
pub fn validate_topic_name(topic: &str) -> Result<(), TopicError> {
    validate_common(topic)?;
    if topic.contains(['+', '#']) {
        return Err(TopicError::WildcardInName(topic.to_string()));
    }
    Ok(())
}

/// Validate a topic filter used for subscribing
pub fn validate_topic_filter(filter: &str) -> Result<(), TopicError> {
    validate_common(filter)?;

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    for (index, level) in levels.iter().enumerate() {
        let misplaced = match *level {
            "#" => index != last,
            "+" => false,
            other => other.contains(['+', '#']),
        };
        if misplaced {
            return Err(TopicError::MisplacedWildcard(filter.to_string()));
        }
    }
    Ok(())
}
