//! Ingestion Adapter - transport payloads to coordinates.
//!
//! Two logical channels:
//! - **Single**: `{"latitude": n, "longitude": n}`
//! - **Bulk**: `[{"latitude": n, "longitude": n}, ...]`, applied in array order
//!
//! Decoding is all-or-nothing per message: one bad element rejects the whole
//! bulk payload, so a malformed message never partially mutates state.

use crate::coordinate::{Coordinate, CoordinatePolicy};
use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical channel a topic is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Single,
    Bulk,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Single => f.write_str("single"),
            Channel::Bulk => f.write_str("bulk"),
        }
    }
}

/// Topic strings of the two channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMap {
    single: String,
    bulk: String,
}

impl TopicMap {
    /// The bulk topic embeds the vehicle id: `<bulk_prefix>/<vehicle_id>`.
    pub fn new(single: impl Into<String>, bulk_prefix: &str, vehicle_id: &str) -> Self {
        Self {
            single: single.into(),
            bulk: format!("{}/{}", bulk_prefix.trim_end_matches('/'), vehicle_id),
        }
    }

    pub fn single(&self) -> &str {
        &self.single
    }

    pub fn bulk(&self) -> &str {
        &self.bulk
    }

    /// Both topics, single first.
    pub fn all(&self) -> [&str; 2] {
        [&self.single, &self.bulk]
    }

    pub fn channel_for(&self, topic: &str) -> Option<Channel> {
        if topic == self.single {
            Some(Channel::Single)
        } else if topic == self.bulk {
            Some(Channel::Bulk)
        } else {
            None
        }
    }
}

/// Decodes messages on the bound topics.
#[derive(Debug, Clone)]
pub struct IngestionAdapter {
    topics: TopicMap,
    policy: CoordinatePolicy,
}

impl IngestionAdapter {
    pub fn new(topics: TopicMap, policy: CoordinatePolicy) -> Self {
        Self { topics, policy }
    }

    pub fn topics(&self) -> &TopicMap {
        &self.topics
    }

    pub fn policy(&self) -> CoordinatePolicy {
        self.policy
    }

    /// Resolves the channel of `topic`.
    pub fn route(&self, topic: &str) -> Result<Channel, IngestError> {
        self.topics
            .channel_for(topic)
            .ok_or_else(|| IngestError::UnroutedTopic(topic.to_string()))
    }

    /// Decodes a payload received on `channel` into coordinates, in order.
    pub fn decode(&self, channel: Channel, payload: &str) -> Result<Vec<Coordinate>, IngestError> {
        let value: Value = serde_json::from_str(payload)?;
        let coordinates = match channel {
            Channel::Single => vec![location_from_value(value)?],
            Channel::Bulk => match value {
                Value::Array(items) => items
                    .into_iter()
                    .map(location_from_value)
                    .collect::<Result<Vec<_>, _>>()?,
                other => {
                    return Err(IngestError::NotAnArray {
                        found: json_kind(&other),
                    })
                }
            },
        };

        coordinates
            .into_iter()
            .map(|c| self.policy.apply(c))
            .collect()
    }
}

fn location_from_value(value: Value) -> Result<Coordinate, IngestError> {
    if !value.is_object() {
        return Err(IngestError::NotAnObject {
            found: json_kind(&value),
        });
    }
    Ok(serde_json::from_value(value)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
