//! Tracker configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! {
//!   "broker_uri": "tcp/127.0.0.1:7447",
//!   "vehicle_id": "214342",
//!   "move_duration_ms": 2000,
//!   "coordinate_policy": "accept"
//! }
//! ```

use crate::animation::AnimationTiming;
use crate::coordinate::{Coordinate, CoordinatePolicy};
use crate::error::ConfigError;
use crate::ingest::TopicMap;
use crate::surface::CameraTarget;
use fleetview_env::{BrokerEndpoint, ClientId};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration for a tracker session and its transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Broker locator
    pub broker_uri: String,

    /// Client identifier; random when absent
    pub client_id: Option<String>,

    /// Vehicle whose bulk topic is consumed
    pub vehicle_id: String,

    /// Single-location topic
    pub single_topic: String,

    /// Bulk topic prefix; the vehicle id is appended
    pub bulk_topic_prefix: String,

    /// Positional transition per leg
    pub move_duration_ms: u64,

    /// Marker rotation per leg
    pub rotate_duration_ms: u64,

    /// Range policy for incoming coordinates
    pub coordinate_policy: CoordinatePolicy,

    /// First camera view
    pub initial_region: CameraTarget,

    /// Retained diagnostics
    pub diagnostics_capacity: usize,

    /// Extra connect attempts after the first failure
    pub connect_retries: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            broker_uri: "tcp/127.0.0.1:7447".to_string(),
            client_id: None,
            vehicle_id: "214342".to_string(),
            single_topic: "Vehicle/Locations".to_string(),
            bulk_topic_prefix: "Vehicle/BulkLocations".to_string(),
            move_duration_ms: 2000,
            rotate_duration_ms: 300,
            coordinate_policy: CoordinatePolicy::Accept,
            initial_region: CameraTarget::region(
                Coordinate::new(24.74894444419256, 55.48447756374216),
                0.0922,
                0.0421,
            ),
            diagnostics_capacity: 256,
            connect_retries: 1,
        }
    }
}

impl TrackerConfig {
    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.move_duration_ms == 0 {
            return Err(ConfigError::Invalid("move_duration_ms must be > 0".into()));
        }
        if self.rotate_duration_ms == 0 {
            return Err(ConfigError::Invalid("rotate_duration_ms must be > 0".into()));
        }
        if self.diagnostics_capacity == 0 {
            return Err(ConfigError::Invalid("diagnostics_capacity must be > 0".into()));
        }
        if self.single_topic.trim().is_empty() || self.bulk_topic_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("topics must not be empty".into()));
        }
        if self.vehicle_id.trim().is_empty() {
            return Err(ConfigError::Invalid("vehicle_id must not be empty".into()));
        }
        if self.broker_uri.trim().is_empty() {
            return Err(ConfigError::Invalid("broker_uri must not be empty".into()));
        }
        Ok(())
    }

    pub fn timing(&self) -> AnimationTiming {
        AnimationTiming {
            move_duration: Duration::from_millis(self.move_duration_ms),
            rotate_duration: Duration::from_millis(self.rotate_duration_ms),
        }
    }

    pub fn topics(&self) -> TopicMap {
        TopicMap::new(
            self.single_topic.clone(),
            &self.bulk_topic_prefix,
            &self.vehicle_id,
        )
    }

    /// Broker endpoint; a fresh random client id is drawn when none is configured.
    pub fn endpoint(&self) -> BrokerEndpoint {
        let client_id = match &self.client_id {
            Some(id) => ClientId(id.clone()),
            None => ClientId::random(),
        };
        BrokerEndpoint::new(self.broker_uri.clone(), client_id)
    }

    /// Total connect attempts: the first one plus retries.
    pub fn connect_attempts(&self) -> u32 {
        1 + self.connect_retries
    }
}
