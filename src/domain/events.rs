//! Event types exchanged between agents over the bus.
//!
//! Events are immutable notifications of a state change. They are built by
//! the publishing component and never persisted beyond a single publish.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single notification published on the event bus.
///
/// The wire format keeps the field names every agent already speaks:
/// `event_type`, `agent`, `timestamp`, `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Dotted category, e.g. `task.created` (drives channel routing)
    #[serde(rename = "event_type")]
    pub category: String,

    /// Agent that published the event
    #[serde(rename = "agent")]
    pub source_agent: String,

    /// When the event was created (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// Arbitrary structured payload
    #[serde(rename = "data", default)]
    pub payload: Map<String, Value>,
}

impl Event {
    /// Create a new event stamped with the current time
    pub fn new(
        category: impl Into<String>,
        source_agent: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            category: category.into(),
            source_agent: source_agent.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Create an event from any serializable payload.
    ///
    /// Objects become the payload map directly; any other value is wrapped
    /// as `{"value": ...}`.
    pub fn from_payload<T: Serialize + ?Sized>(
        category: impl Into<String>,
        source_agent: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        let payload = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Ok(Self::new(category, source_agent, payload))
    }

    /// Decode the payload into a typed structure
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.payload.clone()))
    }
}

/// Well-known event categories
pub mod categories {
    pub const TASK_CREATED: &str = "task.created";
    pub const TASK_UPDATED: &str = "task.updated";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_DELETED: &str = "task.deleted";
    pub const SCHEDULE_CHANGED: &str = "schedule.changed";

    pub const FILE_UPLOADED: &str = "file.uploaded";
    pub const FILE_TAGGED: &str = "file.tagged";
    pub const FILE_DELETED: &str = "file.deleted";
    pub const SEARCH_INDEXED: &str = "search.indexed";
    pub const FILE_ASSOCIATED: &str = "file.associated";

    pub const AGENT_STARTED: &str = "agent.started";
    pub const AGENT_STOPPED: &str = "agent.stopped";
    pub const HEALTH_CHECK: &str = "system.health_check";

    pub const EPISODE_CREATED: &str = "episode.created";
    pub const EPISODE_STATUS_CHANGED: &str = "episode.status_changed";
    pub const SCENE_UPDATED: &str = "scene.updated";
}
