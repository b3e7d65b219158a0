//! Episode payload.
//!
//! The queue core never looks inside a payload; this is the concrete payload
//! the service submits and the graph backend consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the episode text came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum EpisodeSource {
    #[default]
    Text,
    Message,
    Json,
}

impl EpisodeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EpisodeSource::Text => "text",
            EpisodeSource::Message => "message",
            EpisodeSource::Json => "json",
        }
    }
}

/// Unknown source strings fall back to `Text`.
impl From<&str> for EpisodeSource {
    fn from(value: &str) -> Self {
        match value {
            "message" => EpisodeSource::Message,
            "json" => EpisodeSource::Json,
            _ => EpisodeSource::Text,
        }
    }
}

impl From<String> for EpisodeSource {
    fn from(value: String) -> Self {
        EpisodeSource::from(value.as_str())
    }
}

/// One unit of unstructured content to fold into the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub name: String,
    pub episode_body: String,
    #[serde(default)]
    pub source: EpisodeSource,
    #[serde(default)]
    pub source_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub reference_time: DateTime<Utc>,
}

impl Episode {
    pub fn new(
        name: impl Into<String>,
        episode_body: impl Into<String>,
        reference_time: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            episode_body: episode_body.into(),
            source: EpisodeSource::Text,
            source_description: String::new(),
            uuid: None,
            reference_time,
        }
    }

    pub fn with_source(mut self, source: EpisodeSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_source_description(mut self, description: impl Into<String>) -> Self {
        self.source_description = description.into();
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }
}

/// Inbound request shape: an episode plus the optional group it belongs to.
///
/// `group_id` is resolved against the configured default key by
/// [`QueueConfig::key_for`](crate::config::QueueConfig::key_for).
#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeRequest {
    #[serde(default)]
    pub group_id: Option<String>,
    pub name: String,
    pub episode_body: String,
    #[serde(default)]
    pub source: EpisodeSource,
    #[serde(default)]
    pub source_description: String,
    #[serde(default)]
    pub uuid: Option<String>,
}

impl EpisodeRequest {
    /// Split into the group id and an episode stamped with `accepted_at`.
    pub fn into_episode(self, accepted_at: DateTime<Utc>) -> (Option<String>, Episode) {
        let episode = Episode {
            name: self.name,
            episode_body: self.episode_body,
            source: self.source,
            source_description: self.source_description,
            uuid: self.uuid,
            reference_time: accepted_at,
        };
        (self.group_id, episode)
    }
}
