//! SimulatedGraph - メモリ上の apply 実装（開発用・CLI 用）
//!
//! 本物のグラフ書き込みの代わりに、一定の遅延のあと episode を
//! group ごとのリストに追加します。空の本文は失敗として扱います。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use ulid::Ulid;

use crate::domain::{ApplyError, Episode, EpisodeSource, NamespaceKey};
use crate::ports::{ApplyEpisode, Clock, SystemClock};

/// What the backend recorded for one applied episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedEpisode {
    pub uuid: String,
    pub group_id: String,
    pub name: String,
    pub source: EpisodeSource,
    pub custom_entities: bool,
    pub applied_at: DateTime<Utc>,
}

pub struct SimulatedGraph {
    latency: Duration,
    use_custom_entities: bool,
    clock: Arc<dyn Clock>,
    groups: Mutex<HashMap<String, Vec<AppliedEpisode>>>,
}

impl SimulatedGraph {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            use_custom_entities: false,
            clock: Arc::new(SystemClock),
            groups: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_custom_entities(mut self, enabled: bool) -> Self {
        self.use_custom_entities = enabled;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn groups(&self) -> MutexGuard<'_, HashMap<String, Vec<AppliedEpisode>>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Episodes applied to `group_id`, in apply order.
    pub fn episodes(&self, group_id: &str) -> Vec<AppliedEpisode> {
        self.groups().get(group_id).cloned().unwrap_or_default()
    }

    pub fn total_applied(&self) -> usize {
        self.groups().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl ApplyEpisode for SimulatedGraph {
    type Payload = Episode;
    type Output = AppliedEpisode;

    async fn apply(
        &self,
        key: &NamespaceKey,
        episode: Episode,
    ) -> Result<AppliedEpisode, ApplyError> {
        if episode.episode_body.trim().is_empty() {
            return Err(ApplyError::new(format!(
                "episode '{}' has an empty body",
                episode.name
            )));
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let applied = AppliedEpisode {
            uuid: episode.uuid.unwrap_or_else(|| Ulid::new().to_string()),
            group_id: key.to_string(),
            name: episode.name,
            source: episode.source,
            custom_entities: self.use_custom_entities,
            applied_at: self.clock.now(),
        };
        info!(
            group_id = %applied.group_id,
            name = %applied.name,
            uuid = %applied.uuid,
            "episode added to graph"
        );

        self.groups()
            .entry(applied.group_id.clone())
            .or_default()
            .push(applied.clone());
        Ok(applied)
    }
}
