use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use super::controller::{LaneController, LaneId};
use crate::provider::{ContentProvider, ProviderError, SortMode, TopicId};
use crate::store::{load_json, save_json, BlobStore, LANES_KEY};

/// Reasons an add is rejected. No lane exists after any of these.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The topic already has a lane (exact, case-sensitive match).
    #[error("r/{0} is already open")]
    Duplicate(TopicId),

    #[error("topic name is empty")]
    EmptyTopic,

    /// The existence probe failed; carries the provider's error unchanged.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl RegistryError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_not_found())
    }
}

/// The ordered set of open lanes.
///
/// Topic order is insertion order, persisted under [`LANES_KEY`] after every
/// change and restored verbatim at startup. A topic appears at most once.
pub struct LaneRegistry {
    order: Vec<TopicId>,
    lanes: HashMap<TopicId, LaneController>,
    next_lane_id: u64,
    store: Arc<dyn BlobStore>,
}

impl LaneRegistry {
    /// Restore the persisted lane order, or `default_topics` when nothing
    /// (or nothing readable) was persisted. Restored lanes start `Idle`.
    pub fn load(store: Arc<dyn BlobStore>, default_topics: &[TopicId]) -> Self {
        let restored = load_json::<Vec<TopicId>>(store.as_ref(), LANES_KEY)
            .unwrap_or_else(|| default_topics.to_vec());

        let mut registry = Self {
            order: Vec::with_capacity(restored.len()),
            lanes: HashMap::with_capacity(restored.len()),
            next_lane_id: 1,
            store,
        };

        let mut seen = HashSet::new();
        for topic in restored {
            if topic.as_str().trim().is_empty() || !seen.insert(topic.clone()) {
                tracing::warn!(topic = %topic, "Skipping empty or duplicate persisted topic");
                continue;
            }
            registry.insert_lane(topic);
        }

        tracing::debug!(lanes = registry.order.len(), "Lane registry restored");
        registry
    }

    /// Open a lane for `topic`.
    ///
    /// Rejects duplicates without touching the network. Otherwise probes the
    /// topic with one first-page fetch; a failed probe rejects the add with
    /// the provider's error. On success the topic is appended and persisted.
    pub async fn add(
        &mut self,
        provider: &dyn ContentProvider,
        topic: TopicId,
        page_size: u32,
    ) -> Result<&mut LaneController, RegistryError> {
        if topic.as_str().trim().is_empty() {
            return Err(RegistryError::EmptyTopic);
        }
        if self.contains(&topic) {
            tracing::debug!(topic = %topic, "Add rejected, topic already open");
            return Err(RegistryError::Duplicate(topic));
        }

        if let Err(e) = provider
            .fetch_page(&topic, SortMode::default(), page_size, None)
            .await
        {
            tracing::info!(topic = %topic, error = %e, "Add rejected, probe failed");
            return Err(RegistryError::Provider(e));
        }

        let id = self.next_id();
        self.order.push(topic.clone());
        self.persist();
        tracing::info!(topic = %topic, lane = %id, "Lane added");

        Ok(self
            .lanes
            .entry(topic.clone())
            .or_insert_with(|| LaneController::new(id, topic)))
    }

    /// Close the lane for `topic`. Removing an absent topic is a no-op.
    pub fn remove(&mut self, topic: &TopicId) -> Option<LaneController> {
        let lane = self.lanes.remove(topic)?;
        self.order.retain(|t| t != topic);
        tracing::info!(topic = %topic, lane = %lane.id(), "Lane removed");
        self.persist();
        Some(lane)
    }

    /// Open topics in display order.
    pub fn list(&self) -> &[TopicId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, topic: &TopicId) -> bool {
        self.lanes.contains_key(topic)
    }

    pub fn get(&self, topic: &TopicId) -> Option<&LaneController> {
        self.lanes.get(topic)
    }

    pub fn get_mut(&mut self, topic: &TopicId) -> Option<&mut LaneController> {
        self.lanes.get_mut(topic)
    }

    /// The lane for `topic`, but only if it is still the instance `id`.
    pub fn get_instance_mut(&mut self, topic: &TopicId, id: LaneId) -> Option<&mut LaneController> {
        self.lanes.get_mut(topic).filter(|lane| lane.id() == id)
    }

    /// Lanes in display order.
    pub fn lanes(&self) -> impl Iterator<Item = &LaneController> {
        self.order.iter().filter_map(|t| self.lanes.get(t))
    }

    fn next_id(&mut self) -> LaneId {
        let id = LaneId(self.next_lane_id);
        self.next_lane_id += 1;
        id
    }

    fn insert_lane(&mut self, topic: TopicId) {
        let id = self.next_id();
        self.order.push(topic.clone());
        self.lanes.insert(topic.clone(), LaneController::new(id, topic));
    }

    /// Rewrite the persisted order. Failures are logged; the in-memory
    /// registry stays authoritative for this session.
    fn persist(&self) {
        if let Err(e) = save_json(self.store.as_ref(), LANES_KEY, &self.order) {
            tracing::warn!(error = %e, "Failed to persist lane order");
        }
    }
}

impl std::fmt::Debug for LaneRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneRegistry")
            .field("order", &self.order)
            .field("next_lane_id", &self.next_lane_id)
            .finish_non_exhaustive()
    }
}
