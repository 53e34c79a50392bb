//! Inbound consumers keyed by id.

use crate::media::ConsumerHandle;
use common::types::{ConsumerId, PeerId, ProducerId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct ConsumerEntry {
    pub handle: Arc<dyn ConsumerHandle>,
    pub remote_producer_id: ProducerId,
    /// `None` until attributed, and again after the owner leaves.
    pub owner_peer_id: Option<PeerId>,
}

impl ConsumerEntry {
    pub fn id(&self) -> ConsumerId {
        self.handle.id()
    }
}

#[derive(Debug, Default)]
pub struct ConsumerSet {
    by_id: HashMap<ConsumerId, ConsumerEntry>,
}

impl ConsumerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &ConsumerId) -> bool {
        self.by_id.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &ConsumerId) -> Option<&ConsumerEntry> {
        self.by_id.get(id)
    }

    /// Store a consumer. The entry is handed back on an id collision.
    pub fn insert(&mut self, entry: ConsumerEntry) -> Result<(), ConsumerEntry> {
        let id = entry.id();
        if self.by_id.contains_key(&id) {
            return Err(entry);
        }
        self.by_id.insert(id, entry);
        Ok(())
    }

    pub fn remove(&mut self, id: &ConsumerId) -> Option<ConsumerEntry> {
        self.by_id.remove(id)
    }

    /// Mark a consumer's owner as unknown.
    pub fn clear_owner(&mut self, id: &ConsumerId) -> bool {
        self.by_id
            .get_mut(id)
            .and_then(|entry| entry.owner_peer_id.take())
            .is_some()
    }

    pub fn drain(&mut self) -> Vec<ConsumerEntry> {
        self.by_id.drain().map(|(_, entry)| entry).collect()
    }
}
