//! Local producers, at most one per media kind.

use crate::media::{LocalTrack, ProducerHandle};
use common::types::{MediaKind, ProducerId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Active,
    Paused,
}

/// An outbound stream and the capture source it owns.
#[derive(Debug)]
pub struct ProducerEntry {
    pub handle: Arc<dyn ProducerHandle>,
    pub track: LocalTrack,
    pub state: ProducerState,
}

impl ProducerEntry {
    pub fn new(handle: Arc<dyn ProducerHandle>, track: LocalTrack) -> Self {
        Self {
            handle,
            track,
            state: ProducerState::Active,
        }
    }

    pub fn id(&self) -> ProducerId {
        self.handle.id()
    }

    pub fn kind(&self) -> MediaKind {
        self.handle.kind()
    }

    /// Close the engine producer and stop its capture source.
    pub fn release(&self) {
        self.handle.close();
        self.track.stop();
    }
}

/// Producers keyed by kind, plus kinds with a produce in flight.
///
/// A kind is either free, reserved or occupied; never two at once.
#[derive(Debug, Default)]
pub struct ProducerSet {
    by_kind: HashMap<MediaKind, ProducerEntry>,
    pending: HashSet<MediaKind>,
}

impl ProducerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    #[must_use]
    pub fn contains(&self, kind: MediaKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    /// Claim `kind` for a produce in flight. False if it is taken.
    pub fn reserve(&mut self, kind: MediaKind) -> bool {
        if self.contains(kind) {
            return false;
        }
        self.pending.insert(kind)
    }

    pub fn release_reservation(&mut self, kind: MediaKind) {
        self.pending.remove(&kind);
    }

    /// Store a finished producer. The entry is handed back if the kind is
    /// already occupied.
    pub fn insert(&mut self, entry: ProducerEntry) -> Result<(), ProducerEntry> {
        let kind = entry.kind();
        if self.contains(kind) {
            return Err(entry);
        }
        self.pending.remove(&kind);
        self.by_kind.insert(kind, entry);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, kind: MediaKind) -> Option<&ProducerEntry> {
        self.by_kind.get(&kind)
    }

    pub fn remove(&mut self, kind: MediaKind) -> Option<ProducerEntry> {
        self.by_kind.remove(&kind)
    }

    /// Kind of the producer with `id`, if we own it.
    #[must_use]
    pub fn kind_of(&self, id: &ProducerId) -> Option<MediaKind> {
        self.by_kind
            .iter()
            .find(|(_, entry)| &entry.id() == id)
            .map(|(kind, _)| *kind)
    }

    /// Update the state. Returns false when absent or unchanged.
    pub fn set_state(&mut self, kind: MediaKind, state: ProducerState) -> bool {
        match self.by_kind.get_mut(&kind) {
            Some(entry) if entry.state != state => {
                entry.state = state;
                true
            }
            _ => false,
        }
    }

    /// Remove every producer, audio first.
    pub fn drain(&mut self) -> Vec<ProducerEntry> {
        MediaKind::ALL
            .iter()
            .filter_map(|kind| self.by_kind.remove(kind))
            .collect()
    }

    /// `(kind, id, state)` for every producer, audio first.
    #[must_use]
    pub fn summary(&self) -> Vec<(MediaKind, ProducerId, ProducerState)> {
        MediaKind::ALL
            .iter()
            .filter_map(|kind| self.by_kind.get(kind).map(|e| (*kind, e.id(), e.state)))
            .collect()
    }
}
