//! Remote participant bookkeeping.
//!
//! The roster maps each remote [`PeerId`] to a [`PeerRecord`] and remembers
//! which inbound consumers were attributed to which peer. It also owns the
//! local participant's card. Every record has exactly one card; the session
//! forwards the returned [`CardSpec`]s to the UI and the presentation state.

use crate::signaling::{PeerJoined, RoomSnapshot};
use crate::ui::CardSpec;
use chrono::{DateTime, Utc};
use common::types::{CardId, ConsumerId, PeerId};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Identity of the local participant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalProfile {
    pub name: String,
    pub avatar: Option<String>,
    pub is_trainer: bool,
}

/// A remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub name: String,
    pub avatar: Option<String>,
    pub is_trainer: bool,
    pub card: CardId,
    /// When this client first learned about the peer.
    pub seen_at: DateTime<Utc>,
    consumers: BTreeSet<ConsumerId>,
}

impl PeerRecord {
    /// Consumers currently attributed to this peer.
    pub fn consumers(&self) -> impl Iterator<Item = &ConsumerId> {
        self.consumers.iter()
    }

    fn card_spec(&self) -> CardSpec {
        CardSpec {
            card_id: self.card,
            peer_id: Some(self.peer_id.clone()),
            display_name: self.name.clone(),
            avatar: self.avatar.clone(),
            is_trainer: self.is_trainer,
            is_local: false,
        }
    }
}

/// Where an inbound stream should be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    /// Owner found; render in its card.
    Peer { peer_id: PeerId, card: CardId },
    /// Owner unknown; render in the fallback slot.
    Fallback,
}

/// What remains after a peer leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartedPeer {
    pub peer_id: PeerId,
    pub card: CardId,
    /// Consumers that were attributed to the peer; their owner is now unknown.
    pub orphaned: Vec<ConsumerId>,
}

#[derive(Debug, Default)]
pub struct RosterManager {
    local: LocalProfile,
    local_card: CardId,
    /// Snapshot entries that carry the local name. All of them render in
    /// the local card.
    local_peer_ids: BTreeSet<PeerId>,
    peers: HashMap<PeerId, PeerRecord>,
    consumer_owner: HashMap<ConsumerId, PeerId>,
    initialized: bool,
}

impl RosterManager {
    #[must_use]
    pub fn new(local: LocalProfile) -> Self {
        Self {
            local,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn local(&self) -> &LocalProfile {
        &self.local
    }

    #[must_use]
    pub fn local_card(&self) -> CardId {
        self.local_card
    }

    /// Socket ids mapped to the local card by the room snapshot.
    #[must_use]
    pub fn local_peer_ids(&self) -> &BTreeSet<PeerId> {
        &self.local_peer_ids
    }

    /// The local card. It carries our socket id only when the snapshot
    /// identified exactly one.
    #[must_use]
    pub fn local_card_spec(&self) -> CardSpec {
        let peer_id = match (self.local_peer_ids.len(), self.local_peer_ids.first()) {
            (1, Some(id)) => Some(id.clone()),
            _ => None,
        };
        CardSpec {
            card_id: self.local_card,
            peer_id,
            display_name: self.local.name.clone(),
            avatar: self.local.avatar.clone(),
            is_trainer: self.local.is_trainer,
            is_local: true,
        }
    }

    #[must_use]
    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(peer_id)
    }

    /// Number of remote peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    /// Whether an announced participant is actually us.
    ///
    /// Matches on the socket ids taken from the snapshot once there are
    /// any, on display name before that.
    #[must_use]
    pub fn is_local(&self, peer_id: &PeerId, name: &str) -> bool {
        if self.local_peer_ids.is_empty() {
            self.is_local_name(name)
        } else {
            self.local_peer_ids.contains(peer_id)
        }
    }

    fn is_local_name(&self, name: &str) -> bool {
        !self.local.name.is_empty() && self.local.name == name
    }

    /// Seed the roster from the join-time snapshot.
    ///
    /// Applied once; later snapshots are ignored. Every entry carrying the
    /// local name maps to the local card, since the snapshot cannot tell us
    /// apart from a namesake who joined earlier.
    pub fn initialize_from_snapshot(&mut self, snapshot: &RoomSnapshot) -> Vec<CardSpec> {
        if self.initialized {
            warn!(target: "rc.roster", "Roster already initialized, ignoring snapshot");
            return Vec::new();
        }
        self.initialized = true;

        let mut cards = Vec::new();
        for peer in &snapshot.peers {
            if self.is_local_name(&peer.name) {
                debug!(
                    target: "rc.roster",
                    peer_id = %peer.peer_id,
                    "Snapshot entry mapped to local card"
                );
                self.local_peer_ids.insert(peer.peer_id.clone());
                continue;
            }
            if let Some(card) = self.insert(
                peer.peer_id.clone(),
                peer.name.clone(),
                peer.avatar.clone(),
                peer.is_trainer,
            ) {
                cards.push(card);
            }
        }

        if self.local_peer_ids.len() > 1 {
            warn!(
                target: "rc.roster",
                entries = self.local_peer_ids.len(),
                "Several snapshot entries carry the local name"
            );
        }
        info!(
            target: "rc.roster",
            peers = self.peers.len(),
            "Roster initialized from snapshot"
        );
        cards
    }

    /// Forget every remote peer. Returns their cards.
    pub fn clear(&mut self) -> Vec<CardId> {
        self.consumer_owner.clear();
        self.peers.drain().map(|(_, record)| record.card).collect()
    }

    /// Add a peer announced by `peerJoined`.
    ///
    /// Returns `None` for announcements without id or name, for known peers
    /// and for our own echo.
    pub fn on_peer_joined(&mut self, joined: &PeerJoined) -> Option<CardSpec> {
        let peer_id = joined.socket_id.as_ref().filter(|id| !id.is_empty())?;
        let name = joined.name.as_deref().filter(|n| !n.is_empty())?;

        if self.is_local(peer_id, name) {
            debug!(target: "rc.roster", peer_id = %peer_id, "Ignoring own join echo");
            return None;
        }

        self.insert(
            peer_id.clone(),
            name.to_string(),
            joined.avatar.clone(),
            joined.is_trainer,
        )
    }

    /// Remove a peer. Returns `None` for unknown peers.
    pub fn on_peer_left(&mut self, peer_id: &PeerId) -> Option<DepartedPeer> {
        let Some(record) = self.peers.remove(peer_id) else {
            debug!(target: "rc.roster", peer_id = %peer_id, "peerLeft for unknown peer");
            return None;
        };

        let orphaned: Vec<ConsumerId> = record.consumers.into_iter().collect();
        for consumer_id in &orphaned {
            self.consumer_owner.remove(consumer_id);
        }

        info!(
            target: "rc.roster",
            peer_id = %peer_id,
            orphaned = orphaned.len(),
            "Peer left"
        );
        Some(DepartedPeer {
            peer_id: record.peer_id,
            card: record.card,
            orphaned,
        })
    }

    /// Resolve the owner of a new consumer.
    ///
    /// A miss is final; the consumer stays in the fallback slot even if the
    /// owner joins later.
    pub fn attribute_consumer(
        &mut self,
        consumer_id: &ConsumerId,
        owner: Option<&PeerId>,
    ) -> Attribution {
        let Some(record) = owner.and_then(|id| self.peers.get_mut(id)) else {
            return Attribution::Fallback;
        };

        record.consumers.insert(consumer_id.clone());
        self.consumer_owner
            .insert(consumer_id.clone(), record.peer_id.clone());
        Attribution::Peer {
            peer_id: record.peer_id.clone(),
            card: record.card,
        }
    }

    /// Forget a consumer. Returns its owner, if it had one.
    pub fn detach_consumer(&mut self, consumer_id: &ConsumerId) -> Option<PeerId> {
        let owner = self.consumer_owner.remove(consumer_id)?;
        if let Some(record) = self.peers.get_mut(&owner) {
            record.consumers.remove(consumer_id);
        }
        Some(owner)
    }

    fn insert(
        &mut self,
        peer_id: PeerId,
        name: String,
        avatar: Option<String>,
        is_trainer: bool,
    ) -> Option<CardSpec> {
        if self.peers.contains_key(&peer_id) {
            debug!(target: "rc.roster", peer_id = %peer_id, "Peer already known");
            return None;
        }
        let record = PeerRecord {
            peer_id: peer_id.clone(),
            name,
            avatar,
            is_trainer,
            card: CardId::new(),
            seen_at: Utc::now(),
            consumers: BTreeSet::new(),
        };
        let spec = record.card_spec();
        self.peers.insert(peer_id, record);
        Some(spec)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::signaling::SnapshotPeer;

    fn roster(name: &str) -> RosterManager {
        RosterManager::new(LocalProfile {
            name: name.to_string(),
            avatar: None,
            is_trainer: true,
        })
    }

    fn joined(id: &str, name: &str) -> PeerJoined {
        PeerJoined {
            socket_id: Some(PeerId::from(id)),
            name: Some(name.to_string()),
            avatar: None,
            is_trainer: false,
        }
    }

    fn snapshot_peer(id: &str, name: &str) -> SnapshotPeer {
        SnapshotPeer {
            peer_id: PeerId::from(id),
            name: name.to_string(),
            avatar: None,
            is_trainer: false,
            has_audio: false,
            has_video: false,
        }
    }

    #[test]
    fn test_peer_joined_creates_one_card() {
        let mut r = roster("Ana");
        let card = r.on_peer_joined(&joined("s1", "Ben")).unwrap();
        assert_eq!(card.display_name, "Ben");
        assert!(!card.is_local);
        assert_eq!(r.len(), 1);

        assert!(r.on_peer_joined(&joined("s1", "Ben")).is_none());
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_own_echo_is_ignored() {
        let mut r = roster("Ana");
        assert!(r.on_peer_joined(&joined("s0", "Ana")).is_none());
        assert!(r.is_empty());
    }

    #[test]
    fn test_incomplete_announcements_are_ignored() {
        let mut r = roster("Ana");
        let mut no_id = joined("", "Ben");
        assert!(r.on_peer_joined(&no_id).is_none());
        no_id.socket_id = None;
        assert!(r.on_peer_joined(&no_id).is_none());
        assert!(r.on_peer_joined(&joined("s2", "")).is_none());
        assert!(r.is_empty());
    }

    #[test]
    fn test_snapshot_learns_local_id_and_creates_cards() {
        let mut r = roster("Ana");
        let snapshot = RoomSnapshot {
            peers: vec![
                snapshot_peer("s1", "Ben"),
                snapshot_peer("s0", "Ana"),
                snapshot_peer("s2", "Cy"),
            ],
        };
        let cards = r.initialize_from_snapshot(&snapshot);
        assert_eq!(cards.len(), 2);
        assert!(r.local_peer_ids().contains(&PeerId::from("s0")));
        assert_eq!(r.local_card_spec().peer_id, Some(PeerId::from("s0")));

        // Our socket ids are known: only they count as echoes.
        assert!(r.on_peer_joined(&joined("s0", "Ana")).is_none());
        assert!(r.on_peer_joined(&joined("s9", "Ana")).is_some());

        // Applied once.
        assert!(r.initialize_from_snapshot(&snapshot).is_empty());
    }

    #[test]
    fn test_snapshot_namesakes_map_to_local_card() {
        let mut r = roster("Ana");
        let snapshot = RoomSnapshot {
            peers: vec![snapshot_peer("s1", "Ana"), snapshot_peer("s0", "Ana")],
        };

        let cards = r.initialize_from_snapshot(&snapshot);

        assert!(cards.is_empty());
        assert!(r.is_empty());
        assert!(r.is_local(&PeerId::from("s0"), "Ana"));
        assert!(r.is_local(&PeerId::from("s1"), "Ana"));
        // Ambiguous: the local card is not tied to either socket.
        assert_eq!(r.local_card_spec().peer_id, None);
        assert!(r.local_card_spec().is_local);
    }

    #[test]
    fn test_clear_returns_remote_cards() {
        let mut r = roster("Ana");
        let ben = r.on_peer_joined(&joined("s1", "Ben")).unwrap().card_id;
        let _ = r.attribute_consumer(&ConsumerId::from("c1"), Some(&PeerId::from("s1")));

        assert_eq!(r.clear(), vec![ben]);
        assert!(r.is_empty());
        assert_eq!(r.detach_consumer(&ConsumerId::from("c1")), None);
    }

    #[test]
    fn test_attribution_and_departure() {
        let mut r = roster("Ana");
        let card = r.on_peer_joined(&joined("s1", "Ben")).unwrap().card_id;

        let c1 = ConsumerId::from("c1");
        let c2 = ConsumerId::from("c2");
        assert_eq!(
            r.attribute_consumer(&c1, Some(&PeerId::from("s1"))),
            Attribution::Peer {
                peer_id: PeerId::from("s1"),
                card
            }
        );
        r.attribute_consumer(&c2, Some(&PeerId::from("s1")));
        assert_eq!(r.get(&PeerId::from("s1")).unwrap().consumers().count(), 2);

        assert_eq!(r.detach_consumer(&c2), Some(PeerId::from("s1")));
        assert_eq!(r.detach_consumer(&c2), None);

        let departed = r.on_peer_left(&PeerId::from("s1")).unwrap();
        assert_eq!(departed.card, card);
        assert_eq!(departed.orphaned, vec![c1.clone()]);
        assert_eq!(r.detach_consumer(&c1), None);
        assert!(r.on_peer_left(&PeerId::from("s1")).is_none());
    }

    #[test]
    fn test_attribution_miss_falls_back() {
        let mut r = roster("Ana");
        let c = ConsumerId::from("c1");
        assert_eq!(
            r.attribute_consumer(&c, Some(&PeerId::from("ghost"))),
            Attribution::Fallback
        );
        assert_eq!(r.attribute_consumer(&c, None), Attribution::Fallback);

        // Owner joining later does not re-attribute.
        r.on_peer_joined(&joined("ghost", "Gus"));
        assert_eq!(
            r.get(&PeerId::from("ghost")).unwrap().consumers().count(),
            0
        );
    }
}
