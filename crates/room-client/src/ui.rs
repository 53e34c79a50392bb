//! Presentation adapter contract.
//!
//! The session never touches presentation primitives. It emits
//! [`UiCommand`]s; the embedding application renders them.

use crate::presentation::LayoutUpdate;
use common::types::{CardId, ConsumerId, MediaKind, PeerId, ProducerId};

/// Everything needed to render one participant card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSpec {
    pub card_id: CardId,
    /// `None` for the local card until the server echoes our own id.
    pub peer_id: Option<PeerId>,
    pub display_name: String,
    pub avatar: Option<String>,
    pub is_trainer: bool,
    pub is_local: bool,
}

/// Where an attached stream is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaTarget {
    /// Video inside a participant card.
    Card(CardId),
    /// Video whose owner is unknown.
    FallbackVideo,
    /// Shared audio output.
    AudioSink,
}

/// The media resource behind an attached stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Local(ProducerId),
    Remote(ConsumerId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    CreateCard(CardSpec),
    RemoveCard(CardId),
    AttachMedia {
        target: MediaTarget,
        source: MediaSource,
        kind: MediaKind,
    },
    DetachMedia {
        source: MediaSource,
    },
    ApplyLayout(LayoutUpdate),
    /// Short user-facing notice.
    Notify(String),
}

/// Implemented by the embedding application.
///
/// Called from the session task; implementations must not block.
pub trait UiAdapter: Send + Sync {
    fn apply(&self, command: UiCommand);
}

/// Adapter for headless sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUi;

impl UiAdapter for NoopUi {
    fn apply(&self, _command: UiCommand) {}
}
