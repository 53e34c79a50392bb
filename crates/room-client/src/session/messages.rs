//! Message types for the session actor.
//!
//! Commands come from [`super::SessionHandle`] and carry a `oneshot` reply
//! channel. Completions are posted by tasks the actor spawned around a
//! signaling round trip or media acquisition; they carry the result and the
//! caller's reply channel.

use super::events::{Listener, SessionEventKind};
use super::producers::ProducerState;
use super::state::SessionState;
use crate::errors::ClientError;
use crate::layout::ViewportClass;
use crate::media::{ConsumerHandle, Device, LocalTrack, ProducerHandle, RecvTransport, SendTransport};
use crate::presentation::LayoutUpdate;
use crate::roster::LocalProfile;
use crate::signaling::{ModerationAction, RoomSnapshot};
use chrono::{DateTime, Utc};
use common::types::{CardId, ConsumerId, MediaKind, PeerId, ProducerId, RoomId};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

pub type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

/// Result of `produce`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProduceOutcome {
    Started(ProducerId),
    /// A producer of this kind already exists or is being created.
    AlreadyActive,
}

/// One participant as listed by `room_participants`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSummary {
    pub peer_id: PeerId,
    pub name: String,
    pub is_trainer: bool,
    pub has_audio: bool,
    pub has_video: bool,
    pub is_local: bool,
    /// The local user may mute or ask this peer to unmute.
    pub can_moderate: bool,
    /// When this client first saw the peer; `None` for the local user and
    /// for peers the roster has not learned about yet.
    pub seen_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub room_id: RoomId,
    pub state: SessionState,
    pub producers: Vec<(MediaKind, ProducerId, ProducerState)>,
    pub consumers: usize,
    pub peers: usize,
    pub cards: usize,
    pub pinned: Option<CardId>,
    pub viewport: ViewportClass,
}

/// Resources gathered by the join task. Fields are filled step by step so a
/// failed join still hands back what it created.
#[derive(Debug, Default)]
pub struct JoinOutcome {
    pub device: Option<Arc<dyn Device>>,
    pub send_transport: Option<Arc<dyn SendTransport>>,
    pub recv_transport: Option<Arc<dyn RecvTransport>>,
}

pub enum SessionMessage {
    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------
    CreateRoom {
        respond_to: Reply<bool>,
    },
    Join {
        profile: LocalProfile,
        respond_to: Reply<()>,
    },
    Produce {
        kind: MediaKind,
        device_selector: Option<String>,
        respond_to: Reply<ProduceOutcome>,
    },
    CloseProducer {
        kind: MediaKind,
        respond_to: oneshot::Sender<bool>,
    },
    PauseProducer {
        kind: MediaKind,
        respond_to: oneshot::Sender<bool>,
    },
    ResumeProducer {
        kind: MediaKind,
        respond_to: oneshot::Sender<bool>,
    },
    Consume {
        producer_id: ProducerId,
        owner: Option<PeerId>,
        respond_to: Option<Reply<ConsumerId>>,
    },
    Exit {
        respond_to: Reply<()>,
    },
    ModerateAudio {
        target: PeerId,
        action: ModerationAction,
        respond_to: Reply<()>,
    },
    RoomParticipants {
        respond_to: Reply<Vec<ParticipantSummary>>,
    },
    Pin {
        card: CardId,
        respond_to: Reply<LayoutUpdate>,
    },
    Unpin {
        respond_to: oneshot::Sender<LayoutUpdate>,
    },
    SetViewport {
        viewport: ViewportClass,
        respond_to: oneshot::Sender<LayoutUpdate>,
    },
    NextPage {
        respond_to: oneshot::Sender<LayoutUpdate>,
    },
    PreviousPage {
        respond_to: oneshot::Sender<LayoutUpdate>,
    },
    GetLayout {
        respond_to: oneshot::Sender<LayoutUpdate>,
    },
    GetSnapshot {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
    Subscribe {
        kind: SessionEventKind,
        listener: Listener,
    },

    // ------------------------------------------------------------------
    // Completions
    // ------------------------------------------------------------------
    /// The join request was accepted; capability negotiation starts.
    JoinStage {
        stage: SessionState,
    },
    JoinCompleted {
        outcome: JoinOutcome,
        result: Result<RoomSnapshot, ClientError>,
        respond_to: Reply<()>,
    },
    ProduceCompleted {
        kind: MediaKind,
        result: Result<(Arc<dyn ProducerHandle>, LocalTrack), ClientError>,
        respond_to: Reply<ProduceOutcome>,
    },
    ConsumeCompleted {
        producer_id: ProducerId,
        owner: Option<PeerId>,
        result: Result<Arc<dyn ConsumerHandle>, ClientError>,
        respond_to: Option<Reply<ConsumerId>>,
    },
    ExitRequestFinished {
        result: Result<(), ClientError>,
    },
}

impl SessionMessage {
    /// Variant name, for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            SessionMessage::CreateRoom { .. } => "CreateRoom",
            SessionMessage::Join { .. } => "Join",
            SessionMessage::Produce { .. } => "Produce",
            SessionMessage::CloseProducer { .. } => "CloseProducer",
            SessionMessage::PauseProducer { .. } => "PauseProducer",
            SessionMessage::ResumeProducer { .. } => "ResumeProducer",
            SessionMessage::Consume { .. } => "Consume",
            SessionMessage::Exit { .. } => "Exit",
            SessionMessage::ModerateAudio { .. } => "ModerateAudio",
            SessionMessage::RoomParticipants { .. } => "RoomParticipants",
            SessionMessage::Pin { .. } => "Pin",
            SessionMessage::Unpin { .. } => "Unpin",
            SessionMessage::SetViewport { .. } => "SetViewport",
            SessionMessage::NextPage { .. } => "NextPage",
            SessionMessage::PreviousPage { .. } => "PreviousPage",
            SessionMessage::GetLayout { .. } => "GetLayout",
            SessionMessage::GetSnapshot { .. } => "GetSnapshot",
            SessionMessage::Subscribe { .. } => "Subscribe",
            SessionMessage::JoinStage { .. } => "JoinStage",
            SessionMessage::JoinCompleted { .. } => "JoinCompleted",
            SessionMessage::ProduceCompleted { .. } => "ProduceCompleted",
            SessionMessage::ConsumeCompleted { .. } => "ConsumeCompleted",
            SessionMessage::ExitRequestFinished { .. } => "ExitRequestFinished",
        }
    }
}

impl fmt::Debug for SessionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
