//! Session events and listener registry.

use crate::media::TransportDirection;
use common::types::MediaKind;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    OpenRoom,
    ExitRoom,
    StartAudio,
    StopAudio,
    StartVideo,
    StopVideo,
    ForceMuted,
    UnmuteRequested,
    TransportFailed,
}

/// Notification delivered to application listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    OpenRoom,
    ExitRoom,
    StartAudio,
    StopAudio,
    StartVideo,
    StopVideo,
    /// A trainer closed our microphone.
    ForceMuted { by: String },
    /// A trainer asked us to unmute.
    UnmuteRequested { by: String },
    TransportFailed { direction: TransportDirection },
}

impl SessionEvent {
    #[must_use]
    pub const fn kind(&self) -> SessionEventKind {
        match self {
            SessionEvent::OpenRoom => SessionEventKind::OpenRoom,
            SessionEvent::ExitRoom => SessionEventKind::ExitRoom,
            SessionEvent::StartAudio => SessionEventKind::StartAudio,
            SessionEvent::StopAudio => SessionEventKind::StopAudio,
            SessionEvent::StartVideo => SessionEventKind::StartVideo,
            SessionEvent::StopVideo => SessionEventKind::StopVideo,
            SessionEvent::ForceMuted { .. } => SessionEventKind::ForceMuted,
            SessionEvent::UnmuteRequested { .. } => SessionEventKind::UnmuteRequested,
            SessionEvent::TransportFailed { .. } => SessionEventKind::TransportFailed,
        }
    }

    #[must_use]
    pub const fn started(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => SessionEvent::StartAudio,
            MediaKind::Video => SessionEvent::StartVideo,
        }
    }

    #[must_use]
    pub const fn stopped(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => SessionEvent::StopAudio,
            MediaKind::Video => SessionEvent::StopVideo,
        }
    }
}

/// Listener callback. Runs on the session task and must not block.
pub type Listener = Box<dyn Fn(&SessionEvent) + Send + Sync>;

/// Listeners per event kind, called in registration order.
#[derive(Default)]
pub struct EventRegistry {
    listeners: HashMap<SessionEventKind, Vec<Listener>>,
}

impl EventRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, kind: SessionEventKind, listener: Listener) {
        self.listeners.entry(kind).or_default().push(listener);
    }

    /// Call every listener for the event's kind. Returns how many ran.
    pub fn emit(&self, event: &SessionEvent) -> usize {
        let Some(listeners) = self.listeners.get(&event.kind()) else {
            return 0;
        };
        for listener in listeners {
            listener(event);
        }
        listeners.len()
    }

    #[must_use]
    pub fn listener_count(&self, kind: SessionEventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self
            .listeners
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("EventRegistry")
            .field("listeners", &counts)
            .finish()
    }
}
