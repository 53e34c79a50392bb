//! Huddle Room Client Library
//!
//! Client-side orchestration for joining a room on an SFU-backed video
//! service:
//!
//! - Room session lifecycle: create, join, capability negotiation, exit
//! - Local media publication (one producer per kind)
//! - Remote media consumption with per-participant attribution
//! - Roster reconciliation from a snapshot plus incremental events
//! - Participant card layout, pinning and pagination per viewport class
//! - Trainer moderation (force mute, unmute request)
//!
//! # Architecture
//!
//! ```text
//! SessionActor (one per room session)
//! ├── owns ProducerSet, ConsumerSet, RosterManager, Presentation
//! ├── reads server events from the signaling socket
//! ├── reads lifecycle events from the media engine
//! └── spawns one task per round trip; completions come back as messages
//! ```
//!
//! The signaling socket ([`signaling::SignalingTransport`]), media engine
//! ([`media::MediaEngine`]) and rendering surface ([`ui::UiAdapter`]) are
//! provided by the embedding application.
//!
//! # Modules
//!
//! - [`session`] - Session actor, handle and lifecycle state machine
//! - [`signaling`] - Request/ack protocol and server-pushed events
//! - [`media`] - Media engine abstraction and transport callback bridge
//! - [`roster`] - Remote participant registry and consumer attribution
//! - [`layout`] - Pure layout computation
//! - [`presentation`] - Card ordering, pinning and paging
//! - [`config`] - Client configuration from environment
//! - [`errors`] - Error types

#![warn(clippy::pedantic)]

pub mod config;
pub mod errors;
pub mod layout;
pub mod media;
pub mod observability;
pub mod presentation;
pub mod roster;
pub mod session;
pub mod signaling;
pub mod ui;

pub use config::ClientConfig;
pub use errors::{ClientError, ErrorCategory};
pub use roster::LocalProfile;
pub use session::{
    SessionActor, SessionContext, SessionEvent, SessionEventKind, SessionHandle, SessionState,
};
