//! Signaling protocol: typed requests, acks and server-pushed events.

pub mod channel;
pub mod events;
pub mod messages;

pub use channel::{SignalingChannel, SignalingTransport};
pub use events::{InboundFrame, NewProducer, PeerJoined, ServerEvent};
pub use messages::{ModerationAction, RoomSnapshot, SnapshotPeer};
