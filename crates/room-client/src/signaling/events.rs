//! Server-pushed signaling events.

use super::messages::loose_flag;
use common::types::{ConsumerId, PeerId, ProducerId};
use serde::Deserialize;
use serde_json::Value;

/// A raw event frame as delivered by the signaling transport.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub event: String,
    pub payload: Value,
}

impl InboundFrame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// One entry of a `newProducers` notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewProducer {
    pub producer_id: ProducerId,
    /// Socket id of the publishing peer; may be absent on old servers.
    #[serde(default)]
    pub producer_socket_id: Option<PeerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeerJoined {
    #[serde(rename = "socketId", default)]
    pub socket_id: Option<PeerId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(rename = "isTrainer", default, deserialize_with = "loose_flag")]
    pub is_trainer: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ConsumerClosedPayload {
    consumer_id: ConsumerId,
}

#[derive(Debug, Clone, Deserialize)]
struct PeerLeftPayload {
    #[serde(rename = "socketId")]
    socket_id: PeerId,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ModeratorPayload {
    #[serde(default)]
    by: Option<String>,
}

/// Typed inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    NewProducers(Vec<NewProducer>),
    ConsumerClosed { consumer_id: ConsumerId },
    PeerJoined(PeerJoined),
    PeerLeft { peer_id: PeerId },
    ForceMute { by: Option<String> },
    RequestUnmute { by: Option<String> },
    Disconnect,
}

impl ServerEvent {
    /// Decode a frame. Unknown event names yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the decode error when a known event carries a malformed
    /// payload.
    pub fn from_frame(frame: &InboundFrame) -> Result<Option<Self>, serde_json::Error> {
        let payload = frame.payload.clone();
        let event = match frame.event.as_str() {
            "newProducers" => ServerEvent::NewProducers(serde_json::from_value(payload)?),
            "consumerClosed" => {
                let p: ConsumerClosedPayload = serde_json::from_value(payload)?;
                ServerEvent::ConsumerClosed {
                    consumer_id: p.consumer_id,
                }
            }
            "peerJoined" => ServerEvent::PeerJoined(serde_json::from_value(payload)?),
            "peerLeft" => {
                let p: PeerLeftPayload = serde_json::from_value(payload)?;
                ServerEvent::PeerLeft {
                    peer_id: p.socket_id,
                }
            }
            "forceMute" => ServerEvent::ForceMute {
                by: moderator(payload)?,
            },
            "requestUnmute" => ServerEvent::RequestUnmute {
                by: moderator(payload)?,
            },
            "disconnect" => ServerEvent::Disconnect,
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Wire name, for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewProducers(_) => "newProducers",
            ServerEvent::ConsumerClosed { .. } => "consumerClosed",
            ServerEvent::PeerJoined(_) => "peerJoined",
            ServerEvent::PeerLeft { .. } => "peerLeft",
            ServerEvent::ForceMute { .. } => "forceMute",
            ServerEvent::RequestUnmute { .. } => "requestUnmute",
            ServerEvent::Disconnect => "disconnect",
        }
    }
}

fn moderator(payload: Value) -> Result<Option<String>, serde_json::Error> {
    if payload.is_null() {
        return Ok(None);
    }
    let p: ModeratorPayload = serde_json::from_value(payload)?;
    Ok(p.by.filter(|b| !b.is_empty()))
}
