//! Request and response payloads of the signaling protocol.
//!
//! Field names follow the server's wire format, which mixes snake_case and
//! camelCase keys; every rename below is deliberate.

use crate::errors::ClientError;
use crate::media::{RtpCapabilities, RtpParameters};
use common::types::{ConsumerId, MediaKind, PeerId, ProducerId, RoomId, TransportId};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Signaling method names.
pub mod method {
    pub const CREATE_ROOM: &str = "createRoom";
    pub const JOIN: &str = "join";
    pub const GET_ROUTER_RTP_CAPABILITIES: &str = "getRouterRtpCapabilities";
    pub const CREATE_WEBRTC_TRANSPORT: &str = "createWebRtcTransport";
    pub const CONNECT_TRANSPORT: &str = "connectTransport";
    pub const PRODUCE: &str = "produce";
    pub const CONSUME: &str = "consume";
    pub const GET_MY_ROOM_INFO: &str = "getMyRoomInfo";
    pub const EXIT_ROOM: &str = "exitRoom";
    pub const MODERATE_AUDIO: &str = "moderateAudio";
    pub const PRODUCER_CLOSED: &str = "producerClosed";
    pub const GET_PRODUCERS: &str = "getProducers";
}

/// Payload of requests that carry no fields.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Empty {}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRoomRequest<'a> {
    pub room_id: &'a RoomId,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinRequest<'a> {
    pub name: &'a str,
    pub room_id: &'a RoomId,
    pub avatar: Option<&'a str>,
    #[serde(rename = "isTrainer")]
    pub is_trainer: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateTransportRequest {
    #[serde(rename = "forceTcp")]
    pub force_tcp: bool,
    #[serde(rename = "rtpCapabilities", skip_serializing_if = "Option::is_none")]
    pub rtp_capabilities: Option<RtpCapabilities>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectTransportRequest<'a> {
    pub transport_id: &'a TransportId,
    #[serde(rename = "dtlsParameters")]
    pub dtls_parameters: crate::media::DtlsParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProduceRequest<'a> {
    #[serde(rename = "producerTransportId")]
    pub producer_transport_id: &'a TransportId,
    pub kind: MediaKind,
    #[serde(rename = "rtpParameters")]
    pub rtp_parameters: RtpParameters,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProduceResponse {
    pub producer_id: ProducerId,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumeRequest<'a> {
    #[serde(rename = "rtpCapabilities")]
    pub rtp_capabilities: RtpCapabilities,
    #[serde(rename = "consumerTransportId")]
    pub consumer_transport_id: &'a TransportId,
    #[serde(rename = "producerId")]
    pub producer_id: &'a ProducerId,
}

/// Server parameters for a new consumer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsumeResponse {
    pub id: ConsumerId,
    pub kind: MediaKind,
    #[serde(rename = "rtpParameters")]
    pub rtp_parameters: RtpParameters,
}

/// Audio moderation action sent by a trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModerationAction {
    Mute,
    RequestUnmute,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModerateAudioRequest<'a> {
    #[serde(rename = "targetSocketId")]
    pub target_socket_id: &'a PeerId,
    pub action: ModerationAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProducerClosedNotice<'a> {
    pub producer_id: &'a ProducerId,
}

/// Raw `getMyRoomInfo` ack.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomInfoResponse {
    #[serde(default)]
    pub peers: Value,
}

/// One participant as described by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PeerInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(rename = "isTrainer", default, deserialize_with = "loose_flag")]
    pub is_trainer: bool,
    #[serde(rename = "hasAudio", default, deserialize_with = "loose_flag")]
    pub has_audio: bool,
    #[serde(rename = "hasVideo", default, deserialize_with = "loose_flag")]
    pub has_video: bool,
}

/// A named participant taken from the room snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPeer {
    pub peer_id: PeerId,
    pub name: String,
    pub avatar: Option<String>,
    pub is_trainer: bool,
    pub has_audio: bool,
    pub has_video: bool,
}

/// Decoded `getMyRoomInfo` roster, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub peers: Vec<SnapshotPeer>,
}

impl RoomSnapshot {
    /// Decode the `peers` field of a room info ack.
    ///
    /// The server sends a JSON-encoded string holding an array of
    /// `[peerId, peerInfo]` pairs; an inline array is accepted too. Entries
    /// without a name or id are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::RosterParse` when the payload does not have
    /// that shape.
    pub fn parse(peers: &Value) -> Result<Self, ClientError> {
        let decoded: Vec<(PeerId, PeerInfo)> = match peers {
            Value::String(encoded) => serde_json::from_str(encoded),
            Value::Null => Ok(Vec::new()),
            other => serde_json::from_value(other.clone()),
        }
        .map_err(|e| ClientError::RosterParse(e.to_string()))?;

        let peers = decoded
            .into_iter()
            .filter_map(|(peer_id, info)| {
                let name = info.name.filter(|n| !n.is_empty())?;
                if peer_id.is_empty() {
                    return None;
                }
                Some(SnapshotPeer {
                    peer_id,
                    name,
                    avatar: info.avatar,
                    is_trainer: info.is_trainer,
                    has_audio: info.has_audio,
                    has_video: info.has_video,
                })
            })
            .collect();

        Ok(Self { peers })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Accept `true`/`false`, `0`/`1` and `"0"`/`"1"`/`"true"`/`"false"`.
///
/// Participant flags come from query strings on some deployments and are
/// echoed back untyped.
pub(crate) fn loose_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        Value::Number(n) => Ok(n.as_i64().is_some_and(|v| v != 0)),
        Value::String(s) => match s.as_str() {
            "1" | "true" => Ok(true),
            "" | "0" | "false" => Ok(false),
            other => Err(de::Error::custom(format!("invalid flag: {other}"))),
        },
        other => Err(de::Error::custom(format!("invalid flag: {other}"))),
    }
}
