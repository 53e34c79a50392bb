//! Media engine contracts.
//!
//! The SFU client library (capability negotiation, ICE/DTLS/RTP) is an
//! external collaborator. These traits describe exactly what the session
//! needs from it:
//!
//! ```text
//! MediaEngine ──load_device──▶ Device ──create_send_transport──▶ SendTransport ──produce──▶ ProducerHandle
//!      │                          └─────create_recv_transport──▶ RecvTransport ──consume──▶ ConsumerHandle
//!      └──acquire_track──▶ MediaTrack
//! ```
//!
//! Lifecycle notifications (`connectionstatechange`, `trackended`,
//! `transportclose`, `close`) are pushed as [`MediaEvent`]s on the channel
//! handed to [`MediaEngine::load_device`]. Transport `connect`/`produce`
//! callbacks are answered by a [`TransportListener`].

pub mod bridge;

pub use bridge::SignalingBridge;

use async_trait::async_trait;
use common::types::{ConsumerId, MediaKind, ProducerId, TransportId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Router or device RTP capabilities. Opaque to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpCapabilities(pub Value);

/// DTLS parameters produced by a transport's `connect` callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DtlsParameters(pub Value);

/// RTP send/receive parameters of one producer or consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpParameters(pub Value);

/// Server-side description of a freshly created transport.
///
/// Only `id` is interpreted; ICE and DTLS fields are passed through to the
/// engine untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportOptions {
    pub id: TransportId,
    #[serde(flatten)]
    pub params: serde_json::Map<String, Value>,
}

/// Everything the engine needs to build a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerOptions {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// Direction of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    /// Outbound media (producers).
    Send,
    /// Inbound media (consumers).
    Recv,
}

impl TransportDirection {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportDirection::Send => "send",
            TransportDirection::Recv => "recv",
        }
    }
}

impl fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport connection state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Capture constraints for video sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub min_width: u32,
    pub ideal_width: u32,
    pub min_height: u32,
    pub ideal_height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            min_width: 640,
            ideal_width: 1920,
            min_height: 400,
            ideal_height: 1080,
        }
    }
}

/// A request for one local media source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub kind: MediaKind,
    /// Specific input device, or `None` for the system default.
    pub device_selector: Option<String>,
    /// Present for video requests only.
    pub video: Option<VideoConstraints>,
}

impl CaptureRequest {
    /// Build the request for `kind`; video constraints are dropped for audio.
    #[must_use]
    pub fn new(kind: MediaKind, device_selector: Option<String>, video: VideoConstraints) -> Self {
        Self {
            kind,
            device_selector,
            video: (kind == MediaKind::Video).then_some(video),
        }
    }
}

/// Media engine errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// The runtime cannot host the engine at all.
    #[error("Unsupported runtime: {0}")]
    Unsupported(String),

    /// Local capture failed (no device, permission denied, ...).
    #[error("Media capture failed: {0}")]
    Capture(String),

    /// A transport callback was rejected by the signaling side.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The resource was already closed.
    #[error("Resource closed")]
    Closed,

    /// Any other engine failure.
    #[error("Engine error: {0}")]
    Engine(String),
}

/// Lifecycle notifications emitted by engine objects.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// `connectionstatechange` on a transport.
    TransportStateChanged {
        transport_id: TransportId,
        direction: TransportDirection,
        state: ConnectionState,
    },
    /// `trackended` on a producer.
    ProducerTrackEnded { producer_id: ProducerId },
    /// `transportclose` on a producer.
    ProducerTransportClosed { producer_id: ProducerId },
    /// `close` on a producer.
    ProducerClosed { producer_id: ProducerId },
    /// `trackended` on a consumer.
    ConsumerTrackEnded { consumer_id: ConsumerId },
    /// `transportclose` on a consumer.
    ConsumerTransportClosed { consumer_id: ConsumerId },
}

/// Sink for engine lifecycle events.
pub type MediaEventSender = mpsc::UnboundedSender<MediaEvent>;

/// A captured local source. Owned by its producer while active.
pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> String;
    fn kind(&self) -> MediaKind;
    /// Release the capture device.
    fn stop(&self);
}

/// Shared handle to a captured source.
pub type LocalTrack = Arc<dyn MediaTrack>;

/// Answers a transport's `connect` and `produce` callbacks.
#[async_trait]
pub trait TransportListener: Send + Sync {
    /// Forward DTLS parameters; resolving `Ok` completes the engine callback.
    async fn on_connect(
        &self,
        transport_id: &TransportId,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), MediaError>;

    /// Register a new producer with the server and return its id.
    async fn on_produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId, MediaError>;
}

/// Entry point of the external media library.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Create a device and load the router's capabilities into it.
    ///
    /// Fails with [`MediaError::Unsupported`] when the runtime cannot host
    /// the engine; that failure is fatal for the join attempt.
    async fn load_device(
        &self,
        router_capabilities: RtpCapabilities,
        events: MediaEventSender,
    ) -> Result<Arc<dyn Device>, MediaError>;

    /// Acquire a local source matching `request`.
    async fn acquire_track(&self, request: CaptureRequest) -> Result<LocalTrack, MediaError>;
}

/// A device with negotiated capabilities.
pub trait Device: Send + Sync + fmt::Debug {
    fn rtp_capabilities(&self) -> RtpCapabilities;

    fn can_produce(&self, kind: MediaKind) -> bool;

    fn create_send_transport(
        &self,
        options: TransportOptions,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn SendTransport>, MediaError>;

    fn create_recv_transport(
        &self,
        options: TransportOptions,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn RecvTransport>, MediaError>;
}

/// Outbound transport.
#[async_trait]
pub trait SendTransport: Send + Sync + fmt::Debug {
    fn id(&self) -> TransportId;

    /// Create a producer for `track`. Triggers the listener's `on_produce`
    /// (and `on_connect` on first use).
    async fn produce(&self, track: LocalTrack) -> Result<Arc<dyn ProducerHandle>, MediaError>;

    fn close(&self);
}

/// Inbound transport. One per session carries every remote stream.
#[async_trait]
pub trait RecvTransport: Send + Sync + fmt::Debug {
    fn id(&self) -> TransportId;

    async fn consume(&self, options: ConsumerOptions)
        -> Result<Arc<dyn ConsumerHandle>, MediaError>;

    fn close(&self);
}

/// Engine-side producer.
pub trait ProducerHandle: Send + Sync + fmt::Debug {
    fn id(&self) -> ProducerId;
    fn kind(&self) -> MediaKind;
    fn pause(&self);
    fn resume(&self);
    fn close(&self);
}

/// Engine-side consumer.
pub trait ConsumerHandle: Send + Sync + fmt::Debug {
    fn id(&self) -> ConsumerId;
    fn kind(&self) -> MediaKind;
    fn producer_id(&self) -> ProducerId;
    fn close(&self);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capture_request_drops_video_constraints_for_audio() {
        let audio = CaptureRequest::new(
            MediaKind::Audio,
            Some("mic-2".to_string()),
            VideoConstraints::default(),
        );
        assert_eq!(audio.video, None);
        assert_eq!(audio.device_selector.as_deref(), Some("mic-2"));

        let video = CaptureRequest::new(MediaKind::Video, None, VideoConstraints::default());
        assert_eq!(video.video.unwrap().ideal_width, 1920);
    }

    #[test]
    fn test_transport_options_keep_engine_fields() {
        let raw = json!({
            "id": "t-1",
            "iceParameters": {"usernameFragment": "u"},
            "dtlsParameters": {"role": "auto"}
        });
        let opts: TransportOptions = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(opts.id.as_str(), "t-1");
        assert!(opts.params.contains_key("iceParameters"));
        assert_eq!(serde_json::to_value(&opts).unwrap(), raw);
    }

    #[test]
    fn test_connection_state_wire_names() {
        let state: ConnectionState = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(state, ConnectionState::Failed);
        assert_eq!(TransportDirection::Recv.to_string(), "recv");
    }
}
