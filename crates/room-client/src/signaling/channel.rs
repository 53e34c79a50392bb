//! Typed request/response wrapper over the signaling transport.

use super::messages::{
    method, ConnectTransportRequest, ConsumeRequest, ConsumeResponse, CreateRoomRequest,
    CreateTransportRequest, Empty, JoinRequest, ModerateAudioRequest, ModerationAction,
    ProduceRequest, ProduceResponse, ProducerClosedNotice, RoomInfoResponse, RoomSnapshot,
};
use crate::errors::ClientError;
use crate::media::{DtlsParameters, RtpCapabilities, RtpParameters, TransportOptions};
use crate::observability::metrics;
use async_trait::async_trait;
use common::types::{MediaKind, PeerId, ProducerId, RoomId, TransportId};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Event-with-acknowledgement socket provided by the embedding application.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Send `event` and wait for the server's ack.
    ///
    /// Transport-level failures (socket gone, ack timeout) are reported as
    /// `ClientError::SignalingUnavailable`. An ack carrying an `error` field
    /// is returned as `Ok`; [`SignalingChannel`] interprets it.
    async fn emit_with_ack(&self, event: &str, payload: Value) -> Result<Value, ClientError>;

    /// Send `event` without waiting for an ack.
    fn emit(&self, event: &str, payload: Value) -> Result<(), ClientError>;
}

/// Session-facing signaling API.
#[derive(Clone)]
pub struct SignalingChannel {
    transport: Arc<dyn SignalingTransport>,
}

impl SignalingChannel {
    pub fn new(transport: Arc<dyn SignalingTransport>) -> Self {
        Self { transport }
    }

    /// Issue a request and decode its ack.
    ///
    /// # Errors
    ///
    /// `Signaling` when the ack contains an `error` field or cannot be
    /// decoded, `SignalingUnavailable` when the transport fails.
    #[instrument(skip_all, name = "rc.signaling.request", fields(method = method))]
    pub async fn request<P, R>(&self, method: &'static str, payload: &P) -> Result<R, ClientError>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_value(payload)
            .map_err(|e| ClientError::Internal(format!("encode {method}: {e}")))?;

        let start = Instant::now();
        let result = self
            .transport
            .emit_with_ack(method, payload)
            .await
            .and_then(|ack| decode_ack(method, ack));
        let duration = start.elapsed();

        let status = match &result {
            Ok(_) => "success",
            Err(ClientError::SignalingUnavailable(_)) => "unavailable",
            Err(_) => "error",
        };
        metrics::record_signaling_request(method, status, duration);

        match &result {
            Ok(_) => debug!(
                target: "rc.signaling",
                method,
                duration_ms = duration.as_millis(),
                "Request acknowledged"
            ),
            Err(e) => debug!(
                target: "rc.signaling",
                method,
                error = %e,
                "Request failed"
            ),
        }

        result
    }

    /// Fire-and-forget emit.
    ///
    /// # Errors
    ///
    /// Returns the transport error; callers treat it as best effort.
    pub fn notify<P: Serialize>(&self, event: &'static str, payload: &P) -> Result<(), ClientError> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| ClientError::Internal(format!("encode {event}: {e}")))?;
        self.transport.emit(event, payload).map_err(|e| {
            warn!(target: "rc.signaling", event, error = %e, "Emit failed");
            e
        })
    }

    pub async fn create_room(&self, room_id: &RoomId) -> Result<(), ClientError> {
        let _: IgnoredAny = self
            .request(method::CREATE_ROOM, &CreateRoomRequest { room_id })
            .await?;
        Ok(())
    }

    /// Join the room. The ack content is informational.
    pub async fn join(&self, request: &JoinRequest<'_>) -> Result<Value, ClientError> {
        self.request(method::JOIN, request).await
    }

    pub async fn router_rtp_capabilities(&self) -> Result<RtpCapabilities, ClientError> {
        self.request(method::GET_ROUTER_RTP_CAPABILITIES, &Empty::default())
            .await
    }

    /// Ask the server for a transport. Send transports include the device
    /// capabilities; receive transports do not.
    pub async fn create_webrtc_transport(
        &self,
        force_tcp: bool,
        rtp_capabilities: Option<RtpCapabilities>,
    ) -> Result<TransportOptions, ClientError> {
        self.request(
            method::CREATE_WEBRTC_TRANSPORT,
            &CreateTransportRequest {
                force_tcp,
                rtp_capabilities,
            },
        )
        .await
    }

    pub async fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), ClientError> {
        let _: IgnoredAny = self
            .request(
                method::CONNECT_TRANSPORT,
                &ConnectTransportRequest {
                    transport_id,
                    dtls_parameters,
                },
            )
            .await?;
        Ok(())
    }

    pub async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId, ClientError> {
        let response: ProduceResponse = self
            .request(
                method::PRODUCE,
                &ProduceRequest {
                    producer_transport_id: transport_id,
                    kind,
                    rtp_parameters,
                },
            )
            .await?;
        Ok(response.producer_id)
    }

    pub async fn consume(
        &self,
        request: &ConsumeRequest<'_>,
    ) -> Result<ConsumeResponse, ClientError> {
        self.request(method::CONSUME, request).await
    }

    /// Fetch and decode the current roster.
    pub async fn room_info(&self) -> Result<RoomSnapshot, ClientError> {
        let info: RoomInfoResponse = self
            .request(method::GET_MY_ROOM_INFO, &Empty::default())
            .await?;
        RoomSnapshot::parse(&info.peers)
    }

    pub async fn exit_room(&self) -> Result<(), ClientError> {
        let _: IgnoredAny = self.request(method::EXIT_ROOM, &Empty::default()).await?;
        Ok(())
    }

    pub async fn moderate_audio(
        &self,
        target: &PeerId,
        action: ModerationAction,
    ) -> Result<(), ClientError> {
        let _: IgnoredAny = self
            .request(
                method::MODERATE_AUDIO,
                &ModerateAudioRequest {
                    target_socket_id: target,
                    action,
                },
            )
            .await?;
        Ok(())
    }

    pub fn producer_closed(&self, producer_id: &ProducerId) -> Result<(), ClientError> {
        self.notify(method::PRODUCER_CLOSED, &ProducerClosedNotice { producer_id })
    }

    pub fn get_producers(&self) -> Result<(), ClientError> {
        self.notify(method::GET_PRODUCERS, &Empty::default())
    }
}

/// Reject acks carrying an `error` field, then decode.
fn decode_ack<R: DeserializeOwned>(method: &'static str, ack: Value) -> Result<R, ClientError> {
    if let Some(error) = ack.get("error").filter(|e| !e.is_null()) {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(ClientError::Signaling {
            method: method.to_string(),
            message,
        });
    }

    serde_json::from_value(ack).map_err(|e| ClientError::Signaling {
        method: method.to_string(),
        message: format!("malformed response: {e}"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct Fixed {
        ack: Result<Value, ClientError>,
        emitted: Mutex<Vec<(String, Value)>>,
    }

    impl Fixed {
        fn new(ack: Result<Value, ClientError>) -> Arc<Self> {
            Arc::new(Self {
                ack,
                emitted: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SignalingTransport for Fixed {
        async fn emit_with_ack(&self, _event: &str, _payload: Value) -> Result<Value, ClientError> {
            match &self.ack {
                Ok(v) => Ok(v.clone()),
                Err(e) => Err(ClientError::SignalingUnavailable(e.to_string())),
            }
        }

        fn emit(&self, event: &str, payload: Value) -> Result<(), ClientError> {
            self.emitted
                .lock()
                .unwrap()
                .push((event.to_string(), payload));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_error_field_becomes_rejection() {
        let channel = SignalingChannel::new(Fixed::new(Ok(json!({"error": "room not found"}))));
        let err = channel.exit_room().await.unwrap_err();
        match err {
            ClientError::Signaling { method, message } => {
                assert_eq!(method, "exitRoom");
                assert_eq!(message, "room not found");
            }
            other => unreachable!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_null_error_field_is_success() {
        let channel = SignalingChannel::new(Fixed::new(Ok(json!({"error": null}))));
        assert!(channel.exit_room().await.is_ok());
    }

    #[tokio::test]
    async fn test_plain_ack_accepted_for_void_requests() {
        let channel = SignalingChannel::new(Fixed::new(Ok(json!("already exists"))));
        assert!(channel.create_room(&RoomId::from("r")).await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let channel = SignalingChannel::new(Fixed::new(Ok(json!({"id": 5}))));
        let err = channel
            .produce(
                &TransportId::from("t"),
                MediaKind::Audio,
                RtpParameters(json!({})),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("malformed response"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_unavailable() {
        let channel = SignalingChannel::new(Fixed::new(Err(ClientError::Internal(
            "socket closed".to_string(),
        ))));
        let err = channel.router_rtp_capabilities().await.unwrap_err();
        assert!(matches!(err, ClientError::SignalingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_room_info_decodes_snapshot() {
        let channel = SignalingChannel::new(Fixed::new(Ok(json!({
            "peers": "[[\"s1\",{\"name\":\"Ana\"}]]"
        }))));
        let snapshot = channel.room_info().await.unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_fire_and_forget_payloads() {
        let transport = Fixed::new(Ok(Value::Null));
        let channel = SignalingChannel::new(transport.clone());
        channel.producer_closed(&ProducerId::from("p1")).unwrap();
        channel.get_producers().unwrap();

        let emitted = transport.emitted.lock().unwrap();
        assert_eq!(
            *emitted,
            vec![
                ("producerClosed".to_string(), json!({"producer_id": "p1"})),
                ("getProducers".to_string(), json!({})),
            ]
        );
    }
}
