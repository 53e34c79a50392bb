//! Transport callback bridge.
//!
//! The engine raises `connect` and `produce` on a transport and waits for the
//! application to answer. [`SignalingBridge`] answers by forwarding the
//! parameters to the server and resolving the callback from the ack.

use super::{DtlsParameters, MediaError, RtpParameters, TransportDirection, TransportListener};
use crate::signaling::SignalingChannel;
use async_trait::async_trait;
use common::types::{MediaKind, ProducerId, TransportId};
use tracing::{debug, warn};

/// Forwards transport callbacks through the signaling channel.
#[derive(Clone)]
pub struct SignalingBridge {
    signaling: SignalingChannel,
    direction: TransportDirection,
}

impl SignalingBridge {
    #[must_use]
    pub fn new(signaling: SignalingChannel, direction: TransportDirection) -> Self {
        Self {
            signaling,
            direction,
        }
    }
}

#[async_trait]
impl TransportListener for SignalingBridge {
    async fn on_connect(
        &self,
        transport_id: &TransportId,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), MediaError> {
        debug!(
            target: "rc.media.bridge",
            transport_id = %transport_id,
            direction = %self.direction,
            "Forwarding transport connect"
        );

        self.signaling
            .connect_transport(transport_id, dtls_parameters)
            .await
            .map_err(|e| {
                warn!(
                    target: "rc.media.bridge",
                    transport_id = %transport_id,
                    error = %e,
                    "connectTransport rejected"
                );
                MediaError::Rejected(e.to_string())
            })
    }

    async fn on_produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId, MediaError> {
        if self.direction != TransportDirection::Send {
            return Err(MediaError::Engine(format!(
                "produce raised on {} transport",
                self.direction
            )));
        }

        self.signaling
            .produce(transport_id, kind, rtp_parameters)
            .await
            .map_err(|e| MediaError::Rejected(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::errors::ClientError;
    use crate::signaling::SignalingTransport;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Scripted {
        calls: Mutex<Vec<(String, Value)>>,
        reply: Mutex<Value>,
    }

    #[async_trait]
    impl SignalingTransport for Scripted {
        async fn emit_with_ack(&self, event: &str, payload: Value) -> Result<Value, ClientError> {
            self.calls.lock().unwrap().push((event.to_string(), payload));
            Ok(self.reply.lock().unwrap().clone())
        }

        fn emit(&self, _event: &str, _payload: Value) -> Result<(), ClientError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_produce_callback_resolves_with_server_id() {
        let transport = Arc::new(Scripted::default());
        *transport.reply.lock().unwrap() = json!({"producer_id": "p-42"});
        let bridge = SignalingBridge::new(
            SignalingChannel::new(transport.clone()),
            TransportDirection::Send,
        );

        let id = bridge
            .on_produce(
                &TransportId::from("send-1"),
                MediaKind::Audio,
                RtpParameters(json!({"codecs": []})),
            )
            .await
            .unwrap();
        assert_eq!(id, ProducerId::from("p-42"));

        let calls = transport.calls.lock().unwrap();
        let (method, payload) = calls.first().unwrap();
        assert_eq!(method, "produce");
        assert_eq!(payload["producerTransportId"], "send-1");
        assert_eq!(payload["kind"], "audio");
    }

    #[tokio::test]
    async fn test_connect_rejection_fails_callback() {
        let transport = Arc::new(Scripted::default());
        *transport.reply.lock().unwrap() = json!({"error": "dtls mismatch"});
        let bridge = SignalingBridge::new(
            SignalingChannel::new(transport),
            TransportDirection::Recv,
        );

        let err = bridge
            .on_connect(&TransportId::from("recv-1"), DtlsParameters(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Rejected(msg) if msg.contains("dtls mismatch")));
    }

    #[tokio::test]
    async fn test_produce_on_recv_transport_is_rejected() {
        let bridge = SignalingBridge::new(
            SignalingChannel::new(Arc::new(Scripted::default())),
            TransportDirection::Recv,
        );
        let err = bridge
            .on_produce(
                &TransportId::from("recv-1"),
                MediaKind::Video,
                RtpParameters(json!({})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Engine(_)));
    }
}
