//! Scripted signaling transport for session tests.
//!
//! Every method has a sensible default ack so that a full join succeeds
//! with no configuration. Tests override individual methods, queue one-shot
//! acks, or hold a request open with a gate to exercise races.
//!
//! # Example
//!
//! ```rust,ignore
//! use rc_test_utils::MockSignaling;
//!
//! let signaling = MockSignaling::new()
//!     .with_error("createRoom", "room already exists")
//!     .with_remote_producer("prod-a", "audio");
//!
//! // Hold `exitRoom` until the test releases it
//! let gate = signaling.gate("exitRoom");
//! gate.notify_one();
//! ```

use crate::fixtures::{room_info_ack, TestPeer};
use async_trait::async_trait;
use room_client::errors::ClientError;
use room_client::signaling::SignalingTransport;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// What the mock answers to one request.
#[derive(Debug, Clone)]
pub enum MockAck {
    /// Ack payload, delivered as is (including `{"error": ...}` payloads).
    Ack(Value),
    /// Transport-level failure.
    Unavailable(String),
}

/// Scripted [`SignalingTransport`].
#[derive(Debug, Clone, Default)]
pub struct MockSignaling {
    inner: Arc<Mutex<MockSignalingInner>>,
}

#[derive(Debug, Default)]
struct MockSignalingInner {
    /// Ack used for every call of a method.
    sticky: HashMap<String, MockAck>,
    /// One-shot acks, consumed before the sticky one.
    queued: HashMap<String, VecDeque<MockAck>>,
    gates: HashMap<String, Arc<Notify>>,
    requests: Vec<(String, Value)>,
    emitted: Vec<(String, Value)>,
    /// Kind reported by the default `consume` ack, per producer id.
    remote_kinds: HashMap<String, String>,
    fail_emits: bool,
    next_id: u64,
}

impl MockSignalingInner {
    fn next_ack(&mut self, method: &str, payload: &Value) -> MockAck {
        if let Some(ack) = self.queued.get_mut(method).and_then(VecDeque::pop_front) {
            return ack;
        }
        if let Some(ack) = self.sticky.get(method) {
            return ack.clone();
        }
        MockAck::Ack(self.default_ack(method, payload))
    }

    fn default_ack(&mut self, method: &str, payload: &Value) -> Value {
        self.next_id += 1;
        let n = self.next_id;
        match method {
            "getRouterRtpCapabilities" => json!({
                "codecs": [
                    {"kind": "audio", "mimeType": "audio/opus", "clockRate": 48000},
                    {"kind": "video", "mimeType": "video/VP8", "clockRate": 90000}
                ]
            }),
            "createWebRtcTransport" => json!({
                "id": format!("transport-{n}"),
                "iceParameters": {"usernameFragment": format!("ufrag-{n}")},
                "iceCandidates": [],
                "dtlsParameters": {"role": "auto", "fingerprints": []}
            }),
            "produce" => json!({"producer_id": format!("producer-{n}")}),
            "consume" => {
                let producer_id = payload["producerId"].as_str().unwrap_or_default();
                let kind = self
                    .remote_kinds
                    .get(producer_id)
                    .cloned()
                    .unwrap_or_else(|| "video".to_string());
                json!({
                    "id": format!("consumer-{n}"),
                    "kind": kind,
                    "rtpParameters": {"codecs": []}
                })
            }
            "getMyRoomInfo" => room_info_ack(&[]),
            _ => json!({}),
        }
    }
}

impl MockSignaling {
    /// Create a mock that acknowledges everything with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `method` with `ack`.
    #[must_use]
    pub fn with_ack(self, method: &str, ack: Value) -> Self {
        self.set_ack(method, ack);
        self
    }

    /// Always answer `method` with a server error.
    #[must_use]
    pub fn with_error(self, method: &str, message: &str) -> Self {
        self.set_ack(method, json!({"error": message}));
        self
    }

    /// Fail `method` at the transport level.
    #[must_use]
    pub fn with_unavailable(self, method: &str) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.sticky.insert(
                method.to_string(),
                MockAck::Unavailable(format!("{method}: socket closed")),
            );
        }
        self
    }

    /// Answer the next call of `method` with `ack`, then fall back.
    #[must_use]
    pub fn with_next_ack(self, method: &str, ack: Value) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .queued
                .entry(method.to_string())
                .or_default()
                .push_back(MockAck::Ack(ack));
        }
        self
    }

    /// Report `kind` when the client consumes `producer_id`.
    #[must_use]
    pub fn with_remote_producer(self, producer_id: &str, kind: &str) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .remote_kinds
                .insert(producer_id.to_string(), kind.to_string());
        }
        self
    }

    /// Serve `peers` from `getMyRoomInfo`.
    #[must_use]
    pub fn with_room_peers(self, peers: &[TestPeer]) -> Self {
        self.set_room_peers(peers);
        self
    }

    /// Make fire-and-forget emits fail.
    #[must_use]
    pub fn with_failing_emits(self) -> Self {
        self.inner.lock().unwrap().fail_emits = true;
        self
    }

    pub fn set_ack(&self, method: &str, ack: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner.sticky.insert(method.to_string(), MockAck::Ack(ack));
    }

    pub fn set_room_peers(&self, peers: &[TestPeer]) {
        self.set_ack("getMyRoomInfo", room_info_ack(peers));
    }

    /// Hold every call of `method` until the returned gate is notified once
    /// per call.
    pub fn gate(&self, method: &str) -> Arc<Notify> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .gates
            .entry(method.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// This mock as a shareable transport.
    #[must_use]
    pub fn transport(&self) -> Arc<dyn SignalingTransport> {
        Arc::new(self.clone())
    }

    /// Payloads of every request to `method`, in order.
    pub fn requests(&self, method: &str) -> Vec<Value> {
        let inner = self.inner.lock().unwrap();
        inner
            .requests
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn request_count(&self, method: &str) -> usize {
        self.requests(method).len()
    }

    /// Request method names, in order.
    pub fn request_log(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.requests.iter().map(|(m, _)| m.clone()).collect()
    }

    /// Payloads of every emit of `event`, in order.
    pub fn emitted(&self, event: &str) -> Vec<Value> {
        let inner = self.inner.lock().unwrap();
        inner
            .emitted
            .iter()
            .filter(|(e, _)| e == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl SignalingTransport for MockSignaling {
    async fn emit_with_ack(&self, event: &str, payload: Value) -> Result<Value, ClientError> {
        let gate = {
            let mut inner = self.inner.lock().unwrap();
            inner.requests.push((event.to_string(), payload.clone()));
            inner.gates.get(event).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let ack = self.inner.lock().unwrap().next_ack(event, &payload);
        match ack {
            MockAck::Ack(value) => Ok(value),
            MockAck::Unavailable(message) => Err(ClientError::SignalingUnavailable(message)),
        }
    }

    fn emit(&self, event: &str, payload: Value) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().unwrap();
        inner.emitted.push((event.to_string(), payload));
        if inner.fail_emits {
            return Err(ClientError::SignalingUnavailable("socket closed".to_string()));
        }
        Ok(())
    }
}
