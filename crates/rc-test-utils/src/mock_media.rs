//! In-memory media engine.
//!
//! Transports drive their [`TransportListener`] exactly like a real engine:
//! the first `produce`/`consume` triggers `on_connect`, and every `produce`
//! asks `on_produce` for the server-assigned producer id. Every created
//! resource is kept so tests can check that it was closed or stopped.

use async_trait::async_trait;
use common::types::{ConsumerId, MediaKind, ProducerId, TransportId};
use room_client::media::{
    CaptureRequest, ConnectionState, ConsumerHandle, ConsumerOptions, Device, DtlsParameters,
    LocalTrack, MediaEngine, MediaError, MediaEvent, MediaEventSender, MediaTrack,
    ProducerHandle, RecvTransport, RtpCapabilities, RtpParameters, SendTransport,
    TransportDirection, TransportListener, TransportOptions,
};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

/// Mock [`MediaEngine`].
#[derive(Debug, Clone, Default)]
pub struct MockMediaEngine {
    inner: Arc<Mutex<EngineState>>,
}

#[derive(Debug, Default)]
struct EngineState {
    unsupported: bool,
    capture_error: Option<String>,
    produce_error: Option<String>,
    video_unavailable: bool,
    capture_gate: Option<Arc<Notify>>,
    consume_gate: Option<Arc<Notify>>,
    held_consumes: usize,
    events: Option<MediaEventSender>,
    capture_requests: Vec<CaptureRequest>,
    tracks: Vec<Arc<MockTrack>>,
    producers: Vec<Arc<MockProducer>>,
    consumers: Vec<Arc<MockConsumer>>,
    send_transports: Vec<Arc<MockSendTransport>>,
    recv_transports: Vec<Arc<MockRecvTransport>>,
}

impl MockMediaEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `load_device` fails as if the runtime had no WebRTC support.
    #[must_use]
    pub fn unsupported(self) -> Self {
        self.inner.lock().unwrap().unsupported = true;
        self
    }

    /// Every capture fails with `message`.
    #[must_use]
    pub fn with_capture_error(self, message: &str) -> Self {
        self.inner.lock().unwrap().capture_error = Some(message.to_string());
        self
    }

    /// Every `SendTransport::produce` fails with `message`.
    #[must_use]
    pub fn with_produce_error(self, message: &str) -> Self {
        self.inner.lock().unwrap().produce_error = Some(message.to_string());
        self
    }

    /// The device reports it cannot produce video.
    #[must_use]
    pub fn without_video(self) -> Self {
        self.inner.lock().unwrap().video_unavailable = true;
        self
    }

    /// Hold every capture until the returned gate is notified once per call.
    pub fn capture_gate(&self) -> Arc<Notify> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .capture_gate
            .get_or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Hold every `RecvTransport::consume` after the transport accepted it,
    /// so the consumer is created only once the gate is notified.
    pub fn consume_gate(&self) -> Arc<Notify> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .consume_gate
            .get_or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Consumes that reached the consume gate so far.
    pub fn held_consumes(&self) -> usize {
        self.inner.lock().unwrap().held_consumes
    }

    #[must_use]
    pub fn device_loaded(&self) -> bool {
        self.inner.lock().unwrap().events.is_some()
    }

    /// Push a lifecycle event as the engine would.
    ///
    /// # Panics
    ///
    /// Panics if no device was loaded yet.
    pub fn emit(&self, event: MediaEvent) {
        let events = self
            .inner
            .lock()
            .unwrap()
            .events
            .clone()
            .expect("no device loaded");
        let _ = events.send(event);
    }

    /// Report the most recent transport of `direction` as failed.
    pub fn fail_transport(&self, direction: TransportDirection) {
        let transport_id = match direction {
            TransportDirection::Send => self.send_transports().last().map(|t| t.id.clone()),
            TransportDirection::Recv => self.recv_transports().last().map(|t| t.id.clone()),
        }
        .expect("no transport of that direction");
        self.emit(MediaEvent::TransportStateChanged {
            transport_id,
            direction,
            state: ConnectionState::Failed,
        });
    }

    pub fn capture_requests(&self) -> Vec<CaptureRequest> {
        self.inner.lock().unwrap().capture_requests.clone()
    }

    pub fn tracks(&self) -> Vec<Arc<MockTrack>> {
        self.inner.lock().unwrap().tracks.clone()
    }

    pub fn producers(&self) -> Vec<Arc<MockProducer>> {
        self.inner.lock().unwrap().producers.clone()
    }

    pub fn consumers(&self) -> Vec<Arc<MockConsumer>> {
        self.inner.lock().unwrap().consumers.clone()
    }

    pub fn send_transports(&self) -> Vec<Arc<MockSendTransport>> {
        self.inner.lock().unwrap().send_transports.clone()
    }

    pub fn recv_transports(&self) -> Vec<Arc<MockRecvTransport>> {
        self.inner.lock().unwrap().recv_transports.clone()
    }

    /// The producer with `id`, if one was created.
    pub fn producer(&self, id: &ProducerId) -> Option<Arc<MockProducer>> {
        self.producers().into_iter().find(|p| &p.id == id)
    }

    /// The consumer with `id`, if one was created.
    pub fn consumer(&self, id: &ConsumerId) -> Option<Arc<MockConsumer>> {
        self.consumers().into_iter().find(|c| &c.id == id)
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn load_device(
        &self,
        router_capabilities: RtpCapabilities,
        events: MediaEventSender,
    ) -> Result<Arc<dyn Device>, MediaError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.unsupported {
            return Err(MediaError::Unsupported("WebRTC not available".to_string()));
        }
        inner.events = Some(events);
        Ok(Arc::new(MockDevice {
            capabilities: router_capabilities,
            video_capable: !inner.video_unavailable,
            engine: self.inner.clone(),
        }))
    }

    async fn acquire_track(&self, request: CaptureRequest) -> Result<LocalTrack, MediaError> {
        let gate = {
            let mut inner = self.inner.lock().unwrap();
            inner.capture_requests.push(request.clone());
            inner.capture_gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = &inner.capture_error {
            return Err(MediaError::Capture(message.clone()));
        }
        let track = Arc::new(MockTrack {
            id: format!("track-{}", Uuid::new_v4()),
            kind: request.kind,
            stopped: AtomicBool::new(false),
        });
        inner.tracks.push(track.clone());
        Ok(track)
    }
}

#[derive(Debug)]
pub struct MockDevice {
    capabilities: RtpCapabilities,
    video_capable: bool,
    engine: Arc<Mutex<EngineState>>,
}

impl Device for MockDevice {
    fn rtp_capabilities(&self) -> RtpCapabilities {
        self.capabilities.clone()
    }

    fn can_produce(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => true,
            MediaKind::Video => self.video_capable,
        }
    }

    fn create_send_transport(
        &self,
        options: TransportOptions,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn SendTransport>, MediaError> {
        let transport = Arc::new(MockSendTransport {
            id: options.id,
            listener,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            engine: self.engine.clone(),
        });
        self.engine
            .lock()
            .unwrap()
            .send_transports
            .push(transport.clone());
        Ok(transport)
    }

    fn create_recv_transport(
        &self,
        options: TransportOptions,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn RecvTransport>, MediaError> {
        let transport = Arc::new(MockRecvTransport {
            id: options.id,
            listener,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            engine: self.engine.clone(),
        });
        self.engine
            .lock()
            .unwrap()
            .recv_transports
            .push(transport.clone());
        Ok(transport)
    }
}

async fn connect_once(
    connected: &AtomicBool,
    listener: &Arc<dyn TransportListener>,
    id: &TransportId,
) -> Result<(), MediaError> {
    if connected.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    listener
        .on_connect(id, DtlsParameters(json!({"role": "client", "fingerprints": []})))
        .await
}

pub struct MockSendTransport {
    pub id: TransportId,
    listener: Arc<dyn TransportListener>,
    connected: AtomicBool,
    closed: AtomicBool,
    engine: Arc<Mutex<EngineState>>,
}

impl MockSendTransport {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MockSendTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSendTransport")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SendTransport for MockSendTransport {
    fn id(&self) -> TransportId {
        self.id.clone()
    }

    async fn produce(&self, track: LocalTrack) -> Result<Arc<dyn ProducerHandle>, MediaError> {
        if self.is_closed() {
            return Err(MediaError::Closed);
        }
        let produce_error = self.engine.lock().unwrap().produce_error.clone();
        if let Some(message) = produce_error {
            return Err(MediaError::Engine(message));
        }

        connect_once(&self.connected, &self.listener, &self.id).await?;
        let producer_id = self
            .listener
            .on_produce(&self.id, track.kind(), RtpParameters(json!({"codecs": []})))
            .await?;

        let producer = Arc::new(MockProducer {
            id: producer_id,
            kind: track.kind(),
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.engine
            .lock()
            .unwrap()
            .producers
            .push(producer.clone());
        Ok(producer)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct MockRecvTransport {
    pub id: TransportId,
    listener: Arc<dyn TransportListener>,
    connected: AtomicBool,
    closed: AtomicBool,
    engine: Arc<Mutex<EngineState>>,
}

impl MockRecvTransport {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MockRecvTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRecvTransport")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RecvTransport for MockRecvTransport {
    fn id(&self) -> TransportId {
        self.id.clone()
    }

    async fn consume(
        &self,
        options: ConsumerOptions,
    ) -> Result<Arc<dyn ConsumerHandle>, MediaError> {
        if self.is_closed() {
            return Err(MediaError::Closed);
        }
        connect_once(&self.connected, &self.listener, &self.id).await?;

        let gate = {
            let mut engine = self.engine.lock().unwrap();
            if engine.consume_gate.is_some() {
                engine.held_consumes += 1;
            }
            engine.consume_gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let consumer = Arc::new(MockConsumer {
            id: options.id,
            kind: options.kind,
            producer_id: options.producer_id,
            closed: AtomicBool::new(false),
        });
        self.engine
            .lock()
            .unwrap()
            .consumers
            .push(consumer.clone());
        Ok(consumer)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct MockTrack {
    pub id: String,
    pub kind: MediaKind,
    stopped: AtomicBool,
}

impl MockTrack {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaTrack for MockTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct MockProducer {
    pub id: ProducerId,
    pub kind: MediaKind,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl MockProducer {
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ProducerHandle for MockProducer {
    fn id(&self) -> ProducerId {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct MockConsumer {
    pub id: ConsumerId,
    pub kind: MediaKind,
    pub producer_id: ProducerId,
    closed: AtomicBool,
}

impl MockConsumer {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ConsumerHandle for MockConsumer {
    fn id(&self) -> ConsumerId {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn producer_id(&self) -> ProducerId {
        self.producer_id.clone()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
