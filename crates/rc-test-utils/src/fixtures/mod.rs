//! Pre-configured test data and a session harness.
//!
//! Provides:
//! - Local profiles for trainers and learners
//! - Remote peers and the `getMyRoomInfo` ack that lists them
//! - [`ServerPush`] for injecting server events
//! - [`TestSession`], a spawned session wired to the mocks

use crate::mock_media::MockMediaEngine;
use crate::mock_signaling::MockSignaling;
use crate::recording_ui::RecordingUi;
use common::types::RoomId;
use room_client::config::ClientConfig;
use room_client::roster::LocalProfile;
use room_client::session::{
    SessionActor, SessionContext, SessionEvent, SessionEventKind, SessionHandle, SessionSnapshot,
};
use room_client::signaling::InboundFrame;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Room used by [`test_config`].
pub const TEST_ROOM: &str = "room-test";

#[must_use]
pub fn learner_profile(name: &str) -> LocalProfile {
    LocalProfile {
        name: name.to_string(),
        avatar: None,
        is_trainer: false,
    }
}

#[must_use]
pub fn trainer_profile(name: &str) -> LocalProfile {
    LocalProfile {
        name: name.to_string(),
        avatar: Some(format!("https://avatars.test/{name}.png")),
        is_trainer: true,
    }
}

/// Desktop configuration for [`TEST_ROOM`] with a learner profile.
#[must_use]
pub fn test_config() -> ClientConfig {
    ClientConfig::new(RoomId::from(TEST_ROOM), learner_profile("Local"))
}

/// Remote participant fixture.
#[derive(Debug, Clone)]
pub struct TestPeer {
    pub peer_id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub is_trainer: bool,
    pub has_audio: bool,
    pub has_video: bool,
}

impl TestPeer {
    #[must_use]
    pub fn new(peer_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            name: name.into(),
            avatar: None,
            is_trainer: false,
            has_audio: false,
            has_video: false,
        }
    }

    /// A peer with a random socket id.
    #[must_use]
    pub fn random(name: impl Into<String>) -> Self {
        Self::new(format!("socket-{}", Uuid::new_v4()), name)
    }

    #[must_use]
    pub fn trainer(mut self) -> Self {
        self.is_trainer = true;
        self
    }

    #[must_use]
    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_audio(mut self) -> Self {
        self.has_audio = true;
        self
    }

    #[must_use]
    pub fn with_video(mut self) -> Self {
        self.has_video = true;
        self
    }

    /// `[peerId, info]` pair as found in the room snapshot. Flags are sent
    /// as `"0"`/`"1"` strings like the server does.
    #[must_use]
    pub fn snapshot_entry(&self) -> Value {
        json!([
            self.peer_id,
            {
                "name": self.name,
                "avatar": self.avatar,
                "isTrainer": flag(self.is_trainer),
                "hasAudio": flag(self.has_audio),
                "hasVideo": flag(self.has_video),
            }
        ])
    }

    /// `peerJoined` payload for this peer.
    #[must_use]
    pub fn joined_payload(&self) -> Value {
        json!({
            "socketId": self.peer_id,
            "name": self.name,
            "avatar": self.avatar,
            "isTrainer": self.is_trainer,
        })
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// `getMyRoomInfo` ack listing `peers`; the list is JSON-encoded into a
/// string as on the wire.
#[must_use]
pub fn room_info_ack(peers: &[TestPeer]) -> Value {
    let entries: Vec<Value> = peers.iter().map(TestPeer::snapshot_entry).collect();
    json!({ "peers": Value::Array(entries).to_string() })
}

/// Sender side of the server event stream.
#[derive(Debug, Clone)]
pub struct ServerPush {
    tx: mpsc::UnboundedSender<InboundFrame>,
}

impl ServerPush {
    /// Create the push side and the receiver to hand to the session.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<InboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: &str, payload: Value) {
        let _ = self.tx.send(InboundFrame::new(event, payload));
    }

    /// Announce one remote producer.
    pub fn new_producer(&self, producer_id: &str, owner: Option<&str>) {
        self.send(
            "newProducers",
            json!([{ "producer_id": producer_id, "producer_socket_id": owner }]),
        );
    }

    pub fn peer_joined(&self, peer: &TestPeer) {
        self.send("peerJoined", peer.joined_payload());
    }

    pub fn peer_left(&self, peer_id: &str) {
        self.send("peerLeft", json!({ "socketId": peer_id }));
    }

    pub fn consumer_closed(&self, consumer_id: &str) {
        self.send("consumerClosed", json!({ "consumer_id": consumer_id }));
    }

    pub fn force_mute(&self, by: Option<&str>) {
        self.send("forceMute", json!({ "by": by }));
    }

    pub fn request_unmute(&self, by: Option<&str>) {
        self.send("requestUnmute", json!({ "by": by }));
    }

    pub fn disconnect(&self) {
        self.send("disconnect", Value::Null);
    }
}

/// Events delivered to listeners, in order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: SessionEventKind) -> usize {
        self.events().iter().filter(|e| e.kind() == kind).count()
    }
}

const ALL_EVENT_KINDS: [SessionEventKind; 9] = [
    SessionEventKind::OpenRoom,
    SessionEventKind::ExitRoom,
    SessionEventKind::StartAudio,
    SessionEventKind::StopAudio,
    SessionEventKind::StartVideo,
    SessionEventKind::StopVideo,
    SessionEventKind::ForceMuted,
    SessionEventKind::UnmuteRequested,
    SessionEventKind::TransportFailed,
];

/// A spawned session wired to mocks.
pub struct TestSession {
    pub handle: SessionHandle,
    pub task: JoinHandle<()>,
    pub signaling: MockSignaling,
    pub media: MockMediaEngine,
    pub ui: Arc<RecordingUi>,
    pub push: ServerPush,
    pub events: EventLog,
    pub cancel_token: CancellationToken,
}

impl TestSession {
    #[must_use]
    pub fn builder() -> TestSessionBuilder {
        TestSessionBuilder::default()
    }

    /// Spawn with default mocks.
    pub async fn spawn() -> Self {
        Self::builder().spawn().await
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.handle.snapshot().await.expect("session alive")
    }

    /// Poll the session until `condition` holds.
    ///
    /// # Panics
    ///
    /// Panics after two seconds.
    pub async fn wait_for(&self, condition: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let snapshot = self.snapshot().await;
            if condition(&snapshot) {
                return snapshot;
            }
            assert!(
                Instant::now() < deadline,
                "session never reached expected state: {snapshot:?}"
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

/// Poll `condition` until it holds.
///
/// # Panics
///
/// Panics after two seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[derive(Default)]
pub struct TestSessionBuilder {
    signaling: Option<MockSignaling>,
    media: Option<MockMediaEngine>,
    config: Option<ClientConfig>,
}

impl TestSessionBuilder {
    #[must_use]
    pub fn signaling(mut self, signaling: MockSignaling) -> Self {
        self.signaling = Some(signaling);
        self
    }

    #[must_use]
    pub fn media(mut self, media: MockMediaEngine) -> Self {
        self.media = Some(media);
        self
    }

    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Shorthand for a config with the given viewport width.
    #[must_use]
    pub fn viewport_width(mut self, width: u32) -> Self {
        let mut config = self.config.take().unwrap_or_else(test_config);
        config.viewport_width = width;
        self.config = Some(config);
        self
    }

    /// Spawn the session and subscribe an [`EventLog`] to every event kind.
    pub async fn spawn(self) -> TestSession {
        let signaling = self.signaling.unwrap_or_default();
        let media = self.media.unwrap_or_default();
        let config = self.config.unwrap_or_else(test_config);
        let ui = RecordingUi::new();
        let (push, inbound) = ServerPush::channel();
        let cancel_token = CancellationToken::new();

        let ctx = SessionContext::new(
            signaling.transport(),
            Arc::new(media.clone()),
            ui.clone(),
            config,
        );
        let (handle, task) = SessionActor::spawn(ctx, inbound, cancel_token.clone());

        let events = EventLog::default();
        for kind in ALL_EVENT_KINDS {
            let log = events.events.clone();
            handle
                .on(kind, move |event| log.lock().unwrap().push(event.clone()))
                .await
                .expect("subscribe");
        }

        TestSession {
            handle,
            task,
            signaling,
            media,
            ui,
            push,
            events,
            cancel_token,
        }
    }
}
