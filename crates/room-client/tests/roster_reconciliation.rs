//! Integration tests for roster reconciliation and stream attribution.
//!
//! Covers:
//! - incremental `peerJoined`/`peerLeft` handling after the snapshot
//! - events arriving while the join is still negotiating
//! - routing of inbound streams to cards, the fallback slot and audio sink
//! - orphaned consumers after their owner leaves
//! - consumes still in flight when the owner leaves or the session exits

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::time::Duration;

use common::types::{ConsumerId, MediaKind, PeerId};
use rc_test_utils::{eventually, learner_profile, MockSignaling, TestPeer, TestSession};
use room_client::media::TransportDirection;
use room_client::errors::ClientError;
use room_client::session::{SessionEventKind, SessionState};
use room_client::ui::{MediaSource, MediaTarget};

async fn open_with(peers: &[TestPeer], signaling: MockSignaling) -> TestSession {
    let session = TestSession::builder()
        .signaling(signaling.with_room_peers(peers))
        .spawn()
        .await;
    session.handle.join(learner_profile("Local")).await.unwrap();
    session
}

fn room() -> Vec<TestPeer> {
    vec![
        TestPeer::new("s-local", "Local"),
        TestPeer::new("s-ana", "Ana"),
    ]
}

fn remote_cards(session: &TestSession) -> usize {
    session
        .ui
        .created_cards()
        .iter()
        .filter(|c| !c.is_local)
        .count()
}

// ============================================================================
// Roster
// ============================================================================

#[tokio::test]
async fn test_peer_joined_adds_one_card() {
    let session = open_with(&room(), MockSignaling::new()).await;
    let cara = TestPeer::new("s-cara", "Cara").trainer();

    session.push.peer_joined(&cara);
    session.push.peer_joined(&cara);
    session.push.peer_joined(&TestPeer::new("s-dev", "Dev"));
    session.wait_for(|s| s.peers == 3).await;

    assert_eq!(remote_cards(&session), 3);
    let card = session.ui.card_for("s-cara").unwrap();
    assert!(card.is_trainer);
    assert_eq!(session.snapshot().await.cards, 4);
}

#[tokio::test]
async fn test_own_join_echo_is_ignored() {
    let session = open_with(&room(), MockSignaling::new()).await;

    session.push.peer_joined(&TestPeer::new("s-local", "Local"));
    session.push.peer_joined(&TestPeer::new("s-eve", "Eve"));
    session.wait_for(|s| s.peers == 2).await;

    assert_eq!(remote_cards(&session), 2);
}

#[tokio::test]
async fn test_announcements_without_name_are_ignored() {
    let session = open_with(&room(), MockSignaling::new()).await;

    session.push.peer_joined(&TestPeer::new("s-anon", ""));
    session.push.peer_joined(&TestPeer::new("s-fay", "Fay"));
    session.wait_for(|s| s.peers == 2).await;

    assert!(session.ui.card_for("s-anon").is_none());
}

#[tokio::test]
async fn test_peer_left_removes_card() {
    let session = open_with(&room(), MockSignaling::new()).await;
    let ana = session.ui.card_for("s-ana").unwrap();

    session.push.peer_left("s-ghost");
    session.push.peer_left("s-ana");
    let snapshot = session.wait_for(|s| s.peers == 0).await;

    assert_eq!(snapshot.cards, 1);
    assert_eq!(session.ui.removed_cards(), vec![ana.card_id]);
}

#[tokio::test]
async fn test_events_before_join_are_ignored() {
    let session = TestSession::builder()
        .signaling(MockSignaling::new().with_room_peers(&room()))
        .spawn()
        .await;

    session.push.peer_joined(&TestPeer::new("s-early", "Early"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.handle.join(learner_profile("Local")).await.unwrap();

    assert!(session.ui.card_for("s-early").is_none());
    assert_eq!(session.snapshot().await.peers, 1);
}

#[tokio::test]
async fn test_roster_events_during_negotiation_apply_after_snapshot() {
    let signaling = MockSignaling::new().with_room_peers(&room());
    let gate = signaling.gate("getMyRoomInfo");
    let session = TestSession::builder().signaling(signaling).spawn().await;

    let handle = session.handle.clone();
    let join = tokio::spawn(async move { handle.join(learner_profile("Local")).await });
    eventually(|| session.signaling.request_count("getMyRoomInfo") == 1).await;

    session.push.peer_joined(&TestPeer::new("s-gus", "Gus"));
    session.push.peer_left("s-ana");
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.notify_one();
    join.await.unwrap().unwrap();

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Open);
    assert_eq!(snapshot.peers, 1);
    assert!(session.ui.card_for("s-gus").is_some());
    let ana = session.ui.card_for("s-ana").unwrap();
    assert_eq!(session.ui.removed_cards(), vec![ana.card_id]);
}

// ============================================================================
// Stream attribution
// ============================================================================

#[tokio::test]
async fn test_video_from_known_peer_goes_to_their_card() {
    let session = open_with(&room(), MockSignaling::new()).await;
    let ana = session.ui.card_for("s-ana").unwrap();

    session.push.new_producer("prod-ana-cam", Some("s-ana"));
    session.wait_for(|s| s.consumers == 1).await;

    let consume = &session.signaling.requests("consume")[0];
    assert_eq!(consume["producerId"], "prod-ana-cam");
    assert_eq!(
        consume["consumerTransportId"],
        session.media.recv_transports()[0].id.as_str()
    );
    assert!(consume.get("rtpCapabilities").is_some());

    let (target, source, kind) = session.ui.attachments().pop().unwrap();
    assert_eq!(target, MediaTarget::Card(ana.card_id));
    assert_eq!(kind, MediaKind::Video);
    assert!(matches!(source, MediaSource::Remote(_)));
}

#[tokio::test]
async fn test_unknown_owner_uses_fallback_slot() {
    let session = open_with(&room(), MockSignaling::new()).await;

    session.push.new_producer("prod-ghost", Some("s-ghost"));
    session.push.new_producer("prod-anon", None);
    session.wait_for(|s| s.consumers == 2).await;

    let targets: Vec<MediaTarget> = session
        .ui
        .attachments()
        .into_iter()
        .map(|(target, _, _)| target)
        .collect();
    assert_eq!(
        targets,
        vec![MediaTarget::FallbackVideo, MediaTarget::FallbackVideo]
    );
}

#[tokio::test]
async fn test_remote_audio_goes_to_audio_sink() {
    let signaling = MockSignaling::new().with_remote_producer("prod-ana-mic", "audio");
    let session = open_with(&room(), signaling).await;

    session.push.new_producer("prod-ana-mic", Some("s-ana"));
    session.wait_for(|s| s.consumers == 1).await;

    let (target, _, kind) = session.ui.attachments().pop().unwrap();
    assert_eq!(target, MediaTarget::AudioSink);
    assert_eq!(kind, MediaKind::Audio);
}

#[tokio::test]
async fn test_explicit_consume_returns_consumer_id() {
    let session = open_with(&room(), MockSignaling::new()).await;

    let consumer_id = session
        .handle
        .consume("prod-x".into(), Some(PeerId::from("s-ana")))
        .await
        .unwrap();

    let consumer = session.media.consumer(&consumer_id).unwrap();
    assert_eq!(consumer.producer_id.as_str(), "prod-x");
    assert!(!consumer.is_closed());
}

#[tokio::test]
async fn test_consumer_survives_owner_leaving_until_closed() {
    let session = open_with(&room(), MockSignaling::new()).await;

    let consumer_id = session
        .handle
        .consume("prod-ana-cam".into(), Some(PeerId::from("s-ana")))
        .await
        .unwrap();

    session.push.peer_left("s-ana");
    let snapshot = session.wait_for(|s| s.peers == 0).await;
    assert_eq!(snapshot.consumers, 1);
    assert!(!session.media.consumer(&consumer_id).unwrap().is_closed());

    session.push.consumer_closed("consumer-unknown");
    session.push.consumer_closed(consumer_id.as_str());
    session.wait_for(|s| s.consumers == 0).await;

    assert!(session.media.consumer(&consumer_id).unwrap().is_closed());
    assert_eq!(
        session.ui.detachments(),
        vec![MediaSource::Remote(consumer_id)]
    );
}

#[tokio::test]
async fn test_consume_failure_is_reported() {
    let signaling = MockSignaling::new().with_error("consume", "producer not found");
    let session = open_with(&room(), signaling).await;

    let result = session
        .handle
        .consume("prod-gone".into(), None)
        .await;
    assert!(result.is_err());
    assert_eq!(session.snapshot().await.consumers, 0);
    assert!(session.ui.attachments().is_empty());
}

#[tokio::test]
async fn test_recv_transport_failure_releases_consumers() {
    let session = open_with(&room(), MockSignaling::new()).await;
    let consumer_id: ConsumerId = session
        .handle
        .consume("prod-ana-cam".into(), Some(PeerId::from("s-ana")))
        .await
        .unwrap();

    session.media.fail_transport(TransportDirection::Recv);
    session.wait_for(|s| s.consumers == 0).await;
    eventually(|| session.events.count(SessionEventKind::TransportFailed) == 1).await;

    assert!(session.media.consumer(&consumer_id).unwrap().is_closed());
    assert!(session.media.recv_transports()[0].is_closed());
    assert!(!session.media.send_transports()[0].is_closed());
}

#[tokio::test]
async fn test_owner_leaving_mid_consume_routes_to_fallback() {
    let signaling = MockSignaling::new();
    let gate = signaling.gate("consume");
    let session = open_with(&room(), signaling).await;

    let handle = session.handle.clone();
    let consume = tokio::spawn(async move {
        handle
            .consume("prod-ana-cam".into(), Some(PeerId::from("s-ana")))
            .await
    });
    eventually(|| session.signaling.request_count("consume") == 1).await;

    session.push.peer_left("s-ana");
    session.wait_for(|s| s.peers == 0).await;
    gate.notify_one();

    let consumer_id = consume.await.unwrap().unwrap();
    let (target, source, kind) = session.ui.attachments().pop().unwrap();
    assert_eq!(target, MediaTarget::FallbackVideo);
    assert_eq!(source, MediaSource::Remote(consumer_id.clone()));
    assert_eq!(kind, MediaKind::Video);

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.consumers, 1);
    assert_eq!(snapshot.state, SessionState::Open);
    assert!(!session.media.consumer(&consumer_id).unwrap().is_closed());
}

#[tokio::test]
async fn test_consumer_created_after_exit_is_closed() {
    let session = open_with(&room(), MockSignaling::new()).await;
    let gate = session.media.consume_gate();

    let handle = session.handle.clone();
    let consume = tokio::spawn(async move {
        handle
            .consume("prod-ana-cam".into(), Some(PeerId::from("s-ana")))
            .await
    });
    eventually(|| session.media.held_consumes() == 1).await;

    session.handle.exit().await.unwrap();
    gate.notify_one();

    let result = consume.await.unwrap();
    assert!(matches!(
        result,
        Err(ClientError::InvalidState {
            state: SessionState::Closed,
            ..
        })
    ));

    let consumers = session.media.consumers();
    assert_eq!(consumers.len(), 1);
    assert!(consumers[0].is_closed());
    assert_eq!(session.snapshot().await.consumers, 0);
    assert!(session.ui.attachments().is_empty());
}
