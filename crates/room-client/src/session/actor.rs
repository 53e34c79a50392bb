//! `SessionActor` - owns all state of one room session.
//!
//! The actor is the only writer of the producer set, consumer set, roster
//! and presentation state. Handlers never await: every signaling round trip
//! or media acquisition runs in a spawned task that posts a completion
//! message back to the mailbox. Between issue and completion the actor keeps
//! serving roster events, remote producer notifications and disconnects.
//!
//! # Late completions
//!
//! A completion that arrives after the session left `Open` (or, for join,
//! the joining states) never resurrects state. It releases the media
//! resource it carries and answers the caller with `InvalidState`.
//!
//! # Inbound streams
//!
//! - signaling frames from the embedding application's socket, parsed into
//!   [`ServerEvent`]s; dropping the receiver detaches all listeners
//! - media engine lifecycle events ([`MediaEvent`])

use super::consumers::{ConsumerEntry, ConsumerSet};
use super::context::SessionContext;
use super::events::{EventRegistry, SessionEvent, SessionEventKind};
use super::messages::{
    JoinOutcome, ParticipantSummary, ProduceOutcome, Reply, SessionMessage, SessionSnapshot,
};
use super::producers::{ProducerEntry, ProducerSet, ProducerState};
use super::state::SessionState;
use crate::errors::ClientError;
use crate::layout::ViewportClass;
use crate::media::{
    CaptureRequest, ConnectionState, ConsumerHandle, ConsumerOptions, Device, LocalTrack,
    MediaEvent, MediaEventSender, ProducerHandle, RecvTransport, SendTransport, SignalingBridge,
    TransportDirection,
};
use crate::observability::metrics;
use crate::presentation::{LayoutUpdate, Presentation};
use crate::roster::{Attribution, LocalProfile, RosterManager};
use crate::signaling::messages::{ConsumeRequest, JoinRequest};
use crate::signaling::{InboundFrame, ModerationAction, RoomSnapshot, ServerEvent};
use crate::ui::{MediaSource, MediaTarget, UiCommand};
use chrono::{DateTime, Utc};
use common::types::{CardId, ConsumerId, MediaKind, PeerId, ProducerId, RoomId, TransportId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Mailbox size for the session actor.
const SESSION_CHANNEL_BUFFER: usize = 256;

/// Name shown when a moderator did not identify themselves.
const DEFAULT_MODERATOR: &str = "Trainer";

/// Handle to a `SessionActor`.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    room_id: RoomId,
}

impl SessionHandle {
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Send a command and wait for its reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| ClientError::SessionClosed)?;
        rx.await.map_err(|_| ClientError::SessionClosed)
    }

    /// Ask the server to create the room.
    ///
    /// A rejection (typically "already exists") is logged and reported as
    /// `Ok(false)`; it never blocks a subsequent join.
    pub async fn create_room(&self) -> Result<bool, ClientError> {
        self.request(|respond_to| SessionMessage::CreateRoom { respond_to })
            .await?
    }

    /// Join the room and negotiate transports.
    ///
    /// # Errors
    ///
    /// Any rejected step fails the join with a negotiation error and leaves
    /// the session `Closed`; call [`exit`](Self::exit) to release what the
    /// failed attempt created.
    pub async fn join(&self, profile: LocalProfile) -> Result<(), ClientError> {
        self.request(|respond_to| SessionMessage::Join {
            profile,
            respond_to,
        })
        .await?
    }

    /// Create the room, then join it.
    pub async fn open(&self, profile: LocalProfile) -> Result<(), ClientError> {
        self.create_room().await?;
        self.join(profile).await
    }

    /// Start sending local media of `kind`.
    pub async fn produce(
        &self,
        kind: MediaKind,
        device_selector: Option<String>,
    ) -> Result<ProduceOutcome, ClientError> {
        self.request(|respond_to| SessionMessage::Produce {
            kind,
            device_selector,
            respond_to,
        })
        .await?
    }

    /// Stop sending `kind`. Returns false if nothing was being sent.
    pub async fn close_producer(&self, kind: MediaKind) -> Result<bool, ClientError> {
        self.request(|respond_to| SessionMessage::CloseProducer { kind, respond_to })
            .await
    }

    pub async fn pause_producer(&self, kind: MediaKind) -> Result<bool, ClientError> {
        self.request(|respond_to| SessionMessage::PauseProducer { kind, respond_to })
            .await
    }

    pub async fn resume_producer(&self, kind: MediaKind) -> Result<bool, ClientError> {
        self.request(|respond_to| SessionMessage::ResumeProducer { kind, respond_to })
            .await
    }

    /// Receive a remote producer, attributing it to `owner` when known.
    pub async fn consume(
        &self,
        producer_id: ProducerId,
        owner: Option<PeerId>,
    ) -> Result<ConsumerId, ClientError> {
        self.request(|tx| SessionMessage::Consume {
            producer_id,
            owner,
            respond_to: Some(tx),
        })
        .await?
    }

    /// Leave the room and release every resource.
    pub async fn exit(&self) -> Result<(), ClientError> {
        self.request(|respond_to| SessionMessage::Exit { respond_to })
            .await?
    }

    /// Mute a participant or ask them to unmute. Trainers only.
    pub async fn moderate_audio(
        &self,
        target: PeerId,
        action: ModerationAction,
    ) -> Result<(), ClientError> {
        self.request(|respond_to| SessionMessage::ModerateAudio {
            target,
            action,
            respond_to,
        })
        .await?
    }

    /// Current participants as reported by the server.
    pub async fn room_participants(&self) -> Result<Vec<ParticipantSummary>, ClientError> {
        self.request(|respond_to| SessionMessage::RoomParticipants { respond_to })
            .await?
    }

    /// Pin `card`, or unpin it if already pinned.
    pub async fn pin(&self, card: CardId) -> Result<LayoutUpdate, ClientError> {
        self.request(|respond_to| SessionMessage::Pin { card, respond_to })
            .await?
    }

    pub async fn unpin(&self) -> Result<LayoutUpdate, ClientError> {
        self.request(|respond_to| SessionMessage::Unpin { respond_to })
            .await
    }

    /// Report the viewport width in CSS pixels.
    pub async fn set_viewport_width(&self, width: u32) -> Result<LayoutUpdate, ClientError> {
        self.set_viewport(ViewportClass::from_width(width)).await
    }

    pub async fn set_viewport(&self, viewport: ViewportClass) -> Result<LayoutUpdate, ClientError> {
        self.request(|respond_to| SessionMessage::SetViewport {
            viewport,
            respond_to,
        })
        .await
    }

    pub async fn next_page(&self) -> Result<LayoutUpdate, ClientError> {
        self.request(|respond_to| SessionMessage::NextPage { respond_to })
            .await
    }

    pub async fn previous_page(&self) -> Result<LayoutUpdate, ClientError> {
        self.request(|respond_to| SessionMessage::PreviousPage { respond_to })
            .await
    }

    pub async fn layout(&self) -> Result<LayoutUpdate, ClientError> {
        self.request(|respond_to| SessionMessage::GetLayout { respond_to })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, ClientError> {
        self.request(|respond_to| SessionMessage::GetSnapshot { respond_to })
            .await
    }

    /// Register a listener for one event kind.
    ///
    /// Listeners run on the session task in registration order.
    pub async fn on<F>(&self, kind: SessionEventKind, listener: F) -> Result<(), ClientError>
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.sender
            .send(SessionMessage::Subscribe {
                kind,
                listener: Box::new(listener),
            })
            .await
            .map_err(|_| ClientError::SessionClosed)
    }

    /// Stop the actor. Resources are released locally without notifying
    /// the server.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The session actor.
pub struct SessionActor {
    ctx: SessionContext,
    room_id: RoomId,
    receiver: mpsc::Receiver<SessionMessage>,
    /// Used by spawned tasks to post completions; weak so that dropping
    /// every handle still stops the actor.
    self_sender: mpsc::WeakSender<SessionMessage>,
    inbound: Option<mpsc::UnboundedReceiver<InboundFrame>>,
    media_events: mpsc::UnboundedReceiver<MediaEvent>,
    media_events_tx: MediaEventSender,
    cancel_token: CancellationToken,
    state: SessionState,
    device: Option<Arc<dyn Device>>,
    send_transport: Option<Arc<dyn SendTransport>>,
    recv_transport: Option<Arc<dyn RecvTransport>>,
    producers: ProducerSet,
    consumers: ConsumerSet,
    roster: RosterManager,
    presentation: Presentation,
    listeners: EventRegistry,
    /// Roster events received while joining, replayed once open.
    deferred: Vec<ServerEvent>,
    exit_waiters: Vec<Reply<()>>,
}

impl SessionActor {
    /// Spawn a session for the room in `ctx.config`.
    ///
    /// `inbound` carries the server-pushed events of the signaling socket.
    pub fn spawn(
        ctx: SessionContext,
        inbound: mpsc::UnboundedReceiver<InboundFrame>,
        cancel_token: CancellationToken,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (media_events_tx, media_events) = mpsc::unbounded_channel();
        let room_id = ctx.config.room_id.clone();
        let presentation = Presentation::new(
            ViewportClass::from_width(ctx.config.viewport_width),
            ctx.config.auto_pin_mobile,
        );
        let roster = RosterManager::new(ctx.config.profile.clone());

        let actor = Self {
            ctx,
            room_id: room_id.clone(),
            receiver,
            self_sender: sender.downgrade(),
            inbound: Some(inbound),
            media_events,
            media_events_tx,
            cancel_token: cancel_token.clone(),
            state: SessionState::Idle,
            device: None,
            send_transport: None,
            recv_transport: None,
            producers: ProducerSet::new(),
            consumers: ConsumerSet::new(),
            roster,
            presentation,
            listeners: EventRegistry::new(),
            deferred: Vec::new(),
            exit_waiters: Vec::new(),
        };

        let task = tokio::spawn(actor.run());

        (
            SessionHandle {
                sender,
                cancel_token,
                room_id,
            },
            task,
        )
    }

    #[instrument(skip_all, name = "rc.actor.session", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "rc.actor.session",
            room_id = %self.room_id,
            "SessionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "rc.actor.session",
                        room_id = %self.room_id,
                        "SessionActor received cancellation signal"
                    );
                    self.shutdown();
                    break;
                }

                message = self.receiver.recv() => {
                    let Some(message) = message else {
                        debug!(target: "rc.actor.session", "All session handles dropped");
                        self.shutdown();
                        break;
                    };
                    self.handle_message(message);
                }

                frame = next_frame(&mut self.inbound) => {
                    match frame {
                        Some(frame) => self.handle_frame(frame),
                        None => {
                            self.inbound = None;
                            self.on_signaling_lost();
                        }
                    }
                }

                Some(event) = self.media_events.recv() => {
                    self.handle_media_event(event);
                }
            }
        }

        info!(
            target: "rc.actor.session",
            room_id = %self.room_id,
            "SessionActor stopped"
        );
    }

    fn handle_message(&mut self, message: SessionMessage) {
        debug!(target: "rc.actor.session", message = message.name(), "Handling message");

        match message {
            SessionMessage::CreateRoom { respond_to } => self.handle_create_room(respond_to),
            SessionMessage::Join {
                profile,
                respond_to,
            } => self.handle_join(profile, respond_to),
            SessionMessage::Produce {
                kind,
                device_selector,
                respond_to,
            } => self.handle_produce(kind, device_selector, respond_to),
            SessionMessage::CloseProducer { kind, respond_to } => {
                let _ = respond_to.send(self.close_producer(kind, true));
            }
            SessionMessage::PauseProducer { kind, respond_to } => {
                let _ = respond_to.send(self.set_producer_state(kind, ProducerState::Paused));
            }
            SessionMessage::ResumeProducer { kind, respond_to } => {
                let _ = respond_to.send(self.set_producer_state(kind, ProducerState::Active));
            }
            SessionMessage::Consume {
                producer_id,
                owner,
                respond_to,
            } => self.handle_consume(producer_id, owner, respond_to),
            SessionMessage::Exit { respond_to } => self.handle_exit(Some(respond_to), false),
            SessionMessage::ModerateAudio {
                target,
                action,
                respond_to,
            } => self.handle_moderate_audio(target, action, respond_to),
            SessionMessage::RoomParticipants { respond_to } => {
                self.handle_room_participants(respond_to);
            }
            SessionMessage::Pin { card, respond_to } => {
                let result = self
                    .presentation
                    .toggle_pin(card)
                    .map(|change| {
                        debug!(target: "rc.actor.session", ?change, "Pin changed");
                        self.relayout()
                    });
                let _ = respond_to.send(result);
            }
            SessionMessage::Unpin { respond_to } => {
                self.presentation.unpin();
                let _ = respond_to.send(self.relayout());
            }
            SessionMessage::SetViewport {
                viewport,
                respond_to,
            } => {
                self.presentation.set_viewport(viewport);
                let _ = respond_to.send(self.relayout());
            }
            SessionMessage::NextPage { respond_to } => {
                let update = self.presentation.next_page();
                self.ctx.ui.apply(UiCommand::ApplyLayout(update.clone()));
                let _ = respond_to.send(update);
            }
            SessionMessage::PreviousPage { respond_to } => {
                let update = self.presentation.previous_page();
                self.ctx.ui.apply(UiCommand::ApplyLayout(update.clone()));
                let _ = respond_to.send(update);
            }
            SessionMessage::GetLayout { respond_to } => {
                let _ = respond_to.send(self.presentation.relayout());
            }
            SessionMessage::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
            SessionMessage::Subscribe { kind, listener } => {
                self.listeners.on(kind, listener);
            }
            SessionMessage::JoinStage { stage } => self.handle_join_stage(stage),
            SessionMessage::JoinCompleted {
                outcome,
                result,
                respond_to,
            } => self.handle_join_completed(outcome, result, respond_to),
            SessionMessage::ProduceCompleted {
                kind,
                result,
                respond_to,
            } => self.handle_produce_completed(kind, result, respond_to),
            SessionMessage::ConsumeCompleted {
                producer_id,
                owner,
                result,
                respond_to,
            } => self.handle_consume_completed(producer_id, owner, result, respond_to),
            SessionMessage::ExitRequestFinished { result } => {
                if let Err(e) = result {
                    warn!(
                        target: "rc.actor.session",
                        error = %e,
                        "exitRoom failed, cleaning up anyway"
                    );
                }
                self.finish_exit();
            }
        }
    }

    // ------------------------------------------------------------------
    // State helpers
    // ------------------------------------------------------------------

    fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                target: "rc.actor.session",
                from = %self.state,
                to = %next,
                "Ignoring illegal session transition"
            );
            return false;
        }
        debug!(
            target: "rc.actor.session",
            from = %self.state,
            to = %next,
            "Session state changed"
        );
        self.state = next;
        true
    }

    fn require_open(&self, operation: &'static str) -> Result<(), ClientError> {
        if self.state.is_open() {
            Ok(())
        } else {
            Err(ClientError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Run `task` off the actor and post its result back as a message.
    ///
    /// Returns false if the mailbox is gone; the task is not started.
    fn spawn_completion<F>(&self, task: F) -> bool
    where
        F: Future<Output = SessionMessage> + Send + 'static,
    {
        let Some(sender) = self.self_sender.upgrade() else {
            warn!(target: "rc.actor.session", "Mailbox closed, dropping task");
            return false;
        };
        tokio::spawn(async move {
            let message = task.await;
            let _ = sender.send(message).await;
        });
        true
    }

    fn emit(&self, event: SessionEvent) {
        let listeners = self.listeners.emit(&event);
        debug!(
            target: "rc.actor.session",
            event = ?event.kind(),
            listeners,
            "Session event emitted"
        );
    }

    fn relayout(&mut self) -> LayoutUpdate {
        let update = self.presentation.relayout();
        self.ctx.ui.apply(UiCommand::ApplyLayout(update.clone()));
        update
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            room_id: self.room_id.clone(),
            state: self.state,
            producers: self.producers.summary(),
            consumers: self.consumers.len(),
            peers: self.roster.len(),
            cards: self.presentation.card_count(),
            pinned: self.presentation.pinned(),
            viewport: self.presentation.viewport(),
        }
    }

    // ------------------------------------------------------------------
    // Room and join
    // ------------------------------------------------------------------

    fn handle_create_room(&mut self, respond_to: Reply<bool>) {
        if self.state != SessionState::Idle {
            let _ = respond_to.send(Err(ClientError::InvalidState {
                operation: "create_room",
                state: self.state,
            }));
            return;
        }

        let signaling = self.ctx.signaling.clone();
        let room_id = self.room_id.clone();
        tokio::spawn(async move {
            let created = match signaling.create_room(&room_id).await {
                Ok(()) => true,
                Err(e) => {
                    info!(
                        target: "rc.actor.session",
                        room_id = %room_id,
                        error = %e,
                        "createRoom rejected, continuing"
                    );
                    false
                }
            };
            let _ = respond_to.send(Ok(created));
        });
    }

    fn handle_join(&mut self, profile: LocalProfile, respond_to: Reply<()>) {
        if self.state != SessionState::Idle {
            let _ = respond_to.send(Err(ClientError::InvalidState {
                operation: "join",
                state: self.state,
            }));
            return;
        }
        let Some(sender) = self.self_sender.upgrade() else {
            let _ = respond_to.send(Err(ClientError::SessionClosed));
            return;
        };

        self.roster = RosterManager::new(profile.clone());
        self.transition(SessionState::Joining);
        info!(target: "rc.actor.session", room_id = %self.room_id, "Joining room");

        let ctx = self.ctx.clone();
        let events = self.media_events_tx.clone();
        tokio::spawn(async move {
            let mut outcome = JoinOutcome::default();
            let result = negotiate(&ctx, &profile, events, &sender, &mut outcome).await;
            let _ = sender
                .send(SessionMessage::JoinCompleted {
                    outcome,
                    result,
                    respond_to,
                })
                .await;
        });
    }

    fn handle_join_stage(&mut self, stage: SessionState) {
        if self.state == SessionState::Joining && stage == SessionState::Negotiating {
            self.transition(stage);
        } else {
            debug!(
                target: "rc.actor.session",
                state = %self.state,
                stage = %stage,
                "Ignoring stale join stage"
            );
        }
    }

    fn handle_join_completed(
        &mut self,
        outcome: JoinOutcome,
        result: Result<RoomSnapshot, ClientError>,
        respond_to: Reply<()>,
    ) {
        if !self.state.is_joining() {
            info!(
                target: "rc.actor.session",
                state = %self.state,
                "Join finished after the session was closed, releasing its resources"
            );
            release_join_outcome(outcome);
            metrics::record_join("aborted");
            let _ = respond_to.send(Err(ClientError::InvalidState {
                operation: "join",
                state: self.state,
            }));
            return;
        }

        self.device = outcome.device;
        self.send_transport = outcome.send_transport;
        self.recv_transport = outcome.recv_transport;

        match result {
            Ok(snapshot) => {
                if self.state == SessionState::Joining {
                    self.transition(SessionState::Negotiating);
                }
                self.transition(SessionState::Open);
                self.open_room(&snapshot);
                metrics::record_join("success");
                let _ = respond_to.send(Ok(()));
            }
            Err(e) => {
                warn!(
                    target: "rc.actor.session",
                    room_id = %self.room_id,
                    error = %e,
                    "Join failed"
                );
                metrics::record_join("failure");
                self.deferred.clear();
                self.transition(SessionState::Closed);
                let _ = respond_to.send(Err(e));
            }
        }
    }

    fn open_room(&mut self, snapshot: &RoomSnapshot) {
        let remote_cards = self.roster.initialize_from_snapshot(snapshot);

        let local = self.roster.local_card_spec();
        self.presentation.add_card(local.card_id);
        self.ctx.ui.apply(UiCommand::CreateCard(local));
        for card in remote_cards {
            self.presentation.add_card(card.card_id);
            self.ctx.ui.apply(UiCommand::CreateCard(card));
        }

        for event in std::mem::take(&mut self.deferred) {
            self.handle_server_event(event);
        }
        metrics::set_roster_peers(self.roster.len());

        if let Err(e) = self.ctx.signaling.get_producers() {
            warn!(target: "rc.actor.session", error = %e, "getProducers emit failed");
        }

        self.relayout();
        self.emit(SessionEvent::OpenRoom);
        info!(
            target: "rc.actor.session",
            room_id = %self.room_id,
            peers = self.roster.len(),
            "Room open"
        );
    }

    // ------------------------------------------------------------------
    // Producers
    // ------------------------------------------------------------------

    fn handle_produce(
        &mut self,
        kind: MediaKind,
        device_selector: Option<String>,
        respond_to: Reply<ProduceOutcome>,
    ) {
        if let Err(e) = self.require_open("produce") {
            let _ = respond_to.send(Err(e));
            return;
        }
        let (Some(device), Some(transport)) = (self.device.clone(), self.send_transport.clone())
        else {
            let _ = respond_to.send(Err(ClientError::Transport {
                direction: TransportDirection::Send,
                reason: "send transport closed after failure".to_string(),
            }));
            return;
        };
        if kind == MediaKind::Video && !device.can_produce(MediaKind::Video) {
            let _ = respond_to.send(Err(ClientError::Produce {
                kind,
                reason: "device cannot produce video".to_string(),
            }));
            return;
        }
        if !self.producers.reserve(kind) {
            info!(target: "rc.actor.session", kind = %kind, "Producer already exists");
            let _ = respond_to.send(Ok(ProduceOutcome::AlreadyActive));
            return;
        }

        let media = self.ctx.media.clone();
        let request = CaptureRequest::new(kind, device_selector, self.ctx.config.video);
        let started = self.spawn_completion(async move {
            let result: Result<(Arc<dyn ProducerHandle>, LocalTrack), ClientError> = async {
                let track = media
                    .acquire_track(request)
                    .await
                    .map_err(|e| ClientError::produce(kind, e))?;
                match transport.produce(track.clone()).await {
                    Ok(handle) => Ok((handle, track)),
                    Err(e) => {
                        track.stop();
                        Err(ClientError::produce(kind, e))
                    }
                }
            }
            .await;
            SessionMessage::ProduceCompleted {
                kind,
                result,
                respond_to,
            }
        });
        if !started {
            self.producers.release_reservation(kind);
        }
    }

    fn handle_produce_completed(
        &mut self,
        kind: MediaKind,
        result: Result<(Arc<dyn ProducerHandle>, LocalTrack), ClientError>,
        respond_to: Reply<ProduceOutcome>,
    ) {
        self.producers.release_reservation(kind);

        let (handle, track) = match result {
            Ok(produced) => produced,
            Err(e) => {
                warn!(target: "rc.actor.session", kind = %kind, error = %e, "Produce failed");
                let _ = respond_to.send(Err(e));
                return;
            }
        };

        if !self.state.is_open() {
            info!(
                target: "rc.actor.session",
                kind = %kind,
                state = %self.state,
                "Producer created after session left open state, releasing it"
            );
            handle.close();
            track.stop();
            let _ = respond_to.send(Err(ClientError::InvalidState {
                operation: "produce",
                state: self.state,
            }));
            return;
        }

        let producer_id = handle.id();
        if let Err(duplicate) = self.producers.insert(ProducerEntry::new(handle, track)) {
            warn!(target: "rc.actor.session", kind = %kind, "Duplicate producer released");
            duplicate.release();
            let _ = respond_to.send(Ok(ProduceOutcome::AlreadyActive));
            return;
        }
        metrics::set_producers_active(self.producers.len());

        if kind == MediaKind::Video {
            self.ctx.ui.apply(UiCommand::AttachMedia {
                target: MediaTarget::Card(self.roster.local_card()),
                source: MediaSource::Local(producer_id.clone()),
                kind,
            });
        }
        self.emit(SessionEvent::started(kind));
        info!(
            target: "rc.actor.session",
            producer_id = %producer_id,
            kind = %kind,
            "Producer started"
        );
        let _ = respond_to.send(Ok(ProduceOutcome::Started(producer_id)));
    }

    /// Close the producer of `kind`. `notify` sends `producerClosed`
    /// (best effort) before the local resource is released.
    fn close_producer(&mut self, kind: MediaKind, notify: bool) -> bool {
        let Some(entry) = self.producers.get(kind) else {
            debug!(target: "rc.actor.session", kind = %kind, "No producer to close");
            return false;
        };
        let producer_id = entry.id();

        if notify {
            if let Err(e) = self.ctx.signaling.producer_closed(&producer_id) {
                warn!(
                    target: "rc.actor.session",
                    producer_id = %producer_id,
                    error = %e,
                    "producerClosed notification failed"
                );
            }
        }
        entry.release();
        self.producers.remove(kind);
        metrics::set_producers_active(self.producers.len());

        if kind == MediaKind::Video {
            self.ctx.ui.apply(UiCommand::DetachMedia {
                source: MediaSource::Local(producer_id.clone()),
            });
        }
        self.emit(SessionEvent::stopped(kind));
        info!(
            target: "rc.actor.session",
            producer_id = %producer_id,
            kind = %kind,
            "Producer closed"
        );
        true
    }

    fn set_producer_state(&mut self, kind: MediaKind, state: ProducerState) -> bool {
        let Some(entry) = self.producers.get(kind) else {
            return false;
        };
        if entry.state == state {
            return false;
        }
        match state {
            ProducerState::Paused => entry.handle.pause(),
            ProducerState::Active => entry.handle.resume(),
        }
        self.producers.set_state(kind, state)
    }

    // ------------------------------------------------------------------
    // Consumers
    // ------------------------------------------------------------------

    fn handle_consume(
        &mut self,
        producer_id: ProducerId,
        owner: Option<PeerId>,
        respond_to: Option<Reply<ConsumerId>>,
    ) {
        if let Err(e) = self.require_open("consume") {
            reply(respond_to, Err(e));
            return;
        }
        let (Some(device), Some(transport)) = (self.device.clone(), self.recv_transport.clone())
        else {
            reply(
                respond_to,
                Err(ClientError::Transport {
                    direction: TransportDirection::Recv,
                    reason: "receive transport closed after failure".to_string(),
                }),
            );
            return;
        };

        let signaling = self.ctx.signaling.clone();
        self.spawn_completion(async move {
            let result: Result<Arc<dyn ConsumerHandle>, ClientError> = async {
                let transport_id = transport.id();
                let params = signaling
                    .consume(&ConsumeRequest {
                        rtp_capabilities: device.rtp_capabilities(),
                        consumer_transport_id: &transport_id,
                        producer_id: &producer_id,
                    })
                    .await?;
                let handle = transport
                    .consume(ConsumerOptions {
                        id: params.id,
                        producer_id: producer_id.clone(),
                        kind: params.kind,
                        rtp_parameters: params.rtp_parameters,
                    })
                    .await?;
                Ok(handle)
            }
            .await;
            SessionMessage::ConsumeCompleted {
                producer_id,
                owner,
                result,
                respond_to,
            }
        });
    }

    fn handle_consume_completed(
        &mut self,
        producer_id: ProducerId,
        owner: Option<PeerId>,
        result: Result<Arc<dyn ConsumerHandle>, ClientError>,
        respond_to: Option<Reply<ConsumerId>>,
    ) {
        let handle = match result {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    target: "rc.actor.session",
                    producer_id = %producer_id,
                    error = %e,
                    "Consume failed"
                );
                reply(respond_to, Err(e));
                return;
            }
        };

        if !self.state.is_open() {
            debug!(
                target: "rc.actor.session",
                producer_id = %producer_id,
                "Consumer created after session left open state, releasing it"
            );
            handle.close();
            reply(
                respond_to,
                Err(ClientError::InvalidState {
                    operation: "consume",
                    state: self.state,
                }),
            );
            return;
        }

        let consumer_id = handle.id();
        let kind = handle.kind();
        if self.consumers.contains(&consumer_id) {
            warn!(
                target: "rc.actor.session",
                consumer_id = %consumer_id,
                "Duplicate consumer id, releasing the new consumer"
            );
            handle.close();
            reply(
                respond_to,
                Err(ClientError::Internal(format!(
                    "duplicate consumer id {consumer_id}"
                ))),
            );
            return;
        }

        let (owner_peer_id, card) = match self.roster.attribute_consumer(&consumer_id, owner.as_ref())
        {
            Attribution::Peer { peer_id, card } => (Some(peer_id), Some(card)),
            Attribution::Fallback => {
                metrics::record_attribution_miss();
                info!(
                    target: "rc.actor.session",
                    consumer_id = %consumer_id,
                    owner = ?owner,
                    "Consumer owner not in roster, using fallback slot"
                );
                (None, None)
            }
        };

        let target = match kind {
            MediaKind::Audio => MediaTarget::AudioSink,
            MediaKind::Video => card.map_or(MediaTarget::FallbackVideo, MediaTarget::Card),
        };

        let entry = ConsumerEntry {
            handle,
            remote_producer_id: producer_id,
            owner_peer_id,
        };
        if let Err(entry) = self.consumers.insert(entry) {
            entry.handle.close();
            reply(
                respond_to,
                Err(ClientError::Internal(format!(
                    "duplicate consumer id {consumer_id}"
                ))),
            );
            return;
        }
        metrics::set_consumers_active(self.consumers.len());

        self.ctx.ui.apply(UiCommand::AttachMedia {
            target,
            source: MediaSource::Remote(consumer_id.clone()),
            kind,
        });
        debug!(
            target: "rc.actor.session",
            consumer_id = %consumer_id,
            kind = %kind,
            "Consumer attached"
        );
        reply(respond_to, Ok(consumer_id));
    }

    fn remove_consumer(&mut self, consumer_id: &ConsumerId) -> bool {
        let Some(entry) = self.consumers.remove(consumer_id) else {
            debug!(
                target: "rc.actor.session",
                consumer_id = %consumer_id,
                "Ignoring close for unknown consumer"
            );
            return false;
        };
        self.release_consumer(entry);
        metrics::set_consumers_active(self.consumers.len());
        true
    }

    fn release_consumer(&mut self, entry: ConsumerEntry) {
        let consumer_id = entry.id();
        debug!(
            target: "rc.actor.session",
            consumer_id = %consumer_id,
            producer_id = %entry.remote_producer_id,
            owner = ?entry.owner_peer_id,
            "Releasing consumer"
        );
        entry.handle.close();
        self.roster.detach_consumer(&consumer_id);
        self.ctx.ui.apply(UiCommand::DetachMedia {
            source: MediaSource::Remote(consumer_id),
        });
    }

    // ------------------------------------------------------------------
    // Moderation and participants
    // ------------------------------------------------------------------

    fn handle_moderate_audio(
        &mut self,
        target: PeerId,
        action: ModerationAction,
        respond_to: Reply<()>,
    ) {
        if let Err(e) = self.require_open("moderate_audio") {
            let _ = respond_to.send(Err(e));
            return;
        }
        if !self.roster.local().is_trainer {
            let _ = respond_to.send(Err(ClientError::PermissionDenied(
                "only trainers can moderate audio".to_string(),
            )));
            return;
        }
        let Some(record) = self.roster.get(&target) else {
            let _ = respond_to.send(Err(ClientError::PeerNotFound(target)));
            return;
        };
        if record.is_trainer {
            let _ = respond_to.send(Err(ClientError::PermissionDenied(
                "trainers cannot be moderated".to_string(),
            )));
            return;
        }

        info!(
            target: "rc.actor.session",
            peer_id = %target,
            action = ?action,
            "Moderating participant audio"
        );
        let signaling = self.ctx.signaling.clone();
        tokio::spawn(async move {
            let _ = respond_to.send(signaling.moderate_audio(&target, action).await);
        });
    }

    fn handle_room_participants(&mut self, respond_to: Reply<Vec<ParticipantSummary>>) {
        if let Err(e) = self.require_open("room_participants") {
            let _ = respond_to.send(Err(e));
            return;
        }

        let signaling = self.ctx.signaling.clone();
        let local_is_trainer = self.roster.local().is_trainer;
        let local_name = self.roster.local().name.clone();
        let local_ids = self.roster.local_peer_ids().clone();
        let seen: HashMap<PeerId, DateTime<Utc>> = self
            .roster
            .peers()
            .map(|record| (record.peer_id.clone(), record.seen_at))
            .collect();
        tokio::spawn(async move {
            let result = signaling.room_info().await.map(|snapshot| {
                snapshot
                    .peers
                    .into_iter()
                    .map(|peer| {
                        let is_local = if local_ids.is_empty() {
                            peer.name == local_name
                        } else {
                            local_ids.contains(&peer.peer_id)
                        };
                        ParticipantSummary {
                            can_moderate: local_is_trainer && !is_local && !peer.is_trainer,
                            seen_at: seen.get(&peer.peer_id).copied(),
                            peer_id: peer.peer_id,
                            name: peer.name,
                            is_trainer: peer.is_trainer,
                            has_audio: peer.has_audio,
                            has_video: peer.has_video,
                            is_local,
                        }
                    })
                    .collect()
            });
            let _ = respond_to.send(result);
        });
    }

    // ------------------------------------------------------------------
    // Signaling events
    // ------------------------------------------------------------------

    fn handle_frame(&mut self, frame: InboundFrame) {
        let event = match ServerEvent::from_frame(&frame) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(
                    target: "rc.actor.session",
                    event = %frame.event,
                    "Ignoring unknown signaling event"
                );
                return;
            }
            Err(e) => {
                warn!(
                    target: "rc.actor.session",
                    event = %frame.event,
                    error = %e,
                    "Dropping malformed signaling event"
                );
                return;
            }
        };

        if matches!(event, ServerEvent::Disconnect) {
            self.on_signaling_lost();
            return;
        }

        match self.state {
            SessionState::Open => self.handle_server_event(event),
            SessionState::Joining | SessionState::Negotiating
                if matches!(
                    event,
                    ServerEvent::PeerJoined(_) | ServerEvent::PeerLeft { .. }
                ) =>
            {
                self.deferred.push(event);
            }
            _ => debug!(
                target: "rc.actor.session",
                event = event.name(),
                state = %self.state,
                "Ignoring event outside open session"
            ),
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::NewProducers(producers) => {
                for producer in producers {
                    self.handle_consume(producer.producer_id, producer.producer_socket_id, None);
                }
            }
            ServerEvent::ConsumerClosed { consumer_id } => {
                self.remove_consumer(&consumer_id);
            }
            ServerEvent::PeerJoined(joined) => {
                if let Some(card) = self.roster.on_peer_joined(&joined) {
                    info!(
                        target: "rc.actor.session",
                        peer_id = ?card.peer_id,
                        "Peer joined"
                    );
                    self.presentation.add_card(card.card_id);
                    self.ctx.ui.apply(UiCommand::CreateCard(card));
                    metrics::set_roster_peers(self.roster.len());
                    if self.state.is_open() {
                        self.relayout();
                    }
                }
            }
            ServerEvent::PeerLeft { peer_id } => {
                if let Some(departed) = self.roster.on_peer_left(&peer_id) {
                    for consumer_id in &departed.orphaned {
                        self.consumers.clear_owner(consumer_id);
                    }
                    self.presentation.remove_card(departed.card);
                    self.ctx.ui.apply(UiCommand::RemoveCard(departed.card));
                    metrics::set_roster_peers(self.roster.len());
                    if self.state.is_open() {
                        self.relayout();
                    }
                }
            }
            ServerEvent::ForceMute { by } => {
                let by = by.unwrap_or_else(|| DEFAULT_MODERATOR.to_string());
                info!(target: "rc.actor.session", "Microphone muted by moderator");
                self.close_producer(MediaKind::Audio, true);
                self.ctx
                    .ui
                    .apply(UiCommand::Notify(format!("{by} muted your microphone")));
                self.emit(SessionEvent::ForceMuted { by });
            }
            ServerEvent::RequestUnmute { by } => {
                let by = by.unwrap_or_else(|| DEFAULT_MODERATOR.to_string());
                self.ctx.ui.apply(UiCommand::Notify(format!(
                    "{by} asked you to unmute your microphone"
                )));
                self.emit(SessionEvent::UnmuteRequested { by });
            }
            ServerEvent::Disconnect => self.on_signaling_lost(),
        }
    }

    /// Socket gone: forced exit without `exitRoom`.
    fn on_signaling_lost(&mut self) {
        match self.state {
            SessionState::Idle | SessionState::Closed => {
                debug!(target: "rc.actor.session", state = %self.state, "Signaling lost");
                self.inbound = None;
            }
            _ => {
                info!(
                    target: "rc.actor.session",
                    room_id = %self.room_id,
                    "Signaling disconnected, forcing exit"
                );
                self.handle_exit(None, true);
            }
        }
    }

    // ------------------------------------------------------------------
    // Media engine events
    // ------------------------------------------------------------------

    fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::TransportStateChanged {
                transport_id,
                direction,
                state,
            } => {
                debug!(
                    target: "rc.actor.session",
                    transport_id = %transport_id,
                    direction = %direction,
                    state = ?state,
                    "Transport state changed"
                );
                if state == ConnectionState::Failed {
                    self.on_transport_failed(&transport_id, direction);
                }
            }
            MediaEvent::ProducerTrackEnded { producer_id } => {
                if let Some(kind) = self.producers.kind_of(&producer_id) {
                    info!(
                        target: "rc.actor.session",
                        producer_id = %producer_id,
                        "Capture track ended"
                    );
                    self.close_producer(kind, true);
                }
            }
            MediaEvent::ProducerTransportClosed { producer_id }
            | MediaEvent::ProducerClosed { producer_id } => {
                if let Some(kind) = self.producers.kind_of(&producer_id) {
                    self.close_producer(kind, false);
                }
            }
            MediaEvent::ConsumerTrackEnded { consumer_id }
            | MediaEvent::ConsumerTransportClosed { consumer_id } => {
                self.remove_consumer(&consumer_id);
            }
        }
    }

    fn on_transport_failed(&mut self, transport_id: &TransportId, direction: TransportDirection) {
        let current = match direction {
            TransportDirection::Send => self.send_transport.as_ref().map(|t| t.id()),
            TransportDirection::Recv => self.recv_transport.as_ref().map(|t| t.id()),
        };
        if current.as_ref() != Some(transport_id) {
            debug!(
                target: "rc.actor.session",
                transport_id = %transport_id,
                "Failure reported for a transport no longer in use"
            );
            return;
        }

        warn!(
            target: "rc.actor.session",
            transport_id = %transport_id,
            direction = %direction,
            "Transport failed, closing it"
        );
        metrics::record_transport_failure(direction);

        match direction {
            TransportDirection::Send => {
                for kind in MediaKind::ALL {
                    self.close_producer(kind, false);
                }
                if let Some(transport) = self.send_transport.take() {
                    transport.close();
                }
            }
            TransportDirection::Recv => {
                for entry in self.consumers.drain() {
                    self.release_consumer(entry);
                }
                metrics::set_consumers_active(0);
                if let Some(transport) = self.recv_transport.take() {
                    transport.close();
                }
            }
        }
        self.emit(SessionEvent::TransportFailed { direction });
    }

    // ------------------------------------------------------------------
    // Exit
    // ------------------------------------------------------------------

    fn handle_exit(&mut self, respond_to: Option<Reply<()>>, already_disconnected: bool) {
        match self.state {
            SessionState::Closed => {
                self.release_resources();
                self.clear_room();
                reply(respond_to, Ok(()));
            }
            SessionState::Exiting => {
                self.exit_waiters.extend(respond_to);
                if already_disconnected {
                    self.finish_exit();
                }
            }
            SessionState::Idle => {
                self.transition(SessionState::Closed);
                self.inbound = None;
                reply(respond_to, Ok(()));
            }
            SessionState::Joining | SessionState::Negotiating => {
                info!(target: "rc.actor.session", "Exit requested during join, aborting");
                if !already_disconnected {
                    self.send_exit_room_detached();
                }
                self.deferred.clear();
                self.transition(SessionState::Closed);
                self.release_resources();
                self.clear_room();
                self.inbound = None;
                self.emit(SessionEvent::ExitRoom);
                reply(respond_to, Ok(()));
            }
            SessionState::Open => {
                self.transition(SessionState::Exiting);
                self.exit_waiters.extend(respond_to);
                if already_disconnected {
                    self.finish_exit();
                    return;
                }
                let signaling = self.ctx.signaling.clone();
                let started = self.spawn_completion(async move {
                    SessionMessage::ExitRequestFinished {
                        result: signaling.exit_room().await,
                    }
                });
                if !started {
                    self.finish_exit();
                }
            }
        }
    }

    fn send_exit_room_detached(&self) {
        let signaling = self.ctx.signaling.clone();
        tokio::spawn(async move {
            if let Err(e) = signaling.exit_room().await {
                debug!(target: "rc.actor.session", error = %e, "exitRoom after aborted join failed");
            }
        });
    }

    fn finish_exit(&mut self) {
        if self.state != SessionState::Exiting {
            return;
        }
        self.release_resources();
        self.clear_room();
        self.inbound = None;
        self.transition(SessionState::Closed);
        self.emit(SessionEvent::ExitRoom);
        for waiter in self.exit_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        info!(target: "rc.actor.session", room_id = %self.room_id, "Session closed");
    }

    /// Close every producer, consumer and transport. Idempotent.
    fn release_resources(&mut self) {
        for entry in self.producers.drain() {
            let producer_id = entry.id();
            let kind = entry.kind();
            entry.release();
            if kind == MediaKind::Video {
                self.ctx.ui.apply(UiCommand::DetachMedia {
                    source: MediaSource::Local(producer_id),
                });
            }
        }
        for entry in self.consumers.drain() {
            self.release_consumer(entry);
        }
        if let Some(transport) = self.send_transport.take() {
            transport.close();
        }
        if let Some(transport) = self.recv_transport.take() {
            transport.close();
        }
        self.device = None;
        metrics::set_producers_active(0);
        metrics::set_consumers_active(0);
    }

    /// Remove every card from the UI and forget the roster.
    fn clear_room(&mut self) {
        let remote = self.roster.clear();
        let shown = self.presentation.clear();
        if shown.is_empty() && remote.is_empty() {
            return;
        }
        debug!(
            target: "rc.actor.session",
            cards = shown.len(),
            peers = remote.len(),
            "Clearing room presentation"
        );
        // Every remote card is also presented; the roster list only fills gaps.
        let stray: Vec<CardId> = remote.into_iter().filter(|c| !shown.contains(c)).collect();
        for card in shown.into_iter().chain(stray) {
            self.ctx.ui.apply(UiCommand::RemoveCard(card));
        }
        metrics::set_roster_peers(0);
        self.relayout();
    }

    /// Local teardown on cancellation or when every handle is dropped.
    fn shutdown(&mut self) {
        if self.state != SessionState::Closed {
            self.release_resources();
            self.clear_room();
            self.inbound = None;
            self.transition(SessionState::Closed);
        }
        for waiter in self.exit_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }
}

/// Join handshake: join, capabilities, device, both transports, roster.
///
/// Resources are recorded in `outcome` as soon as they exist so that a
/// failure at a later step still hands them to the actor.
async fn negotiate(
    ctx: &SessionContext,
    profile: &LocalProfile,
    events: MediaEventSender,
    mailbox: &mpsc::Sender<SessionMessage>,
    outcome: &mut JoinOutcome,
) -> Result<RoomSnapshot, ClientError> {
    let room_id = &ctx.config.room_id;
    ctx.signaling
        .join(&JoinRequest {
            name: &profile.name,
            room_id,
            avatar: profile.avatar.as_deref(),
            is_trainer: profile.is_trainer,
        })
        .await
        .map_err(|e| ClientError::negotiation("join", e))?;
    let _ = mailbox
        .send(SessionMessage::JoinStage {
            stage: SessionState::Negotiating,
        })
        .await;

    let router_capabilities = ctx
        .signaling
        .router_rtp_capabilities()
        .await
        .map_err(|e| ClientError::negotiation("getRouterRtpCapabilities", e))?;
    let device = ctx
        .media
        .load_device(router_capabilities, events)
        .await
        .map_err(|e| ClientError::negotiation("loadDevice", e))?;
    outcome.device = Some(device.clone());

    let force_tcp = ctx.config.force_tcp;
    let send_options = ctx
        .signaling
        .create_webrtc_transport(force_tcp, Some(device.rtp_capabilities()))
        .await
        .map_err(|e| ClientError::negotiation("createWebRtcTransport", e))?;
    let send_transport = device
        .create_send_transport(
            send_options,
            Arc::new(SignalingBridge::new(
                ctx.signaling.clone(),
                TransportDirection::Send,
            )),
        )
        .map_err(|e| ClientError::negotiation("createSendTransport", e))?;
    outcome.send_transport = Some(send_transport);

    let recv_options = ctx
        .signaling
        .create_webrtc_transport(force_tcp, None)
        .await
        .map_err(|e| ClientError::negotiation("createWebRtcTransport", e))?;
    let recv_transport = device
        .create_recv_transport(
            recv_options,
            Arc::new(SignalingBridge::new(
                ctx.signaling.clone(),
                TransportDirection::Recv,
            )),
        )
        .map_err(|e| ClientError::negotiation("createRecvTransport", e))?;
    outcome.recv_transport = Some(recv_transport);

    ctx.signaling
        .room_info()
        .await
        .map_err(|e| ClientError::negotiation("getMyRoomInfo", e))
}

fn release_join_outcome(outcome: JoinOutcome) {
    if let Some(transport) = outcome.send_transport {
        transport.close();
    }
    if let Some(transport) = outcome.recv_transport {
        transport.close();
    }
}

fn reply<T>(respond_to: Option<Reply<T>>, result: Result<T, ClientError>) {
    if let Some(tx) = respond_to {
        let _ = tx.send(result);
    }
}

async fn next_frame(
    inbound: &mut Option<mpsc::UnboundedReceiver<InboundFrame>>,
) -> Option<InboundFrame> {
    match inbound {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}
