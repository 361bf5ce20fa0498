//! The failover controller.
//!
//! [`PlayerActor`] owns the playback session and is the only place that decides when
//! to switch sources. It runs as a single task: mailbox messages, native pipeline
//! events, background task results and timer deadlines are handled one at a time, so
//! no two decisions ever interleave.

mod handle;
mod messages;
mod snapshot;
mod timers;

use std::future;
use std::sync::Arc;

use stream_sources::{
    ContentDetails, ContentKey, MetadataSource, SourceError, SourceKind, SourceResolver,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub use handle::PlayerHandle;
pub use messages::PlayerMessage;
pub use snapshot::PlayerSnapshot;
pub use timers::{TimerKind, Timers};

use messages::TaskEvent;

use crate::config::PlayerConfig;
use crate::embed::{BridgeSignal, EmbedBridge, EmbedSurface};
use crate::error::{FailureClass, PlaybackError, PlayerError, PlayerErrorKind, Result, SourceFailure};
use crate::gesture::GestureWindow;
use crate::history::{SnapshotHint, WatchHistory};
use crate::native::{
    AttachmentId, EngineSignal, NativeEngine, NativeEngineConfig, NativeEvent, PipelineFactory,
    SegmentWarmer,
};
use crate::progress::{PositionSource, ProgressSample, ProgressTracker};
use crate::session::{PlaybackSession, PlayerState};

/// Outcome of a player run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorOutcome {
    /// Closed through the handle, or every handle was dropped.
    Stopped,
    /// The cancellation token fired.
    Cancelled,
}

/// What to play.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub key: ContentKey,
    /// Where to start, in seconds.
    pub initial_resume_time: Option<f64>,
}

/// Collaborators of a player.
pub struct PlayerDeps {
    pub resolver: Arc<SourceResolver>,
    pub metadata: Option<Arc<dyn MetadataSource>>,
    pub pipelines: Arc<dyn PipelineFactory>,
    pub surface: Box<dyn EmbedSurface>,
    pub history: Arc<dyn WatchHistory>,
    pub warmer: Option<Arc<dyn SegmentWarmer>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Attachment {
    index: usize,
    kind: SourceKind,
    id: AttachmentId,
}

pub struct PlayerActor {
    config: Arc<PlayerConfig>,
    session: PlaybackSession,
    resolver: Arc<SourceResolver>,
    metadata: Option<Arc<dyn MetadataSource>>,
    details: Option<ContentDetails>,
    engine: NativeEngine,
    bridge: EmbedBridge,
    tracker: ProgressTracker,
    attachment: Option<Attachment>,
    next_attachment: AttachmentId,
    timers: Timers,
    mailbox: mpsc::Receiver<PlayerMessage>,
    native_events: mpsc::UnboundedReceiver<(AttachmentId, NativeEvent)>,
    task_tx: mpsc::UnboundedSender<TaskEvent>,
    task_events: mpsc::UnboundedReceiver<TaskEvent>,
    tasks: Vec<JoinHandle<()>>,
    snapshots: watch::Sender<PlayerSnapshot>,
    generation: u64,
    task_token: CancellationToken,
    cancellation_token: CancellationToken,
    closed: bool,
}

/// Spawn a player on the current runtime.
pub fn spawn_player(
    request: PlayRequest,
    deps: PlayerDeps,
    config: Arc<PlayerConfig>,
    cancellation_token: CancellationToken,
) -> (PlayerHandle, JoinHandle<ActorOutcome>) {
    let (actor, handle) = PlayerActor::new(request, deps, config, cancellation_token);
    (handle, tokio::spawn(actor.run()))
}

impl PlayerActor {
    pub fn new(
        request: PlayRequest,
        deps: PlayerDeps,
        config: Arc<PlayerConfig>,
        cancellation_token: CancellationToken,
    ) -> (Self, PlayerHandle) {
        let (sender, mailbox) = mpsc::channel(config.mailbox_capacity.max(1));
        let (native_tx, native_events) = mpsc::unbounded_channel();
        let (task_tx, task_events) = mpsc::unbounded_channel();

        let session = PlaybackSession::new(request.key, request.initial_resume_time);
        let initial = PlayerSnapshot::initial(
            session.key.clone(),
            session.position,
            config.default_duration(session.key.media_type()),
        );
        let (snapshots, snapshot_rx) = watch::channel(initial);

        let engine = NativeEngine::new(
            deps.pipelines,
            native_tx,
            deps.warmer,
            NativeEngineConfig {
                stall_threshold: config.stall_recovery_threshold,
                prefetch: config.prefetch.clone(),
                gesture_window: GestureWindow::new(config.gesture_window()),
            },
            cancellation_token.child_token(),
        );
        let bridge = EmbedBridge::new(deps.surface, config.embed_load_timeout());
        let tracker = ProgressTracker::new(deps.history, config.clone());
        let handle = PlayerHandle::new(sender, snapshot_rx, cancellation_token.clone());

        let actor = Self {
            config,
            session,
            resolver: deps.resolver,
            metadata: deps.metadata,
            details: None,
            engine,
            bridge,
            tracker,
            attachment: None,
            next_attachment: 0,
            timers: Timers::default(),
            mailbox,
            native_events,
            task_tx,
            task_events,
            tasks: Vec::new(),
            snapshots,
            generation: 0,
            task_token: cancellation_token.child_token(),
            cancellation_token,
            closed: false,
        };
        (actor, handle)
    }

    /// Run until closed, cancelled or every handle is dropped.
    pub async fn run(mut self) -> ActorOutcome {
        info!(key = %self.session.key, "Player starting");
        self.start_resolution();
        self.publish();

        let outcome = loop {
            let deadline = self.timers.next_deadline();

            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    info!(key = %self.session.key, "Player cancelled");
                    self.close();
                    break ActorOutcome::Cancelled;
                }

                msg = self.mailbox.recv() => match msg {
                    Some(msg) => {
                        if self.handle_message(msg) {
                            break ActorOutcome::Stopped;
                        }
                    }
                    None => {
                        debug!(key = %self.session.key, "All player handles dropped");
                        self.close();
                        break ActorOutcome::Stopped;
                    }
                },

                Some((id, event)) = self.native_events.recv() => {
                    self.handle_native_event(id, event);
                }

                Some(event) = self.task_events.recv() => {
                    self.handle_task_event(event);
                }

                _ = Self::sleep_until(deadline) => {
                    self.fire_timers();
                }
            }

            self.publish();
        };

        self.publish();
        info!(key = %self.session.key, outcome = ?outcome, "Player stopped");
        outcome
    }

    async fn sleep_until(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => future::pending().await,
        }
    }

    /// Returns `true` when the actor should stop.
    fn handle_message(&mut self, msg: PlayerMessage) -> bool {
        trace!(message = msg.name(), "Handling player message");
        let now = Instant::now();

        match msg {
            PlayerMessage::SwitchSource { index, reply } => {
                let _ = reply.send(self.manual_switch(index, now));
            }
            PlayerMessage::NextEpisode => self.next_episode(now),
            PlayerMessage::Retry => self.retry(now),
            PlayerMessage::SelectAudioTrack { id, reply } => {
                let result = self
                    .require_native()
                    .and_then(|()| self.engine.select_audio_track(id));
                let _ = reply.send(result);
            }
            PlayerMessage::SelectQuality { level, reply } => {
                let result = self
                    .require_native()
                    .and_then(|()| self.engine.select_level(level));
                let _ = reply.send(result);
            }
            PlayerMessage::PictureInPicture { gesture_at, reply } => {
                let result = self
                    .require_native()
                    .and_then(|()| self.engine.request_picture_in_picture(gesture_at, now));
                let _ = reply.send(result);
            }
            PlayerMessage::Fullscreen { gesture_at, reply } => {
                let result = self
                    .require_native()
                    .and_then(|()| self.engine.request_fullscreen(gesture_at, now));
                let _ = reply.send(result);
            }
            PlayerMessage::UserInteraction => {
                if self.embed_attached()
                    && let Some(signal) = self.bridge.on_interaction(now)
                {
                    self.handle_bridge_signal(signal, now);
                }
            }
            PlayerMessage::EmbedLoaded => {
                if self.embed_attached()
                    && let Some(signal) = self.bridge.on_loaded(now)
                {
                    self.handle_bridge_signal(signal, now);
                }
            }
            PlayerMessage::EmbedLoadFailed(reason) => {
                if self.embed_attached()
                    && let Some(signal) = self.bridge.on_load_error(&reason)
                {
                    self.handle_bridge_signal(signal, now);
                }
            }
            PlayerMessage::EmbedMessage { origin, payload } => {
                if self.embed_attached() {
                    let signals =
                        self.bridge
                            .on_message(&origin, &payload, &self.session.key, now);
                    for signal in signals {
                        self.handle_bridge_signal(signal, now);
                    }
                }
            }
            PlayerMessage::GetSnapshot(reply) => {
                let _ = reply.send(self.build_snapshot());
            }
            PlayerMessage::Close(reply) => {
                let sample = self.close();
                let _ = reply.send(sample);
                return true;
            }
        }
        false
    }

    fn require_native(&self) -> Result<()> {
        match self.attachment {
            Some(a) if a.kind == SourceKind::Native => Ok(()),
            _ => Err(PlaybackError::NotNative),
        }
    }

    fn embed_attached(&self) -> bool {
        self.attachment.is_some_and(|a| a.kind == SourceKind::Embed)
    }

    fn next_attachment_id(&mut self) -> AttachmentId {
        self.next_attachment += 1;
        self.next_attachment
    }

    // ---- resolution -------------------------------------------------------

    fn start_resolution(&mut self) {
        self.generation += 1;
        self.task_token.cancel();
        self.task_token = self.cancellation_token.child_token();
        self.tasks.retain(|t| !t.is_finished());

        let generation = self.generation;
        let key = self.session.key.clone();
        let resolver = self.resolver.clone();
        let token = self.task_token.clone();
        let tx = self.task_tx.clone();
        debug!(key = %key, generation, "Resolving sources");

        self.tasks.push(tokio::spawn(async move {
            let result = resolver.resolve(&key, &token).await;
            let _ = tx.send(TaskEvent::Resolved { generation, result });
        }));

        if self.details.is_none()
            && let Some(metadata) = self.metadata.clone()
        {
            let content = self.session.key.content.clone();
            let token = self.task_token.clone();
            let tx = self.task_tx.clone();
            self.tasks.push(tokio::spawn(async move {
                let result = tokio::select! {
                    _ = token.cancelled() => Err(SourceError::Cancelled),
                    result = metadata.content_details(&content) => result,
                };
                let _ = tx.send(TaskEvent::Details { content, result });
            }));
        }
    }

    fn handle_task_event(&mut self, event: TaskEvent) {
        let now = Instant::now();
        match event {
            TaskEvent::Resolved { generation, result } => {
                if generation != self.generation || self.closed {
                    debug!(generation, current = self.generation, "Dropping stale resolution");
                    return;
                }
                match result {
                    Ok(sources) => {
                        info!(
                            key = %self.session.key,
                            count = sources.len(),
                            native = sources.has_native(),
                            "Sources resolved"
                        );
                        self.session.sources = Some(sources);
                        self.activate(0, now);
                    }
                    Err(SourceError::Cancelled) => {
                        debug!(key = %self.session.key, "Resolution cancelled");
                    }
                    Err(e) => {
                        warn!(key = %self.session.key, error = %e, "No playable sources");
                        self.enter_terminal_error(PlayerError::unavailable(e.to_string()), now);
                    }
                }
            }
            TaskEvent::Details { content, result } => match result {
                Ok(details) if content == self.session.key.content => {
                    self.session.metadata_runtime = details.runtime_secs(&self.session.key);
                    debug!(
                        key = %self.session.key,
                        runtime = ?self.session.metadata_runtime,
                        "Content details loaded"
                    );
                    self.details = Some(details);
                }
                Ok(_) => {}
                Err(SourceError::Cancelled) => {}
                Err(e) => warn!(content = %content.storage_key(), error = %e, "Content details unavailable"),
            },
        }
    }

    // ---- attachment -------------------------------------------------------

    /// Attach source `index`. Whatever was attached is torn down first.
    fn activate(&mut self, index: usize, now: Instant) {
        let Some(source) = self
            .session
            .sources
            .as_ref()
            .and_then(|s| s.get(index))
            .cloned()
        else {
            return;
        };

        self.detach();
        self.session.active_index = index;
        self.session.begin_source();
        self.session.transition(PlayerState::Loading);

        let id = self.next_attachment_id();
        let resume_at = self.session.position;
        self.attachment = Some(Attachment {
            index,
            kind: source.kind,
            id,
        });

        match source.kind {
            SourceKind::Native => {
                if let Err(failure) = self.engine.attach(id, &source.url, resume_at) {
                    self.handle_failure(failure, now);
                }
            }
            SourceKind::Embed => {
                self.bridge.render(id, &source.url, resume_at);
                self.timers
                    .arm(TimerKind::EmbedLoad, self.config.embed_load_timeout(), now);
                self.timers
                    .arm(TimerKind::EmbedReport, self.config.embed_report_interval(), now);
            }
        }
    }

    fn detach(&mut self) {
        if let Some(attachment) = self.attachment.take() {
            match attachment.kind {
                SourceKind::Native => self.engine.teardown(),
                SourceKind::Embed => self.bridge.unload(),
            }
        }
        self.timers.clear_all();
    }

    fn manual_switch(&mut self, index: usize, now: Instant) -> Result<()> {
        let len = self.session.source_count();
        if index >= len {
            return Err(PlaybackError::InvalidSourceIndex { index, len });
        }

        let healthy = matches!(
            self.session.state,
            PlayerState::Loading | PlayerState::Playing
        );
        if healthy && self.attachment.is_some_and(|a| a.index == index) {
            debug!(index, "Source already active");
            return Ok(());
        }

        info!(key = %self.session.key, from = self.session.active_index, to = index, "Manual source switch");
        self.switch_to(index, now);
        Ok(())
    }

    fn switch_to(&mut self, index: usize, now: Instant) {
        let sample = self.sample(now);
        self.session.observe_position(sample.position);
        self.session.transition(PlayerState::Switching);
        self.session.switch_count += 1;

        if index >= self.session.source_count() {
            let count = self.session.source_count();
            self.enter_terminal_error(PlayerError::exhausted(count), now);
            return;
        }

        debug!(
            key = %self.session.key,
            to = index,
            position = self.session.position,
            "Switching source"
        );
        self.activate(index, now);
    }

    // ---- events -----------------------------------------------------------

    fn handle_native_event(&mut self, id: AttachmentId, event: NativeEvent) {
        let current = self
            .attachment
            .is_some_and(|a| a.kind == SourceKind::Native && a.id == id);
        if !current {
            trace!(attachment = id, "Dropping event for detached pipeline");
            return;
        }

        let now = Instant::now();
        if let Some(signal) = self.engine.handle_event(id, event, now) {
            self.handle_engine_signal(signal, now);
        }
    }

    fn handle_engine_signal(&mut self, signal: EngineSignal, now: Instant) {
        match signal {
            EngineSignal::Ready => self.mark_live(),
            EngineSignal::Progress { position, duration } => {
                if self.engine.live_position(now).is_some() {
                    self.session.observe_progress(position);
                }
                if duration.is_some() {
                    self.session.engine_duration = duration;
                }
                if self.session.state == PlayerState::Loading && position > 0.0 {
                    self.mark_live();
                }
                if self.session.state == PlayerState::Playing {
                    let sample = self.sample(now);
                    self.tracker.report_periodic(
                        &self.session.key,
                        &sample,
                        self.config.native_report_interval(),
                        now,
                    );
                }
            }
            EngineSignal::Ended => {
                let sample = self.sample(now);
                self.tracker.report(&self.session.key, &sample, None, now);
                info!(key = %self.session.key, "Playback ended");
            }
            EngineSignal::StallRecovery => {
                self.timers
                    .arm(TimerKind::StallVerify, self.config.stall_verify_window(), now);
            }
            EngineSignal::Failure(failure) => self.handle_failure(failure, now),
            EngineSignal::TracksChanged | EngineSignal::Playing | EngineSignal::Paused => {}
        }
    }

    fn handle_bridge_signal(&mut self, signal: BridgeSignal, now: Instant) {
        match signal {
            BridgeSignal::Live => {
                self.timers.cancel(TimerKind::EmbedLoad);
                let timed_out = self
                    .session
                    .error
                    .as_ref()
                    .is_some_and(|e| e.kind == PlayerErrorKind::EmbedTimeout);
                if self.session.state == PlayerState::Error && timed_out {
                    info!(key = %self.session.key, "Embed came alive after timing out");
                    self.bridge.revive();
                    self.session.has_live_signal = true;
                    self.session.transition(PlayerState::Playing);
                    if !self.timers.is_armed(TimerKind::EmbedReport) {
                        self.timers
                            .arm(TimerKind::EmbedReport, self.config.embed_report_interval(), now);
                    }
                } else {
                    self.mark_live();
                }
            }
            BridgeSignal::Progress { position, duration } => {
                self.session.observe_progress(position);
                if duration.is_some() {
                    self.session.engine_duration = duration;
                }
            }
            BridgeSignal::Failure(failure) => self.handle_failure(failure, now),
        }
    }

    fn mark_live(&mut self) {
        self.session.has_live_signal = true;
        if self.session.state == PlayerState::Loading {
            self.session.transition(PlayerState::Playing);
        }
    }

    fn handle_failure(&mut self, failure: SourceFailure, now: Instant) {
        match failure.class() {
            FailureClass::AutoSwitch => {
                self.session.failed_native = true;
                if self.timers.is_armed(TimerKind::AutoSwitch) {
                    debug!(key = %self.session.key, "Automatic switch already pending");
                    return;
                }
                if !matches!(
                    self.session.state,
                    PlayerState::Loading | PlayerState::Playing
                ) {
                    debug!(state = %self.session.state, "Ignoring switchable failure");
                    return;
                }
                if self.session.has_next_source() {
                    info!(
                        key = %self.session.key,
                        failure = %failure,
                        delay = ?self.config.auto_switch_delay(),
                        "Scheduling automatic source switch"
                    );
                    self.session.transition(PlayerState::Switching);
                    self.timers
                        .arm(TimerKind::AutoSwitch, self.config.auto_switch_delay(), now);
                } else {
                    let count = self.session.source_count();
                    self.enter_terminal_error(PlayerError::exhausted(count), now);
                }
            }
            FailureClass::Manual => {
                warn!(key = %self.session.key, failure = %failure, "Source failed");
                self.timers.cancel(TimerKind::EmbedLoad);
                self.timers.cancel(TimerKind::StallVerify);
                let count = self.session.source_count();
                self.session.fail(PlayerError::from_failure(&failure, count));
            }
        }
    }

    fn fire_timers(&mut self) {
        let now = Instant::now();
        for kind in self.timers.take_due(now) {
            trace!(timer = ?kind, "Timer fired");
            match kind {
                TimerKind::AutoSwitch => {
                    let native = self
                        .attachment
                        .is_some_and(|a| a.kind == SourceKind::Native);
                    if self.session.state == PlayerState::Switching
                        && self.session.failed_native
                        && native
                    {
                        let next = self.session.active_index + 1;
                        self.switch_to(next, now);
                    }
                }
                TimerKind::EmbedLoad => {
                    if self.embed_attached()
                        && let Some(failure) = self.bridge.check_load_timeout()
                    {
                        self.handle_failure(failure, now);
                    }
                }
                TimerKind::EmbedReport => {
                    if self.embed_attached() {
                        if self.session.state == PlayerState::Playing {
                            let sample = self.sample(now);
                            self.tracker.report_periodic(
                                &self.session.key,
                                &sample,
                                std::time::Duration::ZERO,
                                now,
                            );
                        }
                        self.timers
                            .arm(TimerKind::EmbedReport, self.config.embed_report_interval(), now);
                    }
                }
                TimerKind::StallVerify => {
                    if self.attachment.is_some_and(|a| a.kind == SourceKind::Native)
                        && let Some(failure) = self.engine.verify_stall_recovery(now)
                    {
                        self.handle_failure(failure, now);
                    }
                }
            }
        }
    }

    // ---- session-level operations ----------------------------------------

    fn next_episode(&mut self, now: Instant) {
        let key = self.session.key.clone();
        let (Some(season), Some(episode)) = (key.season, key.episode) else {
            warn!(key = %key, "Next episode requested for a movie");
            return;
        };

        let next = match &self.details {
            Some(details) => details.next_episode(season, episode),
            None => Some((season, episode + 1)),
        };
        let Some((next_season, next_episode)) = next else {
            info!(key = %key, "Already at the last episode");
            return;
        };

        let sample = self.sample(now);
        self.tracker.report(&key, &sample, None, now);
        self.detach();

        let next_key = key.with_episode(next_season, next_episode);
        info!(from = %key, to = %next_key, "Advancing to next episode");
        self.session.rekey(next_key);
        self.session.metadata_runtime = self
            .details
            .as_ref()
            .and_then(|d| d.runtime_secs(&self.session.key));
        self.start_resolution();
    }

    fn retry(&mut self, now: Instant) {
        let sample = self.sample(now);
        self.session.observe_position(sample.position);
        info!(key = %self.session.key, position = self.session.position, "Retrying playback");

        self.detach();
        self.session.sources = None;
        self.session.active_index = 0;
        self.session.reset_source_flags();
        self.session.transition(PlayerState::Idle);
        self.start_resolution();
    }

    /// Report, release the source and surface an error no switch can fix.
    fn enter_terminal_error(&mut self, error: PlayerError, now: Instant) {
        let sample = self.sample(now);
        let snapshot = self.capture_snapshot();
        self.tracker
            .report(&self.session.key, &sample, snapshot, now);
        self.detach();
        warn!(key = %self.session.key, error = %error.message, "Playback failed");
        self.session.fail(error);
    }

    /// Final report and teardown. Idempotent.
    fn close(&mut self) -> ProgressSample {
        let now = Instant::now();
        let sample = self.sample(now);
        if self.closed {
            return sample;
        }
        self.closed = true;

        let snapshot = self.capture_snapshot();
        self.tracker
            .report(&self.session.key, &sample, snapshot, now);

        self.detach();
        self.task_token.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.session.transition(PlayerState::Idle);
        info!(key = %self.session.key, position = sample.position, "Player closed");
        sample
    }

    // ---- observation ------------------------------------------------------

    fn capture_snapshot(&self) -> Option<SnapshotHint> {
        match self.attachment {
            Some(a) if a.kind == SourceKind::Native => self.engine.capture_snapshot(),
            _ => None,
        }
    }

    fn active_source(&self) -> Option<&dyn PositionSource> {
        match self.attachment.map(|a| a.kind) {
            Some(SourceKind::Native) => Some(&self.engine),
            Some(SourceKind::Embed) => Some(&self.bridge),
            None => None,
        }
    }

    fn sample(&self, now: Instant) -> ProgressSample {
        let mut sample = self.tracker.sample(self.active_source(), &self.session, now);
        sample.position = self.session.floored(sample.position);
        sample
    }

    fn build_snapshot(&self) -> PlayerSnapshot {
        let sample = self.sample(Instant::now());
        let kind = self.attachment.map(|a| a.kind);
        let native = kind == Some(SourceKind::Native);

        PlayerSnapshot {
            key: self.session.key.clone(),
            state: self.session.state,
            sources: self
                .session
                .sources
                .as_ref()
                .map(|s| s.as_slice().to_vec())
                .unwrap_or_default(),
            active_index: self.session.active_index,
            active_kind: kind,
            active_url: match kind {
                Some(SourceKind::Native) => self.engine.url().map(str::to_string),
                Some(SourceKind::Embed) => self.bridge.rendered_url().map(str::to_string),
                None => None,
            },
            is_playing: self.session.state == PlayerState::Playing
                && (!native || self.engine.is_playing()),
            error: self.session.error.clone(),
            position: sample.position,
            duration: sample.duration,
            buffer_ahead: if native { self.engine.buffer_ahead() } else { None },
            audio_tracks: if native {
                self.engine.audio_tracks().to_vec()
            } else {
                Vec::new()
            },
            selected_audio_track: if native {
                self.engine.selected_audio_track()
            } else {
                None
            },
            quality_levels: if native {
                self.engine.quality_levels().to_vec()
            } else {
                Vec::new()
            },
            selected_quality: if native { self.engine.selected_level() } else { None },
            has_live_signal: self.session.has_live_signal,
            switch_count: self.session.switch_count,
            closed: self.closed,
        }
    }

    fn publish(&self) {
        let snapshot = self.build_snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use stream_sources::{ResolvedSources, ResolverConfig, Source, StreamBackend};

    use super::*;
    use crate::history::{MemoryStore, StoreWatchHistory};
    use crate::native::{LoadRequest, MediaPipeline, NativeEventSender, PipelineError};

    struct NoBackend;

    #[async_trait]
    impl StreamBackend for NoBackend {
        async fn fetch_stream(&self, endpoint: &str) -> stream_sources::Result<String> {
            Err(SourceError::unavailable(format!("no stream at {endpoint}")))
        }
    }

    /// A pipeline whose manifest is never found.
    struct MissingManifest;

    impl MediaPipeline for MissingManifest {
        fn load(&mut self, _request: &LoadRequest) -> std::result::Result<(), PipelineError> {
            Err(PipelineError::manifest_load(Some(404), "manifest not found"))
        }

        fn start_load(&mut self, _position: Option<f64>) -> std::result::Result<(), PipelineError> {
            Ok(())
        }

        fn stop_load(&mut self) {}

        fn detach_media(&mut self) {}

        fn destroy(&mut self) {}

        fn current_time(&self) -> f64 {
            0.0
        }

        fn buffered_end(&self) -> f64 {
            0.0
        }

        fn duration(&self) -> Option<f64> {
            None
        }

        fn set_audio_track(&mut self, _id: u32) -> std::result::Result<(), PipelineError> {
            Ok(())
        }

        fn set_level(&mut self, _level: Option<usize>) -> std::result::Result<(), PipelineError> {
            Ok(())
        }
    }

    struct MissingManifests;

    impl PipelineFactory for MissingManifests {
        fn create(&self, _events: NativeEventSender) -> Box<dyn MediaPipeline> {
            Box::new(MissingManifest)
        }
    }

    struct Frames(Arc<Mutex<Vec<String>>>);

    impl EmbedSurface for Frames {
        fn render(&mut self, url: &str) {
            self.0.lock().push(url.to_string());
        }

        fn unload(&mut self) {}
    }

    fn actor() -> (PlayerActor, PlayerHandle, Arc<Mutex<Vec<String>>>) {
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let deps = PlayerDeps {
            resolver: Arc::new(SourceResolver::new(
                Arc::new(NoBackend),
                Arc::new(ResolverConfig::default()),
            )),
            metadata: None,
            pipelines: Arc::new(MissingManifests),
            surface: Box::new(Frames(rendered.clone())),
            history: Arc::new(StoreWatchHistory::new(MemoryStore::new())),
            warmer: None,
        };
        let request = PlayRequest {
            key: ContentKey::movie("550"),
            initial_resume_time: None,
        };
        let (mut actor, handle) = PlayerActor::new(
            request,
            deps,
            Arc::new(PlayerConfig::default()),
            CancellationToken::new(),
        );
        actor.session.sources = Some(ResolvedSources::new(
            ContentKey::movie("550"),
            vec![
                Source::native("https://cdn.test/550/master.m3u8", "Direct"),
                Source::embed("vidlink", "https://vidlink.pro/movie/550", "VidLink"),
                Source::embed("vidfast", "https://vidfast.pro/movie/550", "VidFast"),
            ],
        ));
        (actor, handle, rendered)
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_inside_the_switch_delay_switch_once() {
        let (mut actor, _handle, rendered) = actor();
        let now = Instant::now();

        // The manifest 404 fails the attach and schedules the switch.
        actor.activate(0, now);
        assert_eq!(actor.session.state, PlayerState::Switching);
        assert!(actor.timers.is_armed(TimerKind::AutoSwitch));
        let deadline = actor.timers.next_deadline();

        tokio::time::advance(Duration::from_millis(500)).await;
        actor.handle_failure(
            SourceFailure::NativeUnreachable("level load failed".into()),
            Instant::now(),
        );
        assert_eq!(actor.timers.next_deadline(), deadline);
        assert_eq!(actor.session.switch_count, 0);

        tokio::time::advance(actor.config.auto_switch_delay()).await;
        actor.fire_timers();
        assert_eq!(actor.session.active_index, 1);
        assert_eq!(actor.session.switch_count, 1);
        assert_eq!(actor.session.state, PlayerState::Loading);
        assert!(!actor.timers.is_armed(TimerKind::AutoSwitch));

        tokio::time::advance(Duration::from_secs(10)).await;
        actor.fire_timers();
        assert_eq!(actor.session.active_index, 1);
        assert_eq!(actor.session.switch_count, 1);
        assert_eq!(
            rendered.lock().as_slice(),
            ["https://vidlink.pro/movie/550".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_switch_absorbs_failures_while_playing() {
        let (mut actor, _handle, _) = actor();
        let now = Instant::now();
        actor.activate(0, now);
        assert!(actor.timers.is_armed(TimerKind::AutoSwitch));

        // A failure that lands after the state moved on still finds the timer armed.
        actor.session.state = PlayerState::Playing;
        actor.handle_failure(
            SourceFailure::NativeUnreachable("manifest not found".into()),
            now,
        );
        assert_eq!(actor.session.state, PlayerState::Playing);
        assert_eq!(actor.session.switch_count, 0);
    }
}
