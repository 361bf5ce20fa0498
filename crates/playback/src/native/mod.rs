//! Native adaptive-stream engine.
//!
//! [`NativeEngine`] owns at most one [`MediaPipeline`] at a time, translates its events
//! into [`EngineSignal`]s for the controller and keeps stall recovery and segment
//! prefetch tied to the attachment that started them.

mod classify;
mod manifest;
mod pipeline;
mod prefetch;
mod stall;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use classify::{NativeErrorClass, classify};
pub use manifest::{ManifestInfo, ManifestLoader, ParsedPlaylist, parse_playlist};
pub use pipeline::{
    AttachmentId, AudioTrack, ErrorDetails, ErrorType, LoadRequest, MediaPipeline, NativeEvent,
    NativeEventSender, PipelineError, PipelineFactory, QualityLevel, SegmentRef,
};
pub use prefetch::{HttpSegmentWarmer, PrefetchConfig, SegmentPrefetcher, SegmentWarmer};
pub use stall::{StallAction, StallTracker};

use crate::error::{PlaybackError, Result, SourceFailure};
use crate::gesture::GestureWindow;
use crate::history::SnapshotHint;
use crate::progress::{PositionSource, SampleSource};

/// What the controller needs to hear about the native source.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    /// The pipeline can play.
    Ready,
    Progress {
        position: f64,
        duration: Option<f64>,
    },
    TracksChanged,
    Playing,
    Paused,
    Ended,
    /// A load restart was issued; verify it within the stall window.
    StallRecovery,
    Failure(SourceFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached(AttachmentId),
    /// Same URL already attached and healthy.
    Unchanged(AttachmentId),
}

/// Engine settings taken from the player config.
#[derive(Debug, Clone)]
pub struct NativeEngineConfig {
    pub stall_threshold: u32,
    pub prefetch: PrefetchConfig,
    pub gesture_window: GestureWindow,
}

struct ActivePipeline {
    id: AttachmentId,
    url: String,
    pipeline: Box<dyn MediaPipeline>,
    audio_tracks: Vec<AudioTrack>,
    levels: Vec<QualityLevel>,
    selected_audio: Option<u32>,
    selected_level: Option<usize>,
    last_time: f64,
    duration: Option<f64>,
    buffer_ahead: f64,
    ready: bool,
    has_played: bool,
    paused: bool,
    failed: bool,
    stall: StallTracker,
    prefetcher: SegmentPrefetcher,
}

pub struct NativeEngine {
    factory: Arc<dyn PipelineFactory>,
    events: mpsc::UnboundedSender<(AttachmentId, NativeEvent)>,
    warmer: Option<Arc<dyn SegmentWarmer>>,
    config: NativeEngineConfig,
    token: CancellationToken,
    active: Option<ActivePipeline>,
}

impl NativeEngine {
    pub fn new(
        factory: Arc<dyn PipelineFactory>,
        events: mpsc::UnboundedSender<(AttachmentId, NativeEvent)>,
        warmer: Option<Arc<dyn SegmentWarmer>>,
        config: NativeEngineConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            factory,
            events,
            warmer,
            config,
            token,
            active: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.active.is_some()
    }

    pub fn attachment(&self) -> Option<AttachmentId> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn url(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.url.as_str())
    }

    /// Attach `url`, starting at `resume_at` seconds.
    ///
    /// Attaching the URL that is already attached and healthy does nothing. Anything
    /// else tears the current pipeline down before a new one is created.
    pub fn attach(
        &mut self,
        id: AttachmentId,
        url: &str,
        resume_at: f64,
    ) -> std::result::Result<AttachOutcome, SourceFailure> {
        if let Some(active) = &self.active
            && active.url == url
            && !active.failed
        {
            debug!(url, attachment = active.id, "Native source already attached");
            return Ok(AttachOutcome::Unchanged(active.id));
        }

        self.teardown();

        let sender = NativeEventSender::new(id, self.events.clone());
        let mut pipeline = self.factory.create(sender);
        let request = LoadRequest {
            url: url.to_string(),
            start_position: (resume_at > 0.0).then_some(resume_at),
            autoplay: true,
        };

        if let Err(e) = pipeline.load(&request) {
            warn!(url, error = %e, "Native pipeline refused to load");
            pipeline.destroy();
            return Err(failure_for(&e));
        }

        info!(url, attachment = id, resume_at, "Native source attached");
        self.active = Some(ActivePipeline {
            id,
            url: url.to_string(),
            pipeline,
            audio_tracks: Vec::new(),
            levels: Vec::new(),
            selected_audio: None,
            selected_level: None,
            last_time: resume_at.max(0.0),
            duration: None,
            buffer_ahead: 0.0,
            ready: false,
            has_played: false,
            paused: false,
            failed: false,
            stall: StallTracker::new(self.config.stall_threshold),
            prefetcher: SegmentPrefetcher::new(
                self.config.prefetch.clone(),
                self.warmer.clone(),
                &self.token,
            ),
        });
        Ok(AttachOutcome::Attached(id))
    }

    /// Release the pipeline and everything hanging off it.
    pub fn teardown(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.prefetcher.shutdown();
            active.pipeline.stop_load();
            active.pipeline.detach_media();
            active.pipeline.destroy();
            debug!(url = %active.url, attachment = active.id, "Native source torn down");
        }
    }

    /// Translate a pipeline event. Events for other attachments are ignored.
    pub fn handle_event(
        &mut self,
        id: AttachmentId,
        event: NativeEvent,
        now: Instant,
    ) -> Option<EngineSignal> {
        let active = self.active.as_mut()?;
        if active.id != id {
            debug!(attachment = id, current = active.id, "Dropping stale native event");
            return None;
        }

        match event {
            NativeEvent::ManifestParsed {
                audio_tracks,
                levels,
            } => {
                active.selected_audio = audio_tracks
                    .iter()
                    .find(|t| t.is_default)
                    .or(audio_tracks.first())
                    .map(|t| t.id);
                active.audio_tracks = audio_tracks;
                active.levels = levels;
                Some(EngineSignal::TracksChanged)
            }
            NativeEvent::LevelLoaded { segments } => {
                active.prefetcher.set_segments(segments);
                None
            }
            NativeEvent::FragmentLoaded { sn } => {
                active.prefetcher.on_fragment_loaded(sn, active.buffer_ahead);
                None
            }
            NativeEvent::Ready => {
                active.ready = true;
                Some(EngineSignal::Ready)
            }
            NativeEvent::TimeUpdate {
                current_time,
                duration,
                buffered_end,
            } => {
                if !current_time.is_finite() || current_time < 0.0 {
                    return None;
                }
                active.stall.on_progress(current_time);
                if current_time > 0.0 {
                    active.has_played = true;
                }
                active.last_time = current_time;
                active.buffer_ahead = (buffered_end - current_time).max(0.0);
                if let Some(d) = duration.filter(|d| d.is_finite() && *d > 0.0) {
                    active.duration = Some(d);
                }
                Some(EngineSignal::Progress {
                    position: current_time,
                    duration: active.duration,
                })
            }
            NativeEvent::Playing => {
                active.paused = false;
                Some(EngineSignal::Playing)
            }
            NativeEvent::Paused => {
                active.paused = true;
                Some(EngineSignal::Paused)
            }
            NativeEvent::Ended => Some(EngineSignal::Ended),
            NativeEvent::Stalled => Self::handle_stall(active, now),
            NativeEvent::Error(error) => match classify(&error) {
                NativeErrorClass::Stall => Self::handle_stall(active, now),
                NativeErrorClass::Recoverable => {
                    debug!(url = %active.url, error = %error, "Recoverable pipeline error");
                    None
                }
                NativeErrorClass::AutoSwitch | NativeErrorClass::Manual => {
                    if active.failed {
                        debug!(url = %active.url, "Pipeline already failed, ignoring error");
                        return None;
                    }
                    warn!(url = %active.url, error = %error, "Fatal pipeline error");
                    active.failed = true;
                    Some(EngineSignal::Failure(failure_for(&error)))
                }
            },
        }
    }

    fn handle_stall(active: &mut ActivePipeline, now: Instant) -> Option<EngineSignal> {
        if active.failed {
            return None;
        }
        let position = active.pipeline.current_time();
        match active.stall.on_stall(position) {
            StallAction::Wait => {
                debug!(
                    url = %active.url,
                    consecutive = active.stall.consecutive(),
                    buffer_ahead = active.buffer_ahead,
                    "Playback stalled"
                );
                None
            }
            StallAction::Verifying => None,
            StallAction::Recover => {
                info!(url = %active.url, position, "Restarting load after repeated stalls");
                active.pipeline.stop_load();
                match active.pipeline.start_load(Some(position)) {
                    Ok(()) => {
                        active.stall.recovery_started(position, now);
                        Some(EngineSignal::StallRecovery)
                    }
                    Err(e) => {
                        warn!(url = %active.url, error = %e, "Stall recovery failed");
                        active.failed = true;
                        Some(EngineSignal::Failure(SourceFailure::NativeStallUnrecovered(
                            e.to_string(),
                        )))
                    }
                }
            }
        }
    }

    /// The stall verification window closed. Fails the source when playback has not
    /// moved since the recovery.
    pub fn verify_stall_recovery(&mut self, now: Instant) -> Option<SourceFailure> {
        let active = self.active.as_mut()?;
        let position = active.pipeline.current_time().max(active.last_time);
        let elapsed = active.stall.recovering_for(now);
        if active.stall.recovery_failed(position) && !active.failed {
            warn!(
                url = %active.url,
                position,
                elapsed = ?elapsed,
                "Playback did not resume after stall recovery"
            );
            active.failed = true;
            return Some(SourceFailure::NativeStallUnrecovered(format!(
                "no progress from {position:.1}s"
            )));
        }
        None
    }

    pub fn audio_tracks(&self) -> &[AudioTrack] {
        self.active
            .as_ref()
            .map(|a| a.audio_tracks.as_slice())
            .unwrap_or_default()
    }

    pub fn selected_audio_track(&self) -> Option<u32> {
        self.active.as_ref().and_then(|a| a.selected_audio)
    }

    pub fn quality_levels(&self) -> &[QualityLevel] {
        self.active
            .as_ref()
            .map(|a| a.levels.as_slice())
            .unwrap_or_default()
    }

    pub fn selected_level(&self) -> Option<usize> {
        self.active.as_ref().and_then(|a| a.selected_level)
    }

    pub fn buffer_ahead(&self) -> Option<f64> {
        self.active.as_ref().map(|a| a.buffer_ahead)
    }

    pub fn is_playing(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| (a.ready || a.has_played) && !a.paused && !a.failed)
    }

    pub fn select_audio_track(&mut self, id: u32) -> Result<()> {
        let active = self.active.as_mut().ok_or(PlaybackError::NotNative)?;
        if !active.audio_tracks.iter().any(|t| t.id == id) {
            return Err(PlaybackError::UnknownAudioTrack(id));
        }
        active.pipeline.set_audio_track(id)?;
        active.selected_audio = Some(id);
        Ok(())
    }

    /// `None` returns to automatic level selection.
    pub fn select_level(&mut self, level: Option<usize>) -> Result<()> {
        let active = self.active.as_mut().ok_or(PlaybackError::NotNative)?;
        if let Some(index) = level
            && !active.levels.iter().any(|l| l.index == index)
        {
            return Err(PlaybackError::UnknownLevel(index));
        }
        active.pipeline.set_level(level)?;
        active.selected_level = level;
        Ok(())
    }

    pub fn request_picture_in_picture(&mut self, gesture_at: Instant, now: Instant) -> Result<()> {
        if !self.config.gesture_window.allows(gesture_at, now) {
            return Err(PlaybackError::GestureRequired("picture-in-picture"));
        }
        let active = self.active.as_mut().ok_or(PlaybackError::NotNative)?;
        Ok(active.pipeline.request_picture_in_picture()?)
    }

    pub fn request_fullscreen(&mut self, gesture_at: Instant, now: Instant) -> Result<()> {
        if !self.config.gesture_window.allows(gesture_at, now) {
            return Err(PlaybackError::GestureRequired("fullscreen"));
        }
        let active = self.active.as_mut().ok_or(PlaybackError::NotNative)?;
        Ok(active.pipeline.request_fullscreen()?)
    }

    pub fn capture_snapshot(&self) -> Option<SnapshotHint> {
        let active = self.active.as_ref()?;
        if !active.has_played {
            return None;
        }
        active.pipeline.capture_snapshot()
    }
}

impl PositionSource for NativeEngine {
    fn live_position(&self, _now: Instant) -> Option<(f64, SampleSource)> {
        let active = self.active.as_ref()?;
        if !active.has_played {
            return None;
        }
        let current = active.pipeline.current_time();
        let position = if current.is_finite() && current > 0.0 {
            current
        } else {
            active.last_time
        };
        Some((position, SampleSource::Native))
    }

    fn reported_duration(&self) -> Option<f64> {
        let active = self.active.as_ref()?;
        active
            .duration
            .or_else(|| active.pipeline.duration().filter(|d| d.is_finite() && *d > 0.0))
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn failure_for(error: &PipelineError) -> SourceFailure {
    match classify(error) {
        NativeErrorClass::AutoSwitch => SourceFailure::NativeUnreachable(error.to_string()),
        _ => SourceFailure::NativeFatal(error.to_string()),
    }
}
