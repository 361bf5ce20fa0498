//! The state of one playback session.

use std::fmt;

use serde::Serialize;
use stream_sources::{ContentKey, ResolvedSources, Source};
use tracing::{debug, warn};

use crate::error::PlayerError;

/// Player state machine.
///
/// ```text
/// Idle -> Loading -> Playing -> Switching -> Loading
///   \        \          \            \
///    -> Error  -> Error   -> Error     -> Error
/// ```
///
/// `Error` leaves through a manual switch, a retry (back to `Idle`) or a late embed
/// liveness signal (back to `Playing`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    /// Waiting for sources.
    Idle,
    /// A source is attached but has not shown signs of life.
    Loading,
    Playing,
    /// Between sources; the next attach is pending.
    Switching,
    Error,
}

impl PlayerState {
    pub fn can_transition_to(self, to: PlayerState) -> bool {
        use PlayerState::*;
        match (self, to) {
            (from, to) if from == to => true,
            // Re-key, retry and close always go back to Idle.
            (_, Idle) => true,
            (Idle, Loading | Error) => true,
            (Loading, Playing | Switching | Error) => true,
            (Playing, Switching | Error | Loading) => true,
            (Switching, Loading | Error) => true,
            (Error, Switching | Playing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlayerState::Idle => "idle",
            PlayerState::Loading => "loading",
            PlayerState::Playing => "playing",
            PlayerState::Switching => "switching",
            PlayerState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Everything the controller knows about the content being watched.
///
/// Owned by the controller; engines and the bridge only see what they are handed.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub key: ContentKey,
    pub sources: Option<ResolvedSources>,
    pub active_index: usize,
    /// Last known position in seconds. Survives source switches.
    pub position: f64,
    /// Runtime from the metadata service, in seconds.
    pub metadata_runtime: Option<f64>,
    /// Duration reported by the active source, in seconds.
    pub engine_duration: Option<f64>,
    pub has_live_signal: bool,
    pub failed_native: bool,
    /// Position the active source was started from. Reports never fall below it
    /// until the source itself has reported progress.
    pub resume_floor: f64,
    /// The active source has reported a position at or past `resume_floor`.
    pub has_progress: bool,
    pub state: PlayerState,
    pub error: Option<PlayerError>,
    /// Completed source switches since the session started.
    pub switch_count: u32,
}

impl PlaybackSession {
    pub fn new(key: ContentKey, initial_resume_time: Option<f64>) -> Self {
        Self {
            key,
            sources: None,
            active_index: 0,
            position: sanitize_position(initial_resume_time),
            metadata_runtime: None,
            engine_duration: None,
            has_live_signal: false,
            failed_native: false,
            resume_floor: 0.0,
            has_progress: false,
            state: PlayerState::Idle,
            error: None,
            switch_count: 0,
        }
    }

    /// Move to another episode of the same show. Everything tied to the old key is dropped.
    pub fn rekey(&mut self, key: ContentKey) {
        self.key = key;
        self.sources = None;
        self.active_index = 0;
        self.position = 0.0;
        self.resume_floor = 0.0;
        self.engine_duration = None;
        self.error = None;
        self.switch_count = 0;
        self.reset_source_flags();
        self.transition(PlayerState::Idle);
    }

    /// Flags that describe the attached source, not the content.
    pub fn reset_source_flags(&mut self) {
        self.has_live_signal = false;
        self.failed_native = false;
        self.has_progress = false;
        self.engine_duration = None;
    }

    /// A new source is about to be attached at the current position.
    pub fn begin_source(&mut self) {
        self.reset_source_flags();
        self.resume_floor = self.position;
    }

    pub fn active_source(&self) -> Option<&Source> {
        self.sources.as_ref()?.get(self.active_index)
    }

    pub fn source_count(&self) -> usize {
        self.sources.as_ref().map_or(0, ResolvedSources::len)
    }

    pub fn has_next_source(&self) -> bool {
        self.active_index + 1 < self.source_count()
    }

    /// Record a position sampled from the active source.
    pub fn observe_position(&mut self, position: f64) {
        if position.is_finite() && position >= 0.0 {
            self.position = self.floored(position);
        }
    }

    /// Record progress reported by the active source.
    ///
    /// Until the source reaches the point it was started from, lower values are
    /// start-up noise (a player posting 0 before it seeks) and are dropped.
    /// Returns whether the position was taken.
    pub fn observe_progress(&mut self, position: f64) -> bool {
        if !position.is_finite() || position < 0.0 {
            return false;
        }
        if !self.has_progress {
            if position + RESUME_SLACK_SECS < self.resume_floor {
                debug!(
                    key = %self.key,
                    position,
                    floor = self.resume_floor,
                    "Ignoring progress behind the resume point"
                );
                return false;
            }
            self.has_progress = true;
        }
        self.position = position;
        true
    }

    /// `position`, raised to the resume floor while the source has not reported progress.
    pub fn floored(&self, position: f64) -> f64 {
        if self.has_progress {
            position
        } else {
            position.max(self.resume_floor)
        }
    }

    pub fn transition(&mut self, to: PlayerState) {
        if self.state == to {
            return;
        }
        if !self.state.can_transition_to(to) {
            warn!(key = %self.key, from = %self.state, to = %to, "Unexpected state transition");
        } else {
            debug!(key = %self.key, from = %self.state, to = %to, "State transition");
        }
        if to != PlayerState::Error {
            self.error = None;
        }
        self.state = to;
    }

    pub fn fail(&mut self, error: PlayerError) {
        self.transition(PlayerState::Error);
        self.error = Some(error);
    }
}

/// Resume offsets are whole seconds, so a source may start up to a second early.
pub(crate) const RESUME_SLACK_SECS: f64 = 1.0;

fn sanitize_position(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite() && *v > 0.0).unwrap_or(0.0)
}
