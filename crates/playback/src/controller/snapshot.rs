use serde::Serialize;
use stream_sources::{ContentKey, Source, SourceKind};

use crate::error::PlayerError;
use crate::native::{AudioTrack, QualityLevel};
use crate::session::PlayerState;

/// What the UI renders. Published after every event the player handles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub key: ContentKey,
    pub state: PlayerState,
    pub sources: Vec<Source>,
    pub active_index: usize,
    pub active_kind: Option<SourceKind>,
    /// URL currently attached, with the resume offset for embeds.
    pub active_url: Option<String>,
    pub is_playing: bool,
    pub error: Option<PlayerError>,
    pub position: f64,
    pub duration: f64,
    pub buffer_ahead: Option<f64>,
    pub audio_tracks: Vec<AudioTrack>,
    pub selected_audio_track: Option<u32>,
    pub quality_levels: Vec<QualityLevel>,
    pub selected_quality: Option<usize>,
    pub has_live_signal: bool,
    pub switch_count: u32,
    pub closed: bool,
}

impl PlayerSnapshot {
    pub fn initial(key: ContentKey, position: f64, duration: f64) -> Self {
        Self {
            key,
            state: PlayerState::Idle,
            sources: Vec::new(),
            active_index: 0,
            active_kind: None,
            active_url: None,
            is_playing: false,
            error: None,
            position,
            duration,
            buffer_ahead: None,
            audio_tracks: Vec::new(),
            selected_audio_track: None,
            quality_levels: Vec::new(),
            selected_quality: None,
            has_live_signal: false,
            switch_count: 0,
            closed: false,
        }
    }

    pub fn active_source(&self) -> Option<&Source> {
        self.sources.get(self.active_index)
    }
}
