//! Player mailbox messages.

use serde_json::Value;
use stream_sources::{ContentDetails, ContentRef, ResolvedSources, SourceError};
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::snapshot::PlayerSnapshot;
use crate::error::Result;
use crate::progress::ProgressSample;

/// Requests from the UI and the embed frame.
#[derive(Debug)]
pub enum PlayerMessage {
    /// User picked a source.
    SwitchSource {
        index: usize,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Advance to the next episode of the show.
    NextEpisode,
    /// Re-run source resolution for the current key.
    Retry,
    SelectAudioTrack {
        id: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    SelectQuality {
        level: Option<usize>,
        reply: oneshot::Sender<Result<()>>,
    },
    PictureInPicture {
        gesture_at: Instant,
        reply: oneshot::Sender<Result<()>>,
    },
    Fullscreen {
        gesture_at: Instant,
        reply: oneshot::Sender<Result<()>>,
    },
    /// The user interacted with the embed frame.
    UserInteraction,
    /// The embed frame finished loading.
    EmbedLoaded,
    EmbedLoadFailed(String),
    /// A cross-frame message posted by the embed.
    EmbedMessage { origin: String, payload: Value },
    GetSnapshot(oneshot::Sender<PlayerSnapshot>),
    /// Flush the final progress report and stop.
    Close(oneshot::Sender<ProgressSample>),
}

impl PlayerMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SwitchSource { .. } => "switch_source",
            Self::NextEpisode => "next_episode",
            Self::Retry => "retry",
            Self::SelectAudioTrack { .. } => "select_audio_track",
            Self::SelectQuality { .. } => "select_quality",
            Self::PictureInPicture { .. } => "picture_in_picture",
            Self::Fullscreen { .. } => "fullscreen",
            Self::UserInteraction => "user_interaction",
            Self::EmbedLoaded => "embed_loaded",
            Self::EmbedLoadFailed(_) => "embed_load_failed",
            Self::EmbedMessage { .. } => "embed_message",
            Self::GetSnapshot(_) => "get_snapshot",
            Self::Close(_) => "close",
        }
    }
}

/// Results of background work. Resolutions carry the generation that started them.
#[derive(Debug)]
pub(crate) enum TaskEvent {
    Resolved {
        generation: u64,
        result: std::result::Result<ResolvedSources, SourceError>,
    },
    Details {
        content: ContentRef,
        result: std::result::Result<ContentDetails, SourceError>,
    },
}
