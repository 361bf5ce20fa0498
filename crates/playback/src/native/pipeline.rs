//! The seam between the native engine and a concrete media pipeline.
//!
//! A pipeline is the adaptive-stream player bound to a media element. The engine owns
//! exactly one at a time and talks to it through [`MediaPipeline`]; the pipeline reports
//! back through the [`NativeEventSender`] it was created with.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::history::SnapshotHint;

/// Identifies one attachment of a source. Events from older attachments are dropped.
pub type AttachmentId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioTrack {
    pub id: u32,
    pub name: String,
    pub language: Option<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityLevel {
    pub index: usize,
    pub height: Option<u32>,
    pub bitrate: u64,
    pub name: String,
}

/// A media segment listed by the active level playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRef {
    /// Media sequence number.
    pub sn: u64,
    pub uri: String,
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Network,
    Media,
    Mux,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDetails {
    ManifestLoadError,
    ManifestLoadTimeout,
    ManifestParsingError,
    LevelLoadError,
    LevelLoadTimeout,
    FragLoadError,
    FragLoadTimeout,
    KeyLoadError,
    BufferStalled,
    BufferAppendError,
    FragDecryptError,
    IncompatibleCodecs,
    Internal,
}

/// An error raised by the pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error_type:?}/{details:?} (fatal: {fatal}, code: {response_code:?}): {reason}")]
pub struct PipelineError {
    pub error_type: ErrorType,
    pub details: ErrorDetails,
    pub fatal: bool,
    /// HTTP status of the failed request; `None` or `Some(0)` when no response arrived.
    pub response_code: Option<u16>,
    pub reason: String,
}

impl PipelineError {
    pub fn new(
        error_type: ErrorType,
        details: ErrorDetails,
        fatal: bool,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            error_type,
            details,
            fatal,
            response_code: None,
            reason: reason.into(),
        }
    }

    pub fn with_response(mut self, code: u16) -> Self {
        self.response_code = Some(code);
        self
    }

    /// Fatal manifest load failure, optionally with the HTTP status.
    pub fn manifest_load(response_code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            response_code,
            ..Self::new(ErrorType::Network, ErrorDetails::ManifestLoadError, true, reason)
        }
    }

    pub fn level_load(response_code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            response_code,
            ..Self::new(ErrorType::Network, ErrorDetails::LevelLoadError, true, reason)
        }
    }

    pub fn buffer_stalled() -> Self {
        Self::new(ErrorType::Media, ErrorDetails::BufferStalled, false, "buffer stalled")
    }

    pub fn media(reason: impl Into<String>) -> Self {
        Self::new(ErrorType::Media, ErrorDetails::BufferAppendError, true, reason)
    }

    pub fn unsupported(what: &str) -> Self {
        Self::new(
            ErrorType::Other,
            ErrorDetails::Internal,
            false,
            format!("{what} is not supported by this pipeline"),
        )
    }
}

/// Events a pipeline reports about its own progress.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    ManifestParsed {
        audio_tracks: Vec<AudioTrack>,
        levels: Vec<QualityLevel>,
    },
    LevelLoaded {
        segments: Vec<SegmentRef>,
    },
    FragmentLoaded {
        sn: u64,
    },
    /// Enough data to start playback.
    Ready,
    TimeUpdate {
        current_time: f64,
        duration: Option<f64>,
        buffered_end: f64,
    },
    Playing,
    Paused,
    /// The media element is waiting for data.
    Stalled,
    Ended,
    Error(PipelineError),
}

/// Sender handed to a pipeline at creation, tagged with its attachment.
#[derive(Debug, Clone)]
pub struct NativeEventSender {
    attachment: AttachmentId,
    tx: mpsc::UnboundedSender<(AttachmentId, NativeEvent)>,
}

impl NativeEventSender {
    pub fn new(
        attachment: AttachmentId,
        tx: mpsc::UnboundedSender<(AttachmentId, NativeEvent)>,
    ) -> Self {
        Self { attachment, tx }
    }

    pub fn attachment(&self) -> AttachmentId {
        self.attachment
    }

    /// Returns `false` once the player has gone away.
    pub fn send(&self, event: NativeEvent) -> bool {
        self.tx.send((self.attachment, event)).is_ok()
    }
}

/// What to load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub url: String,
    /// Position to start from; `None` means the beginning.
    pub start_position: Option<f64>,
    pub autoplay: bool,
}

/// Controls of an adaptive-stream pipeline bound to a media element.
///
/// Calls are synchronous; outcomes that take time arrive later as [`NativeEvent`]s.
pub trait MediaPipeline: Send {
    /// Bind to the media element and start loading the manifest.
    fn load(&mut self, request: &LoadRequest) -> Result<(), PipelineError>;

    /// Resume loading, optionally from a position.
    fn start_load(&mut self, position: Option<f64>) -> Result<(), PipelineError>;

    fn stop_load(&mut self);

    fn detach_media(&mut self);

    /// Release everything. The pipeline is not used afterwards.
    fn destroy(&mut self);

    fn current_time(&self) -> f64;

    /// End of the buffered range containing the playhead.
    fn buffered_end(&self) -> f64;

    fn duration(&self) -> Option<f64>;

    fn set_audio_track(&mut self, id: u32) -> Result<(), PipelineError>;

    /// `None` selects automatic level switching.
    fn set_level(&mut self, level: Option<usize>) -> Result<(), PipelineError>;

    fn request_picture_in_picture(&mut self) -> Result<(), PipelineError> {
        Err(PipelineError::unsupported("picture-in-picture"))
    }

    fn request_fullscreen(&mut self) -> Result<(), PipelineError> {
        Err(PipelineError::unsupported("fullscreen"))
    }

    /// Small still of the current frame, if the pipeline can produce one.
    fn capture_snapshot(&self) -> Option<SnapshotHint> {
        None
    }
}

/// Creates pipelines for the engine.
pub trait PipelineFactory: Send + Sync {
    fn create(&self, events: NativeEventSender) -> Box<dyn MediaPipeline>;
}
