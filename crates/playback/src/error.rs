use serde::Serialize;
use stream_sources::SourceError;
use thiserror::Error;

use crate::native::PipelineError;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Errors returned by player operations.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("player is closed")]
    Closed,

    #[error("operation requires an active native source")]
    NotNative,

    #[error("{0} requires a recent user gesture")]
    GestureRequired(&'static str),

    #[error("unknown audio track {0}")]
    UnknownAudioTrack(u32),

    #[error("unknown quality level {0}")]
    UnknownLevel(usize),

    #[error("source index {index} out of range ({len} sources)")]
    InvalidSourceIndex { index: usize, len: usize },

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlaybackError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// Whether a source failure moves on by itself or waits for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Unreachable native stream; the controller advances after a debounce.
    AutoSwitch,
    /// Anything else; the user decides (switch or retry).
    Manual,
}

/// Why the active source stopped being usable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceFailure {
    #[error("native stream unreachable: {0}")]
    NativeUnreachable(String),

    #[error("native playback failed: {0}")]
    NativeFatal(String),

    #[error("native playback stalled: {0}")]
    NativeStallUnrecovered(String),

    #[error("embed did not respond within {0:?}")]
    EmbedLoadTimeout(std::time::Duration),

    #[error("embed failed to load: {0}")]
    EmbedLoadFailed(String),

    #[error("embed reported an error: {0}")]
    EmbedReported(String),
}

impl SourceFailure {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::NativeUnreachable(_) => FailureClass::AutoSwitch,
            _ => FailureClass::Manual,
        }
    }

    pub fn is_auto_switchable(&self) -> bool {
        self.class() == FailureClass::AutoSwitch
    }

    pub fn kind(&self) -> PlayerErrorKind {
        match self {
            Self::NativeUnreachable(_) => PlayerErrorKind::NativeUnreachable,
            Self::NativeFatal(_) => PlayerErrorKind::NativeFatal,
            Self::NativeStallUnrecovered(_) => PlayerErrorKind::NativeStalled,
            Self::EmbedLoadTimeout(_) => PlayerErrorKind::EmbedTimeout,
            Self::EmbedLoadFailed(_) => PlayerErrorKind::EmbedLoadFailed,
            Self::EmbedReported(_) => PlayerErrorKind::EmbedReported,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerErrorKind {
    /// No source could be constructed for the content.
    Unavailable,
    NativeUnreachable,
    NativeFatal,
    NativeStalled,
    EmbedTimeout,
    EmbedLoadFailed,
    EmbedReported,
    /// Automatic failover ran past the last source.
    SourcesExhausted,
}

/// The error surfaced to the UI, with the actions it may offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerError {
    pub kind: PlayerErrorKind,
    pub message: String,
    /// Another source can be picked.
    pub can_switch: bool,
    pub can_retry: bool,
}

impl PlayerError {
    pub fn from_failure(failure: &SourceFailure, source_count: usize) -> Self {
        Self {
            kind: failure.kind(),
            message: failure.to_string(),
            can_switch: source_count > 1,
            can_retry: true,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: PlayerErrorKind::Unavailable,
            message: message.into(),
            can_switch: false,
            can_retry: true,
        }
    }

    pub fn exhausted(source_count: usize) -> Self {
        Self {
            kind: PlayerErrorKind::SourcesExhausted,
            message: format!("all {source_count} sources failed"),
            can_switch: source_count > 1,
            can_retry: true,
        }
    }

    /// Terminal errors are the ones no source switch can fix.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            PlayerErrorKind::Unavailable | PlayerErrorKind::SourcesExhausted
        )
    }
}
