//! Playback failover core.
//!
//! The crate acquires a playable stream from one of several heterogeneous sources
//! and keeps the viewer's position across failures:
//!
//! - [`native::NativeEngine`] drives an adaptive-stream [`native::MediaPipeline`] for the
//!   native HLS source and classifies its errors.
//! - [`embed::EmbedBridge`] renders third-party embeds with a resume offset and infers
//!   liveness from cross-frame messages and user interaction.
//! - [`controller::PlayerActor`] owns the source list and decides when to switch.
//! - [`progress::ProgressTracker`] turns whichever source is active into one canonical
//!   "time watched" value and reports it to a [`history::WatchHistory`].
//!
//! A player is started with [`controller::spawn_player`] and driven through the returned
//! [`controller::PlayerHandle`].

pub mod config;
pub mod controller;
pub mod embed;
pub mod error;
pub mod gesture;
pub mod history;
pub mod native;
pub mod progress;
pub mod session;

pub use config::PlayerConfig;
pub use controller::{
    ActorOutcome, PlayRequest, PlayerActor, PlayerDeps, PlayerHandle, PlayerSnapshot,
    spawn_player,
};
pub use embed::{EmbedBridge, EmbedSurface};
pub use error::{FailureClass, PlaybackError, PlayerError, PlayerErrorKind, Result, SourceFailure};
pub use history::{
    FileStore, KeyValueStore, MemoryStore, SnapshotHint, StoreWatchHistory, WatchHistory,
    WatchProgress,
};
pub use native::{
    AudioTrack, MediaPipeline, NativeEngine, NativeEvent, NativeEventSender, PipelineError,
    PipelineFactory, QualityLevel,
};
pub use progress::{ProgressSample, ProgressTracker, SampleSource, resolve_duration};
pub use session::{PlaybackSession, PlayerState};

pub use stream_sources;
