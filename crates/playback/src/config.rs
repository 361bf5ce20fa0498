//! Player configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stream_sources::MediaType;

use crate::native::PrefetchConfig;

/// Default time an embed has to produce a liveness signal before the player gives up on it.
pub const DEFAULT_EMBED_LOAD_TIMEOUT_MS: u64 = 15_000;
/// Debounce before an automatic native -> next-source switch.
pub const DEFAULT_AUTO_SWITCH_DELAY_MS: u64 = 2_000;
pub const DEFAULT_NATIVE_REPORT_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_EMBED_REPORT_INTERVAL_MS: u64 = 10_000;
/// Consecutive stalls before a load restart is attempted.
pub const DEFAULT_STALL_RECOVERY_THRESHOLD: u32 = 3;
pub const DEFAULT_STALL_VERIFY_MS: u64 = 10_000;
pub const DEFAULT_GESTURE_WINDOW_MS: u64 = 5_000;
pub const DEFAULT_MOVIE_DURATION_SECS: f64 = 7_200.0;
pub const DEFAULT_EPISODE_DURATION_SECS: f64 = 2_700.0;

/// Tunables for a single player instance.
///
/// All fields have defaults, so a partial TOML/JSON table is enough to override one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// How long an embed may stay silent after render before it is considered failed.
    pub embed_load_timeout_ms: u64,
    /// Delay between a switchable native failure and the automatic switch.
    pub auto_switch_delay_ms: u64,
    /// Minimum spacing of progress reports driven by native time updates.
    pub native_report_interval_ms: u64,
    /// Period of progress reports while an embed is playing.
    pub embed_report_interval_ms: u64,
    pub stall_recovery_threshold: u32,
    /// How long after a stall recovery playback must have advanced.
    pub stall_verify_ms: u64,
    /// Picture-in-picture and fullscreen must follow a user gesture within this window.
    pub gesture_window_ms: u64,
    pub default_movie_duration_secs: f64,
    pub default_episode_duration_secs: f64,
    /// Capacity of the player mailbox.
    pub mailbox_capacity: usize,
    pub prefetch: PrefetchConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            embed_load_timeout_ms: DEFAULT_EMBED_LOAD_TIMEOUT_MS,
            auto_switch_delay_ms: DEFAULT_AUTO_SWITCH_DELAY_MS,
            native_report_interval_ms: DEFAULT_NATIVE_REPORT_INTERVAL_MS,
            embed_report_interval_ms: DEFAULT_EMBED_REPORT_INTERVAL_MS,
            stall_recovery_threshold: DEFAULT_STALL_RECOVERY_THRESHOLD,
            stall_verify_ms: DEFAULT_STALL_VERIFY_MS,
            gesture_window_ms: DEFAULT_GESTURE_WINDOW_MS,
            default_movie_duration_secs: DEFAULT_MOVIE_DURATION_SECS,
            default_episode_duration_secs: DEFAULT_EPISODE_DURATION_SECS,
            mailbox_capacity: 64,
            prefetch: PrefetchConfig::default(),
        }
    }
}

impl PlayerConfig {
    pub fn embed_load_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_load_timeout_ms)
    }

    pub fn auto_switch_delay(&self) -> Duration {
        Duration::from_millis(self.auto_switch_delay_ms)
    }

    pub fn native_report_interval(&self) -> Duration {
        Duration::from_millis(self.native_report_interval_ms)
    }

    pub fn embed_report_interval(&self) -> Duration {
        Duration::from_millis(self.embed_report_interval_ms)
    }

    pub fn stall_verify_window(&self) -> Duration {
        Duration::from_millis(self.stall_verify_ms)
    }

    pub fn gesture_window(&self) -> Duration {
        Duration::from_millis(self.gesture_window_ms)
    }

    /// Fallback duration when neither metadata nor the engine know better.
    pub fn default_duration(&self, media_type: MediaType) -> f64 {
        match media_type {
            MediaType::Movie => self.default_movie_duration_secs,
            MediaType::Tv => self.default_episode_duration_secs,
        }
    }
}
