//! User-gesture gating for picture-in-picture and fullscreen.

use std::time::Duration;

use tokio::time::Instant;

/// Requests that need user activation are only honoured shortly after a gesture.
#[derive(Debug, Clone, Copy)]
pub struct GestureWindow {
    window: Duration,
}

impl GestureWindow {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// `gesture_at` is when the triggering user gesture happened.
    pub fn allows(&self, gesture_at: Instant, now: Instant) -> bool {
        gesture_at <= now && now.duration_since(gesture_at) <= self.window
    }
}
