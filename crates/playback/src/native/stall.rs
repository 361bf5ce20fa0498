//! Stall detection and recovery bookkeeping for the native engine.

use tokio::time::Instant;

/// Progress smaller than this does not count as playback moving.
const PROGRESS_EPSILON: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallAction {
    /// Below the threshold; keep waiting.
    Wait,
    /// Restart loading at the current position.
    Recover,
    /// A recovery is already being verified.
    Verifying,
}

/// Counts consecutive stalls and verifies that a recovery worked.
#[derive(Debug, Clone)]
pub struct StallTracker {
    threshold: u32,
    consecutive: u32,
    last_position: f64,
    recovery: Option<Recovery>,
}

#[derive(Debug, Clone, Copy)]
struct Recovery {
    position: f64,
    started: Instant,
}

impl StallTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
            last_position: 0.0,
            recovery: None,
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn is_recovering(&self) -> bool {
        self.recovery.is_some()
    }

    pub fn on_stall(&mut self, position: f64) -> StallAction {
        if self.recovery.is_some() {
            return StallAction::Verifying;
        }
        self.last_position = position;
        self.consecutive += 1;
        if self.consecutive >= self.threshold {
            StallAction::Recover
        } else {
            StallAction::Wait
        }
    }

    /// Call right after the load restart was issued.
    pub fn recovery_started(&mut self, position: f64, now: Instant) {
        self.consecutive = 0;
        self.recovery = Some(Recovery {
            position,
            started: now,
        });
    }

    /// Playback reported `position`. Moving forward clears the stall state.
    pub fn on_progress(&mut self, position: f64) {
        if position > self.last_position + PROGRESS_EPSILON {
            self.consecutive = 0;
            if self
                .recovery
                .is_some_and(|r| position > r.position + PROGRESS_EPSILON)
            {
                self.recovery = None;
            }
        }
        self.last_position = position;
    }

    /// Time since the current recovery was issued.
    pub fn recovering_for(&self, now: Instant) -> Option<std::time::Duration> {
        self.recovery
            .map(|r| now.saturating_duration_since(r.started))
    }

    /// Called when the verification window closes. Returns `true` when the recovery
    /// did not get playback moving again.
    pub fn recovery_failed(&mut self, position: f64) -> bool {
        match self.recovery.take() {
            Some(recovery) => position <= recovery.position + PROGRESS_EPSILON,
            None => false,
        }
    }
}
