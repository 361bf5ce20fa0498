//! Deadlines owned by the player.
//!
//! Timers are plain deadlines polled from the actor loop, so clearing one is just
//! forgetting it and nothing outlives the actor.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Debounced automatic switch after a native failure.
    AutoSwitch,
    /// Embed liveness deadline.
    EmbedLoad,
    /// Periodic embed progress report.
    EmbedReport,
    /// Did the stall recovery get playback moving?
    StallVerify,
}

const ALL: [TimerKind; 4] = [
    TimerKind::AutoSwitch,
    TimerKind::EmbedLoad,
    TimerKind::EmbedReport,
    TimerKind::StallVerify,
];

#[derive(Debug, Default)]
pub struct Timers {
    auto_switch: Option<Instant>,
    embed_load: Option<Instant>,
    embed_report: Option<Instant>,
    stall_verify: Option<Instant>,
}

impl Timers {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<Instant> {
        match kind {
            TimerKind::AutoSwitch => &mut self.auto_switch,
            TimerKind::EmbedLoad => &mut self.embed_load,
            TimerKind::EmbedReport => &mut self.embed_report,
            TimerKind::StallVerify => &mut self.stall_verify,
        }
    }

    fn get(&self, kind: TimerKind) -> Option<Instant> {
        match kind {
            TimerKind::AutoSwitch => self.auto_switch,
            TimerKind::EmbedLoad => self.embed_load,
            TimerKind::EmbedReport => self.embed_report,
            TimerKind::StallVerify => self.stall_verify,
        }
    }

    pub fn arm(&mut self, kind: TimerKind, after: Duration, now: Instant) {
        *self.slot(kind) = Some(now + after);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        *self.slot(kind) = None;
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn clear_all(&mut self) {
        *self = Self::default();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        ALL.iter().filter_map(|k| self.get(*k)).min()
    }

    /// Disarm and return every timer due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = ALL
            .iter()
            .filter_map(|k| self.get(*k).filter(|d| *d <= now).map(|d| (d, *k)))
            .collect();
        due.sort_by_key(|(d, _)| *d);
        for (_, kind) in &due {
            self.cancel(*kind);
        }
        due.into_iter().map(|(_, k)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_due_order() {
        let mut timers = Timers::default();
        let now = Instant::now();
        timers.arm(TimerKind::EmbedReport, Duration::from_secs(10), now);
        timers.arm(TimerKind::EmbedLoad, Duration::from_secs(5), now);
        assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(5)));

        assert!(timers.take_due(now).is_empty());
        let due = timers.take_due(now + Duration::from_secs(10));
        assert_eq!(due, vec![TimerKind::EmbedLoad, TimerKind::EmbedReport]);
        assert!(timers.next_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear() {
        let mut timers = Timers::default();
        timers.arm(TimerKind::AutoSwitch, Duration::from_secs(2), Instant::now());
        assert!(timers.is_armed(TimerKind::AutoSwitch));
        timers.clear_all();
        assert!(!timers.is_armed(TimerKind::AutoSwitch));
    }
}
