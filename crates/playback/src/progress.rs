//! One canonical "time watched" value, whichever source is playing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use stream_sources::{ContentKey, MediaType};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::PlayerConfig;
use crate::history::{SnapshotHint, WatchHistory, WatchProgress};
use crate::session::PlaybackSession;

/// Where a sampled position came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// The native pipeline's playhead.
    Native,
    /// A structured message from the embed.
    EmbedMessage,
    /// Wall clock since the embed loaded, offset by the resume time.
    EmbedClock,
    /// No live source; the last known position.
    LastKnown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSample {
    pub position: f64,
    pub duration: f64,
    pub source: SampleSource,
}

/// Implemented by whatever currently plays the content.
pub trait PositionSource {
    /// Position of a source that has actually played, `None` otherwise.
    fn live_position(&self, now: Instant) -> Option<(f64, SampleSource)>;

    fn reported_duration(&self) -> Option<f64>;
}

/// Duration precedence: metadata runtime, then the engine, then a per-type default.
pub fn resolve_duration(
    metadata_runtime: Option<f64>,
    engine_duration: Option<f64>,
    media_type: MediaType,
    config: &PlayerConfig,
) -> f64 {
    [metadata_runtime, engine_duration]
        .into_iter()
        .flatten()
        .find(|d| d.is_finite() && *d > 0.0)
        .unwrap_or_else(|| config.default_duration(media_type))
}

/// Samples the active source and forwards reports to the watch history.
pub struct ProgressTracker {
    history: Arc<dyn WatchHistory>,
    config: Arc<PlayerConfig>,
    last_report: Option<Instant>,
    reports: u64,
}

impl ProgressTracker {
    pub fn new(history: Arc<dyn WatchHistory>, config: Arc<PlayerConfig>) -> Self {
        Self {
            history,
            config,
            last_report: None,
            reports: 0,
        }
    }

    pub fn reports(&self) -> u64 {
        self.reports
    }

    pub fn sample(
        &self,
        active: Option<&dyn PositionSource>,
        session: &PlaybackSession,
        now: Instant,
    ) -> ProgressSample {
        let (position, source) = active
            .and_then(|s| s.live_position(now))
            .unwrap_or((session.position, SampleSource::LastKnown));
        let engine_duration = active
            .and_then(|s| s.reported_duration())
            .or(session.engine_duration);
        let duration = resolve_duration(
            session.metadata_runtime,
            engine_duration,
            session.key.media_type(),
            &self.config,
        );
        ProgressSample {
            position,
            duration,
            source,
        }
    }

    /// Report unconditionally.
    pub fn report(
        &mut self,
        key: &ContentKey,
        sample: &ProgressSample,
        snapshot: Option<SnapshotHint>,
        now: Instant,
    ) {
        debug!(
            key = %key,
            position = sample.position,
            duration = sample.duration,
            source = ?sample.source,
            "Reporting progress"
        );
        self.history.record(
            WatchProgress::new(key, sample.position, sample.duration).with_snapshot(snapshot),
        );
        self.last_report = Some(now);
        self.reports += 1;
    }

    /// Periodic report: skipped at position zero and when the last report is younger
    /// than `min_interval`. Returns whether a report was made.
    pub fn report_periodic(
        &mut self,
        key: &ContentKey,
        sample: &ProgressSample,
        min_interval: Duration,
        now: Instant,
    ) -> bool {
        if sample.position <= 0.0 {
            trace!(key = %key, "Skipping report at position zero");
            return false;
        }
        if self
            .last_report
            .is_some_and(|last| now.saturating_duration_since(last) < min_interval)
        {
            return false;
        }
        self.report(key, sample, None, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use proptest::prelude::*;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<WatchProgress>>);

    impl WatchHistory for Recorder {
        fn record(&self, progress: WatchProgress) {
            self.0.lock().push(progress);
        }
    }

    struct Fixed(Option<(f64, SampleSource)>, Option<f64>);

    impl PositionSource for Fixed {
        fn live_position(&self, _now: Instant) -> Option<(f64, SampleSource)> {
            self.0
        }

        fn reported_duration(&self) -> Option<f64> {
            self.1
        }
    }

    fn tracker() -> (Arc<Recorder>, ProgressTracker) {
        let recorder = Arc::new(Recorder::default());
        let tracker = ProgressTracker::new(recorder.clone(), Arc::new(PlayerConfig::default()));
        (recorder, tracker)
    }

    #[test]
    fn test_duration_precedence() {
        let config = PlayerConfig::default();
        assert_eq!(resolve_duration(Some(5400.0), Some(5000.0), MediaType::Movie, &config), 5400.0);
        assert_eq!(resolve_duration(None, Some(5000.0), MediaType::Movie, &config), 5000.0);
        assert_eq!(resolve_duration(Some(0.0), None, MediaType::Tv, &config), 2700.0);
        assert_eq!(resolve_duration(None, Some(f64::INFINITY), MediaType::Movie, &config), 7200.0);
    }

    proptest! {
        #[test]
        fn duration_is_first_valid_candidate(
            metadata in proptest::option::of(-10.0f64..10_000.0),
            engine in proptest::option::of(-10.0f64..10_000.0),
        ) {
            let config = PlayerConfig::default();
            let resolved = resolve_duration(metadata, engine, MediaType::Movie, &config);
            let expected = match (metadata, engine) {
                (Some(m), _) if m > 0.0 => m,
                (_, Some(e)) if e > 0.0 => e,
                _ => 7200.0,
            };
            prop_assert_eq!(resolved, expected);
            prop_assert!(resolved > 0.0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_falls_back_to_last_known() {
        let (_, tracker) = tracker();
        let mut session = PlaybackSession::new(ContentKey::movie("550"), Some(120.0));
        session.metadata_runtime = Some(8340.0);

        let sample = tracker.sample(Some(&Fixed(None, Some(100.0))), &session, Instant::now());
        assert_eq!(sample.position, 120.0);
        assert_eq!(sample.source, SampleSource::LastKnown);
        assert_eq!(sample.duration, 8340.0);

        let live = Fixed(Some((130.0, SampleSource::Native)), Some(8000.0));
        let sample = tracker.sample(Some(&live), &session, Instant::now());
        assert_eq!(sample.position, 130.0);

        session.metadata_runtime = None;
        let sample = tracker.sample(Some(&live), &session, Instant::now());
        assert_eq!(sample.duration, 8000.0);

        let sample = tracker.sample(None, &session, Instant::now());
        assert_eq!(sample.duration, 7200.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_reports_are_rate_limited() {
        let (recorder, mut tracker) = tracker();
        let key = ContentKey::movie("550");
        let interval = Duration::from_secs(5);
        let sample = |position| ProgressSample {
            position,
            duration: 100.0,
            source: SampleSource::Native,
        };

        assert!(!tracker.report_periodic(&key, &sample(0.0), interval, Instant::now()));
        assert!(tracker.report_periodic(&key, &sample(1.0), interval, Instant::now()));
        assert!(!tracker.report_periodic(&key, &sample(2.0), interval, Instant::now()));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(tracker.report_periodic(&key, &sample(6.0), interval, Instant::now()));
        assert_eq!(recorder.0.lock().len(), 2);
        assert_eq!(tracker.reports(), 2);
    }
}
