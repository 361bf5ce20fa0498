//! Embed bridge: third-party iframe players.
//!
//! Embeds expose no control API. The bridge renders the provider URL with a resume
//! offset, listens to cross-frame messages from the embed's origin and infers liveness
//! from load, user interaction or any structured message. When no structured time is
//! available it falls back to a wall clock started at the first sign of life.

mod messages;
mod resume;

use std::time::Duration;

use serde_json::Value;
use stream_sources::{ContentKey, MediaType};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

pub use messages::{ProgressMessage, parse_progress, reported_error};
pub use resume::{ResumeUrlCache, resume_url};

use crate::error::SourceFailure;
use crate::native::AttachmentId;
use crate::progress::{PositionSource, SampleSource};
use crate::session::RESUME_SLACK_SECS;

/// The frame an embed is rendered into.
pub trait EmbedSurface: Send {
    /// Show `url`, replacing whatever the frame showed before.
    fn render(&mut self, url: &str);

    /// Blank the frame.
    fn unload(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered(String),
    /// The computed URL is already on screen.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeSignal {
    /// First sign of life from the current embed.
    Live,
    Progress {
        position: f64,
        duration: Option<f64>,
    },
    Failure(SourceFailure),
}

struct ActiveEmbed {
    id: AttachmentId,
    base_url: String,
    rendered_url: String,
    origin: Option<Url>,
    resume_at: f64,
    live_since: Option<Instant>,
    last_message: Option<ProgressMessage>,
    /// A progress message reached `resume_at`. Earlier ones predate the seek.
    reached_resume: bool,
    failed: bool,
}

pub struct EmbedBridge {
    surface: Box<dyn EmbedSurface>,
    resume_urls: ResumeUrlCache,
    load_timeout: Duration,
    active: Option<ActiveEmbed>,
}

impl EmbedBridge {
    pub fn new(surface: Box<dyn EmbedSurface>, load_timeout: Duration) -> Self {
        Self {
            surface,
            resume_urls: ResumeUrlCache::default(),
            load_timeout,
            active: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.active.is_some()
    }

    pub fn attachment(&self) -> Option<AttachmentId> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn rendered_url(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.rendered_url.as_str())
    }

    pub fn has_live_signal(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.live_since.is_some())
    }

    /// Render `base_url` resuming at `resume_at` seconds.
    ///
    /// Rendering the exact URL already shown does nothing; otherwise the previous embed
    /// is unloaded first.
    pub fn render(&mut self, id: AttachmentId, base_url: &str, resume_at: f64) -> RenderOutcome {
        let url = self.resume_urls.get(base_url, resume_at);
        if self
            .active
            .as_ref()
            .is_some_and(|a| a.rendered_url == url && !a.failed)
        {
            debug!(url = %url, "Embed already rendered");
            return RenderOutcome::Unchanged;
        }

        self.unload();
        self.surface.render(&url);
        info!(url = %url, attachment = id, resume_at, "Embed rendered");

        self.active = Some(ActiveEmbed {
            id,
            base_url: base_url.to_string(),
            origin: Url::parse(&url).ok(),
            rendered_url: url.clone(),
            resume_at: resume_at.max(0.0),
            live_since: None,
            last_message: None,
            reached_resume: resume_at < 1.0,
            failed: false,
        });
        RenderOutcome::Rendered(url)
    }

    pub fn unload(&mut self) {
        if let Some(active) = self.active.take() {
            self.surface.unload();
            debug!(url = %active.base_url, attachment = active.id, "Embed unloaded");
        }
    }

    fn mark_live(&mut self, now: Instant, why: &str) -> Option<BridgeSignal> {
        let active = self.active.as_mut()?;
        if active.live_since.is_some() {
            return None;
        }
        active.live_since = Some(now);
        info!(url = %active.rendered_url, signal = why, "Embed is live");
        Some(BridgeSignal::Live)
    }

    /// The frame finished loading.
    pub fn on_loaded(&mut self, now: Instant) -> Option<BridgeSignal> {
        self.mark_live(now, "load")
    }

    /// The user interacted with the frame.
    pub fn on_interaction(&mut self, now: Instant) -> Option<BridgeSignal> {
        self.mark_live(now, "interaction")
    }

    pub fn on_load_error(&mut self, reason: &str) -> Option<BridgeSignal> {
        let active = self.active.as_mut()?;
        if active.failed {
            return None;
        }
        warn!(url = %active.rendered_url, reason, "Embed failed to load");
        active.failed = true;
        Some(BridgeSignal::Failure(SourceFailure::EmbedLoadFailed(
            reason.to_string(),
        )))
    }

    /// A cross-frame message. Messages from other origins are ignored, as are progress
    /// reports for an episode other than `key`.
    pub fn on_message(
        &mut self,
        origin: &str,
        payload: &Value,
        key: &ContentKey,
        now: Instant,
    ) -> Vec<BridgeSignal> {
        let mut signals = Vec::new();
        let Some(active) = self.active.as_ref() else {
            return signals;
        };
        if !origin_matches(active.origin.as_ref(), origin) {
            debug!(origin, expected = %active.rendered_url, "Ignoring message from foreign origin");
            return signals;
        }

        signals.extend(self.mark_live(now, "message"));

        if let Some(reason) = reported_error(payload) {
            if let Some(active) = self.active.as_mut()
                && !active.failed
            {
                warn!(url = %active.rendered_url, reason = %reason, "Embed reported an error");
                active.failed = true;
                signals.push(BridgeSignal::Failure(SourceFailure::EmbedReported(reason)));
            }
            return signals;
        }

        let Some(active) = self.active.as_mut() else {
            return signals;
        };
        let Some(message) = parse_progress(&active.rendered_url, payload) else {
            return signals;
        };
        if !episode_matches(key, &message) {
            debug!(
                key = %key,
                season = ?message.season,
                episode = ?message.episode,
                "Ignoring progress for another episode"
            );
            return signals;
        }
        if !active.reached_resume {
            if message.current_time + RESUME_SLACK_SECS < active.resume_at {
                debug!(
                    position = message.current_time,
                    resume_at = active.resume_at,
                    "Holding progress before resume point"
                );
                return signals;
            }
            active.reached_resume = true;
        }

        active.last_message = Some(message);
        signals.push(BridgeSignal::Progress {
            position: message.current_time,
            duration: message.duration,
        });
        signals
    }

    /// The load deadline passed. Fails the embed when it never showed signs of life.
    pub fn check_load_timeout(&mut self) -> Option<SourceFailure> {
        let active = self.active.as_mut()?;
        if active.live_since.is_some() || active.failed {
            return None;
        }
        warn!(url = %active.rendered_url, timeout = ?self.load_timeout, "Embed load timed out");
        active.failed = true;
        Some(SourceFailure::EmbedLoadTimeout(self.load_timeout))
    }

    pub fn is_failed(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.failed)
    }

    /// Clear the failed flag after a late live signal.
    pub fn revive(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.failed = false;
        }
    }
}

/// The last accepted message wins. Without one, a clock runs from the first sign of life
/// (not from render), so a frame that never comes alive keeps no position of its own.
impl PositionSource for EmbedBridge {
    fn live_position(&self, now: Instant) -> Option<(f64, SampleSource)> {
        let active = self.active.as_ref()?;
        if let Some(message) = active.last_message {
            return Some((message.current_time, SampleSource::EmbedMessage));
        }
        let since = active.live_since?;
        let elapsed = now.saturating_duration_since(since).as_secs_f64();
        Some((active.resume_at + elapsed, SampleSource::EmbedClock))
    }

    fn reported_duration(&self) -> Option<f64> {
        self.active.as_ref()?.last_message?.duration
    }
}

fn origin_matches(expected: Option<&Url>, origin: &str) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    let Ok(origin) = Url::parse(origin) else {
        return false;
    };
    if expected.origin() == origin.origin() {
        return true;
    }
    // Providers post from the player host or its parent domain.
    match (expected.host_str(), origin.host_str()) {
        (Some(e), Some(o)) => {
            expected.scheme() == origin.scheme()
                && (e.ends_with(&format!(".{o}")) || o.ends_with(&format!(".{e}")))
        }
        _ => false,
    }
}

fn episode_matches(key: &ContentKey, message: &ProgressMessage) -> bool {
    if key.media_type() == MediaType::Movie {
        return true;
    }
    let season_ok = message.season.is_none_or(|s| Some(s) == key.season);
    let episode_ok = message.episode.is_none_or(|e| Some(e) == key.episode);
    season_ok && episode_ok
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Frames {
        rendered: Vec<String>,
        unloads: usize,
    }

    struct FakeSurface(Arc<Mutex<Frames>>);

    impl EmbedSurface for FakeSurface {
        fn render(&mut self, url: &str) {
            self.0.lock().rendered.push(url.to_string());
        }

        fn unload(&mut self) {
            self.0.lock().unloads += 1;
        }
    }

    fn bridge() -> (Arc<Mutex<Frames>>, EmbedBridge) {
        let frames = Arc::new(Mutex::new(Frames::default()));
        let bridge = EmbedBridge::new(
            Box::new(FakeSurface(frames.clone())),
            Duration::from_secs(15),
        );
        (frames, bridge)
    }

    const VIDLINK: &str = "https://vidlink.pro/tv/1399/1/2";

    #[tokio::test(start_paused = true)]
    async fn test_render_is_idempotent() {
        let (frames, mut bridge) = bridge();
        assert_eq!(
            bridge.render(1, VIDLINK, 42.0),
            RenderOutcome::Rendered(format!("{VIDLINK}?startAt=42"))
        );
        assert_eq!(bridge.render(2, VIDLINK, 42.4), RenderOutcome::Unchanged);
        assert_eq!(frames.lock().rendered.len(), 1);

        // New resume time means a new URL.
        bridge.render(3, VIDLINK, 90.0);
        let frames = frames.lock();
        assert_eq!(frames.rendered.len(), 2);
        assert_eq!(frames.unloads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_origin_is_ignored() {
        let (_, mut bridge) = bridge();
        let key = ContentKey::episode("1399", 1, 2);
        bridge.render(1, VIDLINK, 0.0);
        let payload = json!({"type": "PLAYER_EVENT", "data": {"currentTime": 10}});

        assert!(bridge
            .on_message("https://evil.example", &payload, &key, Instant::now())
            .is_empty());
        assert!(!bridge.has_live_signal());

        let signals = bridge.on_message("https://vidlink.pro", &payload, &key, Instant::now());
        assert_eq!(
            signals,
            vec![
                BridgeSignal::Live,
                BridgeSignal::Progress {
                    position: 10.0,
                    duration: None
                }
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_episode_progress_is_ignored() {
        let (_, mut bridge) = bridge();
        let key = ContentKey::episode("1399", 1, 2);
        bridge.render(1, VIDLINK, 0.0);
        let payload = json!({
            "type": "PLAYER_EVENT",
            "data": {"currentTime": 10, "season": 1, "episode": 3}
        });
        let signals = bridge.on_message("https://vidlink.pro", &payload, &key, Instant::now());
        // Still a sign of life, but no progress.
        assert_eq!(signals, vec![BridgeSignal::Live]);
        assert!(bridge.live_position(Instant::now()).is_some_and(|(_, s)| s == SampleSource::EmbedClock));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout_and_late_liveness() {
        let (_, mut bridge) = bridge();
        bridge.render(1, "https://zeta.example/embed/550", 0.0);
        assert!(matches!(
            bridge.check_load_timeout(),
            Some(SourceFailure::EmbedLoadTimeout(_))
        ));
        assert!(bridge.is_failed());
        assert!(bridge.check_load_timeout().is_none());

        assert_eq!(bridge.on_interaction(Instant::now()), Some(BridgeSignal::Live));
        bridge.revive();
        assert!(!bridge.is_failed());
        assert!(bridge.check_load_timeout().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_error() {
        let (_, mut bridge) = bridge();
        let key = ContentKey::movie("550");
        bridge.render(1, "https://vidlink.pro/movie/550", 0.0);
        bridge.on_loaded(Instant::now());
        let signals = bridge.on_message(
            "https://vidlink.pro",
            &json!({"type": "error", "message": "not found"}),
            &key,
            Instant::now(),
        );
        assert_eq!(
            signals,
            vec![BridgeSignal::Failure(SourceFailure::EmbedReported("not found".into()))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_fallback() {
        let (_, mut bridge) = bridge();
        bridge.render(1, "https://zeta.example/embed/550", 100.0);
        assert!(bridge.live_position(Instant::now()).is_none());

        bridge.on_loaded(Instant::now());
        tokio::time::advance(Duration::from_secs(30)).await;
        let (position, source) = bridge.live_position(Instant::now()).unwrap();
        assert_eq!(source, SampleSource::EmbedClock);
        assert!((position - 130.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_before_resume_point_is_held() {
        let (_, mut bridge) = bridge();
        let key = ContentKey::movie("550");
        bridge.render(1, "https://vidlink.pro/movie/550", 100.0);
        let message = |t: f64| json!({"type": "PLAYER_EVENT", "data": {"currentTime": t}});

        // The player posts its initial position before applying startAt.
        let signals = bridge.on_message("https://vidlink.pro", &message(0.0), &key, Instant::now());
        assert_eq!(signals, vec![BridgeSignal::Live]);
        let (position, source) = bridge.live_position(Instant::now()).unwrap();
        assert_eq!(source, SampleSource::EmbedClock);
        assert!((position - 100.0).abs() < 1e-6);

        let signals = bridge.on_message("https://vidlink.pro", &message(100.0), &key, Instant::now());
        assert_eq!(
            signals,
            vec![BridgeSignal::Progress {
                position: 100.0,
                duration: None
            }]
        );

        // Past the resume point, seeking back is reported as is.
        let signals = bridge.on_message("https://vidlink.pro", &message(12.0), &key, Instant::now());
        assert_eq!(signals.len(), 1);
        assert_eq!(
            bridge.live_position(Instant::now()),
            Some((12.0, SampleSource::EmbedMessage))
        );
    }

    #[test]
    fn test_origin_matching() {
        let embed = Url::parse("https://player.videasy.net/movie/550").ok();
        assert!(origin_matches(embed.as_ref(), "https://player.videasy.net"));
        assert!(origin_matches(embed.as_ref(), "https://videasy.net"));
        assert!(!origin_matches(embed.as_ref(), "http://player.videasy.net"));
        assert!(!origin_matches(embed.as_ref(), "https://notvideasy.net"));
        assert!(!origin_matches(embed.as_ref(), "null"));
    }
}
