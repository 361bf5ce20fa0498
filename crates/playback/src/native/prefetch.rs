// Segment prefetch for the native engine.
//
// When the pipeline reports a fragment as loaded, the prefetcher decides which of the
// following segments to warm so the next fragment request is served from cache. All
// warm-up work hangs off one cancellation token so a teardown stops it at once.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use moka::sync::Cache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::pipeline::{ErrorDetails, ErrorType, PipelineError, SegmentRef};

/// Configuration for segment prefetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Enable/disable prefetching.
    pub enabled: bool,
    /// Number of segments to prefetch ahead.
    pub prefetch_count: usize,
    /// Skip prefetching when this many seconds are already buffered ahead of the playhead.
    pub max_buffer_ahead_secs: f64,
    /// Maximum number of warmed segments kept in memory.
    pub cache_capacity: u64,
    /// Time-to-live of a warmed segment.
    pub cache_ttl_secs: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefetch_count: 2,
            max_buffer_ahead_secs: 30.0,
            cache_capacity: 16,
            cache_ttl_secs: 60,
        }
    }
}

/// Fetches a segment so it is warm when the pipeline asks for it.
#[async_trait]
pub trait SegmentWarmer: Send + Sync {
    async fn warm(&self, uri: &str) -> Result<Bytes, PipelineError>;
}

/// Warms segments with a plain GET.
pub struct HttpSegmentWarmer {
    client: Client,
}

impl HttpSegmentWarmer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn frag_error(reason: impl Into<String>) -> PipelineError {
    PipelineError::new(ErrorType::Network, ErrorDetails::FragLoadError, false, reason)
}

#[async_trait]
impl SegmentWarmer for HttpSegmentWarmer {
    async fn warm(&self, uri: &str) -> Result<Bytes, PipelineError> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| frag_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(frag_error(format!("segment request returned {status}"))
                .with_response(status.as_u16()));
        }
        response.bytes().await.map_err(|e| frag_error(e.to_string()))
    }
}

/// Tracks which segments are pending or done and warms the next few.
///
/// Owned by one pipeline attachment. Dropping it cancels all outstanding work.
pub struct SegmentPrefetcher {
    config: PrefetchConfig,
    segments: Vec<SegmentRef>,
    pending: HashSet<u64>,
    completed: HashSet<u64>,
    cache: Cache<String, Bytes>,
    warmer: Option<Arc<dyn SegmentWarmer>>,
    token: CancellationToken,
}

impl SegmentPrefetcher {
    pub fn new(
        config: PrefetchConfig,
        warmer: Option<Arc<dyn SegmentWarmer>>,
        parent: &CancellationToken,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();
        Self {
            config,
            segments: Vec::new(),
            pending: HashSet::new(),
            completed: HashSet::new(),
            cache,
            warmer,
            token: parent.child_token(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Replace the known segment list after a level (re)load.
    pub fn set_segments(&mut self, segments: Vec<SegmentRef>) {
        if let Some(first) = segments.first() {
            let min_sn = first.sn;
            self.completed.retain(|&sn| sn >= min_sn);
            self.pending.retain(|&sn| sn >= min_sn);
        }
        self.segments = segments;
    }

    /// Which segments to warm after `completed_sn` finished loading.
    ///
    /// Nothing is returned when prefetch is disabled or enough is buffered already.
    pub fn prefetch_targets(&mut self, completed_sn: u64, buffer_ahead: f64) -> Vec<SegmentRef> {
        self.mark_completed(completed_sn);

        if !self.config.enabled {
            return Vec::new();
        }

        if buffer_ahead >= self.config.max_buffer_ahead_secs {
            debug!(
                buffer_ahead,
                max_buffer_ahead = self.config.max_buffer_ahead_secs,
                "Skipping prefetch due to buffer pressure"
            );
            return Vec::new();
        }

        let targets: Vec<SegmentRef> = self
            .segments
            .iter()
            .filter(|s| s.sn > completed_sn)
            .filter(|s| !self.pending.contains(&s.sn) && !self.completed.contains(&s.sn))
            .take(self.config.prefetch_count)
            .cloned()
            .collect();

        for target in &targets {
            self.pending.insert(target.sn);
        }

        if !targets.is_empty() {
            debug!(
                completed_sn,
                targets = ?targets.iter().map(|s| s.sn).collect::<Vec<_>>(),
                "Generated prefetch targets"
            );
        }

        targets
    }

    /// Compute targets and start warming them in the background.
    pub fn on_fragment_loaded(&mut self, sn: u64, buffer_ahead: f64) -> usize {
        let targets = self.prefetch_targets(sn, buffer_ahead);
        let Some(warmer) = self.warmer.clone() else {
            return 0;
        };
        // Warm-up needs a runtime; without one the targets are only bookkept.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return 0;
        };

        for target in &targets {
            let warmer = warmer.clone();
            let cache = self.cache.clone();
            let token = self.token.clone();
            let uri = target.uri.clone();
            let sn = target.sn;
            runtime.spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        trace!(sn, "Prefetch cancelled");
                    }
                    result = warmer.warm(&uri) => match result {
                        Ok(bytes) => {
                            trace!(sn, len = bytes.len(), "Segment warmed");
                            cache.insert(uri, bytes);
                        }
                        Err(e) => debug!(sn, error = %e, "Segment prefetch failed"),
                    },
                }
            });
        }
        targets.len()
    }

    pub fn mark_completed(&mut self, sn: u64) {
        self.pending.remove(&sn);
        self.completed.insert(sn);
    }

    pub fn is_pending(&self, sn: u64) -> bool {
        self.pending.contains(&sn)
    }

    pub fn cached(&self, uri: &str) -> Option<Bytes> {
        self.cache.get(uri)
    }

    /// Stop outstanding warm-ups and drop cached data.
    pub fn shutdown(&mut self) {
        self.token.cancel();
        self.cache.invalidate_all();
        self.pending.clear();
        self.completed.clear();
        self.segments.clear();
    }
}

impl Drop for SegmentPrefetcher {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
