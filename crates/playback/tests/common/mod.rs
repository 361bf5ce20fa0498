//! Test doubles shared by the player integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use playback_engine::native::{AttachmentId, LoadRequest, NativeEvent, NativeEventSender};
use playback_engine::stream_sources::{
    ContentDetails, ContentKey, ContentRef, EmbedProviderConfig, MetadataSource, ResolverConfig,
    SourceError, SourceResolver, StreamBackend, default_embed_providers,
};
use playback_engine::{
    ActorOutcome, EmbedSurface, MediaPipeline, PipelineError, PipelineFactory, PlayRequest,
    PlayerConfig, PlayerDeps, PlayerHandle, PlayerSnapshot, WatchHistory, WatchProgress,
    spawn_player,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const BASE: &str = "http://backend.test";

/// Stream backend answering from a fixed endpoint -> URL table; everything else is a 404.
#[derive(Default)]
pub struct FakeBackend {
    streams: HashMap<String, String>,
    hang: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn with_stream(endpoint: &str, url: &str) -> Self {
        let mut streams = HashMap::new();
        streams.insert(format!("{BASE}{endpoint}"), url.to_string());
        Self {
            streams,
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl StreamBackend for FakeBackend {
    async fn fetch_stream(&self, endpoint: &str) -> Result<String, SourceError> {
        self.calls.lock().push(endpoint.to_string());
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.streams.get(endpoint).cloned().ok_or_else(|| {
            SourceError::http_status(reqwest::StatusCode::NOT_FOUND, endpoint)
        })
    }
}

pub struct FakeMetadata(pub ContentDetails);

#[async_trait]
impl MetadataSource for FakeMetadata {
    async fn content_details(&self, _content: &ContentRef) -> Result<ContentDetails, SourceError> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct PipelineLog {
    pub created: Vec<NativeEventSender>,
    pub loads: Vec<LoadRequest>,
    pub destroyed: usize,
    pub current_time: f64,
    pub audio_track: Option<u32>,
    pub pip_requests: usize,
}

struct FakePipeline {
    log: Arc<Mutex<PipelineLog>>,
}

impl MediaPipeline for FakePipeline {
    fn load(&mut self, request: &LoadRequest) -> Result<(), PipelineError> {
        let mut log = self.log.lock();
        log.current_time = request.start_position.unwrap_or(0.0);
        log.loads.push(request.clone());
        Ok(())
    }

    fn start_load(&mut self, _position: Option<f64>) -> Result<(), PipelineError> {
        Ok(())
    }

    fn stop_load(&mut self) {}

    fn detach_media(&mut self) {}

    fn destroy(&mut self) {
        self.log.lock().destroyed += 1;
    }

    fn current_time(&self) -> f64 {
        self.log.lock().current_time
    }

    fn buffered_end(&self) -> f64 {
        self.log.lock().current_time + 10.0
    }

    fn duration(&self) -> Option<f64> {
        None
    }

    fn set_audio_track(&mut self, id: u32) -> Result<(), PipelineError> {
        self.log.lock().audio_track = Some(id);
        Ok(())
    }

    fn set_level(&mut self, _level: Option<usize>) -> Result<(), PipelineError> {
        Ok(())
    }

    fn request_picture_in_picture(&mut self) -> Result<(), PipelineError> {
        self.log.lock().pip_requests += 1;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakePipelines {
    pub log: Arc<Mutex<PipelineLog>>,
}

impl FakePipelines {
    /// Emit an event from the most recently created pipeline.
    pub fn emit(&self, event: NativeEvent) {
        let sender = self.log.lock().created.last().cloned();
        sender.expect("no pipeline created").send(event);
    }

    /// Emit an event from a specific attachment.
    pub fn emit_from(&self, attachment: AttachmentId, event: NativeEvent) {
        let sender = self
            .log
            .lock()
            .created
            .iter()
            .find(|s| s.attachment() == attachment)
            .cloned();
        sender.expect("unknown attachment").send(event);
    }

    /// Move the playhead and report it.
    pub fn play_to(&self, position: f64) {
        self.log.lock().current_time = position;
        self.emit(NativeEvent::TimeUpdate {
            current_time: position,
            duration: Some(8340.0),
            buffered_end: position + 10.0,
        });
    }

    pub fn created(&self) -> usize {
        self.log.lock().created.len()
    }

    pub fn destroyed(&self) -> usize {
        self.log.lock().destroyed
    }
}

impl PipelineFactory for FakePipelines {
    fn create(&self, events: NativeEventSender) -> Box<dyn MediaPipeline> {
        self.log.lock().created.push(events);
        Box::new(FakePipeline {
            log: self.log.clone(),
        })
    }
}

#[derive(Default)]
pub struct Frames {
    pub rendered: Vec<String>,
    pub unloads: usize,
}

#[derive(Clone, Default)]
pub struct FakeSurface {
    pub frames: Arc<Mutex<Frames>>,
}

impl FakeSurface {
    pub fn rendered(&self) -> Vec<String> {
        self.frames.lock().rendered.clone()
    }
}

impl EmbedSurface for FakeSurface {
    fn render(&mut self, url: &str) {
        self.frames.lock().rendered.push(url.to_string());
    }

    fn unload(&mut self) {
        self.frames.lock().unloads += 1;
    }
}

#[derive(Default)]
pub struct RecordingHistory {
    pub reports: Mutex<Vec<WatchProgress>>,
}

impl RecordingHistory {
    pub fn count(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn last(&self) -> Option<WatchProgress> {
        self.reports.lock().last().cloned()
    }
}

impl WatchHistory for RecordingHistory {
    fn record(&self, progress: WatchProgress) {
        self.reports.lock().push(progress);
    }
}

pub fn provider(id: &str, host: &str) -> EmbedProviderConfig {
    EmbedProviderConfig {
        id: id.to_string(),
        label: id.to_string(),
        movie_template: format!("https://{host}/embed/movie/{{id}}"),
        episode_template: format!("https://{host}/embed/tv/{{id}}/{{season}}/{{episode}}"),
        enabled: true,
    }
}

/// vidlink, then vidfast.
pub fn known_providers() -> Vec<EmbedProviderConfig> {
    default_embed_providers().into_iter().take(2).collect()
}

pub struct Harness {
    pub handle: PlayerHandle,
    pub join: JoinHandle<ActorOutcome>,
    pub backend: Arc<FakeBackend>,
    pub pipelines: FakePipelines,
    pub surface: FakeSurface,
    pub history: Arc<RecordingHistory>,
    pub token: CancellationToken,
}

pub struct HarnessBuilder {
    key: ContentKey,
    resume: Option<f64>,
    backend: FakeBackend,
    providers: Vec<EmbedProviderConfig>,
    metadata: Option<ContentDetails>,
}

impl HarnessBuilder {
    pub fn new(key: ContentKey) -> Self {
        Self {
            key,
            resume: None,
            backend: FakeBackend::empty(),
            providers: known_providers(),
            metadata: None,
        }
    }

    pub fn resume(mut self, at: f64) -> Self {
        self.resume = Some(at);
        self
    }

    pub fn backend(mut self, backend: FakeBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn providers(mut self, providers: Vec<EmbedProviderConfig>) -> Self {
        self.providers = providers;
        self
    }

    pub fn metadata(mut self, details: ContentDetails) -> Self {
        self.metadata = Some(details);
        self
    }

    pub fn start(self) -> Harness {
        let backend = Arc::new(self.backend);
        let resolver_config = ResolverConfig {
            base_url: BASE.to_string(),
            max_retries: 0,
            embed_providers: self.providers,
            ..ResolverConfig::default()
        };
        let resolver = Arc::new(SourceResolver::new(
            backend.clone(),
            Arc::new(resolver_config),
        ));
        let pipelines = FakePipelines::default();
        let surface = FakeSurface::default();
        let history = Arc::new(RecordingHistory::default());
        let token = CancellationToken::new();

        let deps = PlayerDeps {
            resolver,
            metadata: self
                .metadata
                .map(|d| Arc::new(FakeMetadata(d)) as Arc<dyn MetadataSource>),
            pipelines: Arc::new(pipelines.clone()),
            surface: Box::new(surface.clone()),
            history: history.clone(),
            warmer: None,
        };
        let (handle, join) = spawn_player(
            PlayRequest {
                key: self.key,
                initial_resume_time: self.resume,
            },
            deps,
            Arc::new(PlayerConfig::default()),
            token.clone(),
        );

        Harness {
            handle,
            join,
            backend,
            pipelines,
            surface,
            history,
            token,
        }
    }
}

impl Harness {
    /// Let the player drain everything that is ready.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    pub async fn wait_for(&self, what: &str, pred: impl Fn(&PlayerSnapshot) -> bool) -> PlayerSnapshot {
        let mut rx = self.handle.subscribe();
        let result = tokio::time::timeout(Duration::from_secs(120), rx.wait_for(|s| pred(s))).await;
        match result {
            Ok(Ok(snapshot)) => snapshot.clone(),
            _ => panic!("timed out waiting for {what}; last state: {:?}", self.handle.snapshot()),
        }
    }
}
