//! SourceResolver: content key -> ordered playback sources.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::StreamBackend;
use crate::config::ResolverConfig;
use crate::content::{ContentKey, MediaType};
use crate::error::{Result, SourceError};
use crate::providers::build_embed_sources;
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};
use crate::source::{ResolvedSources, Source};
use crate::template;

pub struct SourceResolver {
    backend: Arc<dyn StreamBackend>,
    config: Arc<ResolverConfig>,
    policy: RetryPolicy,
}

impl SourceResolver {
    pub fn new(backend: Arc<dyn StreamBackend>, config: Arc<ResolverConfig>) -> Self {
        let policy = config.retry_policy();
        Self {
            backend,
            config,
            policy,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve the ordered source list for `key`.
    ///
    /// A missing native stream is not an error; the list then holds embeds only.
    /// Fails with an "unavailable" error when no embed can be constructed, and with
    /// [`SourceError::Cancelled`] when `token` fires.
    pub async fn resolve(
        &self,
        key: &ContentKey,
        token: &CancellationToken,
    ) -> Result<ResolvedSources> {
        let embeds = build_embed_sources(key, &self.config.embed_providers).map_err(|e| {
            warn!(key = %key, error = %e, "No sources can be constructed");
            SourceError::unavailable(e.to_string())
        })?;

        let native = self.resolve_native(key, token).await?;

        let mut sources = Vec::with_capacity(embeds.len() + 1);
        if let Some(native) = native {
            sources.push(native);
        }
        sources.extend(embeds);

        info!(
            key = %key,
            count = sources.len(),
            native = sources.first().is_some_and(Source::is_native),
            "Resolved sources"
        );

        Ok(ResolvedSources::new(key.clone(), sources))
    }

    async fn resolve_native(
        &self,
        key: &ContentKey,
        token: &CancellationToken,
    ) -> Result<Option<Source>> {
        let endpoints = match key.media_type() {
            MediaType::Movie => &self.config.movie_endpoints,
            MediaType::Tv => &self.config.episode_endpoints,
        };
        let attempt_timeout = self.config.request_timeout();

        for template_str in endpoints {
            let endpoint = match template::fill(template_str, key, Some(&self.config.base_url)) {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    warn!(error = %e, "Skipping stream endpoint");
                    continue;
                }
            };

            let backend = Arc::clone(&self.backend);
            let outcome = retry_with_backoff(&self.policy, token, |attempt| {
                let backend = Arc::clone(&backend);
                let endpoint = endpoint.clone();
                async move {
                    debug!(endpoint = %endpoint, attempt, "Stream lookup attempt");
                    attempt_once(backend.as_ref(), &endpoint, attempt_timeout).await
                }
            })
            .await;

            match outcome {
                Ok(url) => {
                    info!(endpoint = %endpoint, "Native stream found");
                    return Ok(Some(Source::native(url, &self.config.native_label)));
                }
                Err(SourceError::Cancelled) => return Err(SourceError::Cancelled),
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Stream endpoint exhausted");
                }
            }
        }

        debug!(key = %key, "No native stream, falling back to embeds only");
        Ok(None)
    }
}

async fn attempt_once(
    backend: &dyn StreamBackend,
    endpoint: &str,
    timeout: Duration,
) -> RetryAction<String> {
    match tokio::time::timeout(timeout, backend.fetch_stream(endpoint)).await {
        Ok(Ok(url)) => RetryAction::Success(url),
        Ok(Err(e)) if e.is_retryable() => RetryAction::Retry(e),
        Ok(Err(e)) => RetryAction::Fail(e),
        Err(_) => RetryAction::Retry(SourceError::Timeout {
            url: endpoint.to_string(),
            timeout,
        }),
    }
}
