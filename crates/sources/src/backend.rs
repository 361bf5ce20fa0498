//! Metadata/stream backend client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use rustls::ClientConfig;
use rustls_platform_verifier::BuilderVerifierExt;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::ResolverConfig;
use crate::content::{ContentKey, ContentRef, MediaType};
use crate::error::{Result, SourceError};
use crate::template;

/// Looks up a direct stream URL from one backend endpoint.
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// Perform a single request against `endpoint` and return the stream URL.
    async fn fetch_stream(&self, endpoint: &str) -> Result<String>;
}

/// Read-only content details used for duration and episode navigation.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn content_details(&self, content: &ContentRef) -> Result<ContentDetails>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonSummary {
    pub season_number: u32,
    pub episode_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentDetails {
    /// Movie runtime in minutes.
    #[serde(default, alias = "runtime")]
    pub runtime_minutes: Option<u32>,
    /// Typical episode runtimes in minutes.
    #[serde(default, alias = "episode_run_time")]
    pub episode_runtimes: Vec<u32>,
    #[serde(default)]
    pub seasons: Vec<SeasonSummary>,
}

impl ContentDetails {
    /// Runtime in seconds for the given key, if the metadata has one.
    pub fn runtime_secs(&self, key: &ContentKey) -> Option<f64> {
        let minutes = match key.media_type() {
            MediaType::Movie => self.runtime_minutes,
            MediaType::Tv => self
                .episode_runtimes
                .iter()
                .copied()
                .find(|m| *m > 0)
                .or(self.runtime_minutes),
        };
        minutes.filter(|m| *m > 0).map(|m| f64::from(m) * 60.0)
    }

    /// The episode after `(season, episode)`, rolling over into the next regular
    /// season. Specials (season 0) are never entered from another season.
    pub fn next_episode(&self, season: u32, episode: u32) -> Option<(u32, u32)> {
        let current = self.seasons.iter().find(|s| s.season_number == season)?;
        if episode < current.episode_count {
            return Some((season, episode + 1));
        }

        self.seasons
            .iter()
            .filter(|s| s.season_number > season && s.season_number > 0 && s.episode_count > 0)
            .min_by_key(|s| s.season_number)
            .map(|s| (s.season_number, 1))
    }
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    stream: Option<StreamPayload>,
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    url: Option<String>,
}

/// Parse a backend body of the form `{ "stream": { "url": ... } }`.
///
/// The URL must be absolute http(s).
pub(crate) fn parse_stream_body(endpoint: &str, body: &[u8]) -> Result<String> {
    let response: StreamResponse = serde_json::from_slice(body)
        .map_err(|e| SourceError::malformed(endpoint, e.to_string()))?;

    let raw = response
        .stream
        .and_then(|s| s.url)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| SourceError::NoStream(endpoint.to_string()))?;

    let parsed = Url::parse(&raw).map_err(|e| SourceError::malformed(endpoint, e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(SourceError::malformed(
            endpoint,
            format!("unsupported stream scheme `{other}`"),
        )),
    }
}

/// Build the HTTP client with the platform certificate verifier.
pub fn default_client(config: &ResolverConfig) -> Result<Client> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| SourceError::Client(e.to_string()))?
        .with_platform_verifier()
        .map_err(|e| SourceError::Client(e.to_string()))?
        .with_no_client_auth();

    Client::builder()
        .use_preconfigured_tls(tls_config)
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout())
        .build()
        .map_err(SourceError::from)
}

/// `reqwest`-backed implementation of [`StreamBackend`] and [`MetadataSource`].
#[derive(Debug, Clone)]
pub struct HttpStreamBackend {
    client: Client,
    config: Arc<ResolverConfig>,
}

impl HttpStreamBackend {
    pub fn new(client: Client, config: Arc<ResolverConfig>) -> Self {
        Self { client, config }
    }

    pub fn from_config(config: Arc<ResolverConfig>) -> Result<Self> {
        let client = default_client(&config)?;
        Ok(Self::new(client, config))
    }

    async fn get_bytes(&self, url: &str) -> Result<bytes::Bytes> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.request_timeout())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout {
                        url: url.to_string(),
                        timeout: self.config.request_timeout(),
                    }
                } else {
                    SourceError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::http_status(status, url));
        }

        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl StreamBackend for HttpStreamBackend {
    async fn fetch_stream(&self, endpoint: &str) -> Result<String> {
        debug!(endpoint, "Requesting stream url");
        let body = self.get_bytes(endpoint).await?;
        parse_stream_body(endpoint, &body)
    }
}

#[async_trait]
impl MetadataSource for HttpStreamBackend {
    async fn content_details(&self, content: &ContentRef) -> Result<ContentDetails> {
        let template_str = match content.media_type {
            MediaType::Movie => &self.config.movie_details_endpoint,
            MediaType::Tv => &self.config.tv_details_endpoint,
        };
        let key = ContentKey {
            content: content.clone(),
            season: None,
            episode: None,
        };
        let url = template::fill(template_str, &key, Some(&self.config.base_url))?;
        let body = self.get_bytes(&url).await?;
        serde_json::from_slice(&body).map_err(|e| SourceError::malformed(url, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_body() {
        let url = parse_stream_body(
            "e",
            br#"{"stream":{"url":"https://cdn.example/hls/master.m3u8"}}"#,
        )
        .unwrap();
        assert_eq!(url, "https://cdn.example/hls/master.m3u8");
    }

    #[test]
    fn test_parse_stream_body_rejects_unusable_urls() {
        assert!(matches!(
            parse_stream_body("e", br#"{"stream":{"url":""}}"#),
            Err(SourceError::NoStream(_))
        ));
        assert!(matches!(
            parse_stream_body("e", br#"{"stream":null}"#),
            Err(SourceError::NoStream(_))
        ));
        assert!(matches!(
            parse_stream_body("e", br#"{"stream":{"url":"/relative.m3u8"}}"#),
            Err(SourceError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_stream_body("e", br#"{"stream":{"url":"ftp://x/a.m3u8"}}"#),
            Err(SourceError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_stream_body("e", b"<html>"),
            Err(SourceError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_details_deserialize_tmdb_shape() {
        let details: ContentDetails = serde_json::from_str(
            r#"{"episode_run_time":[0, 57],"seasons":[{"season_number":0,"episode_count":4},{"season_number":1,"episode_count":10},{"season_number":2,"episode_count":10}]}"#,
        )
        .unwrap();
        let key = ContentKey::episode("1399", 1, 1);
        assert_eq!(details.runtime_secs(&key), Some(57.0 * 60.0));

        let movie: ContentDetails = serde_json::from_str(r#"{"runtime":139}"#).unwrap();
        assert_eq!(movie.runtime_secs(&ContentKey::movie("550")), Some(8340.0));
        let zero: ContentDetails = serde_json::from_str(r#"{"runtime":0}"#).unwrap();
        assert_eq!(zero.runtime_secs(&ContentKey::movie("550")), None);
    }

    #[test]
    fn test_next_episode_navigation() {
        let details = ContentDetails {
            seasons: vec![
                SeasonSummary { season_number: 0, episode_count: 3 },
                SeasonSummary { season_number: 1, episode_count: 2 },
                SeasonSummary { season_number: 2, episode_count: 8 },
            ],
            ..Default::default()
        };
        assert_eq!(details.next_episode(1, 1), Some((1, 2)));
        assert_eq!(details.next_episode(1, 2), Some((2, 1)));
        assert_eq!(details.next_episode(2, 8), None);
        assert_eq!(details.next_episode(0, 3), Some((1, 1)));
        assert_eq!(details.next_episode(7, 1), None);
    }
}
