//! Resolver configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::providers::default_embed_providers;
use crate::retry::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// One third-party embed provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedProviderConfig {
    /// Stable identifier, e.g. `vidlink`.
    pub id: String,
    pub label: String,
    /// Template with `{id}`.
    pub movie_template: String,
    /// Template with `{id}`, `{season}` and `{episode}`.
    pub episode_template: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Base URL of the metadata/stream backend, substituted for `{base}`.
    pub base_url: String,
    /// Stream endpoints tried in order for movies.
    pub movie_endpoints: Vec<String>,
    /// Stream endpoints tried in order for episodes.
    pub episode_endpoints: Vec<String>,
    pub movie_details_endpoint: String,
    pub tv_details_endpoint: String,
    /// Additional attempts per endpoint.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter: bool,
    /// Bound on a single attempt.
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Label given to the native source.
    pub native_label: String,
    /// Ordered embed providers appended after the native source.
    pub embed_providers: Vec<EmbedProviderConfig>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3001".to_string(),
            movie_endpoints: vec![
                "{base}/api/stream/movie/{id}".to_string(),
                "{base}/api/movies/{id}/stream".to_string(),
            ],
            episode_endpoints: vec![
                "{base}/api/stream/tv/{id}/{season}/{episode}".to_string(),
                "{base}/api/tv/{id}/season/{season}/episode/{episode}/stream".to_string(),
            ],
            movie_details_endpoint: "{base}/api/movie/{id}".to_string(),
            tv_details_endpoint: "{base}/api/tv/{id}".to_string(),
            max_retries: 2,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 8_000,
            retry_jitter: false,
            request_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            native_label: "Direct".to_string(),
            embed_providers: default_embed_providers(),
        }
    }
}

impl ResolverConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter: self.retry_jitter,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: ResolverConfig =
            serde_json::from_str(r#"{"base_url": "https://api.example", "max_retries": 4}"#)
                .unwrap();
        assert_eq!(config.base_url, "https://api.example");
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(!config.embed_providers.is_empty());
        assert_eq!(config.retry_policy().base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_provider_enabled_defaults_to_true() {
        let provider: EmbedProviderConfig = serde_json::from_str(
            r#"{"id":"x","label":"X","movie_template":"https://x/{id}","episode_template":"https://x/{id}/{season}/{episode}"}"#,
        )
        .unwrap();
        assert!(provider.enabled);
    }
}
