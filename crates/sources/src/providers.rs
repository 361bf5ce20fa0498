//! Embed provider table.
//!
//! Embed sources are built purely from URL templates; whether a provider can
//! actually play the title is only known once it is rendered.

use tracing::warn;

use crate::config::EmbedProviderConfig;
use crate::content::{ContentKey, MediaType};
use crate::error::{Result, SourceError};
use crate::source::Source;
use crate::template;

macro_rules! embed_providers {
    ( $( $id:literal => ($label:literal, $movie:literal, $episode:literal) ),+ $(,)? ) => {
        vec![
            $(
                EmbedProviderConfig {
                    id: $id.to_string(),
                    label: $label.to_string(),
                    movie_template: $movie.to_string(),
                    episode_template: $episode.to_string(),
                    enabled: true,
                },
            )+
        ]
    };
}

/// Built-in providers, in failover order.
pub fn default_embed_providers() -> Vec<EmbedProviderConfig> {
    embed_providers![
        "vidlink" => (
            "VidLink",
            "https://vidlink.pro/movie/{id}",
            "https://vidlink.pro/tv/{id}/{season}/{episode}"
        ),
        "vidfast" => (
            "VidFast",
            "https://vidfast.pro/movie/{id}",
            "https://vidfast.pro/tv/{id}/{season}/{episode}"
        ),
        "videasy" => (
            "Videasy",
            "https://player.videasy.net/movie/{id}",
            "https://player.videasy.net/tv/{id}/{season}/{episode}"
        ),
        "vidsrc" => (
            "VidSrc",
            "https://vidsrc.cc/v2/embed/movie/{id}",
            "https://vidsrc.cc/v2/embed/tv/{id}/{season}/{episode}"
        ),
    ]
}

/// Build the ordered embed sources for `key`.
///
/// Providers whose template cannot be filled are skipped; an empty result is
/// the terminal "unavailable" condition.
pub fn build_embed_sources(
    key: &ContentKey,
    providers: &[EmbedProviderConfig],
) -> Result<Vec<Source>> {
    key.validate()?;

    let sources: Vec<Source> = providers
        .iter()
        .filter(|provider| provider.enabled)
        .filter_map(|provider| {
            let template_str = match key.media_type() {
                MediaType::Movie => &provider.movie_template,
                MediaType::Tv => &provider.episode_template,
            };
            match template::fill(template_str, key, None) {
                Ok(url) => Some(Source::embed(&provider.id, url, &provider.label)),
                Err(e) => {
                    warn!(provider = %provider.id, error = %e, "Skipping embed provider");
                    None
                }
            }
        })
        .collect();

    if sources.is_empty() {
        return Err(SourceError::NoProviders(key.media_type()));
    }

    Ok(sources)
}
