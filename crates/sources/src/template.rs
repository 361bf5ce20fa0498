use std::sync::LazyLock;

use regex::Regex;

use crate::content::ContentKey;
use crate::error::{Result, SourceError};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[a-z_]+\}").expect("valid placeholder regex"));

/// Fill `{base}`, `{id}`, `{type}`, `{season}` and `{episode}` in a URL template.
///
/// Fails when a placeholder is left over, e.g. `{season}` for a movie key.
pub(crate) fn fill(template: &str, key: &ContentKey, base: Option<&str>) -> Result<String> {
    let mut out = template.replace("{id}", key.id());
    out = out.replace("{type}", key.media_type().as_str());
    if let Some(base) = base {
        out = out.replace("{base}", base.trim_end_matches('/'));
    }
    if let Some(season) = key.season {
        out = out.replace("{season}", &season.to_string());
    }
    if let Some(episode) = key.episode {
        out = out.replace("{episode}", &episode.to_string());
    }

    if let Some(leftover) = PLACEHOLDER.find(&out) {
        return Err(SourceError::InvalidTemplate {
            template: template.to_string(),
            reason: format!("unfilled placeholder {}", leftover.as_str()),
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_episode_template() {
        let key = ContentKey::episode("1399", 3, 9);
        let url = fill("{base}/api/stream/tv/{id}/{season}/{episode}", &key, Some("http://api/"))
            .unwrap();
        assert_eq!(url, "http://api/api/stream/tv/1399/3/9");
    }

    #[test]
    fn test_fill_rejects_leftover_placeholder() {
        let key = ContentKey::movie("550");
        assert!(fill("https://x/tv/{id}/{season}", &key, None).is_err());
        assert!(fill("{base}/movie/{id}", &key, None).is_err());
    }
}
