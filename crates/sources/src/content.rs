//! Content identity: what is being played.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

// Numeric TMDB ids or IMDb `tt` ids.
static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+|tt\d{5,})$").expect("valid id regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" | "film" => Ok(MediaType::Movie),
            "tv" | "show" | "series" | "episode" => Ok(MediaType::Tv),
            other => Err(SourceError::InvalidKey(format!("unknown media type `{other}`"))),
        }
    }
}

/// A title in the metadata catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub id: String,
    pub media_type: MediaType,
}

impl ContentRef {
    pub fn new(id: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            id: id.into(),
            media_type,
        }
    }

    /// Key used by the watch-history store, e.g. `movie-550` or `tv-1399`.
    pub fn storage_key(&self) -> String {
        format!("{}-{}", self.media_type, self.id)
    }
}

/// The identifying key of a playback session.
///
/// Any change to one of these fields invalidates the resolved sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    pub content: ContentRef,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl ContentKey {
    pub fn movie(id: impl Into<String>) -> Self {
        Self {
            content: ContentRef::new(id, MediaType::Movie),
            season: None,
            episode: None,
        }
    }

    pub fn episode(id: impl Into<String>, season: u32, episode: u32) -> Self {
        Self {
            content: ContentRef::new(id, MediaType::Tv),
            season: Some(season),
            episode: Some(episode),
        }
    }

    pub fn id(&self) -> &str {
        &self.content.id
    }

    pub fn media_type(&self) -> MediaType {
        self.content.media_type
    }

    /// Same show, another episode.
    pub fn with_episode(&self, season: u32, episode: u32) -> Self {
        Self {
            content: self.content.clone(),
            season: Some(season),
            episode: Some(episode),
        }
    }

    pub fn validate(&self) -> Result<(), SourceError> {
        if !ID_REGEX.is_match(self.id()) {
            return Err(SourceError::InvalidId(self.id().to_string()));
        }

        match self.media_type() {
            MediaType::Movie => {
                if self.season.is_some() || self.episode.is_some() {
                    return Err(SourceError::InvalidKey(format!(
                        "movie {} must not carry season/episode",
                        self.id()
                    )));
                }
            }
            MediaType::Tv => match (self.season, self.episode) {
                (Some(_), Some(episode)) if episode >= 1 => {}
                _ => {
                    return Err(SourceError::InvalidKey(format!(
                        "tv {} requires a season and an episode >= 1",
                        self.id()
                    )));
                }
            },
        }

        Ok(())
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.season, self.episode) {
            (Some(season), Some(episode)) => write!(
                f,
                "{} {} S{:02}E{:02}",
                self.media_type(),
                self.id(),
                season,
                episode
            ),
            _ => write!(f, "{} {}", self.media_type(), self.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_parsing() {
        assert_eq!("movie".parse::<MediaType>().unwrap(), MediaType::Movie);
        assert_eq!("Episode".parse::<MediaType>().unwrap(), MediaType::Tv);
        assert!("podcast".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_key_validation() {
        assert!(ContentKey::movie("550").validate().is_ok());
        assert!(ContentKey::movie("tt0137523").validate().is_ok());
        assert!(ContentKey::episode("1399", 1, 1).validate().is_ok());
        assert!(ContentKey::episode("1399", 0, 3).validate().is_ok());

        assert!(ContentKey::movie("").validate().is_err());
        assert!(ContentKey::movie("../etc").validate().is_err());
        assert!(ContentKey::episode("1399", 1, 0).validate().is_err());

        let mut key = ContentKey::episode("1399", 1, 1);
        key.season = None;
        assert!(key.validate().is_err());

        let mut movie = ContentKey::movie("550");
        movie.episode = Some(2);
        assert!(movie.validate().is_err());
    }

    #[test]
    fn test_display_and_storage_key() {
        let key = ContentKey::episode("1399", 2, 5);
        assert_eq!(key.to_string(), "tv 1399 S02E05");
        assert_eq!(key.content.storage_key(), "tv-1399");
        assert_eq!(ContentKey::movie("550").to_string(), "movie 550");
    }
}
