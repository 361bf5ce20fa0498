use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::content::ContentKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Adaptive-stream manifest played through an owned media pipeline.
    Native,
    /// Third-party iframe player.
    Embed,
}

/// One candidate way to play the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub kind: SourceKind,
    /// Absolute URL. Embed URLs are rewritten per switch to carry a resume time.
    pub url: String,
    /// Display name only.
    pub label: String,
    /// Embed provider id from the provider table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Source {
    pub fn native(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Native,
            url: url.into(),
            label: label.into(),
            provider: None,
        }
    }

    pub fn embed(
        provider: impl Into<String>,
        url: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            kind: SourceKind::Embed,
            url: url.into(),
            label: label.into(),
            provider: Some(provider.into()),
        }
    }

    pub fn is_native(&self) -> bool {
        self.kind == SourceKind::Native
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} - {} ({})", self.kind, self.label, self.url)
    }
}

/// Sources resolved for one content key.
///
/// The list is shared and never mutated; a different key means a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSources {
    key: ContentKey,
    sources: Arc<[Source]>,
}

impl ResolvedSources {
    pub fn new(key: ContentKey, sources: Vec<Source>) -> Self {
        Self {
            key,
            sources: sources.into(),
        }
    }

    pub fn key(&self) -> &ContentKey {
        &self.key
    }

    pub fn get(&self, index: usize) -> Option<&Source> {
        self.sources.get(index)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn has_native(&self) -> bool {
        self.sources.iter().any(Source::is_native)
    }

    pub fn as_slice(&self) -> &[Source] {
        &self.sources
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }
}
