//! Source resolution for the playback core.
//!
//! Given a content key (`id`, media type and, for episodes, season/episode), the
//! [`SourceResolver`] produces an ordered, immutable list of playback candidates:
//!
//! - at most one [`SourceKind::Native`] source, an HLS manifest URL obtained from the
//!   stream backend with per-endpoint retry and timeout;
//! - a fixed list of [`SourceKind::Embed`] sources built from provider URL templates,
//!   which never require a network round trip.
//!
//! Resolution degrades to embed-only sources when the backend has nothing to offer
//! and only fails with [`SourceError::Unavailable`] when no embed can be built.

pub mod backend;
pub mod config;
pub mod content;
pub mod error;
pub mod providers;
pub mod resolver;
pub mod retry;
pub mod source;
mod template;

pub use backend::{
    ContentDetails, HttpStreamBackend, MetadataSource, SeasonSummary, StreamBackend,
    default_client,
};
pub use config::{EmbedProviderConfig, ResolverConfig};
pub use content::{ContentKey, ContentRef, MediaType};
pub use error::{Result, SourceError};
pub use providers::{build_embed_sources, default_embed_providers};
pub use resolver::SourceResolver;
pub use retry::{RetryAction, RetryPolicy, retry_with_backoff};
pub use source::{ResolvedSources, Source, SourceKind};
