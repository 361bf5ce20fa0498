//! Manifest probing: fetch an HLS playlist and describe what it offers.

use std::time::Duration;

use m3u8_rs::{AlternativeMediaType, MasterPlaylist, MediaPlaylist, Playlist, parse_playlist_res};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::pipeline::{AudioTrack, ErrorDetails, ErrorType, PipelineError, QualityLevel, SegmentRef};

/// What a manifest offers, as seen by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestInfo {
    pub url: String,
    pub is_master: bool,
    pub levels: Vec<QualityLevel>,
    pub audio_tracks: Vec<AudioTrack>,
    /// Segments of the selected media playlist.
    #[serde(skip)]
    pub segments: Vec<SegmentRef>,
    pub segment_count: usize,
    /// Sum of segment durations, when the playlist is complete.
    pub total_duration: Option<f64>,
    pub target_duration: Option<f64>,
}

/// A parsed playlist before any follow-up request.
#[derive(Debug)]
pub enum ParsedPlaylist {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
}

pub fn parse_playlist(bytes: &[u8]) -> Result<ParsedPlaylist, PipelineError> {
    match parse_playlist_res(bytes) {
        Ok(Playlist::MasterPlaylist(pl)) => Ok(ParsedPlaylist::Master(pl)),
        Ok(Playlist::MediaPlaylist(pl)) => Ok(ParsedPlaylist::Media(pl)),
        Err(e) => Err(PipelineError::new(
            ErrorType::Network,
            ErrorDetails::ManifestParsingError,
            true,
            format!("failed to parse playlist: {e}"),
        )),
    }
}

/// Quality levels of a master playlist, highest bitrate first. I-frame variants are skipped.
pub fn quality_levels(master: &MasterPlaylist) -> Vec<QualityLevel> {
    let mut variants: Vec<_> = master.variants.iter().filter(|v| !v.is_i_frame).collect();
    variants.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));
    variants
        .into_iter()
        .enumerate()
        .map(|(index, v)| {
            let height = v.resolution.map(|r| r.height as u32);
            let name = match height {
                Some(h) => format!("{h}p"),
                None => format!("{} kbps", v.bandwidth / 1000),
            };
            QualityLevel {
                index,
                height,
                bitrate: v.bandwidth,
                name,
            }
        })
        .collect()
}

pub fn audio_tracks(master: &MasterPlaylist) -> Vec<AudioTrack> {
    master
        .alternatives
        .iter()
        .filter(|a| a.media_type == AlternativeMediaType::Audio)
        .enumerate()
        .map(|(id, a)| AudioTrack {
            id: id as u32,
            name: a.name.clone(),
            language: a.language.clone(),
            is_default: a.default,
        })
        .collect()
}

pub fn segments(media: &MediaPlaylist, base: &Url) -> Vec<SegmentRef> {
    media
        .segments
        .iter()
        .enumerate()
        .map(|(i, s)| SegmentRef {
            sn: media.media_sequence + i as u64,
            uri: base
                .join(&s.uri)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| s.uri.clone()),
            duration: s.duration as f64,
        })
        .collect()
}

/// Fetches a manifest and, for master playlists, the top level's media playlist.
pub struct ManifestLoader {
    client: Client,
    timeout: Duration,
}

impl ManifestLoader {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn load(&self, url: &str) -> Result<ManifestInfo, PipelineError> {
        let manifest_url = Url::parse(url)
            .map_err(|e| PipelineError::manifest_load(None, format!("invalid url {url}: {e}")))?;

        let body = self
            .fetch(&manifest_url, ErrorDetails::ManifestLoadError, ErrorDetails::ManifestLoadTimeout)
            .await?;

        match parse_playlist(&body)? {
            ParsedPlaylist::Media(media) => {
                debug!(url, segments = media.segments.len(), "Loaded media playlist");
                Ok(describe(url, false, Vec::new(), Vec::new(), &media, &manifest_url))
            }
            ParsedPlaylist::Master(master) => {
                let levels = quality_levels(&master);
                let tracks = audio_tracks(&master);
                let top = master
                    .variants
                    .iter()
                    .filter(|v| !v.is_i_frame)
                    .max_by_key(|v| v.bandwidth)
                    .ok_or_else(|| {
                        PipelineError::new(
                            ErrorType::Network,
                            ErrorDetails::ManifestParsingError,
                            true,
                            "master playlist has no variants",
                        )
                    })?;
                let level_url = manifest_url
                    .join(&top.uri)
                    .map_err(|e| PipelineError::level_load(None, e.to_string()))?;
                debug!(url, level = %level_url, levels = levels.len(), "Loaded master playlist");

                let body = self
                    .fetch(&level_url, ErrorDetails::LevelLoadError, ErrorDetails::LevelLoadTimeout)
                    .await?;
                match parse_playlist(&body)? {
                    ParsedPlaylist::Media(media) => {
                        Ok(describe(url, true, levels, tracks, &media, &level_url))
                    }
                    ParsedPlaylist::Master(_) => Err(PipelineError::new(
                        ErrorType::Network,
                        ErrorDetails::ManifestParsingError,
                        true,
                        "nested master playlist",
                    )),
                }
            }
        }
    }

    async fn fetch(
        &self,
        url: &Url,
        failed: ErrorDetails,
        timed_out: ErrorDetails,
    ) -> Result<bytes::Bytes, PipelineError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                let details = if e.is_timeout() { timed_out } else { failed };
                PipelineError::new(ErrorType::Network, details, true, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::new(
                ErrorType::Network,
                failed,
                true,
                format!("{url} returned HTTP {status}"),
            )
            .with_response(status.as_u16()));
        }

        response
            .bytes()
            .await
            .map_err(|e| PipelineError::new(ErrorType::Network, failed, true, e.to_string()))
    }
}

fn describe(
    url: &str,
    is_master: bool,
    levels: Vec<QualityLevel>,
    audio_tracks: Vec<AudioTrack>,
    media: &MediaPlaylist,
    base: &Url,
) -> ManifestInfo {
    let segments = segments(media, base);
    let total_duration = media
        .end_list
        .then(|| segments.iter().map(|s| s.duration).sum::<f64>());
    ManifestInfo {
        url: url.to_string(),
        is_master,
        levels,
        audio_tracks,
        segment_count: segments.len(),
        segments,
        total_duration,
        target_duration: Some(media.target_duration as f64),
    }
}
