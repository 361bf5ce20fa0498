use crate::{cli::OutputFormat, error::Result};
#[cfg(feature = "colored-output")]
use colored::*;
use playback_engine::WatchProgress;
use playback_engine::native::ManifestInfo;
use serde::Serialize;
use stream_sources::{ContentKey, ResolvedSources, SourceKind};

pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_sources(
        &self,
        key: &ContentKey,
        sources: &ResolvedSources,
        format: OutputFormat,
    ) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.format_sources_pretty(key, sources)),
            OutputFormat::Json => to_json(&sources.as_slice(), true),
            OutputFormat::JsonCompact => to_json(&sources.as_slice(), false),
        }
    }

    fn format_sources_pretty(&self, key: &ContentKey, sources: &ResolvedSources) -> String {
        let mut output = String::new();
        output.push_str(&self.colorize(&format!("Sources for {key}:"), &Color::Green, true));
        output.push('\n');

        for (index, source) in sources.iter().enumerate() {
            let kind = match source.kind {
                SourceKind::Native => self.colorize("native", &Color::Cyan, true),
                SourceKind::Embed => self.colorize("embed", &Color::Yellow, false),
            };
            output.push_str(&format!(
                "  [{}] {:<8} {:<10} {}\n",
                index,
                kind,
                source.label,
                self.colorize(&source.url, &Color::Blue, false)
            ));
        }

        if !sources.has_native() {
            output.push_str("  (no direct stream, embeds only)\n");
        }
        output
    }

    pub fn format_manifest(&self, info: &ManifestInfo, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.format_manifest_pretty(info)),
            OutputFormat::Json => to_json(info, true),
            OutputFormat::JsonCompact => to_json(info, false),
        }
    }

    fn format_manifest_pretty(&self, info: &ManifestInfo) -> String {
        let mut output = String::new();
        let kind = if info.is_master { "master" } else { "media" };
        output.push_str(&self.colorize(
            &format!("Manifest ({kind}):"),
            &Color::Green,
            true,
        ));
        output.push('\n');
        output.push_str(&format!(
            "  {}: {}\n",
            self.colorize("URL", &Color::Yellow, false),
            self.colorize(&info.url, &Color::Blue, false)
        ));

        if !info.levels.is_empty() {
            output.push_str(&format!(
                "  {}:\n",
                self.colorize("Levels", &Color::Yellow, false)
            ));
            for level in &info.levels {
                output.push_str(&format!(
                    "    [{}] {:<8} {} kbps\n",
                    level.index,
                    level.name,
                    level.bitrate / 1000
                ));
            }
        }

        if !info.audio_tracks.is_empty() {
            output.push_str(&format!(
                "  {}:\n",
                self.colorize("Audio", &Color::Yellow, false)
            ));
            for track in &info.audio_tracks {
                let default = if track.is_default { " (default)" } else { "" };
                output.push_str(&format!(
                    "    [{}] {} {}{}\n",
                    track.id,
                    track.name,
                    track.language.as_deref().unwrap_or("-"),
                    default
                ));
            }
        }

        output.push_str(&format!(
            "  {}: {}\n",
            self.colorize("Segments", &Color::Yellow, false),
            info.segment_count
        ));
        if let Some(total) = info.total_duration {
            output.push_str(&format!(
                "  {}: {}\n",
                self.colorize("Duration", &Color::Yellow, false),
                format_clock(total)
            ));
        }
        output
    }

    pub fn format_history(&self, entries: &[WatchProgress], format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.format_history_pretty(entries)),
            OutputFormat::Json => to_json(&entries, true),
            OutputFormat::JsonCompact => to_json(&entries, false),
        }
    }

    fn format_history_pretty(&self, entries: &[WatchProgress]) -> String {
        if entries.is_empty() {
            return "No watch history.\n".to_string();
        }

        let mut output = String::new();
        for entry in entries {
            let episode = match (entry.season, entry.episode) {
                (Some(s), Some(e)) => format!(" S{s:02}E{e:02}"),
                _ => String::new(),
            };
            output.push_str(&format!(
                "{}{}  {} / {} ({:.0}%)  {}\n",
                self.colorize(&entry.content.storage_key(), &Color::Cyan, true),
                episode,
                format_clock(entry.position_secs),
                format_clock(entry.duration_secs),
                entry.fraction() * 100.0,
                entry.updated_at.format("%Y-%m-%d %H:%M")
            ));
        }
        output
    }

    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {message}"), &Color::Green, false)
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }
}

enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
}

fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(Into::into)
}

/// `h:mm:ss`, or `m:ss` under an hour.
pub fn format_clock(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 { secs as u64 } else { 0 };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}
