use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;
use stream_sources::{ContentKey, MediaType};

use crate::error::{CliError, Result};

#[derive(Parser)]
#[command(
    name = "reel",
    version,
    about = "Resolve playback sources, probe HLS manifests and inspect watch history",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "REEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Stream backend base URL, overriding the configuration
    #[arg(long, global = true, env = "REEL_BACKEND")]
    pub backend: Option<String>,

    /// Request timeout in seconds, overriding the configuration
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the ordered source list for a movie or an episode
    Sources {
        #[command(flatten)]
        content: ContentArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Fetch an HLS manifest and list its levels and audio tracks
    Probe {
        /// Manifest URL
        url: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Print an embed URL carrying a resume offset
    EmbedUrl {
        /// Embed URL as built from the provider template
        url: String,

        /// Resume position in seconds
        #[arg(short, long, default_value_t = 0.0)]
        at: f64,
    },

    /// Inspect or edit stored watch progress
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Show or reset configuration
    Config {
        /// Show current configuration
        #[arg(long, conflicts_with = "reset")]
        show: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List entries, most recent first
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },
    /// Remove the entry for one title
    Remove {
        /// Content id
        id: String,

        /// Media type
        #[arg(short = 't', long = "type", value_enum, default_value = "movie")]
        media_type: MediaTypeArg,
    },
    /// Remove every entry
    Clear,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ContentArgs {
    /// Content id
    pub id: String,

    /// Season number (episodes only)
    #[arg(short, long, requires = "episode")]
    pub season: Option<u32>,

    /// Episode number (episodes only)
    #[arg(short, long, requires = "season")]
    pub episode: Option<u32>,
}

impl ContentArgs {
    pub fn key(&self) -> Result<ContentKey> {
        let key = match (self.season, self.episode) {
            (Some(season), Some(episode)) => ContentKey::episode(&self.id, season, episode),
            (None, None) => ContentKey::movie(&self.id),
            _ => {
                return Err(CliError::invalid_input(
                    "--season and --episode must be given together",
                ));
            }
        };
        key.validate()?;
        Ok(key)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaTypeArg {
    Movie,
    Tv,
}

impl From<MediaTypeArg> for MediaType {
    fn from(arg: MediaTypeArg) -> Self {
        match arg {
            MediaTypeArg::Movie => MediaType::Movie,
            MediaTypeArg::Tv => MediaType::Tv,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output
    Pretty,
    /// Pretty-printed JSON
    Json,
    /// Single-line JSON
    JsonCompact,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonCompact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_episode_sources() {
        let args = Args::parse_from(["reel", "sources", "1399", "-s", "1", "-e", "2", "-o", "json"]);
        match args.command {
            Commands::Sources { content, output } => {
                assert_eq!(content.key().unwrap(), ContentKey::episode("1399", 1, 2));
                assert_eq!(output, OutputFormat::Json);
            }
            _ => panic!("expected sources"),
        }
    }

    #[test]
    fn season_without_episode_is_rejected() {
        assert!(Args::try_parse_from(["reel", "sources", "1399", "-s", "1"]).is_err());
    }
}
