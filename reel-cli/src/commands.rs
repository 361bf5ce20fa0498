use crate::{
    cli::{ContentArgs, HistoryAction, OutputFormat},
    config::AppConfig,
    error::Result,
    output::OutputManager,
};
use playback_engine::embed::resume_url;
use playback_engine::native::ManifestLoader;
use playback_engine::{FileStore, StoreWatchHistory};
use std::sync::Arc;
use stream_sources::{ContentRef, HttpStreamBackend, SourceResolver, default_client};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct CommandExecutor {
    config: AppConfig,
    output: OutputManager,
}

impl CommandExecutor {
    pub fn new(config: AppConfig) -> Self {
        let output = OutputManager::new(config.colored);
        Self { config, output }
    }

    pub async fn list_sources(&self, content: &ContentArgs, format: OutputFormat) -> Result<()> {
        let key = content.key()?;
        let config = Arc::new(self.config.resolver.clone());
        let backend = HttpStreamBackend::from_config(config.clone())?;
        let resolver = SourceResolver::new(Arc::new(backend), config);

        let token = CancellationToken::new();
        let ctrl_c = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c.cancel();
            }
        });

        info!(key = %key, "Resolving sources");
        let sources = resolver.resolve(&key, &token).await?;
        print!("{}", self.output.format_sources(&key, &sources, format)?);
        if format.is_json() {
            println!();
        }
        Ok(())
    }

    pub async fn probe(&self, url: &str, format: OutputFormat) -> Result<()> {
        let client = default_client(&self.config.resolver)?;
        let loader = ManifestLoader::new(client, self.config.resolver.request_timeout());
        debug!(url, "Probing manifest");
        let info = loader.load(url).await?;
        print!("{}", self.output.format_manifest(&info, format)?);
        if format.is_json() {
            println!();
        }
        Ok(())
    }

    pub fn embed_url(&self, url: &str, at: f64) {
        println!("{}", resume_url(url, at));
    }

    pub fn history(&self, action: HistoryAction) -> Result<()> {
        let dir = self.config.history.resolve_dir()?;
        let history = StoreWatchHistory::with_max_entries(
            FileStore::new(&dir)?,
            self.config.history.max_entries,
        );
        debug!(dir = %dir.display(), "Opened watch history");

        match action {
            HistoryAction::List { output } => {
                let entries = history.entries()?;
                print!("{}", self.output.format_history(&entries, output)?);
                if output.is_json() {
                    println!();
                }
            }
            HistoryAction::Remove { id, media_type } => {
                let content = ContentRef::new(id, media_type.into());
                if history.remove(&content)? {
                    println!("{}", self.output.success(&format!("Removed {}", content.storage_key())));
                } else {
                    println!("No entry for {}", content.storage_key());
                }
            }
            HistoryAction::Clear => {
                history.clear()?;
                println!("{}", self.output.success("Watch history cleared"));
            }
        }
        Ok(())
    }
}
