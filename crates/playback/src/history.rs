//! Watch history: where the viewer left off.
//!
//! Progress is keyed by content (`movie-550`, `tv-1399`), so the latest episode of a
//! show replaces the previous one. Entries live in a [`KeyValueStore`] as one JSON
//! document.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use stream_sources::{ContentKey, ContentRef};
use tracing::{debug, warn};

use crate::error::{PlaybackError, Result};

/// Store key of the history document.
pub const HISTORY_KEY: &str = "watch_history";
pub const DEFAULT_MAX_ENTRIES: usize = 200;

/// Small still of the frame the viewer stopped on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHint {
    pub mime_type: String,
    #[serde(serialize_with = "encode_base64", deserialize_with = "decode_base64")]
    pub data: Vec<u8>,
}

fn encode_base64<T: AsRef<[u8]>, S: Serializer>(
    data: T,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(data.as_ref()))
}

fn decode_base64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchProgress {
    pub content: ContentRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    pub position_secs: f64,
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotHint>,
    pub updated_at: DateTime<Utc>,
}

impl WatchProgress {
    pub fn new(key: &ContentKey, position_secs: f64, duration_secs: f64) -> Self {
        Self {
            content: key.content.clone(),
            season: key.season,
            episode: key.episode,
            position_secs,
            duration_secs,
            snapshot: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_snapshot(mut self, snapshot: Option<SnapshotHint>) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn storage_key(&self) -> String {
        self.content.storage_key()
    }

    /// Watched fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.position_secs / self.duration_secs).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Sink for progress reports.
///
/// `record` is synchronous: a report issued during close has been handed over by the
/// time close returns.
pub trait WatchHistory: Send + Sync {
    fn record(&self, progress: WatchProgress);
}

/// Minimal string key-value persistence.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One file per key under a directory. Writes go through a temp file and a rename.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(PlaybackError::storage(format!("invalid store key `{key}`")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        let _guard = self.lock.lock();
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let _guard = self.lock.lock();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let _guard = self.lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// [`WatchHistory`] backed by a [`KeyValueStore`].
pub struct StoreWatchHistory<S> {
    store: S,
    max_entries: usize,
    // Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> StoreWatchHistory<S> {
    pub fn new(store: S) -> Self {
        Self::with_max_entries(store, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(store: S, max_entries: usize) -> Self {
        Self {
            store,
            max_entries: max_entries.max(1),
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<HashMap<String, WatchProgress>> {
        match self.store.get(HISTORY_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(HashMap::new()),
        }
    }

    fn save(&self, entries: &HashMap<String, WatchProgress>) -> Result<()> {
        let raw = serde_json::to_string(entries)?;
        self.store.set(HISTORY_KEY, &raw)
    }

    /// All entries, most recently updated first.
    pub fn entries(&self) -> Result<Vec<WatchProgress>> {
        let mut entries: Vec<_> = self.load()?.into_values().collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(entries)
    }

    pub fn get(&self, content: &ContentRef) -> Result<Option<WatchProgress>> {
        Ok(self.load()?.remove(&content.storage_key()))
    }

    pub fn upsert(&self, progress: WatchProgress) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load()?;
        entries.insert(progress.storage_key(), progress);

        if entries.len() > self.max_entries {
            let mut by_age: Vec<_> = entries
                .iter()
                .map(|(k, v)| (v.updated_at, k.clone()))
                .collect();
            by_age.sort();
            let excess = entries.len() - self.max_entries;
            for (_, key) in by_age.into_iter().take(excess) {
                entries.remove(&key);
            }
        }

        self.save(&entries)
    }

    pub fn remove(&self, content: &ContentRef) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load()?;
        let removed = entries.remove(&content.storage_key()).is_some();
        if removed {
            self.save(&entries)?;
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.store.remove(HISTORY_KEY)
    }
}

impl<S: KeyValueStore> WatchHistory for StoreWatchHistory<S> {
    fn record(&self, progress: WatchProgress) {
        let key = progress.storage_key();
        let position = progress.position_secs;
        match self.upsert(progress) {
            Ok(()) => debug!(key = %key, position, "Recorded watch progress"),
            Err(e) => warn!(key = %key, error = %e, "Failed to record watch progress"),
        }
    }
}
