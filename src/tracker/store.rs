// Persistence for night records
// Nights are persisted whole to nights.json with exclusive file locking
// on save; the tracker drives these synchronous calls from a blocking
// thread.

use crate::tracker::config::Config;
use crate::tracker::night::{Night, NightId};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::path::PathBuf;

/// CRUD surface the tracker consumes. Implementations are synchronous
/// and must tolerate being called from blocking worker threads.
pub trait NightStore: Send + Sync {
    /// Create a new open night (end == start) and assign it an id
    fn insert(&self, start: DateTime<Utc>) -> Result<Night>;
    /// Replace the stored night with the same id
    fn update(&self, night: &Night) -> Result<()>;
    /// The most recently inserted night, if any
    fn most_recent(&self) -> Result<Option<Night>>;
    /// All nights in insertion order (most recent last)
    fn all_nights(&self) -> Result<Vec<Night>>;
    /// Remove every night
    fn delete_all(&self) -> Result<()>;
}

/// On-disk registry backing [`JsonNightStore`]
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct Registry {
    /// Next night id to assign; never reused, even across delete_all
    next_id: NightId,
    nights: Vec<Night>,
}

/// File-backed store keeping the full history in a single JSON file
pub struct JsonNightStore {
    path: PathBuf,
}

impl JsonNightStore {
    /// Open the store at the configured path, creating the data dir
    pub fn open(config: &Config) -> Result<Self> {
        config.ensure_dirs().with_context(|| {
            format!(
                "Failed to create data directory: {}",
                config.data_dir.display()
            )
        })?;
        Ok(Self {
            path: config.nights_file(),
        })
    }

    /// Open the store against an explicit file path (used by tests)
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> Result<Registry> {
        if !self.path.exists() {
            return Ok(Registry::default());
        }

        let mut file = File::open(&self.path)
            .with_context(|| format!("Failed to open nights file: {}", self.path.display()))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .with_context(|| format!("Failed to read nights file: {}", self.path.display()))?;

        if contents.trim().is_empty() {
            return Ok(Registry::default());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse nights file: {}", self.path.display()))
    }

    fn save(&self, registry: &Registry) -> Result<()> {
        let parent = self
            .path
            .parent()
            .with_context(|| format!("Invalid nights path: {}", self.path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create nights directory: {}", parent.display()))?;

        // Exclusive lock on a sidecar file guards against a second
        // process saving concurrently; the data file itself is replaced
        // by rename, so it cannot hold the lock
        let lock_path = self.path.with_extension("json.lock");
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
        lock_file
            .lock_exclusive()
            .with_context(|| "Failed to acquire exclusive lock on nights file")?;

        let contents =
            serde_json::to_string_pretty(registry).with_context(|| "Failed to serialize nights")?;

        // Write-to-temp + rename so a crash mid-write never leaves a
        // truncated nights.json behind. The temp file sits in the same
        // directory so the rename stays on one filesystem.
        let temp_path = parent.join(format!(
            ".{}.tmp.{}",
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("nights"),
            std::process::id()
        ));

        fs::write(&temp_path, contents.as_bytes())
            .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        // Lock is released when the lock file is dropped
        Ok(())
    }
}

impl NightStore for JsonNightStore {
    fn insert(&self, start: DateTime<Utc>) -> Result<Night> {
        let mut registry = self.load()?;
        let id = registry.next_id;
        registry.next_id += 1;
        let night = Night::new(id, start);
        registry.nights.push(night.clone());
        self.save(&registry)?;
        Ok(night)
    }

    fn update(&self, night: &Night) -> Result<()> {
        let mut registry = self.load()?;
        let Some(slot) = registry.nights.iter_mut().find(|n| n.id == night.id) else {
            bail!("Unknown night id: {}", night.id);
        };
        *slot = night.clone();
        self.save(&registry)
    }

    fn most_recent(&self) -> Result<Option<Night>> {
        Ok(self.load()?.nights.last().cloned())
    }

    fn all_nights(&self) -> Result<Vec<Night>> {
        Ok(self.load()?.nights)
    }

    fn delete_all(&self) -> Result<()> {
        let mut registry = self.load()?;
        registry.nights.clear();
        self.save(&registry)
    }
}
