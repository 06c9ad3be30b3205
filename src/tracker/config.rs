// Path resolution for the night store
// Handles the data directory that holds nights.json

use std::path::PathBuf;

/// Configuration for store paths
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for persistent state (nights.json)
    pub data_dir: PathBuf,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        if let Ok(override_dir) = std::env::var("SLEEP_TRACKER_DIR") {
            return Self {
                data_dir: PathBuf::from(override_dir),
            };
        }

        Self {
            data_dir: Self::default_data_dir(),
        }
    }

    /// Default data directory: ~/.sleep-tracker (or /tmp/sleep-tracker if
    /// home is unavailable)
    fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".sleep-tracker"))
            .unwrap_or_else(|| PathBuf::from("/tmp/sleep-tracker"))
    }

    /// Get the nights.json file path
    pub fn nights_file(&self) -> PathBuf {
        self.data_dir.join("nights.json")
    }

    /// Ensure the data directory exists
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}
