//! Configuration types for debrid-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Debrid provider configuration
///
/// Selects the provider variant and carries its credentials, the local mount
/// folder where completed content appears, and the outbound request budget.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DebridConfig {
    /// Provider variant name (default: "realdebrid")
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Provider API base URL (e.g. "https://api.real-debrid.com/rest/1.0")
    pub host: String,

    /// Provider API key, sent as a bearer token
    pub api_key: String,

    /// Local folder where the provider mount exposes completed torrents
    pub folder: PathBuf,

    /// Submit magnets even when the content is not already cached (default: false)
    #[serde(default)]
    pub download_uncached: bool,

    /// Outbound request budget as "<count>/<unit>", unit second or minute
    /// (default: "250/minute")
    #[serde(default = "default_rate_limit")]
    pub rate_limit: String,

    /// Seconds to sleep between status polls for one torrent (default: 5)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Status polls per torrent before giving up (default: 720)
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

impl DebridConfig {
    /// Sleep between status-poll iterations
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for DebridConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            host: String::new(),
            api_key: String::new(),
            folder: PathBuf::new(),
            download_uncached: false,
            rate_limit: default_rate_limit(),
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

/// One watch-folder pairing owned by an arr application
///
/// Each entry gets its own watch loop: descriptors dropped into
/// `watch_folder` end up as symlinks under `completed_folder`, and failures
/// are reported back to the arr at `url` using `token`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArrConfig {
    /// Folder watched for .torrent/.magnet descriptor files
    pub watch_folder: PathBuf,

    /// Folder the arr imports from; symlink trees are created here
    pub completed_folder: PathBuf,

    /// Arr API key, sent as X-Api-Key
    #[serde(default)]
    pub token: String,

    /// Arr base URL (e.g. "http://localhost:8989")
    #[serde(default)]
    pub url: String,
}

/// Main configuration for the blackhole orchestrator
///
/// Loaded from a JSON file. Only the provider credentials and at least one
/// arr pairing are required; everything else has serde defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Debrid provider settings
    #[serde(default)]
    pub debrid: DebridConfig,

    /// Watch-folder pairings, one independent loop each
    #[serde(default)]
    pub arrs: Vec<ArrConfig>,

    /// Path of the sqlite job store (default: "blackhole.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Quiet period in seconds before a descriptor is considered stable
    /// (default: 1)
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
}

impl Config {
    /// Read and deserialize a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Debounce quiet period
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    /// Reject configurations that cannot possibly work
    pub fn validate(&self) -> Result<()> {
        if self.debrid.host.is_empty() {
            return Err(Error::Config {
                message: "debrid host must not be empty".into(),
                key: Some("debrid.host".into()),
            });
        }
        if self.debrid.api_key.is_empty() {
            return Err(Error::Config {
                message: "debrid api key must not be empty".into(),
                key: Some("debrid.api_key".into()),
            });
        }
        if self.debrid.folder.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "debrid mount folder must not be empty".into(),
                key: Some("debrid.folder".into()),
            });
        }
        if self.arrs.is_empty() {
            return Err(Error::Config {
                message: "at least one arr watch-folder pairing is required".into(),
                key: Some("arrs".into()),
            });
        }
        for (index, arr) in self.arrs.iter().enumerate() {
            if arr.watch_folder.as_os_str().is_empty() {
                return Err(Error::Config {
                    message: format!("arr #{index} has an empty watch folder"),
                    key: Some("arrs.watch_folder".into()),
                });
            }
            if arr.completed_folder.as_os_str().is_empty() {
                return Err(Error::Config {
                    message: format!("arr #{index} has an empty completed folder"),
                    key: Some("arrs.completed_folder".into()),
                });
            }
        }
        Ok(())
    }
}

fn default_provider_name() -> String {
    "realdebrid".to_string()
}

fn default_rate_limit() -> String {
    "250/minute".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_poll_attempts() -> u32 {
    720
}

fn default_database_path() -> PathBuf {
    PathBuf::from("blackhole.db")
}

fn default_debounce_secs() -> u64 {
    1
}
