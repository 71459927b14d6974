//! Test configuration helpers for wiring a blackhole against mock servers

use debrid_dl::{ArrConfig, Blackhole, Config, DebridConfig};
use std::path::PathBuf;
use tempfile::TempDir;

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Watch folder inside a test workspace
pub fn watch_dir(temp: &TempDir) -> PathBuf {
    temp.path().join("watch")
}

/// Completed folder (symlink destination) inside a test workspace
pub fn completed_dir(temp: &TempDir) -> PathBuf {
    temp.path().join("completed")
}

/// Simulated provider mount folder inside a test workspace
pub fn mount_dir(temp: &TempDir) -> PathBuf {
    temp.path().join("mount")
}

/// Build a config with every remote surface pointed at `provider_uri`
///
/// Debounce is zero and the status-poll sleep is zero, so a dropped
/// descriptor moves through the whole pipeline within a couple of watch
/// ticks. The arr pairing carries no credentials; tests that exercise
/// failure reporting swap those in.
pub fn test_config(temp: &TempDir, provider_uri: &str) -> Config {
    Config {
        debrid: DebridConfig {
            name: "realdebrid".to_string(),
            host: provider_uri.to_string(),
            api_key: "test-key".to_string(),
            folder: mount_dir(temp),
            download_uncached: false,
            rate_limit: String::new(),
            poll_interval_secs: 0,
            max_poll_attempts: 5,
        },
        arrs: vec![ArrConfig {
            watch_folder: watch_dir(temp),
            completed_folder: completed_dir(temp),
            token: String::new(),
            url: String::new(),
        }],
        database_path: temp.path().join("test.db"),
        debounce_secs: 0,
    }
}

/// Create a Blackhole from an explicit config and start its watch loops
///
/// Use this when a scenario needs to tweak the config first (debounce,
/// arr credentials). Keep the temp directory alive for the test duration.
pub async fn create_blackhole_from(config: Config) -> Result<Blackhole, ConfigError> {
    let blackhole = Blackhole::new(config)
        .await
        .map_err(|e| ConfigError(format!("Failed to create blackhole: {}", e)))?;

    blackhole
        .start()
        .await
        .map_err(|e| ConfigError(format!("Failed to start blackhole: {}", e)))?;

    Ok(blackhole)
}

/// Create a started Blackhole watching a fresh temp workspace
///
/// Returns the blackhole and temp directory (keep temp_dir alive for the
/// test duration).
pub async fn create_blackhole(provider_uri: &str) -> Result<(Blackhole, TempDir), ConfigError> {
    let temp = tempfile::tempdir()
        .map_err(|e| ConfigError(format!("Failed to create temp dir: {}", e)))?;

    let blackhole = create_blackhole_from(test_config(&temp, provider_uri)).await?;
    Ok((blackhole, temp))
}

/// Create a started Blackhole whose arr pairing reports to `arr_uri`
pub async fn create_blackhole_with_arr(
    provider_uri: &str,
    arr_uri: &str,
    arr_token: &str,
) -> Result<(Blackhole, TempDir), ConfigError> {
    let temp = tempfile::tempdir()
        .map_err(|e| ConfigError(format!("Failed to create temp dir: {}", e)))?;

    let mut config = test_config(&temp, provider_uri);
    config.arrs[0].url = arr_uri.to_string();
    config.arrs[0].token = arr_token.to_string();

    let blackhole = create_blackhole_from(config).await?;
    Ok((blackhole, temp))
}
