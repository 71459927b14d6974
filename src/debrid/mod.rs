//! Debrid provider integration
//!
//! A debrid provider accepts a magnet link, fetches the content on its own
//! infrastructure, and serves the files over a locally mounted filesystem.
//! This module drives one torrent through that pipeline: parse the dropped
//! descriptor, check cache availability, submit the magnet, select the video
//! files, and poll until the provider reports the content downloaded.
//!
//! ## Architecture
//!
//! The module is organized around a small set of components:
//!
//! - **[`DebridProvider`]**: The trait describing the per-torrent operations
//!   every provider backend must support.
//! - **[`Provider`]**: The closed set of configured backends. Construction
//!   routes on the configured provider name; call sites hold a `Provider`
//!   and stay agnostic of the concrete backend.
//! - **[`RealDebrid`]**: The RealDebrid REST backend, currently the only
//!   implementation.

mod realdebrid;

pub use realdebrid::RealDebrid;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::Result;
use crate::config::DebridConfig;
use crate::db::Database;
use crate::types::{Event, Torrent};

/// Operations a debrid backend must support to move a torrent from a
/// dropped descriptor file to downloadable content.
#[async_trait]
pub trait DebridProvider: Send + Sync {
    /// Checks whether the torrent is already cached on the provider.
    ///
    /// Availability is advisory: any transport or decode problem is treated
    /// as "not cached" and logged rather than surfaced, so a flaky
    /// availability endpoint never blocks a submission that was going to
    /// happen anyway.
    async fn is_available(&self, torrent: &Torrent) -> bool;

    /// Submits the torrent's magnet link and stores the provider-assigned
    /// torrent id on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the provider responds
    /// without an id.
    async fn submit_magnet(&self, torrent: &mut Torrent) -> Result<()>;

    /// Polls the provider until the torrent reaches a terminal state,
    /// selecting the video files along the way.
    ///
    /// On success the torrent holds its selected files and has status
    /// [`Downloaded`](crate::types::TorrentStatus::Downloaded).
    ///
    /// # Errors
    ///
    /// Returns an error if the provider reports a failure state, the
    /// content has no video files, the torrent is not cached and waiting
    /// on a real download, or the poll budget runs out first.
    async fn check_status(&self, torrent: &mut Torrent) -> Result<()>;

    /// Resolves the download link for a completed torrent.
    ///
    /// Content is consumed from the provider's mounted filesystem, so no
    /// link needs to be generated; this exists as the hook for backends
    /// that require an explicit unrestrict step.
    async fn download_link(&self, torrent: &Torrent) -> Result<()>;

    /// Runs the full pipeline for one descriptor file: parse, availability
    /// gate, submission, and status polling.
    ///
    /// Returns the torrent ready for publishing. The descriptor file itself
    /// is left in place; cleanup belongs to the caller, which knows whether
    /// the result was published.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails, the torrent is skipped by the
    /// availability gate, or any pipeline step fails.
    async fn process(&self, descriptor: &Path, watch_folder: &Path) -> Result<Torrent>;
}

/// A configured debrid backend.
#[derive(Debug)]
pub enum Provider {
    /// The RealDebrid REST API.
    RealDebrid(RealDebrid),
}

impl Provider {
    /// Builds the backend named in the configuration.
    ///
    /// Unrecognized names fall back to RealDebrid, the default backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend configuration is invalid, such as a
    /// malformed rate limit or an API key that cannot form a header.
    pub fn from_config(
        config: &DebridConfig,
        db: Arc<Database>,
        events: broadcast::Sender<Event>,
    ) -> Result<Self> {
        match config.name.as_str() {
            "realdebrid" => Ok(Provider::RealDebrid(RealDebrid::new(config, db, events)?)),
            other => {
                tracing::warn!("Unknown debrid provider '{}', defaulting to realdebrid", other);
                Ok(Provider::RealDebrid(RealDebrid::new(config, db, events)?))
            }
        }
    }
}

#[async_trait]
impl DebridProvider for Provider {
    async fn is_available(&self, torrent: &Torrent) -> bool {
        match self {
            Provider::RealDebrid(backend) => backend.is_available(torrent).await,
        }
    }

    async fn submit_magnet(&self, torrent: &mut Torrent) -> Result<()> {
        match self {
            Provider::RealDebrid(backend) => backend.submit_magnet(torrent).await,
        }
    }

    async fn check_status(&self, torrent: &mut Torrent) -> Result<()> {
        match self {
            Provider::RealDebrid(backend) => backend.check_status(torrent).await,
        }
    }

    async fn download_link(&self, torrent: &Torrent) -> Result<()> {
        match self {
            Provider::RealDebrid(backend) => backend.download_link(torrent).await,
        }
    }

    async fn process(&self, descriptor: &Path, watch_folder: &Path) -> Result<Torrent> {
        match self {
            Provider::RealDebrid(backend) => backend.process(descriptor, watch_folder).await,
        }
    }
}
