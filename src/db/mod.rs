//! Database layer for debrid-dl
//!
//! Handles SQLite persistence for torrents and their provider-reported files.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`torrents`] — Torrent and torrent-file upserts and queries

use crate::types::{Torrent, TorrentFile, TorrentStatus};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod migrations;
mod torrents;

/// Torrent record from database
#[derive(Debug, Clone, FromRow)]
pub struct TorrentRow {
    /// BitTorrent info hash (primary key)
    pub info_hash: String,
    /// Provider-assigned torrent id (empty until submitted)
    pub provider_id: String,
    /// Display name
    pub name: String,
    /// Destination folder name derived from the provider filename
    pub folder: String,
    /// Path of the descriptor file this torrent came from
    pub source_path: String,
    /// Watch folder the descriptor was dropped into
    pub watch_folder: String,
    /// Total size in bytes
    pub size_bytes: i64,
    /// Magnet URI used for submission
    pub magnet: String,
    /// Lifecycle status (see [`TorrentStatus`])
    pub status: String,
    /// Error message if the torrent failed
    pub error_message: Option<String>,
    /// Unix timestamp when the record was created
    pub created_at: i64,
    /// Unix timestamp of the last update
    pub updated_at: i64,
}

/// Torrent file record from database
#[derive(Debug, Clone, FromRow)]
pub struct TorrentFileRow {
    /// Info hash of the owning torrent
    pub torrent_hash: String,
    /// Provider-assigned file id
    pub file_id: String,
    /// File name without directories
    pub name: String,
    /// Size in bytes
    pub size_bytes: i64,
    /// Path relative to the mount and completed folders
    pub relative_path: String,
}

impl TorrentRow {
    /// Assemble a domain [`Torrent`] from this row and its file rows
    fn into_torrent(self, files: Vec<TorrentFileRow>) -> Torrent {
        Torrent {
            id: self.provider_id,
            info_hash: self.info_hash,
            name: self.name,
            size: self.size_bytes,
            magnet: self.magnet,
            source_path: PathBuf::from(self.source_path),
            folder: self.folder,
            files: files.into_iter().map(TorrentFile::from).collect(),
            status: TorrentStatus::from_db_str(&self.status),
            watch_folder: PathBuf::from(self.watch_folder),
        }
    }
}

impl From<TorrentFileRow> for TorrentFile {
    fn from(row: TorrentFileRow) -> Self {
        TorrentFile {
            id: row.file_id,
            name: row.name,
            size: row.size_bytes,
            relative_path: row.relative_path,
        }
    }
}

/// Database handle for debrid-dl
#[derive(Debug)]
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
