//! Core types for debrid-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A torrent job, one per descriptor dropped into a watch folder
///
/// Created by the descriptor parser, mutated by the provider state machine,
/// and published by the readiness poller. The `info_hash` is the stable
/// external key; `id` is assigned by the provider on submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Torrent {
    /// Provider-assigned identifier, empty until submission succeeds
    pub id: String,

    /// Hex BitTorrent info-hash, derived from the descriptor
    pub info_hash: String,

    /// Display name
    pub name: String,

    /// Total content size in bytes (0 when the descriptor was a magnet file)
    pub size: i64,

    /// Canonical magnet URI used for submission
    pub magnet: String,

    /// Path of the originating descriptor file, basis for cleanup
    pub source_path: PathBuf,

    /// Provider-reported container folder, known only after submission
    pub folder: String,

    /// Selected files, empty until the provider reaches file selection
    pub files: Vec<TorrentFile>,

    /// Current state-machine state
    pub status: TorrentStatus,

    /// Watch folder that discovered this descriptor, used for routing
    pub watch_folder: PathBuf,
}

impl Torrent {
    /// Delete the originating descriptor file
    ///
    /// Called after successful publication and after terminal failures.
    /// Failures are logged and swallowed - the file may already be gone.
    pub async fn remove_source(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.source_path).await {
            tracing::debug!(
                source = %self.source_path.display(),
                "failed to remove descriptor: {}",
                e
            );
        }
    }
}

/// A single file within a torrent, as selected at the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFile {
    /// Provider-assigned file identifier, needed for the selection call
    pub id: String,

    /// File name relative to the torrent contents (no leading separator)
    pub name: String,

    /// File size in bytes
    pub size: i64,

    /// `folder/name` path joining the provider mount and the completed tree
    pub relative_path: String,
}

/// Torrent lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentStatus {
    /// Parsed from a descriptor, not yet submitted
    New,
    /// Magnet accepted by the provider, id assigned
    Submitted,
    /// File selection issued, waiting for the provider to settle
    SelectingFiles,
    /// Provider is preparing the selected files
    Downloading,
    /// Provider finished, files servable from the mount
    Downloaded,
    /// Terminal failure
    Failed,
    /// Skipped by the availability gate (not cached, uncached disabled)
    Skipped,
}

impl TorrentStatus {
    /// Convert a stored status string back to the enum
    pub fn from_db_str(status: &str) -> Self {
        match status {
            "new" => TorrentStatus::New,
            "submitted" => TorrentStatus::Submitted,
            "selecting_files" => TorrentStatus::SelectingFiles,
            "downloading" => TorrentStatus::Downloading,
            "downloaded" => TorrentStatus::Downloaded,
            "failed" => TorrentStatus::Failed,
            "skipped" => TorrentStatus::Skipped,
            _ => TorrentStatus::Failed, // Default to Failed for unknown status
        }
    }

    /// The string stored in the status column
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentStatus::New => "new",
            TorrentStatus::Submitted => "submitted",
            TorrentStatus::SelectingFiles => "selecting_files",
            TorrentStatus::Downloading => "downloading",
            TorrentStatus::Downloaded => "downloaded",
            TorrentStatus::Failed => "failed",
            TorrentStatus::Skipped => "skipped",
        }
    }

    /// Whether this state ends the lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TorrentStatus::Downloaded | TorrentStatus::Failed | TorrentStatus::Skipped
        )
    }
}

impl std::fmt::Display for TorrentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event emitted during torrent lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Descriptor parsed and queued for provider processing
    Queued {
        /// Torrent info-hash
        info_hash: String,
        /// Torrent name
        name: String,
    },

    /// Magnet accepted by the provider
    Submitted {
        /// Torrent info-hash
        info_hash: String,
        /// Provider-assigned torrent identifier
        id: String,
    },

    /// Video/subtitle files selected at the provider
    FilesSelected {
        /// Torrent info-hash
        info_hash: String,
        /// Number of files retained by the filter
        file_count: usize,
    },

    /// Provider finished processing, readiness polling begins
    Downloaded {
        /// Torrent info-hash
        info_hash: String,
        /// Torrent name
        name: String,
    },

    /// A file became visible on the provider mount
    FileReady {
        /// Torrent info-hash
        info_hash: String,
        /// The file's relative path
        relative_path: String,
    },

    /// Symlink tree created under the completed folder
    Published {
        /// Torrent info-hash
        info_hash: String,
        /// Number of links in the published tree
        link_count: usize,
    },

    /// Descriptor processing failed
    Failed {
        /// Torrent info-hash (empty when parsing failed before it was known)
        info_hash: String,
        /// Descriptor path or torrent name
        name: String,
        /// Error message
        error: String,
    },

    /// Graceful shutdown initiated
    Shutdown,
}
