//! Descriptor fixtures and provider response payloads

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Lowercase info-hash used by the magnet fixtures
pub const MAGNET_HASH: &str = "4af92bb95d36df95a2c38bcafc1cc76233ad3a6e";

/// Magnet URI carrying [`MAGNET_HASH`] and the given display name
pub fn magnet_uri(name: &str) -> String {
    format!("magnet:?xt=urn:btih:{}&dn={}", MAGNET_HASH, name)
}

/// Write a one-line magnet descriptor into `dir`, creating it if needed
pub async fn drop_magnet(dir: &Path, filename: &str, uri: &str) -> PathBuf {
    tokio::fs::create_dir_all(dir)
        .await
        .expect("create watch dir");
    let path = dir.join(filename);
    tokio::fs::write(&path, uri).await.expect("write magnet");
    path
}

/// Write arbitrary descriptor bytes into `dir`, creating it if needed
pub async fn drop_descriptor(dir: &Path, filename: &str, bytes: &[u8]) -> PathBuf {
    tokio::fs::create_dir_all(dir)
        .await
        .expect("create watch dir");
    let path = dir.join(filename);
    tokio::fs::write(&path, bytes).await.expect("write descriptor");
    path
}

#[derive(Serialize)]
struct Metainfo {
    announce: String,
    info: Info,
}

#[derive(Serialize)]
struct Info {
    length: i64,
    name: String,
    #[serde(rename = "piece length")]
    piece_length: i64,
    pieces: String,
}

/// Bencode a single-file torrent descriptor
///
/// Returns the file bytes and the lowercase hex info-hash the parser will
/// compute from them.
pub fn single_file_torrent(name: &str, length: i64) -> (Vec<u8>, String) {
    let info = Info {
        length,
        name: name.to_string(),
        piece_length: 16384,
        pieces: "x".repeat(20),
    };

    let info_hash = {
        use sha1::{Digest, Sha1};
        let info_bytes = serde_bencode::to_bytes(&info).expect("bencode info");
        let mut hasher = Sha1::new();
        hasher.update(&info_bytes);
        format!("{:x}", hasher.finalize())
    };

    let meta = Metainfo {
        announce: "udp://tracker.test/announce".to_string(),
        info,
    };
    let bytes = serde_bencode::to_bytes(&meta).expect("bencode metainfo");

    (bytes, info_hash)
}

/// Availability response marking `hash` as cached at one hoster
pub fn cached_body(hash: &str) -> serde_json::Value {
    serde_json::json!({
        hash.to_lowercase(): {
            "rd": [ { "1": { "filename": "content.mkv", "filesize": 1024 } } ]
        }
    })
}

/// Availability response marking `hash` as known but uncached
pub fn uncached_body(hash: &str) -> serde_json::Value {
    serde_json::json!({ hash.to_lowercase(): [] })
}

/// torrents/info response in `waiting_files_selection`
///
/// `files` entries are `(id, path, bytes)` with provider-style leading
/// slashes on the paths.
pub fn waiting_body(
    provider_id: &str,
    original_filename: &str,
    files: &[(i64, &str, i64)],
) -> serde_json::Value {
    let files: Vec<serde_json::Value> = files
        .iter()
        .map(|(id, path, bytes)| {
            serde_json::json!({ "id": id, "path": path, "bytes": bytes })
        })
        .collect();

    serde_json::json!({
        "id": provider_id,
        "status": "waiting_files_selection",
        "original_filename": original_filename,
        "files": files,
    })
}

/// torrents/info response in `downloaded`
pub fn downloaded_body(provider_id: &str, original_filename: &str) -> serde_json::Value {
    serde_json::json!({
        "id": provider_id,
        "status": "downloaded",
        "original_filename": original_filename,
        "files": [],
    })
}

/// Create an empty file (and its parents) under the mount folder
///
/// The readiness poller only checks for existence, so content is
/// irrelevant.
pub async fn write_mount_file(mount: &Path, relative_path: &str) {
    let path = mount.join(relative_path);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .expect("create mount parents");
    }
    tokio::fs::write(&path, b"content").await.expect("write mount file");
}
