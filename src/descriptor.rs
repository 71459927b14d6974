//! Descriptor parsing for watch-folder drops
//!
//! Two descriptor kinds arrive in watch folders: `.torrent` metainfo files
//! (bencoded) and magnet text files holding a single magnet URI. Both parse
//! into the same [`Torrent`] seed record with the info hash, display name,
//! size, and a magnet URI ready for submission.

use crate::error::{Error, Result};
use crate::types::{Torrent, TorrentStatus};
use serde::Deserialize;
use std::path::Path;

/// Bencoded metainfo envelope. Only the fields needed for identity and
/// magnet reconstruction are typed; `info` stays raw so it can be re-encoded
/// canonically for hashing.
#[derive(Debug, Deserialize)]
struct Metainfo {
    #[serde(default)]
    announce: Option<String>,
    #[serde(rename = "announce-list", default)]
    announce_list: Option<Vec<Vec<String>>>,
    info: serde_bencode::value::Value,
}

/// Typed view of the info dictionary, decoded from the re-encoded bytes
#[derive(Debug, Deserialize)]
struct InfoDict {
    name: String,
    #[serde(default)]
    length: Option<i64>,
    #[serde(default)]
    files: Option<Vec<InfoFile>>,
}

#[derive(Debug, Deserialize)]
struct InfoFile {
    length: i64,
}

/// Parse a watch-folder descriptor into a torrent seed record
///
/// Files with a `.torrent` extension (any case) are decoded as bencoded
/// metainfo; everything else is treated as magnet text. The returned record
/// has status [`TorrentStatus::New`] and no provider id, folder, or files
/// yet — those are filled in as the torrent moves through the provider.
pub async fn parse(path: &Path) -> Result<Torrent> {
    let is_torrent = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("torrent"));

    if is_torrent {
        parse_torrent_file(path).await
    } else {
        parse_magnet_file(path).await
    }
}

/// Decode a bencoded metainfo file
///
/// The info hash is the SHA-1 of the canonically re-encoded info dictionary,
/// so fields outside `info` (announce, comment, creation date) never affect
/// identity. A magnet URI is reconstructed from the hash, name, and trackers
/// because the provider only accepts magnet submissions.
async fn parse_torrent_file(path: &Path) -> Result<Torrent> {
    let content = read_descriptor(path).await?;

    let metainfo: Metainfo = serde_bencode::from_bytes(&content).map_err(|e| {
        Error::Parse(format!(
            "Failed to decode torrent file '{}': {}",
            path.display(),
            e
        ))
    })?;

    // Re-encode the info dictionary; the serializer writes keys in sorted
    // order, matching the canonical form the hash is defined over.
    let info_bytes = serde_bencode::to_bytes(&metainfo.info).map_err(|e| {
        Error::Parse(format!(
            "Failed to re-encode info dictionary from '{}': {}",
            path.display(),
            e
        ))
    })?;

    let info_hash = {
        use sha1::{Digest, Sha1};
        let mut hasher = Sha1::new();
        hasher.update(&info_bytes);
        format!("{:x}", hasher.finalize())
    };

    let info: InfoDict = serde_bencode::from_bytes(&info_bytes).map_err(|e| {
        Error::Parse(format!(
            "Failed to decode info dictionary from '{}': {}",
            path.display(),
            e
        ))
    })?;

    // Single-file torrents carry `length`; multi-file torrents sum their
    // per-file lengths instead.
    let size = match info.length {
        Some(length) => length,
        None => info
            .files
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|f| f.length)
            .sum(),
    };

    let trackers: Vec<String> = match metainfo.announce_list {
        Some(tiers) => tiers.into_iter().flatten().collect(),
        None => metainfo.announce.into_iter().collect(),
    };

    let mut magnet = format!(
        "magnet:?xt=urn:btih:{}&dn={}",
        info_hash,
        urlencoding::encode(&info.name)
    );
    for tracker in &trackers {
        magnet.push_str("&tr=");
        magnet.push_str(&urlencoding::encode(tracker));
    }

    Ok(Torrent {
        id: String::new(),
        info_hash,
        name: info.name,
        size,
        magnet,
        source_path: path.to_path_buf(),
        folder: String::new(),
        files: Vec::new(),
        status: TorrentStatus::New,
        watch_folder: std::path::PathBuf::new(),
    })
}

/// Parse a magnet text file
///
/// The first non-empty line is taken as the magnet URI. The info hash keeps
/// whatever case the URI carried; callers normalize case at the boundaries
/// that require it.
async fn parse_magnet_file(path: &Path) -> Result<Torrent> {
    let content = read_descriptor(path).await?;

    let text = String::from_utf8(content).map_err(|e| {
        Error::Parse(format!(
            "Magnet file '{}' is not valid UTF-8: {}",
            path.display(),
            e
        ))
    })?;

    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| {
            Error::Parse(format!("Magnet file '{}' is empty", path.display()))
        })?;

    let uri = url::Url::parse(line).map_err(|e| {
        Error::Parse(format!(
            "Failed to parse magnet URI in '{}': {}",
            path.display(),
            e
        ))
    })?;

    if uri.scheme() != "magnet" {
        return Err(Error::Parse(format!(
            "Descriptor '{}' is not a magnet URI (scheme '{}')",
            path.display(),
            uri.scheme()
        )));
    }

    let mut info_hash = None;
    let mut name = String::new();
    for (key, value) in uri.query_pairs() {
        match key.as_ref() {
            "xt" => {
                if let Some(hash) = value.strip_prefix("urn:btih:")
                    && !hash.is_empty()
                {
                    info_hash = Some(hash.to_string());
                }
            }
            "dn" => name = value.into_owned(),
            _ => {}
        }
    }

    let info_hash = info_hash.ok_or_else(|| {
        Error::Parse(format!(
            "Magnet URI in '{}' has no btih hash",
            path.display()
        ))
    })?;

    Ok(Torrent {
        id: String::new(),
        info_hash,
        name,
        size: 0,
        magnet: line.to_string(),
        source_path: path.to_path_buf(),
        folder: String::new(),
        files: Vec::new(),
        status: TorrentStatus::New,
        watch_folder: std::path::PathBuf::new(),
    })
}

/// Read a descriptor file with path context on failure
async fn read_descriptor(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read descriptor '{}': {}", path.display(), e),
        ))
    })
}
