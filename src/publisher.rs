//! Readiness polling and symlink publication
//!
//! A torrent reported downloaded by the provider is not immediately
//! usable: the mounted filesystem can lag behind the provider's state by
//! seconds. One check per file polls the mount until the file is visible;
//! once every file has been confirmed, the torrent is published as a
//! symlink tree under the completed folder and the source descriptor is
//! removed.

use std::path::Path;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::error::Error;
use crate::types::{Event, Torrent, TorrentFile};

/// Interval between visibility checks on the mount.
const FILE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Waits for every file of the torrent to appear under the mount folder,
/// then publishes the symlink tree and removes the source descriptor.
///
/// One task polls per file; each confirmation is reported on a shared
/// channel and surfaced as a [`Event::FileReady`]. Publication happens
/// only after the join over all checks, so an arr never imports a
/// half-visible torrent. Cancellation is honored while waiting; once
/// every file is confirmed, publication runs to completion so no partial
/// link tree is left behind.
pub async fn publish_when_ready(
    torrent: Torrent,
    mount_folder: &Path,
    completed_folder: &Path,
    events: &broadcast::Sender<Event>,
    shutdown: &CancellationToken,
) {
    if torrent.files.is_empty() {
        warn!("Torrent {} has no files to publish", torrent.name);
        return;
    }

    info!(
        "Waiting for {} files of torrent {} under {}",
        torrent.files.len(),
        torrent.name,
        mount_folder.display()
    );

    let (ready_tx, mut ready_rx) = mpsc::channel::<TorrentFile>(torrent.files.len());
    let mut checks = Vec::with_capacity(torrent.files.len());
    for file in &torrent.files {
        let mount_path = mount_folder.join(&file.relative_path);
        let file = file.clone();
        let tx = ready_tx.clone();
        let shutdown = shutdown.clone();
        checks.push(tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = wait_for_mount_visibility(&mount_path) => {
                    // Receiver gone means the publisher went away first
                    let _ = tx.send(file).await;
                }
            }
        }));
    }
    drop(ready_tx);

    // Join barrier: the channel closes once every check has either
    // confirmed its file or been cancelled
    let mut ready = 0usize;
    while let Some(file) = ready_rx.recv().await {
        ready += 1;
        info!("File {} is visible on the mount", file.relative_path);
        let _ = events.send(Event::FileReady {
            info_hash: torrent.info_hash.clone(),
            relative_path: file.relative_path.clone(),
        });
    }
    for result in join_all(checks).await {
        if let Err(e) = result {
            warn!("File check ended abnormally: {}", e);
        }
    }

    if ready < torrent.files.len() {
        if shutdown.is_cancelled() {
            info!(
                "Shutdown requested; leaving torrent {} unpublished",
                torrent.name
            );
        } else {
            warn!(
                "Only {} of {} files of torrent {} became ready; not publishing",
                ready,
                torrent.files.len(),
                torrent.name
            );
        }
        return;
    }

    if let Err(e) = create_links(&torrent, mount_folder, completed_folder).await {
        error!("Failed to publish torrent {}: {}", torrent.name, e);
        return;
    }

    info!(
        "Published {} files of torrent {} to {}",
        torrent.files.len(),
        torrent.name,
        completed_folder.display()
    );
    let _ = events.send(Event::Published {
        info_hash: torrent.info_hash.clone(),
        link_count: torrent.files.len(),
    });

    torrent.remove_source().await;
}

/// Polls until the path exists. Runs until cancelled by the caller when
/// the file never appears.
async fn wait_for_mount_visibility(path: &Path) {
    let mut tick = tokio::time::interval(FILE_POLL_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return;
        }
    }
}

/// Creates the completed-folder link tree for a fully-ready torrent.
///
/// Links sit at `completed/<relative path>` and point at
/// `mount/<relative path>`. Existing links are left alone, so publication
/// can run again for the same torrent without error.
async fn create_links(torrent: &Torrent, mount_folder: &Path, completed_folder: &Path) -> Result<()> {
    tokio::fs::create_dir_all(completed_folder.join(&torrent.folder)).await?;

    for file in &torrent.files {
        let target = mount_folder.join(&file.relative_path);
        let link = completed_folder.join(&file.relative_path);
        if let Some(parent) = link.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // symlink_metadata rather than exists: a link to a not-yet-visible
        // target still counts as already published
        if tokio::fs::symlink_metadata(&link).await.is_ok() {
            debug!("Link {} already exists", link.display());
            continue;
        }

        make_symlink(&target, &link).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to link '{}': {}", link.display(), e),
            ))
        })?;
        debug!("Linked {} -> {}", link.display(), target.display());
    }

    Ok(())
}

#[cfg(unix)]
async fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(not(unix))]
async fn make_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlink publication requires a unix filesystem",
    ))
}
