//! Custom test assertions and event-waiting helpers

use debrid_dl::Event;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;
use walkdir::WalkDir;

/// Wait for an event matching `predicate`
///
/// Subscribe before triggering the behavior under test; broadcast
/// receivers only see events sent after subscription.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    predicate: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => {
                    return Some(event);
                }
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await;

    result.ok().flatten()
}

/// Collect all events until timeout or the stop predicate is satisfied
pub async fn collect_events_until<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    stop_predicate: F,
) -> Vec<Event>
where
    F: Fn(&Event) -> bool,
{
    let mut collected = Vec::new();

    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let should_stop = stop_predicate(&event);
            collected.push(event);
            if should_stop {
                break;
            }
        }
    })
    .await;

    collected
}

/// Poll until `path` no longer exists; true if it disappeared in time
pub async fn wait_for_removal(path: &Path, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    !path.exists()
}

/// Poll until `path` exists; true if it appeared in time
pub async fn wait_for_path(path: &Path, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    path.exists()
}

/// Assert that `link` is a symlink pointing at `target`
pub fn assert_links_to(link: &Path, target: &Path) {
    let metadata = std::fs::symlink_metadata(link)
        .unwrap_or_else(|e| panic!("expected symlink at {:?}: {}", link, e));
    assert!(
        metadata.file_type().is_symlink(),
        "{:?} exists but is not a symlink",
        link
    );
    let dest = std::fs::read_link(link).expect("read link target");
    assert_eq!(
        dest, target,
        "symlink {:?} points at {:?}, expected {:?}",
        link, dest, target
    );
}

/// Collect every symlink under `root` as a path relative to `root`
///
/// Sorted, so two trees can be compared with a plain `assert_eq!`.
pub fn collect_symlinks(root: &Path) -> Vec<PathBuf> {
    let mut links: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path_is_symlink())
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    links.sort();
    links
}

/// Assert that a directory exists and contains no entries
pub fn assert_dir_empty(dir: &Path) {
    if !dir.exists() {
        return;
    }
    let entries: Vec<_> = std::fs::read_dir(dir)
        .expect("Failed to read directory")
        .collect();
    assert!(
        entries.is_empty(),
        "Expected directory {:?} to be empty, found {} entries",
        dir,
        entries.len()
    );
}
