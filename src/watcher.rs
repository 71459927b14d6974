//! Watch/debounce loop for descriptor files
//!
//! Arr applications drop `.torrent` and `.magnet` descriptor files into a
//! blackhole folder and expect the content to appear in a completed folder
//! once it is ready. One loop runs per configured pairing: filesystem
//! events feed a debounce map, and any path that has stayed quiet for the
//! configured period is dispatched exactly once. Each dispatched
//! descriptor runs end to end in its own task, so a slow provider job
//! never blocks discovery of new descriptors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config as NotifyConfig, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::arr::ArrClient;
use crate::config::{ArrConfig, Config};
use crate::db::Database;
use crate::debrid::{DebridProvider, Provider};
use crate::error::{DebridError, Error};
use crate::publisher;
use crate::types::Event;

/// Interval between scans of the debounce map.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Whether a path names a descriptor file (`.torrent` or `.magnet`,
/// case-insensitive).
fn is_descriptor_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("torrent") || ext.eq_ignore_ascii_case("magnet"))
        .unwrap_or(false)
}

/// Watches one arr pairing's blackhole folder for descriptor files.
pub struct FolderWatcher {
    /// The pairing this loop serves
    arr: ArrConfig,

    /// Client for reporting failures back to the owning arr
    arr_client: Arc<ArrClient>,

    /// Shared provider backend
    provider: Arc<Provider>,

    /// Shared job store
    db: Arc<Database>,

    /// Provider mount folder files become visible under
    mount_folder: PathBuf,

    /// Quiet period before a descriptor is considered stable
    debounce: Duration,

    /// Lifecycle event bus
    events: broadcast::Sender<Event>,

    /// Cooperative shutdown signal
    shutdown: CancellationToken,

    /// Filesystem watcher instance
    watcher: RecommendedWatcher,

    /// Channel for receiving filesystem events
    rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,

    /// Handles of in-flight descriptor tasks, joined on shutdown
    jobs: Vec<tokio::task::JoinHandle<()>>,
}

impl FolderWatcher {
    /// Creates a watcher for one pairing.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be initialized or
    /// the arr token cannot form a header.
    pub fn new(
        config: &Config,
        arr: ArrConfig,
        provider: Arc<Provider>,
        db: Arc<Database>,
        events: broadcast::Sender<Event>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = tx.send(res) {
                    error!("Failed to forward filesystem event: {}", e);
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::FolderWatch(e.to_string()))?;

        let arr_client = Arc::new(ArrClient::new(&arr)?);

        Ok(Self {
            arr,
            arr_client,
            provider,
            db,
            mount_folder: config.debrid.folder.clone(),
            debounce: config.debounce(),
            events,
            shutdown,
            watcher,
            rx,
            jobs: Vec::new(),
        })
    }

    /// Registers the watch folder with the filesystem watcher, creating the
    /// folder first if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be created or watched.
    pub fn start(&mut self) -> Result<()> {
        if !self.arr.watch_folder.exists() {
            std::fs::create_dir_all(&self.arr.watch_folder)
                .map_err(|e| Error::FolderWatch(format!("Failed to create watch folder: {}", e)))?;
            info!("Created watch folder: {}", self.arr.watch_folder.display());
        }

        self.watcher
            .watch(&self.arr.watch_folder, RecursiveMode::NonRecursive)
            .map_err(|e| Error::FolderWatch(format!("Failed to watch folder: {}", e)))?;

        info!("Watching folder: {}", self.arr.watch_folder.display());
        Ok(())
    }

    /// Runs the debounced watch loop until shutdown.
    ///
    /// Filesystem events refresh the per-path timestamp; a one-second tick
    /// dispatches every path whose last event is older than the debounce
    /// period.
    pub async fn run(mut self) {
        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Watch loop for {} stopping", self.arr.watch_folder.display());
                    self.drain_jobs().await;
                    info!("Watch loop for {} stopped", self.arr.watch_folder.display());
                    return;
                }
                maybe = self.rx.recv() => match maybe {
                    Some(Ok(event)) => self.note_event(&mut pending, event),
                    Some(Err(e)) => error!("Filesystem watcher error: {}", e),
                    None => {
                        warn!(
                            "Filesystem event channel closed for {}",
                            self.arr.watch_folder.display()
                        );
                        self.drain_jobs().await;
                        return;
                    }
                },
                _ = tick.tick() => {
                    self.jobs.retain(|handle| !handle.is_finished());
                    self.dispatch_stable(&mut pending);
                }
            }
        }
    }

    /// Waits for every in-flight descriptor task. The shared shutdown token
    /// is already cancelled by the time this runs, so tasks abandon at
    /// their next suspension point rather than running to completion.
    async fn drain_jobs(&mut self) {
        for handle in self.jobs.drain(..) {
            if let Err(e) = handle.await {
                warn!("Descriptor task ended abnormally: {}", e);
            }
        }
    }

    /// Records descriptor activity from a filesystem event.
    ///
    /// Creation and modification both refresh the timestamp, so a file
    /// still being written keeps its dispatch pushed back.
    fn note_event(&self, pending: &mut HashMap<PathBuf, Instant>, event: notify::Event) {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }
        for path in event.paths {
            if is_descriptor_file(&path) {
                debug!("Descriptor activity: {}", path.display());
                pending.insert(path, Instant::now());
            }
        }
    }

    /// Dispatches every pending path that has been quiet long enough,
    /// removing it from the map so it is processed exactly once.
    fn dispatch_stable(&mut self, pending: &mut HashMap<PathBuf, Instant>) {
        let now = Instant::now();
        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) >= self.debounce)
            .map(|(path, _)| path.clone())
            .collect();

        for path in ready {
            pending.remove(&path);
            info!("Descriptor {} is stable, processing", path.display());
            self.spawn_job(path);
        }
    }

    /// Spawns one descriptor's end-to-end processing as its own task,
    /// keeping the handle so shutdown can wait for it.
    fn spawn_job(&mut self, path: PathBuf) {
        let ctx = JobContext {
            arr: self.arr.clone(),
            arr_client: Arc::clone(&self.arr_client),
            provider: Arc::clone(&self.provider),
            db: Arc::clone(&self.db),
            mount_folder: self.mount_folder.clone(),
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
        };
        self.jobs.push(tokio::spawn(process_descriptor(path, ctx)));
    }
}

/// Everything one descriptor's processing task needs.
struct JobContext {
    arr: ArrConfig,
    arr_client: Arc<ArrClient>,
    provider: Arc<Provider>,
    db: Arc<Database>,
    mount_folder: PathBuf,
    events: broadcast::Sender<Event>,
    shutdown: CancellationToken,
}

/// Runs one descriptor end to end: provider pipeline, then readiness
/// polling and publication. Failures clean up the descriptor file and are
/// reported back to the owning arr where the content is to blame.
///
/// The provider phase races against the shutdown token, so an in-flight
/// job is abandoned at its next suspension point when the process stops;
/// the descriptor file survives abandonment and can be redropped.
async fn process_descriptor(path: PathBuf, ctx: JobContext) {
    let result = tokio::select! {
        _ = ctx.shutdown.cancelled() => {
            info!("Shutdown requested; abandoning descriptor {}", path.display());
            return;
        }
        result = ctx.provider.process(&path, &ctx.arr.watch_folder) => result,
    };

    match result {
        Ok(torrent) if torrent.files.is_empty() => {
            // Downloaded but nothing selected should not happen; treat it
            // like a content failure so the arr can re-grab
            error!(
                "Torrent {} completed with no files; cleaning up",
                torrent.name
            );
            torrent.remove_source().await;
            if let Err(e) = ctx
                .db
                .set_torrent_error(&torrent.info_hash, "completed with no files")
                .await
            {
                warn!("Failed to record failure for {}: {}", torrent.info_hash, e);
            }
            if let Err(e) = ctx.arr_client.report_failed(&torrent.info_hash).await {
                warn!("Failed to report {} to the arr: {}", torrent.info_hash, e);
            }
            let _ = ctx.events.send(Event::Failed {
                info_hash: torrent.info_hash.clone(),
                name: torrent.name.clone(),
                error: "completed with no files".to_string(),
            });
        }
        Ok(torrent) => {
            publisher::publish_when_ready(
                torrent,
                &ctx.mount_folder,
                &ctx.arr.completed_folder,
                &ctx.events,
                &ctx.shutdown,
            )
            .await;
        }
        Err(error) => {
            handle_failure(&path, &error, &ctx.db, &ctx.arr_client, &ctx.events).await;
        }
    }
}

/// Cleans up after a failed descriptor: removes the source file, records
/// the failure, and reports content failures to the owning arr.
async fn handle_failure(
    path: &Path,
    error: &Error,
    db: &Database,
    arr_client: &ArrClient,
    events: &broadcast::Sender<Event>,
) {
    error!("Failed to process {}: {}", path.display(), error);

    // The descriptor is consumed either way; the arr resupplies it when the
    // release is retried
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!("Failed to remove descriptor {}: {}", path.display(), e);
    }

    let hash = error.info_hash().map(str::to_string);
    if error.is_content_failure()
        && let Some(hash) = &hash
    {
        // A skipped torrent already persisted its status; everything else
        // gets the failure recorded on its row
        if !matches!(error, Error::Debrid(DebridError::NotCached { .. })) {
            if let Err(e) = db.set_torrent_error(hash, &error.to_string()).await {
                warn!("Failed to record failure for {}: {}", hash, e);
            }
        }
        if let Err(e) = arr_client.report_failed(hash).await {
            warn!("Failed to report {} to the arr: {}", hash, e);
        }
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let _ = events.send(Event::Failed {
        info_hash: hash.unwrap_or_default(),
        name,
        error: error.to_string(),
    });
}
