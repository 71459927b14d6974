//! Orchestrator owning the store, the provider, and the watch loops
//!
//! [`Blackhole`] is the embedding surface of the crate: construct one from a
//! [`Config`], call [`Blackhole::start`] to spawn a watch loop per configured
//! arr, and [`Blackhole::shutdown`] to stop everything and close the store.
//! Lifecycle events are published on a broadcast channel; tap into it with
//! [`Blackhole::subscribe`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::config::Config;
use crate::db::Database;
use crate::debrid::Provider;
use crate::error::Error;
use crate::types::Event;
use crate::watcher::FolderWatcher;

/// Blackhole daemon: watches descriptor folders and drives every dropped
/// torrent through the debrid provider to a published symlink tree.
#[derive(Debug)]
pub struct Blackhole {
    /// Configuration (wrapped in Arc for sharing across tasks)
    config: Arc<Config>,

    /// Job store (wrapped in Arc for sharing across tasks)
    pub db: Arc<Database>,

    /// Shared provider backend
    provider: Arc<Provider>,

    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: broadcast::Sender<Event>,

    /// Root cancellation token; watch loops run on child tokens
    shutdown: CancellationToken,

    /// Handles of the spawned watch loops
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Blackhole {
    /// Create a new blackhole instance
    ///
    /// This validates the configuration, opens (or creates) the sqlite job
    /// store, and constructs the shared provider backend. No tasks run until
    /// [`Blackhole::start`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the database cannot
    /// be opened or migrated, or the provider credentials cannot form a
    /// request header.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.database_path).await?);

        // Broadcast channel with a buffer of 1000 events; each subscriber
        // receives every event independently
        let (event_tx, _rx) = broadcast::channel(1000);

        let provider = Arc::new(Provider::from_config(
            &config.debrid,
            Arc::clone(&db),
            event_tx.clone(),
        )?);

        Ok(Self {
            config: Arc::new(config),
            db,
            provider,
            event_tx,
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Start one watch loop per configured arr
    ///
    /// Each loop registers its filesystem watch (creating the watch folder
    /// if missing) before any task is spawned, so a folder that cannot be
    /// watched fails the whole startup instead of silently dropping one arr.
    ///
    /// # Errors
    ///
    /// Returns an error if a watch folder cannot be created or watched, an
    /// arr token cannot form a request header, or shutdown has already been
    /// initiated.
    pub async fn start(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        let mut watchers = Vec::with_capacity(self.config.arrs.len());
        for arr in &self.config.arrs {
            let mut watcher = FolderWatcher::new(
                &self.config,
                arr.clone(),
                Arc::clone(&self.provider),
                Arc::clone(&self.db),
                self.event_tx.clone(),
                self.shutdown.child_token(),
            )?;
            watcher.start()?;
            watchers.push(watcher);
        }

        let mut handles = self.handles.lock().await;
        for watcher in watchers {
            handles.push(tokio::spawn(watcher.run()));
        }

        info!("Started {} watch loop(s)", handles.len());
        Ok(())
    }

    /// Subscribe to lifecycle events
    ///
    /// Returns a broadcast receiver. Slow subscribers that fall more than
    /// the channel capacity behind miss the overwritten events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Gracefully shut down the blackhole
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Cancels the shared token, stopping watch loops and descriptor
    ///    tasks at their next suspension point
    /// 2. Waits for the loops (and the tasks they track) with a timeout
    ///    (30 seconds)
    /// 3. Emits [`Event::Shutdown`]
    /// 4. Closes the database connection pool
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` return leaves room for shutdown
    /// steps that can fail.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown");

        // 1. Signal every watch loop and descriptor task to stop
        self.shutdown.cancel();
        info!("Cancellation signalled to all tasks");

        // 2. Wait for the watch loops to drain, with a timeout
        let shutdown_timeout = Duration::from_secs(30);
        match tokio::time::timeout(shutdown_timeout, self.wait_for_watch_loops()).await {
            Ok(()) => {
                info!("All watch loops stopped");
            }
            Err(_) => {
                warn!("Timeout waiting for watch loops to stop, proceeding with shutdown");
            }
        }

        // 3. Emit shutdown event
        let _ = self.event_tx.send(Event::Shutdown);

        // 4. Close the store. The pool handle is shared, so this works
        // through the Arc; a task that missed the timeout sees pool-closed
        // errors on its remaining best-effort writes.
        self.db.pool().close().await;
        info!("Database connections closed");

        info!("Graceful shutdown complete");
        Ok(())
    }

    /// Join every watch loop handle. Loops join their own descriptor tasks
    /// before returning, so this also waits for in-flight torrents.
    async fn wait_for_watch_loops(&self) {
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!("Watch loop ended abnormally: {}", e);
            }
        }
    }
}
