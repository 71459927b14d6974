//! # debrid-dl
//!
//! Blackhole-style torrent orchestrator backed by a debrid service.
//!
//! ## Design Philosophy
//!
//! debrid-dl is designed to be:
//! - **Drop-in** - Watches the same blackhole folders arr applications
//!   already write to, no arr-side changes needed
//! - **Hands-off** - Descriptor files drive the whole lifecycle; no queue
//!   to manage, no manual file selection
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! A dropped `.torrent` or `.magnet` file is debounced, parsed, submitted to
//! the debrid provider, polled to completion, and finally published as a
//! symlink tree pointing into the provider's local mount. Failures are
//! reported back to the arr that dropped the descriptor so it can re-grab.
//!
//! ## Quick Start
//!
//! ```no_run
//! use debrid_dl::{Blackhole, Config, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.json")?;
//!
//!     let blackhole = Blackhole::new(config).await?;
//!     blackhole.start().await?;
//!
//!     // Subscribe to events
//!     let mut events = blackhole.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Run until SIGTERM/SIGINT, then shut down gracefully
//!     run_with_shutdown(blackhole).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Arr history lookup and failure reporting
pub mod arr;
/// Orchestrator and graceful shutdown
pub mod blackhole;
/// Rate-limited HTTP client
pub mod client;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Debrid provider backends
pub mod debrid;
/// Descriptor file parsing (.torrent and .magnet)
pub mod descriptor;
/// Error types
pub mod error;
/// Mount readiness polling and symlink publication
pub mod publisher;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Folder watching and debounced dispatch
pub mod watcher;

// Re-export commonly used types
pub use blackhole::Blackhole;
pub use client::{RateLimit, RateUnit, RequestClient, RequestLimiter};
pub use config::{ArrConfig, Config, DebridConfig};
pub use db::Database;
pub use debrid::{DebridProvider, Provider, RealDebrid};
pub use error::{DatabaseError, DebridError, Error, Result};
pub use types::{Event, Torrent, TorrentFile, TorrentStatus};
pub use watcher::FolderWatcher;

/// Helper function to run the blackhole with graceful signal handling.
///
/// Waits for a termination signal and then calls the blackhole's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Errors
///
/// Propagates errors from [`Blackhole::shutdown`].
///
/// # Example
///
/// ```no_run
/// use debrid_dl::{Blackhole, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::load("config.json")?;
///     let blackhole = Blackhole::new(config).await?;
///     blackhole.start().await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(blackhole).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(blackhole: Blackhole) -> Result<()> {
    wait_for_signal().await;
    blackhole.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
