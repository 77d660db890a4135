//! Graceful shutdown coordination
//!
//! Broadcasts a shutdown signal to every scan stream, waits for in-flight
//! scans to drain within a bounded window, then runs registered cleanup
//! hooks in order.

use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Shutdown signal receiver
pub type ShutdownReceiver = broadcast::Receiver<ShutdownSignal>;

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Complete in-flight scans, then stop
    Graceful,
    /// Stop everything now
    Immediate,
}

/// Cleanup work run at the end of shutdown
#[async_trait]
pub trait ShutdownHook: Send + Sync {
    /// Hook name for logging
    fn name(&self) -> &str;

    /// Run the cleanup
    async fn on_shutdown(&self) -> Result<()>;
}

/// Coordinates a bounded, ordered shutdown
pub struct ShutdownManager {
    sender: broadcast::Sender<ShutdownSignal>,
    shutting_down: Arc<AtomicBool>,
    in_flight: Arc<AtomicU64>,
    hooks: Arc<RwLock<Vec<Arc<dyn ShutdownHook>>>>,
    drain_timeout: Duration,
}

impl ShutdownManager {
    /// New manager with the given drain window
    pub fn new(drain_timeout: Duration) -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            sender,
            shutting_down: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicU64::new(0)),
            hooks: Arc::new(RwLock::new(Vec::new())),
            drain_timeout,
        }
    }

    /// Get a shutdown receiver
    pub fn subscribe(&self) -> ShutdownReceiver {
        self.sender.subscribe()
    }

    /// Whether shutdown is in progress
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Register a cleanup hook; hooks run in registration order
    pub fn register_hook<H: ShutdownHook + 'static>(&self, hook: H) {
        self.hooks.write().unwrap().push(Arc::new(hook));
    }

    /// Track a scan; returns `None` once shutdown started so callers
    /// refuse new work during the drain
    pub fn track_scan(&self) -> Option<ScanGuard> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(ScanGuard {
            counter: Arc::clone(&self.in_flight),
        })
    }

    /// Current in-flight scan count
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run the full shutdown sequence: signal, drain, hooks
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already in progress");
            return;
        }
        info!(
            "Shutting down, draining {} in-flight scans",
            self.in_flight_count()
        );
        let _ = self.sender.send(ShutdownSignal::Graceful);

        let start = Instant::now();
        while self.in_flight_count() > 0 {
            if start.elapsed() >= self.drain_timeout {
                warn!(
                    "Drain window elapsed with {} scans still in flight",
                    self.in_flight_count()
                );
                let _ = self.sender.send(ShutdownSignal::Immediate);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // Clone out of the lock so hooks can await freely
        let hooks: Vec<Arc<dyn ShutdownHook>> = self.hooks.read().unwrap().clone();
        for hook in hooks {
            let name = hook.name().to_string();
            info!("Running shutdown hook: {}", name);
            match tokio::time::timeout(Duration::from_secs(30), hook.on_shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Shutdown hook '{}' failed: {}", name, e),
                Err(_) => error!("Shutdown hook '{}' timed out", name),
            }
        }
        info!("Shutdown completed in {:?}", start.elapsed());
    }
}

/// Guard decrementing the in-flight counter on drop
pub struct ScanGuard {
    counter: Arc<AtomicU64>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
