//! Background maintenance scheduling.
//!
//! The engine itself is synchronous; this module owns the only async piece, a
//! tokio task that periodically takes the engine lock and runs one
//! maintenance cycle. Tests bypass it entirely and call
//! [`MemorySubsystem::run_maintenance`] directly.
//!
//! [`MemorySubsystem::run_maintenance`]: crate::subsystem::MemorySubsystem::run_maintenance

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::subsystem::MemorySubsystem;

pub struct MaintenanceScheduler {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl MaintenanceScheduler {
    /// Spawn the maintenance loop. Must be called from within a tokio
    /// runtime. Ticks missed while a cycle runs long are skipped, not
    /// replayed.
    pub fn spawn(engine: Arc<Mutex<MemorySubsystem>>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; swallow it so a fresh engine
            // is not swept before anything arrives.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let engine = Arc::clone(&engine);
                        // The cycle is CPU-bound and takes a std mutex, so it
                        // runs off the async worker threads.
                        let outcome = tokio::task::spawn_blocking(move || {
                            let mut engine = match engine.lock() {
                                Ok(guard) => guard,
                                Err(poisoned) => poisoned.into_inner(),
                            };
                            engine.run_maintenance()
                        })
                        .await;
                        match outcome {
                            Ok(report) if report.skipped => {
                                debug!("maintenance cycle skipped, previous still running")
                            }
                            Ok(report) => debug!(?report, "maintenance cycle done"),
                            Err(e) => warn!(error = %e, "maintenance task panicked"),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("maintenance scheduler stopping");
                        break;
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Stop the loop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(()).await;
        let _ = self.handle.await;
    }
}
