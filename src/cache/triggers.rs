//! Revalidation triggers and the periodic refresh loop.

use crate::cache::controller::CacheController;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Why a fetch was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First subscription, or a remount outside the dedup window
    Mount,
    /// Explicit invalidation after a mutation
    Invalidate,
    Focus,
    Reconnect,
    Interval,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Mount => "mount",
            Trigger::Invalidate => "invalidate",
            Trigger::Focus => "focus",
            Trigger::Reconnect => "reconnect",
            Trigger::Interval => "interval",
        }
    }
}

impl CacheController {
    /// Start the periodic refresh task. Returns `None` when no refresh
    /// interval is configured.
    pub fn spawn_refresh_loop(&self, mut shutdown_rx: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        let interval = self.config().refresh_interval?;
        let controller = self.clone();

        Some(tokio::spawn(async move {
            info!(
                interval_ms = interval.as_millis() as u64,
                "Starting periodic cache refresh"
            );

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                tokio::select! {
                    _ = ticker.tick() => {
                        let started = controller.refresh_tick().await;
                        if started > 0 {
                            debug!(keys = started, "Periodic refresh started fetches");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            info!("Periodic cache refresh stopped");
        }))
    }
}
