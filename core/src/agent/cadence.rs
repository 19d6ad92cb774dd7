//! Background cadence for the slow cognitive phases.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::visitor::Visitor;

/// Runs reflect, wonder, and the memory backfill on a timer next to a live
/// session.
///
/// Phase errors are logged and the loop keeps going; only cancellation stops
/// it. The token is checked between phases so shutdown never waits on more
/// than one in-flight gateway call, and a grace period bounds even that.
pub struct CadenceTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl CadenceTask {
    /// Spawn the cadence loop for a visitor.
    pub fn spawn(visitor: Arc<Visitor>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            info!(
                target = "cadence",
                interval_ms = interval.as_millis() as u64,
                "Cadence task started"
            );
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                if visitor.config().enable_reflect {
                    if let Err(error) = visitor.reflect().await {
                        warn!(target = "cadence", error = %error, "Background reflect failed");
                    }
                }
                if token.is_cancelled() {
                    break;
                }
                if visitor.config().enable_wonder {
                    if let Err(error) = visitor.wonder().await {
                        warn!(target = "cadence", error = %error, "Background wonder failed");
                    }
                }
                if token.is_cancelled() {
                    break;
                }
                if visitor.config().enable_memory_update {
                    visitor.update_memory().await;
                }
            }
            debug!(target = "cadence", "Cadence task exited");
        });
        Self { handle, cancel }
    }

    /// Cooperatively stop the loop, aborting if it outlives the grace period.
    pub async fn shutdown(mut self, grace: Duration) {
        self.cancel.cancel();
        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(Ok(())) => debug!(target = "cadence", "Cadence task stopped"),
            Ok(Err(error)) => {
                warn!(target = "cadence", error = %error, "Cadence task ended abnormally")
            }
            Err(_) => {
                warn!(
                    target = "cadence",
                    grace_ms = grace.as_millis() as u64,
                    "Cadence task did not stop in time, aborting"
                );
                self.handle.abort();
            }
        }
    }
}
