use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::bus::{ExecutionEvent, StatusSnapshot};
use crate::engine::manager::ExecutionManager;

/// Fixed-interval heartbeat for passive observers.
///
/// Independently of per-execution events, republishes the full active set as
/// a `workflow-executions-status` event — but only while something is
/// actually in flight. Start is idempotent; stop cancels the ticker and
/// waits for it to wind down.
pub struct StatusMonitor {
    manager: Arc<ExecutionManager>,
    period: Duration,
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl StatusMonitor {
    pub fn new(manager: Arc<ExecutionManager>, period: Duration) -> Self {
        Self {
            manager,
            period,
            running: Mutex::new(None),
        }
    }

    /// Spawn the ticker. Calling start on an already-running monitor does
    /// nothing.
    pub fn start(&self) {
        let mut running = self.running.lock().expect("monitor state poisoned");
        if running.is_some() {
            debug!("Status monitor already running");
            return;
        }

        let token = CancellationToken::new();
        let manager = Arc::clone(&self.manager);
        let period = self.period;
        let loop_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let executions = manager.list_active().await;
                        if executions.is_empty() {
                            continue;
                        }
                        let total_active = executions.len();
                        manager.bus().publish(ExecutionEvent::StatusSnapshot(StatusSnapshot {
                            executions,
                            total_active,
                            timestamp: Utc::now(),
                        }));
                    }
                }
            }
        });

        *running = Some((token, handle));
        info!(period_ms = self.period.as_millis() as u64, "Status monitor started");
    }

    /// Stop the ticker and wait for it to exit. No-op if not running.
    pub async fn stop(&self) {
        let stopped = self
            .running
            .lock()
            .expect("monitor state poisoned")
            .take();

        if let Some((token, handle)) = stopped {
            token.cancel();
            let _ = handle.await;
            info!("Status monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().expect("monitor state poisoned").is_some()
    }
}
