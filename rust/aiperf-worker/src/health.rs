//! Per-phase task accounting and periodic `WorkerHealth` publication.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aiperf_bus::{envelope::subjects, Broker, Envelope};
use aiperf_core::{AiperfResult, CreditPhase, MessageType, WorkerHealth, WorkerPhaseTaskStats};
use sysinfo::{Pid, System};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Tracks per-phase in-flight/completed/failed counts for one worker
/// process. Updated by the credit-pull loop, read by the health reporter.
#[derive(Default)]
pub struct WorkerTaskStats {
    inner: Mutex<HashMap<CreditPhase, WorkerPhaseTaskStats>>,
}

impl WorkerTaskStats {
    pub async fn mark_started(&self, phase: CreditPhase) {
        let mut inner = self.inner.lock().await;
        inner.entry(phase).or_default().in_flight += 1;
    }

    pub async fn mark_finished(&self, phase: CreditPhase, failed: bool) {
        let mut inner = self.inner.lock().await;
        let entry = inner.entry(phase).or_default();
        entry.in_flight = entry.in_flight.saturating_sub(1);
        if failed {
            entry.failed += 1;
        } else {
            entry.completed += 1;
        }
    }

    pub async fn snapshot(&self) -> HashMap<CreditPhase, WorkerPhaseTaskStats> {
        self.inner.lock().await.clone()
    }
}

pub struct HealthReporter {
    worker_id: String,
    broker: Broker,
    stats: Arc<WorkerTaskStats>,
}

impl HealthReporter {
    pub fn new(worker_id: impl Into<String>, broker: Broker, stats: Arc<WorkerTaskStats>) -> Self {
        Self {
            worker_id: worker_id.into(),
            broker,
            stats,
        }
    }

    pub fn spawn(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut system = System::new_all();
            let pid = sysinfo::get_current_pid().ok();
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(err) = self.publish_once(&mut system, pid).await {
                    warn!(error = %err, "failed to publish worker health");
                }
            }
        })
    }

    async fn publish_once(&self, system: &mut System, pid: Option<Pid>) -> AiperfResult<()> {
        let (cpu_percent, memory_bytes) = if let Some(pid) = pid {
            system.refresh_process(pid);
            system
                .process(pid)
                .map(|process| (process.cpu_usage() as f64, process.memory()))
                .unwrap_or((0.0, 0))
        } else {
            (0.0, 0)
        };

        let health = WorkerHealth {
            worker_id: self.worker_id.clone(),
            cpu_percent,
            memory_bytes,
            task_stats: self.stats.snapshot().await,
        };
        let envelope = Envelope::new(subjects::WORKER_HEALTH, MessageType::WorkerHealth, &health)?;
        self.broker.publish(envelope);
        Ok(())
    }
}
