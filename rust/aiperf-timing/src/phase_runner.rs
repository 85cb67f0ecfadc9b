//! Publishes the phase lifecycle messages (START/PROGRESS/SENDING_COMPLETE/
//! COMPLETE) and owns one phase's [`CreditPhaseStats`]. Strategies call into
//! this for every credit they decide to send; the runner is the single
//! writer of the phase's accounting so overlapping phases (the next phase's
//! first drop may land before the previous phase's last return, per spec)
//! never race on shared state.

use std::sync::Arc;
use std::time::Duration;

use aiperf_bus::{envelope::subjects, Broker, Envelope};
use aiperf_core::{AiperfResult, CreditDrop, CreditPhase, CreditPhaseStats, CreditReturn, MessageType, PerfNs};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

type ReturnHook = Box<dyn Fn(&CreditReturn) + Send + Sync>;

pub struct PhaseRunner {
    phase: CreditPhase,
    broker: Broker,
    stats: Mutex<CreditPhaseStats>,
    drain: Notify,
    return_hook: Mutex<Option<ReturnHook>>,
}

impl PhaseRunner {
    pub fn new_count_based(phase: CreditPhase, total_expected_requests: u64, broker: Broker) -> Arc<Self> {
        Arc::new(Self {
            phase,
            broker,
            stats: Mutex::new(CreditPhaseStats::new_count_based(phase, total_expected_requests)),
            drain: Notify::new(),
            return_hook: Mutex::new(None),
        })
    }

    pub fn new_time_based(phase: CreditPhase, expected_duration_ns: i64, broker: Broker) -> Arc<Self> {
        Arc::new(Self {
            phase,
            broker,
            stats: Mutex::new(CreditPhaseStats::new_time_based(phase, expected_duration_ns)),
            drain: Notify::new(),
            return_hook: Mutex::new(None),
        })
    }

    pub fn phase(&self) -> CreditPhase {
        self.phase
    }

    /// Installs a callback invoked after every `handle_return`, used by
    /// strategies with a concurrency ceiling to release the permit that
    /// gated the returned credit.
    pub async fn set_return_hook(&self, hook: ReturnHook) {
        *self.return_hook.lock().await = Some(hook);
    }

    pub async fn stats_snapshot(&self) -> CreditPhaseStats {
        self.stats.lock().await.clone()
    }

    pub async fn start(&self) -> AiperfResult<()> {
        let snapshot = {
            let mut stats = self.stats.lock().await;
            stats.mark_started();
            stats.clone()
        };
        self.publish(MessageType::CreditPhaseStart, &snapshot)
    }

    pub async fn drop_credit(
        &self,
        conversation_id: Option<String>,
        credit_drop_ns: Option<i64>,
    ) -> AiperfResult<()> {
        let drop = CreditDrop {
            credit_phase: self.phase,
            conversation_id,
            credit_drop_ns,
        };
        self.broker
            .push(
                aiperf_bus::envelope::queues::CREDIT_DROP,
                Envelope::new(aiperf_bus::envelope::queues::CREDIT_DROP, MessageType::CreditDrop, &drop)?,
            )
            .await?;
        self.stats.lock().await.sent += 1;
        Ok(())
    }

    /// Folds a worker's `CreditReturn` into this phase's accounting. No-op
    /// (beyond logging) if the return names a different phase; callers
    /// should route by `credit_phase` before calling this.
    pub async fn handle_return(&self, ret: &CreditReturn) {
        debug_assert_eq!(ret.credit_phase, self.phase);
        {
            let mut stats = self.stats.lock().await;
            if ret.failed {
                stats.failed += 1;
            } else {
                stats.completed += 1;
            }
            if stats.is_sending_complete() && stats.in_flight() == 0 {
                self.drain.notify_waiters();
            }
        }
        if let Some(hook) = self.return_hook.lock().await.as_ref() {
            hook(ret);
        }
    }

    pub async fn mark_sending_complete(&self) -> AiperfResult<()> {
        let snapshot = {
            let mut stats = self.stats.lock().await;
            stats.mark_sending_complete();
            if stats.in_flight() == 0 {
                self.drain.notify_waiters();
            }
            stats.clone()
        };
        self.publish(MessageType::CreditPhaseSendingComplete, &snapshot)
    }

    /// Blocks until `in_flight() == 0` (after sending-complete has been
    /// marked), then publishes `CREDIT_PHASE_COMPLETE`.
    pub async fn wait_for_drain_and_complete(&self) -> AiperfResult<()> {
        loop {
            let notified = self.drain.notified();
            {
                let stats = self.stats.lock().await;
                if stats.in_flight() == 0 {
                    break;
                }
            }
            notified.await;
        }
        let snapshot = {
            let mut stats = self.stats.lock().await;
            stats.mark_ended();
            stats.clone()
        };
        self.publish(MessageType::CreditPhaseComplete, &snapshot)
    }

    /// Spawns a task publishing `CREDIT_PHASE_PROGRESS` on `interval` until
    /// the phase reaches `is_complete()`.
    pub fn spawn_progress_ticker(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let snapshot = runner.stats.lock().await.clone();
                let complete = snapshot.is_complete();
                if let Err(err) = runner.publish(MessageType::CreditPhaseProgress, &snapshot) {
                    debug!(error = %err, "failed to publish phase progress");
                }
                if complete {
                    break;
                }
            }
        })
    }

    fn publish(&self, message_type: MessageType, payload: &CreditPhaseStats) -> AiperfResult<()> {
        let envelope = Envelope::new(subjects::CREDIT_PHASE, message_type, payload)?;
        self.broker.publish(envelope);
        Ok(())
    }
}

/// Convenience: the monotonic instant used as every phase's T0 reference.
pub fn perf_now() -> PerfNs {
    PerfNs::now()
}
