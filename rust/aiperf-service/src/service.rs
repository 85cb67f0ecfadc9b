//! The `Service` trait and the runtime that drives it through its
//! lifecycle, running hooks in the order described in spec §4.2.
//!
//! Where the original source collects hooks dynamically (decorators
//! discovered via reflection at dispatch time), this crate follows the
//! DESIGN NOTES guidance: the "hooks" a service supports are just trait
//! methods resolved at compile time, and `background_task`s are a single
//! method the runtime spawns and cancels — a registry over reflection,
//! expressed as Rust's own vtable rather than a hand-rolled one.

use std::sync::Arc;
use std::time::Duration;

use aiperf_core::{AiperfError, AiperfResult};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

// `Service` hooks all take `&self`: a service owns its mutable state behind
// its own interior-mutable fields (atomics, `DashMap`, `OnceLock`, ...)
// rather than behind the runtime's lock, so a long-running `background_task`
// never has to hold a guard that `dispatch_command` also needs to proceed.

use crate::command::{CommandMessage, CommandOutcome};
use crate::dedup::CommandDedup;
use crate::state::ServiceState;

/// Implemented by every AIPerf service (dataset manager, timing manager,
/// worker, parser, records manager). Default method bodies are no-ops so a
/// service only overrides the hooks it actually needs.
#[async_trait]
pub trait Service: Send + Sync {
    fn service_id(&self) -> &str;
    fn service_type(&self) -> &'static str;

    /// `on_init`: prepare internal state. Runs once, during `initialize()`.
    async fn on_init(&self) -> AiperfResult<()> {
        Ok(())
    }

    /// `on_start`: acquire resources (sockets, HTTP clients). Runs once,
    /// during `start()`, before the background task is spawned.
    async fn on_start(&self) -> AiperfResult<()> {
        Ok(())
    }

    /// `on_stop`: release resources, in addition to the background task
    /// cancellation the runtime performs automatically.
    async fn on_stop(&self) -> AiperfResult<()> {
        Ok(())
    }

    /// `on_command`: handle one command addressed to this service. Called
    /// at most once per distinct `command_id` (duplicates are filtered by
    /// the runtime before this is invoked).
    async fn on_command(&self, _command: &CommandMessage) -> AiperfResult<CommandOutcome> {
        Ok(CommandOutcome::Unhandled)
    }

    /// `background_task`: a long-running loop spawned after `on_start` and
    /// cancelled on `stop()`. The default never runs (services that need no
    /// background work, like a pure request handler, leave this as-is).
    /// Implementations should `select!` against `cancel.cancelled()` at
    /// every suspension point.
    async fn background_task(&self, _cancel: CancellationToken) -> AiperfResult<()> {
        std::future::pending().await
    }

    /// Whether an error escaping [`Service::background_task`] should
    /// transition the service to `Failed` (`true`) or just be logged
    /// (`false`). Mirrors the `stop_on_error` flag on the original
    /// `background_task` hook decorator.
    fn stop_background_task_on_error(&self) -> bool {
        true
    }
}

/// Drives one [`Service`] through {Created -> Initialized -> Running ->
/// Stopped/Failed}, running hooks in order and enforcing the state machine.
pub struct ServiceRuntime<S: Service> {
    service: Arc<S>,
    state: Arc<RwLock<ServiceState>>,
    dedup: Arc<RwLock<CommandDedup>>,
    background: Arc<RwLock<Option<JoinHandle<()>>>>,
    cancel: CancellationToken,
    stop_kill_grace: Duration,
}

impl<S: Service + 'static> ServiceRuntime<S> {
    pub fn new(service: S) -> Self {
        Self {
            service: Arc::new(service),
            state: Arc::new(RwLock::new(ServiceState::Created)),
            dedup: Arc::new(RwLock::new(CommandDedup::default())),
            background: Arc::new(RwLock::new(None)),
            cancel: CancellationToken::new(),
            stop_kill_grace: Duration::from_secs(5),
        }
    }

    pub async fn state(&self) -> ServiceState {
        *self.state.read().await
    }

    async fn transition(&self, to: ServiceState) -> AiperfResult<()> {
        let mut state = self.state.write().await;
        if !state.can_transition_to(to) {
            return Err(AiperfError::InvalidState(format!(
                "illegal transition {state:?} -> {to:?}"
            )));
        }
        *state = to;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn initialize(&self) -> AiperfResult<()> {
        self.transition(ServiceState::Initializing).await?;
        let result = self.service.on_init().await;
        match result {
            Ok(()) => {
                self.transition(ServiceState::Initialized).await?;
                Ok(())
            }
            Err(err) => {
                *self.state.write().await = ServiceState::Failed;
                error!(error = %err, "on_init failed, service marked Failed");
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn start(&self) -> AiperfResult<()> {
        self.transition(ServiceState::Starting).await?;
        if let Err(err) = self.service.on_start().await {
            *self.state.write().await = ServiceState::Failed;
            return Err(err);
        }

        let service = Arc::clone(&self.service);
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let stop_on_error = service.stop_background_task_on_error();
            let result = service.background_task(cancel.clone()).await;
            if let Err(err) = result {
                if cancel.is_cancelled() {
                    // Cancellation in progress; swallow at the hook boundary.
                    return;
                }
                if stop_on_error {
                    error!(error = %err, "background_task failed, service marked Failed");
                    *state.write().await = ServiceState::Failed;
                } else {
                    warn!(error = %err, "background_task failed, continuing per stop_on_error=false");
                }
            }
        });
        *self.background.write().await = Some(handle);

        self.transition(ServiceState::Running).await?;
        info!("service running");
        Ok(())
    }

    /// Stop the service. Calling this a second time while already
    /// `Stopping` force-aborts the background task immediately instead of
    /// waiting out the grace period (spec §4.2: "force-kill its own
    /// process" on a second `stop()`).
    #[instrument(skip(self))]
    pub async fn stop(&self) -> AiperfResult<()> {
        let already_stopping = { *self.state.read().await == ServiceState::Stopping };
        if already_stopping {
            if let Some(handle) = self.background.write().await.take() {
                handle.abort();
            }
            return Ok(());
        }

        self.transition(ServiceState::Stopping).await?;
        self.cancel.cancel();

        if let Some(handle) = self.background.write().await.take() {
            match tokio::time::timeout(self.stop_kill_grace, handle).await {
                Ok(_) => {}
                Err(_) => warn!("background task did not exit within grace period, continuing stop"),
            }
        }

        let result = self.service.on_stop().await;
        match result {
            Ok(()) => {
                self.transition(ServiceState::Stopped).await?;
                Ok(())
            }
            Err(err) => {
                *self.state.write().await = ServiceState::Failed;
                Err(err)
            }
        }
    }

    /// Dispatch one command to the service, filtering duplicate
    /// `command_id`s and non-matching targets before invoking the handler.
    pub async fn dispatch_command(&self, command: &CommandMessage) -> Option<CommandOutcome> {
        let service_id = self.service.service_id().to_string();
        let service_type = self.service.service_type();
        if !command.target.matches(service_type, &service_id) {
            return None;
        }
        if !self.dedup.write().await.accept(&command.command_id) {
            return None;
        }
        let outcome = self
            .service
            .on_command(command)
            .await
            .unwrap_or_else(|err| CommandOutcome::Error { error: err.into() });
        Some(outcome)
    }

    pub fn service_handle(&self) -> Arc<S> {
        Arc::clone(&self.service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandKind, CommandTarget};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Echo {
        id: String,
        started: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Service for Echo {
        fn service_id(&self) -> &str {
            &self.id
        }
        fn service_type(&self) -> &'static str {
            "echo"
        }
        async fn on_start(&self) -> AiperfResult<()> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn on_stop(&self) -> AiperfResult<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn on_command(&self, command: &CommandMessage) -> AiperfResult<CommandOutcome> {
            if command.command == CommandKind::ProfileConfigure {
                Ok(CommandOutcome::Success { data: None })
            } else {
                Ok(CommandOutcome::Unhandled)
            }
        }
    }

    #[tokio::test]
    async fn full_lifecycle_runs_hooks_in_order() {
        let started = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));
        let runtime = ServiceRuntime::new(Echo {
            id: "echo-1".into(),
            started: started.clone(),
            stopped: stopped.clone(),
        });

        runtime.initialize().await.unwrap();
        assert_eq!(runtime.state().await, ServiceState::Initialized);

        runtime.start().await.unwrap();
        assert_eq!(runtime.state().await, ServiceState::Running);
        assert!(started.load(Ordering::SeqCst));

        runtime.stop().await.unwrap();
        assert_eq!(runtime.state().await, ServiceState::Stopped);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn starting_before_init_is_rejected() {
        let runtime = ServiceRuntime::new(Echo {
            id: "echo-2".into(),
            started: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
        });
        assert!(runtime.start().await.is_err());
    }

    #[tokio::test]
    async fn duplicate_command_id_is_handled_once() {
        let runtime = ServiceRuntime::new(Echo {
            id: "echo-3".into(),
            started: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
        });
        runtime.initialize().await.unwrap();
        runtime.start().await.unwrap();

        let command = CommandMessage {
            command: CommandKind::ProfileConfigure,
            command_id: "cmd-1".into(),
            target: CommandTarget::broadcast(),
            data: None,
            require_response: true,
        };
        let first = runtime.dispatch_command(&command).await;
        assert!(matches!(first, Some(CommandOutcome::Success { .. })));
        let second = runtime.dispatch_command(&command).await;
        assert!(second.is_none());
    }
}
