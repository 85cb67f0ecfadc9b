//! The system controller (component C8, spec §4.8): wires `UserConfig`
//! into each service's concrete config, drives the registration →
//! configure → start → records → shutdown lifecycle, and handles
//! SIGINT cancellation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aiperf_bus::{envelope::subjects, Broker};
use aiperf_config::{load_config, CliOverrides, UserConfig};
use aiperf_core::AiperfError;
use aiperf_dataset::{DatasetManager, SyntheticConfig, SyntheticGenerator};
use aiperf_parser::{Parser, ParserConfig};
use aiperf_records::{default_metrics, Exporter, JsonFileExporter, MetricRegistry, ProfileResults, RecordsManager};
use aiperf_service::{CommandKind, CommandMessage, ServiceRuntime};
use aiperf_timing::{RequestRateMode, TimingConfig, TimingManager, TimingMode};
use aiperf_worker::{ChatConverter, EndpointFamily, HttpClientConfig, ModelEndpointInfo, Worker, WorkerConfig};
use tracing::{error, info, warn};

/// Registration, profile-configure, and profile-start each get a
/// generous ceiling per spec §5's documented defaults; everything in
/// this crate runs in-process so these are rarely approached in
/// practice.
const SERVICE_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(30);
const PROFILE_CONFIGURE_TIMEOUT: Duration = Duration::from_secs(300);
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(30);
/// How long the controller waits for a graceful `CreditsComplete` after
/// the first SIGINT before giving up and tearing everything down anyway.
const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(10);

pub async fn run(config_path: Option<&Path>, overrides: &CliOverrides) -> anyhow::Result<ProfileResults> {
    let user_config = load_config(config_path, overrides).map_err(|err| anyhow::anyhow!(err))?;
    let env_overlay = aiperf_config::EnvOverlay::from_env();

    let family = parse_endpoint_family(&user_config.endpoint.endpoint)?;
    let broker = Broker::default();

    let dataset = build_dataset(&user_config, broker.clone()).await;
    let dataset_runtime = ServiceRuntime::new(dataset.clone());

    let worker_runtime = build_worker(&user_config, &env_overlay, broker.clone(), dataset.clone(), family);
    let timing_runtime = build_timing(&user_config, broker.clone(), dataset.clone());
    let parser_runtime = ServiceRuntime::new(Parser::new(
        "parser-0",
        broker.clone(),
        dataset.clone(),
        ParserConfig { family },
    ));
    let records_runtime = build_records(&user_config, broker.clone());

    // Step 2: "launch + await registration". Every service lives in this
    // process, so a successful `initialize()` stands in for the
    // controller receiving that service's `RegistrationMessage`.
    tokio::time::timeout(SERVICE_REGISTRATION_TIMEOUT, async {
        dataset_runtime.initialize().await?;
        worker_runtime.initialize().await?;
        timing_runtime.initialize().await?;
        parser_runtime.initialize().await?;
        records_runtime.initialize().await
    })
    .await
    .map_err(|_| anyhow::anyhow!("service registration timed out"))??;

    dataset_runtime.start().await?;
    worker_runtime.start().await?;
    parser_runtime.start().await?;
    records_runtime.start().await?;

    // Step 3: PROFILE_CONFIGURE. Each service already received its
    // concrete config at construction time, so this broadcast is mostly
    // ceremonial acknowledgment rather than carrying the payload itself.
    let configure = CommandMessage::broadcast(CommandKind::ProfileConfigure, None);
    tokio::time::timeout(PROFILE_CONFIGURE_TIMEOUT, async {
        dataset_runtime.dispatch_command(&configure).await;
        worker_runtime.dispatch_command(&configure).await;
        timing_runtime.dispatch_command(&configure).await;
        parser_runtime.dispatch_command(&configure).await;
        records_runtime.dispatch_command(&configure).await;
    })
    .await
    .map_err(|_| anyhow::anyhow!("profile configure timed out"))?;

    // Step 4: PROFILE_START. The timing manager's background task
    // actually drives the run once `start()` is called; this dispatch
    // just lets it acknowledge.
    let start = CommandMessage::broadcast(CommandKind::ProfileStart, None);
    timing_runtime.start().await?;
    timing_runtime.dispatch_command(&start).await;
    worker_runtime.dispatch_command(&start).await;

    let mut subscriber = broker.subscribe();
    let mut cancel_requested = false;

    loop {
        tokio::select! {
            received = subscriber.recv() => {
                match received {
                    Ok(envelope) if envelope.subject == subjects::CREDITS_COMPLETE => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
            signal_result = tokio::signal::ctrl_c(), if !cancel_requested => {
                signal_result?;
                warn!("SIGINT received, cancelling profile run");
                cancel_requested = true;
                timing_runtime.stop().await.ok();
            }
            _ = tokio::time::sleep(CANCEL_GRACE_PERIOD), if cancel_requested => {
                warn!("timed out waiting for a graceful CreditsComplete after cancel");
                break;
            }
            signal_result = tokio::signal::ctrl_c(), if cancel_requested => {
                signal_result?;
                error!("second SIGINT received, forcing shutdown");
                break;
            }
        }
    }

    // Step 5/6: PROCESS_RECORDS, then SHUTDOWN.
    let process_records = CommandMessage::broadcast(CommandKind::ProcessRecords, None);
    let outcome = records_runtime
        .dispatch_command(&process_records)
        .await
        .ok_or_else(|| anyhow::anyhow!("records manager did not handle PROCESS_RECORDS"))?;
    let results = match outcome {
        aiperf_service::CommandOutcome::Success { data } => {
            let data = data.ok_or_else(|| anyhow::anyhow!("records manager returned no data"))?;
            serde_json::from_value(data)?
        }
        aiperf_service::CommandOutcome::Error { error } => {
            return Err(anyhow::anyhow!("records manager failed: {}", error.message))
        }
        other => return Err(anyhow::anyhow!("unexpected PROCESS_RECORDS outcome: {other:?}")),
    };

    let shutdown = CommandMessage::broadcast(CommandKind::Shutdown, None);
    dataset_runtime.dispatch_command(&shutdown).await;
    worker_runtime.dispatch_command(&shutdown).await;
    parser_runtime.dispatch_command(&shutdown).await;
    records_runtime.dispatch_command(&shutdown).await;

    stop_with_grace("dataset_manager", dataset_runtime.stop()).await;
    stop_with_grace("worker", worker_runtime.stop()).await;
    stop_with_grace("timing_manager", timing_runtime.stop()).await;
    stop_with_grace("parser", parser_runtime.stop()).await;
    stop_with_grace("records_manager", records_runtime.stop()).await;

    info!(
        total_records = results.total_records,
        error_records = results.error_records,
        cancelled = results.cancelled,
        "profile run complete"
    );
    Ok(results)
}

/// SIGTERM-then-SIGKILL, modeled as a timeout race against each
/// service's own `stop()` (spec §4.8 step 6, §5's grace-period policy).
async fn stop_with_grace(service_type: &str, stop: impl std::future::Future<Output = aiperf_core::AiperfResult<()>>) {
    if tokio::time::timeout(STOP_GRACE_PERIOD, stop).await.is_err() {
        warn!(service_type, "service did not stop within the grace period");
    }
}

async fn build_dataset(config: &UserConfig, broker: Broker) -> DatasetManager {
    let total = config.loadgen.request_count.unwrap_or(0) + config.loadgen.warmup_request_count;
    let dataset = DatasetManager::new(config.input.random_seed.unwrap_or(0), broker);
    dataset.set_expected_total(total as usize).await;
    if total > 0 {
        let generated = SyntheticGenerator::new(SyntheticConfig {
            num_conversations: total as usize,
            turns_per_conversation: 1,
            mean_input_tokens: 128,
            random_seed: config.input.random_seed.unwrap_or(0),
        })
        .generate();
        dataset.ingest_generated(generated).await;
    }
    dataset
}

fn build_worker(
    config: &UserConfig,
    env_overlay: &aiperf_config::EnvOverlay,
    broker: Broker,
    dataset: DatasetManager,
    family: EndpointFamily,
) -> ServiceRuntime<Worker> {
    let worker_config = WorkerConfig {
        endpoint: ModelEndpointInfo {
            model: config.endpoint.model.clone(),
            base_url: config.endpoint.url.clone(),
            family,
            streaming: config.endpoint.streaming,
        },
        max_concurrent_requests: config.loadgen.concurrency.unwrap_or(1).max(1) as usize,
        health_check_interval: env_overlay.worker_health_check_interval,
        http: HttpClientConfig::default(),
    };
    let worker = Worker::new("worker-0", broker, dataset, worker_config, Arc::new(ChatConverter));
    ServiceRuntime::new(worker)
}

fn build_timing(config: &UserConfig, broker: Broker, dataset: DatasetManager) -> ServiceRuntime<TimingManager> {
    let mode = if config.loadgen.fixed_schedule {
        TimingMode::FixedSchedule
    } else if config.loadgen.request_rate.is_some() {
        TimingMode::RequestRate
    } else {
        TimingMode::Concurrency
    };

    let timing_config = TimingConfig {
        mode,
        concurrency: config.loadgen.concurrency.map(|c| c as u64),
        request_rate: config.loadgen.request_rate,
        request_rate_mode: RequestRateMode::Constant,
        max_concurrency: None,
        request_count: config.loadgen.request_count,
        benchmarking_duration_sec: config.loadgen.benchmarking_duration,
        warmup_request_count: config.loadgen.warmup_request_count,
        random_seed: config.input.random_seed.unwrap_or(0),
        progress_interval: Duration::from_millis(500),
    };
    ServiceRuntime::new(TimingManager::new("timing-0", broker, dataset, timing_config))
}

fn build_records(config: &UserConfig, broker: Broker) -> ServiceRuntime<RecordsManager> {
    let registry = MetricRegistry::new(default_metrics()).expect("default metric set has no cyclic dependencies");
    let exporters: Vec<Arc<dyn Exporter>> =
        vec![Arc::new(JsonFileExporter::new(config.output.profile_export_file.clone()))];
    ServiceRuntime::new(RecordsManager::new("records-0", broker, registry, exporters))
}

/// Maps the `UserConfig` endpoint string (spec §6's endpoint family
/// table) onto the worker crate's typed enum; kept here rather than in
/// `aiperf-config` so that crate doesn't need to depend on
/// `aiperf-worker` just for this one lookup.
fn parse_endpoint_family(name: &str) -> anyhow::Result<EndpointFamily> {
    match name {
        "chat" => Ok(EndpointFamily::Chat),
        "completions" => Ok(EndpointFamily::Completions),
        "embeddings" => Ok(EndpointFamily::Embeddings),
        "responses" => Ok(EndpointFamily::Responses),
        "generate" => Ok(EndpointFamily::Generate),
        other => Err(anyhow::anyhow!(AiperfError::Configuration(format!(
            "unknown endpoint family: {other}"
        )))),
    }
}
