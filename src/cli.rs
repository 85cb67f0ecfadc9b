//! `clap` derive surface (spec §6): the flags a user actually types,
//! resolved into an `aiperf_config::UserConfig` by
//! [`crate::controller::run`]. Mirrors the teacher's `clap`-derive usage
//! in `knhk-cli`, without the noun-verb dispatch that crate layers on
//! top (a single flat benchmark run has no sub-commands to dispatch).

use std::path::PathBuf;

use aiperf_config::CliOverrides;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "aiperf", about = "Distributed load-generation and measurement harness for LLM inference servers")]
pub struct Cli {
    /// YAML config file (spec §6 persisted-state layout). CLI flags below
    /// always override whatever this file sets.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Emit structured JSON logs instead of human-readable ones.
    #[arg(long)]
    pub log_json: bool,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub streaming: bool,

    #[arg(long)]
    pub concurrency: Option<u32>,

    #[arg(long)]
    pub request_rate: Option<f64>,

    #[arg(long)]
    pub request_count: Option<u64>,

    #[arg(long)]
    pub benchmarking_duration: Option<f64>,

    #[arg(long)]
    pub warmup_request_count: Option<u64>,

    #[arg(long)]
    pub random_seed: Option<u64>,

    #[arg(long)]
    pub fixed_schedule: bool,

    #[arg(long)]
    pub file: Option<String>,

    #[arg(long)]
    pub custom_dataset_type: Option<String>,

    #[arg(long)]
    pub profile_export_file: Option<String>,
}

impl Cli {
    pub fn to_overrides(&self) -> CliOverrides {
        CliOverrides {
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
            url: self.url.clone(),
            streaming: self.streaming.then_some(true),
            concurrency: self.concurrency,
            request_rate: self.request_rate,
            request_count: self.request_count,
            benchmarking_duration: self.benchmarking_duration,
            warmup_request_count: self.warmup_request_count,
            random_seed: self.random_seed,
            fixed_schedule: self.fixed_schedule.then_some(true),
            file: self.file.clone(),
            custom_dataset_type: self.custom_dataset_type.clone(),
            profile_export_file: self.profile_export_file.clone(),
        }
    }
}
