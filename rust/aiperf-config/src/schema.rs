//! `UserConfig` and its sub-configs (spec §6 CLI surface): the shape a
//! config file, environment overlay, and CLI flags all resolve into
//! before the controller translates it into each service's own config.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
    #[serde(default)]
    pub loadgen: LoadGenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// One of the families in spec §6's endpoint table (`chat`,
    /// `completions`, `embeddings`, `responses`, `generate`). Kept as a
    /// validated string rather than the worker crate's own enum, so this
    /// crate doesn't need to depend on `aiperf-worker`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub url: String,
    #[serde(default)]
    pub streaming: bool,
}

fn default_model() -> String {
    String::new()
}

fn default_endpoint() -> String {
    "chat".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            url: String::new(),
            streaming: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    pub file: Option<String>,
    pub custom_dataset_type: Option<String>,
    pub random_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_profile_export_file")]
    pub profile_export_file: String,
}

fn default_profile_export_file() -> String {
    "profile_export.json".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            profile_export_file: default_profile_export_file(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenizerConfig {
    pub name: Option<String>,
    pub trust_remote_code: bool,
}

/// The three load-shape strategies are mutually exclusive (spec §3);
/// `validate` enforces that at most one of `request_rate` /
/// `fixed_schedule` is set alongside `concurrency`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadGenConfig {
    pub concurrency: Option<u32>,
    pub request_rate: Option<f64>,
    #[serde(default)]
    pub fixed_schedule: bool,
    pub request_count: Option<u64>,
    pub benchmarking_duration: Option<f64>,
    #[serde(default)]
    pub warmup_request_count: u64,
}

impl Default for LoadGenConfig {
    fn default() -> Self {
        Self {
            concurrency: Some(1),
            request_rate: None,
            fixed_schedule: false,
            request_count: None,
            benchmarking_duration: None,
            warmup_request_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),
    #[error("failed to parse configuration: {0}")]
    ParseError(String),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
    #[error("io error: {0}")]
    IoError(String),
}
