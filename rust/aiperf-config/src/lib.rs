//! `UserConfig` loading (spec §6): a YAML config file merged with CLI
//! overrides, plus a separate `AIPERF_`-prefixed environment overlay
//! for ambient harness tuning. Split the same way the teacher's
//! `knhk-config` splits declarative file config from `env.rs`.

mod config;
mod env;
mod schema;

pub use config::{apply_overrides, load_config, load_from_file, validate_config, CliOverrides};
pub use env::EnvOverlay;
pub use schema::{ConfigError, EndpointConfig, InputConfig, LoadGenConfig, OutputConfig, TokenizerConfig, UserConfig};
