//! Config-file loading and the CLI-override merge (spec §6). Paired
//! with [`crate::env`]'s separate environment overlay: this module
//! handles the declarative `UserConfig`, `env` handles ambient harness
//! tuning knobs.

use std::path::Path;

use crate::schema::{ConfigError, UserConfig};

/// One field per CLI flag named in spec §6. `None` means "flag not
/// passed" and the file/default value is kept; `Some` always wins over
/// whatever `load_from_file` produced.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub url: Option<String>,
    pub streaming: Option<bool>,
    pub concurrency: Option<u32>,
    pub request_rate: Option<f64>,
    pub request_count: Option<u64>,
    pub benchmarking_duration: Option<f64>,
    pub warmup_request_count: Option<u64>,
    pub random_seed: Option<u64>,
    pub fixed_schedule: Option<bool>,
    pub file: Option<String>,
    pub custom_dataset_type: Option<String>,
    pub profile_export_file: Option<String>,
}

/// Loads `UserConfig` from an optional YAML file, applies `overrides`
/// on top (CLI always wins over the file), then validates the result.
pub fn load_config(path: Option<&Path>, overrides: &CliOverrides) -> Result<UserConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_from_file(path)?,
        None => UserConfig::default(),
    };
    apply_overrides(&mut config, overrides);
    validate_config(&config)?;
    Ok(config)
}

pub fn load_from_file(path: &Path) -> Result<UserConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
    serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

pub fn apply_overrides(config: &mut UserConfig, overrides: &CliOverrides) {
    if let Some(model) = &overrides.model {
        config.endpoint.model = model.clone();
    }
    if let Some(endpoint) = &overrides.endpoint {
        config.endpoint.endpoint = endpoint.clone();
    }
    if let Some(url) = &overrides.url {
        config.endpoint.url = url.clone();
    }
    if let Some(streaming) = overrides.streaming {
        config.endpoint.streaming = streaming;
    }
    if let Some(concurrency) = overrides.concurrency {
        config.loadgen.concurrency = Some(concurrency);
    }
    if let Some(request_rate) = overrides.request_rate {
        config.loadgen.request_rate = Some(request_rate);
    }
    if let Some(request_count) = overrides.request_count {
        config.loadgen.request_count = Some(request_count);
    }
    if let Some(duration) = overrides.benchmarking_duration {
        config.loadgen.benchmarking_duration = Some(duration);
    }
    if let Some(warmup) = overrides.warmup_request_count {
        config.loadgen.warmup_request_count = warmup;
    }
    if let Some(seed) = overrides.random_seed {
        config.input.random_seed = Some(seed);
    }
    if let Some(fixed_schedule) = overrides.fixed_schedule {
        config.loadgen.fixed_schedule = fixed_schedule;
    }
    if let Some(file) = &overrides.file {
        config.input.file = Some(file.clone());
    }
    if let Some(custom_dataset_type) = &overrides.custom_dataset_type {
        config.input.custom_dataset_type = Some(custom_dataset_type.clone());
    }
    if let Some(profile_export_file) = &overrides.profile_export_file {
        config.output.profile_export_file = profile_export_file.clone();
    }
}

/// Enforces the mutual-exclusivity and "pick one stop condition" rules
/// from spec §3: `concurrency`, `request_rate`, and `fixed_schedule`
/// select the load-shape strategy and at most one may be active;
/// non-schedule strategies need a `request_count` or
/// `benchmarking_duration` to know when to stop.
pub fn validate_config(config: &UserConfig) -> Result<(), ConfigError> {
    let strategies_selected = [
        config.loadgen.concurrency.is_some(),
        config.loadgen.request_rate.is_some(),
        config.loadgen.fixed_schedule,
    ]
    .into_iter()
    .filter(|selected| *selected)
    .count();

    if strategies_selected > 1 {
        return Err(ConfigError::ValidationError(
            "concurrency, request_rate, and fixed_schedule are mutually exclusive".to_string(),
        ));
    }

    if !config.loadgen.fixed_schedule
        && config.loadgen.request_count.is_none()
        && config.loadgen.benchmarking_duration.is_none()
    {
        return Err(ConfigError::ValidationError(
            "one of request_count or benchmarking_duration is required unless fixed_schedule is set".to_string(),
        ));
    }

    if config.loadgen.fixed_schedule && config.input.file.is_none() {
        return Err(ConfigError::ValidationError(
            "fixed_schedule requires an input file".to_string(),
        ));
    }

    if config.endpoint.url.is_empty() {
        return Err(ConfigError::ValidationError("endpoint.url is required".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_yaml() -> &'static str {
        r#"
endpoint:
  model: gpt-oss
  endpoint: chat
  url: http://localhost:8000
loadgen:
  concurrency: 4
  request_count: 100
"#
    }

    #[test]
    fn loads_config_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", sample_yaml()).unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.endpoint.model, "gpt-oss");
        assert_eq!(config.loadgen.concurrency, Some(4));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_from_file(Path::new("/nonexistent/aiperf-config-test.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", sample_yaml()).unwrap();

        let overrides = CliOverrides {
            concurrency: Some(8),
            ..Default::default()
        };
        let config = load_config(Some(file.path()), &overrides).unwrap();
        assert_eq!(config.loadgen.concurrency, Some(8));
        assert_eq!(config.endpoint.model, "gpt-oss");
    }

    #[test]
    fn mutually_exclusive_strategies_are_rejected() {
        let mut config = UserConfig::default();
        config.endpoint.url = "http://localhost:8000".to_string();
        config.loadgen.concurrency = Some(1);
        config.loadgen.request_rate = Some(10.0);
        config.loadgen.request_count = Some(10);

        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn missing_stop_condition_is_rejected() {
        let mut config = UserConfig::default();
        config.endpoint.url = "http://localhost:8000".to_string();
        config.loadgen.concurrency = Some(1);
        config.loadgen.request_count = None;
        config.loadgen.benchmarking_duration = None;

        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn default_config_with_url_and_count_validates() {
        let mut config = UserConfig::default();
        config.endpoint.url = "http://localhost:8000".to_string();
        config.loadgen.request_count = Some(10);
        validate_config(&config).unwrap();
    }
}
