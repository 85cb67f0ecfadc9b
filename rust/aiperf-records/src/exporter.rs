//! Result export (spec §4.7's `[ADD] Result export`): a small `Exporter`
//! trait so a profile run's [`ProfileResults`] can be written to more than
//! one sink without the records manager knowing about file formats.

use std::path::{Path, PathBuf};

use aiperf_core::{AiperfError, AiperfResult};
use async_trait::async_trait;
use tracing::info;

use crate::summary::ProfileResults;

#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, results: &ProfileResults) -> AiperfResult<()>;
}

/// Writes the full summary as pretty-printed JSON to a fixed path.
pub struct JsonFileExporter {
    path: PathBuf,
}

impl JsonFileExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Exporter for JsonFileExporter {
    async fn export(&self, results: &ProfileResults) -> AiperfResult<()> {
        let body = serde_json::to_vec_pretty(results)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(AiperfError::Io)?;
            }
        }
        tokio::fs::write(&self.path, body).await.map_err(AiperfError::Io)?;
        info!(path = %self.path.display(), "profile results exported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn writes_results_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile_export.json");
        let exporter = JsonFileExporter::new(&path);

        let results = ProfileResults {
            total_records: 3,
            error_records: 0,
            errors_by_type: HashMap::new(),
            metrics: HashMap::new(),
            cancelled: false,
        };
        exporter.export(&results).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("\"total_records\": 3"));
    }
}
