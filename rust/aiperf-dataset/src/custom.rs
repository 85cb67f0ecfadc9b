//! Custom dataset types recognized by the manager. File parsing for each is
//! out of scope; external tooling supplies conversations via a
//! [`DatasetSource`] implementation, which the manager treats identically to
//! the synthetic generator's output.

use aiperf_core::{AiperfResult, Conversation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomDatasetType {
    SingleTurn,
    MultiTurn,
    RandomPool,
    MooncakeTrace,
}

/// Supplies a fixed set of conversations to the dataset manager, in place of
/// the synthetic generator. An embedding application implements this to feed
/// conversations parsed from one of the [`CustomDatasetType`] file formats.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    fn dataset_type(&self) -> CustomDatasetType;
    async fn load(&self) -> AiperfResult<Vec<Conversation>>;
}
