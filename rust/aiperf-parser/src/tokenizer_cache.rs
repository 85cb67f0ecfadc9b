//! Per-model tokenizer cache (spec §4.6: "a per-model tokenizer, cached in
//! a map protected by a mutex"). Build-once-under-lock: look up, and if
//! absent, build while still holding the lock so two concurrent misses for
//! the same model never construct two instances.

use std::collections::HashMap;
use std::sync::Arc;

use aiperf_core::{Tokenizer, WhitespaceTokenizer};
use tokio::sync::Mutex;

pub struct TokenizerCache {
    inner: Mutex<HashMap<String, Arc<dyn Tokenizer>>>,
}

impl Default for TokenizerCache {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl TokenizerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached tokenizer for `model`, building and inserting a
    /// reference tokenizer if this is the first request for it. The
    /// real tokenizer wrappers this stands in for are out of scope
    /// (spec.md §1); [`WhitespaceTokenizer`] is the one implementation.
    pub async fn get_or_build(&self, model: &str) -> Arc<dyn Tokenizer> {
        let mut guard = self.inner.lock().await;
        if let Some(tokenizer) = guard.get(model) {
            return Arc::clone(tokenizer);
        }
        let built: Arc<dyn Tokenizer> = Arc::new(WhitespaceTokenizer);
        guard.insert(model.to_string(), Arc::clone(&built));
        built
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reuses_the_same_instance_for_repeated_lookups() {
        let cache = TokenizerCache::new();
        let first = cache.get_or_build("llama").await;
        let second = cache.get_or_build("llama").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn builds_one_entry_per_distinct_model() {
        let cache = TokenizerCache::new();
        cache.get_or_build("llama").await;
        cache.get_or_build("mistral").await;
        assert_eq!(cache.len().await, 2);
    }
}
