use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::model::CategoryResult;

/// Results of all finished category crawls, keyed by category name.
///
/// Crawlers never share a category, but they do share the map, so every
/// insertion goes through one lock. Nothing else is done while holding it.
#[derive(Debug, Default)]
pub struct CrawlStore {
    results: Mutex<BTreeMap<String, CategoryResult>>,
}

impl CrawlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a finished category. Each category may be merged once.
    pub async fn merge(&self, result: CategoryResult) -> Result<(), StoreError> {
        let mut results = self.results.lock().await;
        if results.contains_key(&result.category) {
            return Err(StoreError::Duplicate(result.category));
        }
        results.insert(result.category.clone(), result);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.results.lock().await.len()
    }

    /// Takes the merged results out once every crawler is done.
    pub async fn take(&self) -> BTreeMap<String, CategoryResult> {
        std::mem::take(&mut *self.results.lock().await)
    }
}
