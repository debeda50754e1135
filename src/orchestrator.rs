//! Runs every category crawl at once and gathers the results.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::instrument;

use crate::crawler::CategoryCrawler;
use crate::driver::SessionLauncher;
use crate::error::Result;
use crate::model::{CategoryResult, CategoryTarget};
use crate::persist::ResultSink;
use crate::store::CrawlStore;

/// Outcome of a whole run.
#[derive(Debug)]
pub struct CrawlReport {
    pub results: BTreeMap<String, CategoryResult>,
    /// Categories whose task died before handing over a result.
    pub missing: BTreeSet<String>,
}

impl CrawlReport {
    pub fn total_records(&self) -> usize {
        self.results.values().map(CategoryResult::count).sum()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            categories = self.results.len(),
            records = self.total_records(),
            "Crawl results"
        );
        for (category, result) in &self.results {
            tracing::info!(
                category = %category,
                records = result.count(),
                pages = result.pages_visited,
                finished = result.termination.is_finished(),
                "Category summary"
            );
        }
        if self.missing.is_empty() {
            tracing::info!("All categories produced a result");
        } else {
            for category in &self.missing {
                tracing::error!(category = %category, "Category missing from results");
            }
        }
    }
}

pub struct CrawlOrchestrator<L: SessionLauncher> {
    launcher: Arc<L>,
    crawler: Arc<CategoryCrawler>,
    sink: Option<Arc<dyn ResultSink>>,
}

impl<L: SessionLauncher> CrawlOrchestrator<L> {
    pub fn new(launcher: L, crawler: CategoryCrawler) -> Self {
        Self {
            launcher: Arc::new(launcher),
            crawler: Arc::new(crawler),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Crawls every target in parallel, merges, reports and persists.
    ///
    /// Category failures never surface here; they show up as aborted or
    /// missing entries in the report. Only a persistence failure is an error.
    #[instrument(skip(self, targets), fields(categories = targets.len()))]
    pub async fn run(&self, targets: &[CategoryTarget]) -> Result<CrawlReport> {
        let start = Instant::now();
        let store = Arc::new(CrawlStore::new());

        let mut tasks = JoinSet::new();
        for target in targets {
            tracing::info!(category = %target.name, "Category task started");
            let launcher = self.launcher.clone();
            let crawler = self.crawler.clone();
            let store = store.clone();
            let target = target.clone();
            tasks.spawn(async move {
                let result = crawler.crawl(launcher.as_ref(), &target).await;
                if let Err(e) = store.merge(result).await {
                    tracing::error!(category = %target.name, error = %e, "Result dropped");
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Category task failed");
            }
        }
        tracing::info!(duration = ?start.elapsed(), "All category crawls ended");

        // every task has been joined; nothing writes to the store any more
        let results = store.take().await;

        let missing: BTreeSet<String> = targets
            .iter()
            .map(|t| t.name.clone())
            .filter(|name| !results.contains_key(name))
            .collect();

        let report = CrawlReport { results, missing };
        report.log_summary();

        if let Some(ref sink) = self.sink {
            sink.persist(&report.results)?;
        }
        Ok(report)
    }
}
