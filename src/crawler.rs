//! Per-category crawl: one browser session walked page by page.
//!
//! ```text
//! Starting ─► PageLoaded ─► Extracting ─► Paginating ─┬─► PageLoaded
//!                                                     ├─► Finished
//!                                                     └─► Aborted
//! ```
//!
//! Failures are contained at the smallest scope that can absorb them: a bad
//! product node is skipped, a page that never shows products stops the
//! category with what was already collected, and a dead session stops only
//! its own category. The driver is closed on every path, a panic included,
//! and a [`CategoryResult`] is produced unless the crawl panicked.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;
use url::Url;

use crate::config::CrawlTimings;
use crate::driver::{PageAdvance, PageDriver, SessionLauncher};
use crate::error::CrawlError;
use crate::extractor::{ExtractContext, ProductNode, RecordExtractor};
use crate::images::ImageDownloader;
use crate::model::{CategoryResult, CategoryTarget, ProductRecord, Termination};
use crate::pagination::PaginationState;

#[derive(Debug, Clone)]
pub struct CrawlerOptions {
    pub timings: CrawlTimings,
    pub page_param: String,
    pub max_pages: Option<u32>,
}

pub struct CategoryCrawler {
    extractor: Arc<RecordExtractor>,
    images: Option<Arc<ImageDownloader>>,
    options: CrawlerOptions,
}

impl CategoryCrawler {
    pub fn new(extractor: Arc<RecordExtractor>, options: CrawlerOptions) -> Self {
        Self {
            extractor,
            images: None,
            options,
        }
    }

    pub fn with_images(mut self, images: Arc<ImageDownloader>) -> Self {
        self.images = Some(images);
        self
    }

    #[instrument(skip(self, launcher, target), fields(category = %target.name))]
    pub async fn crawl<L: SessionLauncher>(
        &self,
        launcher: &L,
        target: &CategoryTarget,
    ) -> CategoryResult {
        let start = Instant::now();
        tracing::info!(url = %target.url, "Starting category crawl");

        let mut driver = match launcher.launch().await {
            Ok(driver) => driver,
            Err(e) => {
                tracing::error!(error = %e, "Could not start browser session");
                return CategoryResult::new(&target.name, Termination::Aborted(e.to_string()));
            }
        };

        let mut result = CategoryResult::new(&target.name, Termination::Finished);
        let walked = AssertUnwindSafe(self.walk_pages(&mut driver, target, &mut result))
            .catch_unwind()
            .await;

        if let Err(e) = driver.close().await {
            tracing::warn!(error = %e, "Browser session did not close cleanly");
        }
        result.termination = match walked {
            Ok(termination) => termination,
            Err(panic) => {
                tracing::error!(records = result.count(), "Category crawl panicked, session released");
                std::panic::resume_unwind(panic);
            }
        };

        match result.termination {
            Termination::Finished => tracing::info!(
                records = result.count(),
                pages = result.pages_visited,
                duration = ?start.elapsed(),
                "Category crawl finished"
            ),
            Termination::Aborted(ref reason) => tracing::warn!(
                records = result.count(),
                pages = result.pages_visited,
                reason = %reason,
                duration = ?start.elapsed(),
                "Category crawl aborted, keeping partial results"
            ),
        }
        result
    }

    async fn walk_pages<D: PageDriver>(
        &self,
        driver: &mut D,
        target: &CategoryTarget,
        result: &mut CategoryResult,
    ) -> Termination {
        let listing_url = match Url::parse(&target.url) {
            Ok(url) => url,
            Err(e) => return aborted(format!("bad listing url: {}", e)),
        };
        if let Err(e) = driver.open_category(&target.url).await {
            return aborted(e);
        }

        let timings = &self.options.timings;
        let mut state = PaginationState::default();
        loop {
            tracing::info!(page = state.page, "Crawling page");

            match driver.stabilize_view().await {
                Ok(height) => state.last_height = Some(height),
                Err(e) => return aborted(e),
            }
            if let Err(e) = driver.wait_for_products(timings.product_wait()).await {
                return aborted(e);
            }
            tokio::time::sleep(timings.settle()).await;

            let nodes = match driver.current_product_nodes().await {
                Ok(nodes) => nodes,
                Err(e) => return aborted(e),
            };
            let ctx = ExtractContext {
                category: &target.name,
                page_url: &listing_url,
            };
            let added = self
                .extract_page(&nodes, &ctx, state.page, &mut result.records)
                .await;
            state.records = result.records.len();
            result.pages_visited = state.page;
            tracing::info!(
                page = state.page,
                found = nodes.len(),
                added = added,
                total = state.records,
                "Page extracted"
            );

            if let Some(cap) = self.options.max_pages {
                if state.page >= cap {
                    tracing::info!(cap = cap, "Page cap reached");
                    return Termination::Finished;
                }
            }

            match driver
                .advance_page(&mut state, &target.url, &self.options.page_param)
                .await
            {
                Ok(PageAdvance::Moved) => {
                    tokio::time::sleep(timings.settle()).await;
                    state.advance();
                }
                Ok(PageAdvance::NoMorePages) => {
                    tracing::info!(page = state.page, max_pages = state.max_pages, "Last page reached");
                    return Termination::Finished;
                }
                Err(CrawlError::Navigation(reason)) => {
                    tracing::warn!(page = state.page, reason = %reason, "Cannot move past this page, ending category");
                    return Termination::Finished;
                }
                Err(e) => return aborted(e),
            }
        }
    }

    /// Appends every node that extracts cleanly; returns how many did.
    async fn extract_page(
        &self,
        nodes: &[ProductNode],
        ctx: &ExtractContext<'_>,
        page: u32,
        records: &mut Vec<ProductRecord>,
    ) -> usize {
        let before = records.len();
        for (index, node) in nodes.iter().enumerate() {
            let record = match self.extractor.extract(node, ctx) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(page = page, index = index, error = %e, "Skipping product");
                    continue;
                }
            };
            tracing::debug!(
                name = %record.name,
                product_id = ?record.product_id,
                price = ?record.price,
                specs = %record.specs.join(", "),
                link = %record.link,
                image = %record.image_url,
                registered = %record.registered,
                "Extracted product"
            );
            self.save_image(ctx.category, &record).await;
            records.push(record);
        }
        records.len() - before
    }

    async fn save_image(&self, category: &str, record: &ProductRecord) {
        let Some(ref images) = self.images else {
            return;
        };
        let Some(ref product_id) = record.product_id else {
            tracing::debug!(name = %record.name, "No product id, image not saved");
            return;
        };
        if let Err(e) = images.save(category, product_id, &record.image_url).await {
            tracing::warn!(product_id = %product_id, error = %e, "Image download failed");
        }
    }
}

fn aborted(reason: impl ToString) -> Termination {
    let reason = reason.to_string();
    tracing::error!(reason = %reason, "Stopping category");
    Termination::Aborted(reason)
}
