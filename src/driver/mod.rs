//! Browser session abstraction used by the category crawler.

pub mod browser;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::extractor::ProductNode;
use crate::pagination::{page_url, PageControls, PageDecision, PaginationState};

pub use browser::{BrowserDriver, BrowserLauncher};

/// What happened when the driver was asked for the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAdvance {
    /// The browser now shows the page after the current one.
    Moved,
    NoMorePages,
}

/// One browser session rendering one category's listing pages.
#[async_trait]
pub trait PageDriver: Send {
    async fn open_category(&mut self, url: &str) -> Result<()>;

    /// Scrolls to the end until the page stops growing; returns the final height.
    async fn stabilize_view(&mut self) -> Result<u64>;

    /// Blocks until at least one product node exists, or `LocatorTimeout`.
    async fn wait_for_products(&mut self, timeout: Duration) -> Result<()>;

    async fn current_product_nodes(&mut self) -> Result<Vec<ProductNode>>;

    async fn inspect_controls(&mut self) -> Result<PageControls>;

    async fn click_next(&mut self) -> Result<()>;

    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Ends the session. Called exactly once, on every exit path.
    async fn close(&mut self) -> Result<()>;

    /// Moves to the page after `state.page`.
    ///
    /// `listing_url` is the category's first page; numbered pages are built
    /// from it by setting `page_param`.
    async fn advance_page(
        &mut self,
        state: &mut PaginationState,
        listing_url: &str,
        page_param: &str,
    ) -> Result<PageAdvance> {
        let controls = self.inspect_controls().await?;
        match state.decide(&controls) {
            PageDecision::ClickNext => {
                self.click_next().await?;
                Ok(PageAdvance::Moved)
            }
            PageDecision::GoTo(page) => {
                let url = page_url(listing_url, page_param, page)?;
                tracing::debug!(url = %url, page = page, "Navigating by page number");
                self.goto(&url).await?;
                Ok(PageAdvance::Moved)
            }
            PageDecision::NoMorePages => Ok(PageAdvance::NoMorePages),
        }
    }
}

/// Creates one [`PageDriver`] per category crawl.
#[async_trait]
pub trait SessionLauncher: Send + Sync + 'static {
    type Driver: PageDriver + 'static;

    async fn launch(&self) -> Result<Self::Driver>;
}
