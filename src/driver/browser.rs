//! Chrome-backed [`PageDriver`] built on chromiumoxide.

use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::instrument;

use super::{PageDriver, SessionLauncher};
use crate::config::{BrowserSettings, CrawlTimings, SelectorSettings};
use crate::error::{CrawlError, Result};
use crate::extractor::ProductNode;
use crate::pagination::{parse_page_label, PageControls};

const SCROLL_HEIGHT: &str = "document.body.scrollHeight";
const SCROLL_TO_END: &str = "window.scrollTo(0, document.body.scrollHeight);";

trait CdpResultExt<T> {
    fn session(self, context: &str) -> Result<T>;
    fn navigation(self, context: &str) -> Result<T>;
}

impl<T> CdpResultExt<T> for std::result::Result<T, CdpError> {
    fn session(self, context: &str) -> Result<T> {
        self.map_err(|e| CrawlError::Session(format!("{}: {}", context, e)))
    }

    fn navigation(self, context: &str) -> Result<T> {
        self.map_err(|e| CrawlError::Navigation(format!("{}: {}", context, e)))
    }
}

/// Launches (or attaches to) Chrome, one session per category.
pub struct BrowserLauncher {
    settings: BrowserSettings,
    timings: CrawlTimings,
    selectors: SelectorSettings,
    launched: AtomicUsize,
}

impl BrowserLauncher {
    pub fn new(settings: BrowserSettings, timings: CrawlTimings, selectors: SelectorSettings) -> Self {
        Self {
            settings,
            timings,
            selectors,
            launched: AtomicUsize::new(0),
        }
    }

    /// Chrome settings for one session, with a profile directory of its own
    /// that is removed when the session closes.
    fn browser_config(&self) -> Result<(BrowserConfig, TempDir)> {
        let session_no = self.launched.fetch_add(1, Ordering::Relaxed);
        let profile = tempfile::Builder::new()
            .prefix(&format!("listing-crawler-{}-{}-", std::process::id(), session_no))
            .tempdir()?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(profile.path())
            .request_timeout(Duration::from_secs(self.settings.request_timeout_secs))
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(ref executable) = self.settings.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(CrawlError::Session)?;
        Ok((config, profile))
    }
}

#[async_trait]
impl SessionLauncher for BrowserLauncher {
    type Driver = BrowserDriver;

    #[instrument(skip(self))]
    async fn launch(&self) -> Result<BrowserDriver> {
        let ((browser, mut handler), profile) = match self.settings.remote_debugging_url {
            Some(ref url) => {
                tracing::info!("Connecting to remote Chrome instance at: {}", url);
                let connected = Browser::connect(url.as_str())
                    .await
                    .session("connect to remote Chrome")?;
                (connected, None)
            }
            None => {
                let (config, profile) = self.browser_config()?;
                let launched = Browser::launch(config).await.session("launch Chrome")?;
                (launched, Some(profile))
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(CrawlError::Session(format!("open tab: {}", e)));
            }
        };

        Ok(BrowserDriver {
            browser,
            page,
            handler_task,
            profile,
            timings: self.timings.clone(),
            selectors: self.selectors.clone(),
        })
    }
}

pub struct BrowserDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    /// Present only for a Chrome launched by this driver.
    profile: Option<TempDir>,
    timings: CrawlTimings,
    selectors: SelectorSettings,
}

impl BrowserDriver {
    async fn scroll_height(&self) -> Result<u64> {
        self.page
            .evaluate(SCROLL_HEIGHT)
            .await
            .session("read page height")?
            .into_value::<u64>()
            .map_err(|e| CrawlError::Session(format!("page height: {}", e)))
    }

    /// Elements matching `selector`; a failed lookup is logged and treated as none.
    async fn find_or_empty(&self, selector: &str, what: &str) -> Vec<Element> {
        match self.page.find_elements(selector).await {
            Ok(elements) => elements,
            Err(e) => {
                tracing::warn!(selector = %selector, error = %e, "Could not look up {}, assuming none", what);
                Vec::new()
            }
        }
    }

    async fn product_count(&self) -> usize {
        match self.page.find_elements(self.selectors.product.as_str()).await {
            Ok(elements) => elements.len(),
            Err(e) => {
                tracing::debug!(error = %e, "Product lookup failed, retrying");
                0
            }
        }
    }
}

#[async_trait]
impl PageDriver for BrowserDriver {
    async fn open_category(&mut self, url: &str) -> Result<()> {
        self.page.goto(url).await.session("open category")?;
        Ok(())
    }

    async fn stabilize_view(&mut self) -> Result<u64> {
        let mut last_height = self.scroll_height().await?;
        for _ in 0..self.timings.max_scroll_rounds {
            self.page
                .evaluate(SCROLL_TO_END)
                .await
                .session("scroll to end")?;
            tokio::time::sleep(self.timings.scroll_interval()).await;
            let height = self.scroll_height().await?;
            if height == last_height {
                return Ok(height);
            }
            last_height = height;
        }
        tracing::warn!(
            height = last_height,
            rounds = self.timings.max_scroll_rounds,
            "Page kept growing, extracting what is loaded"
        );
        Ok(last_height)
    }

    async fn wait_for_products(&mut self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        let poll = self.timings.poll_interval().max(Duration::from_millis(50));
        let waited = tokio::time::timeout(timeout, async {
            while self.product_count().await == 0 {
                tokio::time::sleep(poll).await;
            }
        })
        .await;

        match waited {
            Ok(()) => {
                tracing::debug!(duration = ?start.elapsed(), "Products present");
                Ok(())
            }
            Err(_) => Err(CrawlError::LocatorTimeout {
                selector: self.selectors.product.clone(),
                seconds: timeout.as_secs(),
            }),
        }
    }

    async fn current_product_nodes(&mut self) -> Result<Vec<ProductNode>> {
        let elements = self
            .page
            .find_elements(self.selectors.product.as_str())
            .await
            .session("find products")?;

        let mut nodes = Vec::with_capacity(elements.len());
        for element in elements {
            match element.outer_html().await {
                Ok(Some(html)) => nodes.push(ProductNode::new(html)),
                Ok(None) => tracing::debug!("Product node without markup skipped"),
                Err(e) => tracing::warn!(error = %e, "Could not read product node"),
            }
        }
        Ok(nodes)
    }

    async fn inspect_controls(&mut self) -> Result<PageControls> {
        let has_next = !self.find_or_empty(&self.selectors.next_page, "next control").await.is_empty();

        let mut page_labels = Vec::new();
        let numbers = self.find_or_empty(&self.selectors.page_numbers, "page numbers").await;
        for element in numbers {
            if let Ok(Some(text)) = element.inner_text().await {
                if let Some(page) = parse_page_label(&text) {
                    page_labels.push(page);
                }
            }
        }

        Ok(PageControls {
            has_next,
            page_labels,
        })
    }

    async fn click_next(&mut self) -> Result<()> {
        // DOM click, so an overlay over the control does not swallow it
        let selector = serde_json::to_string(&self.selectors.next_page)?;
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
            selector
        );
        let clicked = self
            .page
            .evaluate(script)
            .await
            .navigation("click next")?
            .into_value::<bool>()
            .unwrap_or(false);
        if clicked {
            Ok(())
        } else {
            Err(CrawlError::Navigation("next control disappeared".to_string()))
        }
    }

    async fn goto(&mut self, url: &str) -> Result<()> {
        self.page.goto(url).await.navigation("open page")?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let result = match self.profile.take() {
            Some(profile) => {
                let closed = self.browser.close().await.session("close browser").map(|_| ());
                if let Err(e) = self.browser.wait().await {
                    tracing::warn!(error = %e, "Chrome did not exit cleanly");
                }
                let path = profile.path().to_path_buf();
                if let Err(e) = profile.close() {
                    tracing::warn!(path = %path.display(), error = %e, "Chrome profile not removed");
                }
                closed
            }
            None => self.page.clone().close().await.session("close tab"),
        };
        self.handler_task.abort();
        result
    }
}

impl Drop for BrowserDriver {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
