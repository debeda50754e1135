//! Scripted in-memory browser used by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use listing_crawler::config::{CrawlTimings, SelectorSettings};
use listing_crawler::error::{CrawlError, Result};
use listing_crawler::{
    CategoryCrawler, CategoryTarget, CrawlerOptions, PageControls, PageDriver, ProductNode,
    RecordExtractor, SessionLauncher,
};

pub fn product_html(name: &str, id: u32, price: &str) -> String {
    product_html_with_image(name, id, price, &format!("//img.example.com/{}.jpg?shrink=130:130", id))
}

pub fn product_html_with_image(name: &str, id: u32, price: &str, image: &str) -> String {
    format!(
        r#"<li class="prod_item">
            <div class="thumb_info"><div><a href="/info/?billingInternalProductSeq={id}"><img src="{image}"></a></div></div>
            <div class="main_info">
                <div class="head_info"><a href="https://prod.example.com/info/?pcode={id}&billingInternalProductSeq={id}"><strong>{name}</strong></a></div>
                <dl><dd><ul class="spec_list"><li>spec a</li><li>spec b</li></ul></dd></dl>
                <div class="prod_sub_info"><div class="prod_sub_meta"><dl><dt>등록월</dt><dd>2024.01.</dd></dl></div></div>
            </div>
            <div class="price_info"><div class="main_price prod_price_set"><dl><dd><span class="text__number">{price}</span></dd></dl></div></div>
        </li>"#
    )
}

/// A listing entry missing its name, which extraction must reject.
pub fn broken_node() -> ProductNode {
    ProductNode::new(r#"<li class="prod_item"><div class="price_info">no name here</div></li>"#)
}

pub fn products(prefix: &str, page: u32, count: u32) -> Vec<ProductNode> {
    (0..count)
        .map(|i| {
            let id = page * 1_000 + i;
            ProductNode::new(product_html(&format!("{} {}", prefix, id), id, "12,500"))
        })
        .collect()
}

/// Products whose thumbnails are served from `image_base`.
pub fn products_with_images(prefix: &str, page: u32, count: u32, image_base: &str) -> Vec<ProductNode> {
    (0..count)
        .map(|i| {
            let id = page * 1_000 + i;
            let image = format!("{}/{}.jpg", image_base, id);
            ProductNode::new(product_html_with_image(&format!("{} {}", prefix, id), id, "12,500", &image))
        })
        .collect()
}

/// Serves `status` with `body` to every request on a local port; returns the base URL.
pub async fn image_host(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{}", addr)
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    pub nodes: Vec<ProductNode>,
    pub controls: PageControls,
    pub times_out: bool,
    pub panics: bool,
}

impl ScriptedPage {
    pub fn new(nodes: Vec<ProductNode>, controls: PageControls) -> Self {
        Self {
            nodes,
            controls,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CategoryScript {
    pub pages: Vec<ScriptedPage>,
    pub fails_to_open: bool,
    /// Simulated render time per page, to shuffle completion order.
    pub page_delay: Duration,
}

impl CategoryScript {
    /// `pages` numbered pages of `per_page` products, linked by page numbers.
    pub fn numbered(prefix: &str, pages: u32, per_page: u32) -> Self {
        let labels: Vec<u32> = (1..=pages).collect();
        Self {
            pages: (1..=pages)
                .map(|p| ScriptedPage::new(products(prefix, p, per_page), PageControls::with_pages(labels.clone())))
                .collect(),
            ..Default::default()
        }
    }
}

/// What the scripted drivers observed, per listing URL.
#[derive(Debug, Default)]
pub struct Journal {
    pub visited: HashMap<String, Vec<u32>>,
    pub closed: HashMap<String, u32>,
    pub launched: u32,
}

#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    scripts: Arc<HashMap<String, CategoryScript>>,
    pub journal: Arc<Mutex<Journal>>,
    fail_launch: bool,
}

impl ScriptedLauncher {
    pub fn new(scripts: impl IntoIterator<Item = (String, CategoryScript)>) -> Self {
        Self {
            scripts: Arc::new(scripts.into_iter().collect()),
            journal: Arc::new(Mutex::new(Journal::default())),
            fail_launch: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Default::default()
        }
    }

    pub fn visited(&self, url: &str) -> Vec<u32> {
        self.journal
            .lock()
            .unwrap()
            .visited
            .get(url)
            .cloned()
            .unwrap_or_default()
    }

    pub fn closed(&self, url: &str) -> u32 {
        self.journal
            .lock()
            .unwrap()
            .closed
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    type Driver = ScriptedDriver;

    async fn launch(&self) -> Result<ScriptedDriver> {
        if self.fail_launch {
            return Err(CrawlError::Session("chrome not found".to_string()));
        }
        self.journal.lock().unwrap().launched += 1;
        Ok(ScriptedDriver {
            scripts: self.scripts.clone(),
            journal: self.journal.clone(),
            url: String::new(),
            script: None,
            page: 1,
        })
    }
}

pub struct ScriptedDriver {
    scripts: Arc<HashMap<String, CategoryScript>>,
    journal: Arc<Mutex<Journal>>,
    url: String,
    script: Option<CategoryScript>,
    page: u32,
}

impl ScriptedDriver {
    fn current(&self) -> Result<&ScriptedPage> {
        self.script
            .as_ref()
            .and_then(|s| s.pages.get(self.page as usize - 1))
            .ok_or_else(|| CrawlError::Navigation(format!("no page {}", self.page)))
    }

    fn page_count(&self) -> u32 {
        self.script.as_ref().map_or(0, |s| s.pages.len() as u32)
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn open_category(&mut self, url: &str) -> Result<()> {
        self.url = url.to_string();
        let script = self
            .scripts
            .get(url)
            .cloned()
            .ok_or_else(|| CrawlError::Session(format!("unknown url {}", url)))?;
        if script.fails_to_open {
            return Err(CrawlError::Session("tab crashed".to_string()));
        }
        self.script = Some(script);
        self.page = 1;
        Ok(())
    }

    async fn stabilize_view(&mut self) -> Result<u64> {
        let delay = self.script.as_ref().map(|s| s.page_delay).unwrap_or_default();
        tokio::time::sleep(delay).await;
        Ok(1_000 + u64::from(self.page))
    }

    async fn wait_for_products(&mut self, _timeout: Duration) -> Result<()> {
        let page = self.current()?;
        if page.times_out || page.nodes.is_empty() {
            return Err(CrawlError::LocatorTimeout {
                selector: "li.prod_item".to_string(),
                seconds: 20,
            });
        }
        Ok(())
    }

    async fn current_product_nodes(&mut self) -> Result<Vec<ProductNode>> {
        let page = self.current()?.clone();
        if page.panics {
            panic!("renderer crashed on page {}", self.page);
        }
        self.journal
            .lock()
            .unwrap()
            .visited
            .entry(self.url.clone())
            .or_default()
            .push(self.page);
        Ok(page.nodes)
    }

    async fn inspect_controls(&mut self) -> Result<PageControls> {
        Ok(self.current()?.controls.clone())
    }

    async fn click_next(&mut self) -> Result<()> {
        if self.page >= self.page_count() {
            return Err(CrawlError::Navigation("next control disappeared".to_string()));
        }
        self.page += 1;
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<()> {
        let parsed = url::Url::parse(url).map_err(|e| CrawlError::Navigation(e.to_string()))?;
        let page = parsed
            .query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse::<u32>().ok())
            .ok_or_else(|| CrawlError::Navigation(format!("no page in {}", url)))?;
        if page == 0 || page > self.page_count() {
            return Err(CrawlError::Navigation(format!("page {} not found", page)));
        }
        self.page = page;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        *self
            .journal
            .lock()
            .unwrap()
            .closed
            .entry(self.url.clone())
            .or_default() += 1;
        Ok(())
    }
}

pub fn crawler(max_pages: Option<u32>) -> CategoryCrawler {
    let extractor = Arc::new(RecordExtractor::new(&SelectorSettings::default()).unwrap());
    CategoryCrawler::new(
        extractor,
        CrawlerOptions {
            timings: CrawlTimings::immediate(),
            page_param: "page".to_string(),
            max_pages,
        },
    )
}

pub fn target(name: &str) -> CategoryTarget {
    CategoryTarget::new(name, format!("https://shop.example.com/list/?cate={}", name))
}
