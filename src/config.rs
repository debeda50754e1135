use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CrawlError, Result};
use crate::model::CategoryTarget;

/// Prefix for environment overrides, e.g. `CRAWLER__TIMINGS__SETTLE_MS=500`.
const ENV_PREFIX: &str = "CRAWLER";

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AppSettings {
    pub targets_path: PathBuf,
    pub output_dir: PathBuf,
    pub image_dir: PathBuf,
    pub history_dir: PathBuf,
    /// Hard stop for a single category, regardless of what the page shows.
    pub max_pages_per_category: Option<u32>,
    pub browser: BrowserSettings,
    pub timings: CrawlTimings,
    pub selectors: SelectorSettings,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    /// Connect to an already running Chrome instead of launching one per category.
    pub remote_debugging_url: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CrawlTimings {
    pub scroll_interval_ms: u64,
    pub max_scroll_rounds: u32,
    pub product_wait_secs: u64,
    pub poll_interval_ms: u64,
    pub settle_ms: u64,
    pub image_timeout_secs: u64,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SelectorSettings {
    pub product: String,
    pub name: String,
    pub link: String,
    pub price: String,
    pub specs: String,
    pub image: String,
    pub registered: String,
    pub next_page: String,
    pub page_numbers: String,
    pub product_id_param: String,
    pub page_param: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            targets_path: PathBuf::from("target-list.json"),
            output_dir: PathBuf::from("dataset"),
            image_dir: PathBuf::from("dataset/product-images"),
            history_dir: PathBuf::from("dataset/history"),
            max_pages_per_category: None,
            browser: BrowserSettings::default(),
            timings: CrawlTimings::default(),
            selectors: SelectorSettings::default(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            remote_debugging_url: None,
            request_timeout_secs: 30,
        }
    }
}

impl Default for CrawlTimings {
    fn default() -> Self {
        Self {
            scroll_interval_ms: 2_000,
            max_scroll_rounds: 50,
            product_wait_secs: 20,
            poll_interval_ms: 250,
            settle_ms: 3_000,
            image_timeout_secs: 30,
        }
    }
}

impl CrawlTimings {
    /// All waits collapsed to zero; used by in-memory drivers.
    pub fn immediate() -> Self {
        Self {
            scroll_interval_ms: 0,
            max_scroll_rounds: 5,
            product_wait_secs: 1,
            poll_interval_ms: 0,
            settle_ms: 0,
            image_timeout_secs: 5,
        }
    }

    pub fn scroll_interval(&self) -> Duration {
        Duration::from_millis(self.scroll_interval_ms)
    }

    pub fn product_wait(&self) -> Duration {
        Duration::from_secs(self.product_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            product: "li.prod_item".to_string(),
            name: "div.main_info > div.head_info > a > strong".to_string(),
            link: "div.main_info > div.head_info > a".to_string(),
            price: "div.price_info > div.main_price.prod_price_set > dl:nth-child(1) > dd > span.text__number".to_string(),
            specs: "div.main_info > dl > dd > ul.spec_list > li".to_string(),
            image: "div.thumb_info > div > a > img".to_string(),
            registered: "div.main_info > div.prod_sub_info > div.prod_sub_meta > dl".to_string(),
            next_page: "a.nav_next".to_string(),
            page_numbers: "div.number_wrap > a".to_string(),
            product_id_param: "billingInternalProductSeq".to_string(),
            page_param: "page".to_string(),
        }
    }
}

impl AppSettings {
    /// Layers built-in defaults, an optional TOML file and `CRAWLER__*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize::<AppSettings>()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.max_pages_per_category == Some(0) {
            return Err(CrawlError::Config(
                "max_pages_per_category must be at least 1".to_string(),
            ));
        }
        if self.selectors.product.trim().is_empty() {
            return Err(CrawlError::Config("product selector is empty".to_string()));
        }
        Ok(())
    }
}

/// Reads the `{ "category": "listing url" }` map the crawl is driven from.
pub fn load_targets<P: AsRef<Path>>(path: P) -> Result<Vec<CategoryTarget>> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    parse_targets(&contents)
}

pub fn parse_targets(contents: &str) -> Result<Vec<CategoryTarget>> {
    let raw: BTreeMap<String, String> = serde_json::from_str(contents)?;
    let mut targets = Vec::with_capacity(raw.len());
    for (name, url) in raw {
        if name.trim().is_empty() {
            return Err(CrawlError::Config("category name is empty".to_string()));
        }
        url::Url::parse(&url)
            .map_err(|e| CrawlError::Config(format!("category `{}` has bad url: {}", name, e)))?;
        targets.push(CategoryTarget::new(name, url));
    }
    Ok(targets)
}
