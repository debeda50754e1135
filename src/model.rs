use serde::{Deserialize, Serialize};

/// One category to crawl: a unique name and its listing page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CategoryTarget {
    pub name: String,
    pub url: String,
}

impl CategoryTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// A product as it appears on a listing page.
///
/// Field order and keys match the published dataset format, so reordering the
/// struct changes the JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "제품명")]
    pub name: String,
    #[serde(rename = "제품ID")]
    pub product_id: Option<String>,
    #[serde(rename = "가격")]
    pub price: Option<u64>,
    #[serde(rename = "스펙")]
    pub specs: Vec<String>,
    #[serde(rename = "prod_danawa_href")]
    pub link: String,
    #[serde(rename = "이미지URL")]
    pub image_url: String,
    #[serde(rename = "등록년월")]
    pub registered: String,
}

/// How a category crawl ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Pagination ran out of pages (or navigation could not continue).
    Finished,
    /// A page- or session-level failure stopped the crawl early.
    Aborted(String),
}

impl Termination {
    pub fn is_finished(&self) -> bool {
        matches!(self, Termination::Finished)
    }
}

/// Everything one crawler collected for its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryResult {
    pub category: String,
    pub records: Vec<ProductRecord>,
    pub pages_visited: u32,
    pub termination: Termination,
}

impl CategoryResult {
    pub fn new(category: impl Into<String>, termination: Termination) -> Self {
        Self {
            category: category.into(),
            records: Vec::new(),
            pages_visited: 0,
            termination,
        }
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }
}
