//! Product node → [`ProductRecord`] mapping.
//!
//! The extractor works on the rendered outer HTML of one product node, so it
//! is a pure function of that markup, the listing page it came from and the
//! configured selectors.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::SelectorSettings;
use crate::error::{CrawlError, ExtractionError, Result};
use crate::model::ProductRecord;

/// Rendered markup of one listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductNode {
    pub html: String,
}

impl ProductNode {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

/// Where a node was found; used to resolve relative links.
#[derive(Debug, Clone)]
pub struct ExtractContext<'a> {
    pub category: &'a str,
    pub page_url: &'a Url,
}

struct FieldSelector {
    source: String,
    selector: Selector,
}

impl FieldSelector {
    fn parse(source: &str) -> Result<Self> {
        let selector = Selector::parse(source).map_err(|e| CrawlError::Selector {
            selector: source.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            selector,
        })
    }

    fn first<'a>(
        &self,
        doc: &'a Html,
        field: &'static str,
    ) -> std::result::Result<ElementRef<'a>, ExtractionError> {
        doc.select(&self.selector)
            .next()
            .ok_or_else(|| ExtractionError::MissingField {
                field,
                selector: self.source.clone(),
            })
    }
}

pub struct RecordExtractor {
    name: FieldSelector,
    link: FieldSelector,
    price: FieldSelector,
    specs: FieldSelector,
    image: FieldSelector,
    registered: FieldSelector,
    product_id_param: String,
}

impl RecordExtractor {
    pub fn new(selectors: &SelectorSettings) -> Result<Self> {
        Ok(Self {
            name: FieldSelector::parse(&selectors.name)?,
            link: FieldSelector::parse(&selectors.link)?,
            price: FieldSelector::parse(&selectors.price)?,
            specs: FieldSelector::parse(&selectors.specs)?,
            image: FieldSelector::parse(&selectors.image)?,
            registered: FieldSelector::parse(&selectors.registered)?,
            product_id_param: selectors.product_id_param.clone(),
        })
    }

    pub fn extract(
        &self,
        node: &ProductNode,
        ctx: &ExtractContext<'_>,
    ) -> std::result::Result<ProductRecord, ExtractionError> {
        let doc = Html::parse_fragment(&node.html);

        let name = element_text(self.name.first(&doc, "name")?);

        let href = self
            .link
            .first(&doc, "link")?
            .value()
            .attr("href")
            .ok_or(ExtractionError::MissingAttribute {
                field: "link",
                attribute: "href",
            })?;
        let link = resolve(ctx.page_url, href, "link")?;
        let product_id = link
            .query_pairs()
            .find(|(key, _)| key == self.product_id_param.as_str())
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty());

        let price = parse_price(&element_text(self.price.first(&doc, "price")?));

        let specs = doc
            .select(&self.specs.selector)
            .map(element_text)
            .collect();

        let src = self
            .image
            .first(&doc, "image")?
            .value()
            .attr("src")
            .ok_or(ExtractionError::MissingAttribute {
                field: "image",
                attribute: "src",
            })?;
        let mut image_url = resolve(ctx.page_url, src, "image")?;
        image_url.set_query(None);
        image_url.set_fragment(None);

        let registered = element_text(self.registered.first(&doc, "registered")?);

        Ok(ProductRecord {
            name,
            product_id,
            price,
            specs,
            link: link.to_string(),
            image_url: image_url.to_string(),
            registered,
        })
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve(
    base: &Url,
    raw: &str,
    field: &'static str,
) -> std::result::Result<Url, ExtractionError> {
    base.join(raw.trim())
        .map_err(|e| ExtractionError::InvalidUrl {
            field,
            reason: e.to_string(),
        })
}

/// `"1,234,000"` → `Some(1234000)`; anything that is not a plain number → `None`.
pub fn parse_price(text: &str) -> Option<u64> {
    let digits: String = text
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
