//! Pagination decisions for a category crawl.
//!
//! The listing site offers two kinds of controls: an explicit "next" link
//! and a row of numbered page links. Which of them is rendered varies from
//! page to page, so the choice is made here as a table over what the
//! current page shows instead of inside the browser code.

use url::Url;

use crate::error::{CrawlError, Result};

/// Navigation controls visible on the current page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageControls {
    pub has_next: bool,
    /// Numeric labels of the page-number links, in document order.
    pub page_labels: Vec<u32>,
}

impl PageControls {
    pub fn with_next() -> Self {
        Self {
            has_next: true,
            page_labels: Vec::new(),
        }
    }

    pub fn with_pages(labels: impl IntoIterator<Item = u32>) -> Self {
        Self {
            has_next: false,
            page_labels: labels.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDecision {
    ClickNext,
    GoTo(u32),
    NoMorePages,
}

/// Per-crawler progress, discarded once the category is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationState {
    pub page: u32,
    pub records: usize,
    pub last_height: Option<u64>,
    /// Highest page label seen so far. Starts at 1, so a page with neither
    /// control ends the crawl.
    pub max_pages: u32,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            page: 1,
            records: 0,
            last_height: None,
            max_pages: 1,
        }
    }
}

impl PaginationState {
    /// Applies the decision table to `controls`, remembering any larger page
    /// count it reveals.
    pub fn decide(&mut self, controls: &PageControls) -> PageDecision {
        // an explicit "next" control wins over whatever the numbers say
        if controls.has_next {
            return PageDecision::ClickNext;
        }
        if let Some(max) = controls.page_labels.iter().copied().max() {
            self.max_pages = max;
        }
        if self.page >= self.max_pages {
            PageDecision::NoMorePages
        } else {
            PageDecision::GoTo(self.page + 1)
        }
    }

    pub fn advance(&mut self) {
        self.page += 1;
    }
}

/// Listing URL for `page`, replacing any page parameter already present.
pub fn page_url(listing_url: &str, page_param: &str, page: u32) -> Result<String> {
    let mut url = Url::parse(listing_url)
        .map_err(|e| CrawlError::Navigation(format!("bad listing url {}: {}", listing_url, e)))?;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != page_param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair(page_param, &page.to_string());
    Ok(url.to_string())
}

/// Parses a page-number label such as `"3"`; arrows and ellipses yield `None`.
pub fn parse_page_label(label: &str) -> Option<u32> {
    let label = label.trim();
    if label.is_empty() || !label.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    label.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_control_takes_priority() {
        let mut state = PaginationState::default();
        let controls = PageControls {
            has_next: true,
            page_labels: vec![1],
        };
        assert_eq!(state.decide(&controls), PageDecision::ClickNext);
    }

    #[test]
    fn numbers_drive_navigation_until_last_page() {
        let mut state = PaginationState::default();
        let controls = PageControls::with_pages([1, 2, 3]);

        assert_eq!(state.decide(&controls), PageDecision::GoTo(2));
        state.advance();
        assert_eq!(state.decide(&controls), PageDecision::GoTo(3));
        state.advance();
        assert_eq!(state.decide(&controls), PageDecision::NoMorePages);
        assert_eq!(state.max_pages, 3);
    }

    #[test]
    fn missing_labels_fall_back_to_seen_maximum() {
        let mut state = PaginationState {
            page: 2,
            max_pages: 4,
            ..Default::default()
        };
        assert_eq!(state.decide(&PageControls::default()), PageDecision::GoTo(3));
    }

    #[test]
    fn no_controls_on_first_page_finishes() {
        let mut state = PaginationState::default();
        assert_eq!(state.decide(&PageControls::default()), PageDecision::NoMorePages);
    }

    #[test]
    fn page_url_replaces_existing_parameter() {
        let url = page_url("https://shop.example.com/list/?cate=112747&page=2", "page", 3).unwrap();
        assert_eq!(url, "https://shop.example.com/list/?cate=112747&page=3");

        let url = page_url("https://shop.example.com/list/?cate=1", "page", 2).unwrap();
        assert_eq!(url, "https://shop.example.com/list/?cate=1&page=2");
    }

    #[test]
    fn page_labels() {
        assert_eq!(parse_page_label(" 7 "), Some(7));
        assert_eq!(parse_page_label("다음"), None);
        assert_eq!(parse_page_label(""), None);
    }
}
