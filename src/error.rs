use thiserror::Error;

/// A single product node could not be turned into a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("required field `{field}` not found (selector `{selector}`)")]
    MissingField {
        field: &'static str,
        selector: String,
    },

    #[error("attribute `{attribute}` missing on `{field}`")]
    MissingAttribute {
        field: &'static str,
        attribute: &'static str,
    },

    #[error("invalid url for `{field}`: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("no elements matched `{selector}` within {seconds}s")]
    LocatorTimeout { selector: String, seconds: u64 },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser session error: {0}")]
    Session(String),

    #[error("image download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<config::ConfigError> for CrawlError {
    fn from(e: config::ConfigError) -> Self {
        CrawlError::Config(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("category `{0}` already has a result")]
    Duplicate(String),
}

pub type Result<T> = std::result::Result<T, CrawlError>;
