//! Browser-driven crawler for paginated product category listings.
//!
//! Each configured category gets its own browser session and task; finished
//! categories are merged into a shared store and written out as JSON plus a
//! dated archive.

pub mod config;
pub mod crawler;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod images;
pub mod model;
pub mod orchestrator;
pub mod pagination;
pub mod persist;
pub mod store;

pub use config::AppSettings;
pub use crawler::{CategoryCrawler, CrawlerOptions};
pub use driver::{PageAdvance, PageDriver, SessionLauncher};
pub use error::{CrawlError, ExtractionError, StoreError};
pub use extractor::{ExtractContext, ProductNode, RecordExtractor};
pub use images::ImageDownloader;
pub use model::{CategoryResult, CategoryTarget, ProductRecord, Termination};
pub use orchestrator::{CrawlOrchestrator, CrawlReport};
pub use pagination::{PageControls, PageDecision, PaginationState};
pub use persist::{JsonDatasetSink, ResultSink};
pub use store::CrawlStore;
