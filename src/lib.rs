//! Reference price scraper library
//!
//! - Walks the paginated reference price table in a remote browser and
//!   streams every row into a CSV file
//! - Follows a download link and waits for the file to land on disk
//! - Exposes both as fire-and-forget tasks over HTTP
//!
//! # Price table example
//!
//! ```rust,ignore
//! use reference_price_scraper::{ScrapeRequest, ScraperConfig, ScraperService};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ScraperConfig::new()
//!         .with_browser_endpoint("http://chrome:9222")
//!         .with_output_dir("./data");
//!     let mut service = ScraperService::new(config);
//!
//!     let request = ScrapeRequest::reference_prices("https://uzpharmagency.uz/ru/reference-prices");
//!     let result = service.call(request).await.unwrap();
//!     println!("{:?} rows written to {:?}", result.rows, result.output_path);
//! }
//! ```

pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod extract;
pub mod file_download;
pub mod paginate;
pub mod reference_prices;
pub mod service;
pub mod sink;
pub mod traits;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;

// Configuration and errors
pub use config::{ScraperConfig, ServerConfig, TableSelectors, DEFAULT_REFERENCE_PRICES_URL};
pub use error::ScraperError;

// Browser seam
pub use browser::{CdpConnector, CdpSession};
pub use traits::{BrowserSession, Scraper, SessionFactory};
pub use wait::{Condition, ElementState, WaitOutcome, Waiter};

// Table pipeline
pub use extract::{Record, RowExtractor};
pub use paginate::{DriverState, PageCursor, PaginationDriver, PaginationSummary};
pub use sink::CsvSink;

// Tasks
pub use file_download::FileDownloadScraper;
pub use reference_prices::ReferencePriceScraper;
pub use service::{ScrapeRequest, ScrapeResult, ScraperService, TaskKind};
