//! Reference price table scraper
//!
//! Walks the paginated price table page by page and streams every row into
//! a CSV file.

mod scraper;

pub use self::scraper::ReferencePriceScraper;
