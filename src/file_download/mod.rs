//! Link download scraper
//!
//! Finds a download link on a page, follows it and waits for the browser to
//! drop the file into the output directory.

mod scraper;

pub use self::scraper::FileDownloadScraper;
