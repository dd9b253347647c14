//! Downloads curl's source tarball once and lists the output directory.

use reference_price_scraper::{CdpConnector, FileDownloadScraper, Scraper, ScraperConfig};
use std::sync::Arc;
use std::time::Duration;

const DOWNLOAD_PAGE: &str = "https://curl.se/download.html";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let download_dir = std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "./data".to_string());
    if let Err(e) = std::fs::create_dir_all(&download_dir) {
        eprintln!("Cannot create {}: {}", download_dir, e);
        return;
    }
    tracing::info!("Download directory: {}", download_dir);

    let mut config = ScraperConfig::new()
        .with_output_dir(&download_dir)
        .with_wait_timeout(Duration::from_secs(30));
    if let Ok(endpoint) = std::env::var("BROWSER_ENDPOINT") {
        config = config.with_browser_endpoint(endpoint);
    }

    let mut scraper = FileDownloadScraper::new(config, DOWNLOAD_PAGE, Arc::new(CdpConnector::new()));

    match scraper.execute().await {
        Ok(result) => tracing::info!(
            "Downloaded {:?} ({} bytes)",
            result.output_path,
            result.size_bytes
        ),
        Err(e) => tracing::error!("Error during debug download: {}", e),
    }

    let files = reference_price_scraper::api::output_files(std::path::Path::new(&download_dir));
    tracing::info!("Files in download directory: {:?}", files);
}
