//! reference-price-scraper: HTTP entry point
//!
//! Configuration comes from the environment (see `ServerConfig::from_env`).

use reference_price_scraper::api::{self, AppState};
use reference_price_scraper::{ScraperService, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = ServerConfig::from_env().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting reference-price-scraper...");
    match &config.scraper.browser_endpoint {
        Some(endpoint) => tracing::info!("Browser endpoint: {}", endpoint),
        None => tracing::info!("No browser endpoint configured, launching local Chrome per task"),
    }
    tracing::info!("Output directory: {:?}", config.scraper.output_dir);

    std::fs::create_dir_all(&config.scraper.output_dir)?;

    let service = ScraperService::new(config.scraper);
    api::serve(config.bind_addr, AppState::new(service)).await?;

    Ok(())
}
