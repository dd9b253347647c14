use std::path::Path;

use async_trait::async_trait;
use tracing::warn;

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::service::ScrapeResult;
use crate::wait::ElementState;

/// One remote browser session driven over the DevTools protocol.
///
/// Element operations address the first element matching a CSS selector.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load `url` and wait for the navigation to commit.
    async fn navigate(&self, url: &str) -> Result<(), ScraperError>;

    /// State of the first match for every selector, read at one instant.
    /// The result has one entry per selector, in order.
    async fn probe_all(&self, selectors: &[&str]) -> Result<Vec<ElementState>, ScraperError>;

    /// Presence, visibility and enabled state of the first match.
    async fn probe(&self, selector: &str) -> Result<ElementState, ScraperError> {
        let states = self.probe_all(&[selector]).await?;
        Ok(states.into_iter().next().unwrap_or(ElementState::ABSENT))
    }

    /// Rendered text of the first match, `None` when absent.
    async fn text(&self, selector: &str) -> Result<Option<String>, ScraperError>;

    /// Attribute value of the first match, `None` when the element or the
    /// attribute is absent.
    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>, ScraperError>;

    async fn click(&self, selector: &str) -> Result<(), ScraperError>;

    /// Inner HTML of the first match, `None` when absent.
    async fn snapshot_markup(&self, selector: &str) -> Result<Option<String>, ScraperError>;

    /// Full-page PNG written to `path`.
    async fn screenshot(&self, path: &Path) -> Result<(), ScraperError>;

    /// Release the session. Must be safe to call more than once.
    async fn close(&self) -> Result<(), ScraperError>;
}

/// Opens independent browser sessions, one per task.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, config: &ScraperConfig) -> Result<Box<dyn BrowserSession>, ScraperError>;
}

#[async_trait]
pub trait Scraper: Send + Sync {
    /// Prepare directories and open the browser session.
    async fn initialize(&mut self) -> Result<(), ScraperError>;

    /// Perform the task against the open session.
    async fn run(&mut self) -> Result<ScrapeResult, ScraperError>;

    /// Release the session.
    async fn close(&mut self) -> Result<(), ScraperError>;

    /// initialize → run → close. `close` runs on every exit path, including a
    /// partially failed `initialize`; a `run` error takes precedence over a
    /// close error.
    async fn execute(&mut self) -> Result<ScrapeResult, ScraperError> {
        if let Err(e) = self.initialize().await {
            if let Err(close_err) = self.close().await {
                warn!("Close after failed initialize also failed: {}", close_err);
            }
            return Err(e);
        }
        let result = self.run().await;
        let closed = self.close().await;
        let output = result?;
        closed?;
        Ok(output)
    }
}
