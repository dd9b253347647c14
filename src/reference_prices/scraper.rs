use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::paginate::{DriverState, PaginationDriver};
use crate::service::ScrapeResult;
use crate::sink::CsvSink;
use crate::traits::{BrowserSession, Scraper, SessionFactory};

/// Scrapes the whole price table at `url` into `config.output_path()`.
pub struct ReferencePriceScraper {
    config: ScraperConfig,
    url: String,
    factory: Arc<dyn SessionFactory>,
    session: Option<Box<dyn BrowserSession>>,
    final_state: Option<DriverState>,
}

impl ReferencePriceScraper {
    pub fn new(config: ScraperConfig, url: impl Into<String>, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            config,
            url: url.into(),
            factory,
            session: None,
            final_state: None,
        }
    }

    /// State the pagination driver stopped in, once `run` has returned.
    pub fn final_state(&self) -> Option<DriverState> {
        self.final_state
    }

    fn get_session(&self) -> Result<&dyn BrowserSession, ScraperError> {
        self.session
            .as_deref()
            .ok_or_else(|| ScraperError::BrowserInit("browser session not initialized".into()))
    }
}

#[async_trait]
impl Scraper for ReferencePriceScraper {
    async fn initialize(&mut self) -> Result<(), ScraperError> {
        info!("Initializing reference price scrape for {}", self.url);
        self.config.validate()?;

        std::fs::create_dir_all(&self.config.output_dir)?;
        if self.config.debug_screenshots {
            std::fs::create_dir_all(&self.config.screenshot_dir)?;
        }

        self.session = Some(self.factory.open(&self.config).await?);
        Ok(())
    }

    async fn run(&mut self) -> Result<ScrapeResult, ScraperError> {
        self.get_session()?;
        let path = self.config.output_path();
        let mut sink = CsvSink::create(&path)?;

        let (outcome, state) = {
            let session = self.get_session()?;
            let mut driver = PaginationDriver::new(session, self.url.as_str(), &self.config)?;
            let outcome = driver.run(&mut sink).await;
            (outcome, driver.state())
        };
        self.final_state = Some(state);

        let summary = match outcome {
            Ok(summary) => summary,
            Err(e) => {
                error!(
                    "Scrape of {} aborted after {} rows: {}",
                    self.url,
                    sink.rows_written(),
                    e
                );
                return Err(e);
            }
        };
        let rows = sink.finish()?;

        info!(
            "Scrape complete: {} pages, {} rows written to {:?}",
            summary.pages, rows, path
        );
        Ok(ScrapeResult::new(path, Some(rows))?)
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        if let Some(session) = self.session.take() {
            session.close().await?;
        }
        Ok(())
    }
}
