use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::browser::CdpConnector;
use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::file_download::FileDownloadScraper;
use crate::reference_prices::ReferencePriceScraper;
use crate::traits::{Scraper, SessionFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Paginated price table into CSV.
    ReferencePrices,
    /// Single file behind a download link.
    FileDownload,
}

/// One task invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub url: String,
    pub kind: TaskKind,
}

impl ScrapeRequest {
    pub fn reference_prices(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: TaskKind::ReferencePrices,
        }
    }

    pub fn file_download(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: TaskKind::FileDownload,
        }
    }
}

/// What a finished task left on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeResult {
    pub output_path: PathBuf,
    pub size_bytes: u64,
    /// Data rows written, for table scrapes.
    pub rows: Option<usize>,
}

impl ScrapeResult {
    pub fn new(output_path: PathBuf, rows: Option<usize>) -> std::io::Result<Self> {
        let size_bytes = std::fs::metadata(&output_path)?.len();
        Ok(Self {
            output_path,
            size_bytes,
            rows,
        })
    }
}

/// tower::Service running one scrape task per request, each with its own
/// browser session and output file.
#[derive(Clone)]
pub struct ScraperService {
    config: ScraperConfig,
    factory: Arc<dyn SessionFactory>,
}

impl ScraperService {
    /// Service backed by real browser sessions.
    pub fn new(config: ScraperConfig) -> Self {
        Self::with_factory(config, Arc::new(CdpConnector::new()))
    }

    pub fn with_factory(config: ScraperConfig, factory: Arc<dyn SessionFactory>) -> Self {
        Self { config, factory }
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    fn scraper_for(&self, req: ScrapeRequest) -> Box<dyn Scraper> {
        let config = self.config.clone();
        let factory = Arc::clone(&self.factory);
        match req.kind {
            TaskKind::ReferencePrices => Box::new(ReferencePriceScraper::new(config, req.url, factory)),
            TaskKind::FileDownload => Box::new(FileDownloadScraper::new(config, req.url, factory)),
        }
    }
}

impl Service<ScrapeRequest> for ScraperService {
    type Response = ScrapeResult;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ScrapeRequest) -> Self::Future {
        info!("Scrape request received: {:?} {}", req.kind, req.url);
        let mut scraper = self.scraper_for(req);

        Box::pin(async move {
            let result = scraper.execute().await?;

            info!(
                "Scrape finished: path={:?}, size={}bytes, rows={:?}",
                result.output_path, result.size_bytes, result.rows
            );

            Ok(result)
        })
    }
}
