//! Page-by-page walk over the price table.
//!
//! Each iteration navigates to `{base_url}?page={n}&size={size}`, waits for
//! data rows, then waits for the loading placeholder to go away, snapshots
//! the table body and hands the rows to the sink. The first page without
//! rows ends the walk. Any failure is terminal; nothing is retried.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{ScraperConfig, TableSelectors};
use crate::error::ScraperError;
use crate::extract::RowExtractor;
use crate::sink::CsvSink;
use crate::traits::BrowserSession;
use crate::wait::{Condition, Waiter};

/// Server-side page position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    page: u32,
    size: u32,
}

impl PageCursor {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}?page={}&size={}", base_url, self.page, self.size)
    }

    pub fn advance(&mut self) {
        self.page += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Navigating,
    AwaitingRows,
    AwaitingPlaceholderGone,
    Extracting,
    Emitting,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSummary {
    /// Non-empty pages written to the sink.
    pub pages: u32,
    pub rows: usize,
    /// The page found empty.
    pub last_page: u32,
}

pub struct PaginationDriver<'a> {
    session: &'a dyn BrowserSession,
    base_url: String,
    cursor: PageCursor,
    waiter: Waiter,
    selectors: TableSelectors,
    extractor: RowExtractor,
    rows_ready: Condition,
    placeholder_gone: Condition,
    screenshot_dir: Option<PathBuf>,
    state: DriverState,
}

impl<'a> PaginationDriver<'a> {
    pub fn new(
        session: &'a dyn BrowserSession,
        base_url: impl Into<String>,
        config: &ScraperConfig,
    ) -> Result<Self, ScraperError> {
        let selectors = config.selectors.clone();
        let extractor = RowExtractor::new(&selectors.data_row)
            .map_err(|e| ScraperError::Config(format!("invalid data row selector {}", e)))?;

        let data_row = selectors.body_data_row();
        let placeholder = selectors.body_placeholder_row();
        let rows_ready = Condition::any_of([
            Condition::all_of([Condition::present(&data_row), Condition::visible(&data_row)]),
            Condition::all_of([
                Condition::present(selectors.body_empty_marker()),
                Condition::absent(&selectors.loading_indicator),
            ]),
        ]);
        let placeholder_gone = Condition::none_of([
            Condition::present(&placeholder),
            Condition::visible(&placeholder),
        ]);

        Ok(Self {
            session,
            base_url: base_url.into(),
            cursor: PageCursor::new(config.start_page, config.page_size),
            waiter: Waiter::new(config.wait_timeout, config.poll_interval),
            selectors,
            extractor,
            rows_ready,
            placeholder_gone,
            screenshot_dir: config
                .debug_screenshots
                .then(|| config.screenshot_dir.clone()),
            state: DriverState::Navigating,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    /// Walks pages until one comes back empty, writing every non-empty page
    /// to `sink` before moving on.
    pub async fn run(&mut self, sink: &mut CsvSink) -> Result<PaginationSummary, ScraperError> {
        match self.walk(sink).await {
            Ok(summary) => {
                self.transition(DriverState::Done);
                info!(
                    "Pagination finished: {} pages, {} rows, page {} was empty",
                    summary.pages, summary.rows, summary.last_page
                );
                Ok(summary)
            }
            Err(e) => {
                self.transition(DriverState::Failed);
                warn!("Pagination failed on page {}: {}", self.cursor.page(), e);
                Err(e)
            }
        }
    }

    async fn walk(&mut self, sink: &mut CsvSink) -> Result<PaginationSummary, ScraperError> {
        let mut pages = 0;
        let mut rows = 0;

        loop {
            self.transition(DriverState::Navigating);
            let url = self.cursor.url(&self.base_url);
            info!("Navigating to page {}: {}", self.cursor.page(), url);
            self.session.navigate(&url).await?;

            self.transition(DriverState::AwaitingRows);
            self.waiter.require(self.session, &self.rows_ready).await?;

            let empty_page = self
                .session
                .probe(&self.selectors.body_empty_marker())
                .await?
                .present;
            if !empty_page {
                self.transition(DriverState::AwaitingPlaceholderGone);
                self.waiter.require(self.session, &self.placeholder_gone).await?;
            }

            self.capture_screenshot().await;

            self.transition(DriverState::Extracting);
            let markup = self
                .session
                .snapshot_markup(&self.selectors.body)
                .await?
                .ok_or_else(|| {
                    ScraperError::Extraction(format!("table body {} missing", self.selectors.body))
                })?;
            let records = self.extractor.extract(&markup);

            if records.is_empty() {
                return Ok(PaginationSummary {
                    pages,
                    rows,
                    last_page: self.cursor.page(),
                });
            }
            info!("Found {} records on page {}", records.len(), self.cursor.page());

            self.transition(DriverState::Emitting);
            sink.write_page(&records)?;
            pages += 1;
            rows += records.len();

            self.cursor.advance();
        }
    }

    async fn capture_screenshot(&self) {
        let Some(dir) = &self.screenshot_dir else {
            return;
        };
        let path = dir.join(format!(
            "page_{}_{}.png",
            self.cursor.page(),
            Utc::now().timestamp_millis()
        ));
        if let Err(e) = self.session.screenshot(&path).await {
            warn!("Failed to save screenshot {:?}: {}", path, e);
        }
    }

    fn transition(&mut self, next: DriverState) {
        debug!("Driver state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
