use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ScraperError;

/// Reference price table published by the pharmaceutical agency.
pub const DEFAULT_REFERENCE_PRICES_URL: &str = "https://uzpharmagency.uz/ru/reference-prices";

/// CSS selectors describing the paginated price table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSelectors {
    /// Table body whose markup is snapshotted for extraction.
    pub body: String,
    /// A row carrying a real record.
    pub data_row: String,
    /// Transient row shown while the next page loads.
    pub placeholder_row: String,
    /// Empty-state widget rendered when a page has no rows.
    pub empty_marker: String,
    /// Spinner overlaying the table while a request is in flight. Not scoped
    /// to the body.
    pub loading_indicator: String,
}

impl Default for TableSelectors {
    fn default() -> Self {
        Self {
            body: "tbody.ant-table-tbody".to_string(),
            data_row: "tr.ant-table-row".to_string(),
            placeholder_row: "tr.ant-table-placeholder".to_string(),
            empty_marker: ".ant-empty".to_string(),
            loading_indicator: ".ant-spin-spinning".to_string(),
        }
    }
}

impl TableSelectors {
    /// `data_row` scoped to the table body.
    pub fn body_data_row(&self) -> String {
        format!("{} {}", self.body, self.data_row)
    }

    /// `placeholder_row` scoped to the table body.
    pub fn body_placeholder_row(&self) -> String {
        format!("{} {}", self.body, self.placeholder_row)
    }

    /// `empty_marker` scoped to the table body.
    pub fn body_empty_marker(&self) -> String {
        format!("{} {}", self.body, self.empty_marker)
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Remote DevTools endpoint (`ws://...` or `http://host:9222`).
    /// `None` launches a local Chrome.
    pub browser_endpoint: Option<String>,
    pub headless: bool,
    pub window_size: (u32, u32),
    pub output_dir: PathBuf,
    pub output_file_name: String,
    pub screenshot_dir: PathBuf,
    pub debug_screenshots: bool,
    pub start_page: u32,
    pub page_size: u32,
    /// Deadline for a single wait condition.
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    pub download_timeout: Duration,
    pub download_link_selector: String,
    pub selectors: TableSelectors,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            browser_endpoint: None,
            headless: true,
            window_size: (1920, 1080),
            output_dir: PathBuf::from("./data"),
            output_file_name: "data.csv".to_string(),
            screenshot_dir: PathBuf::from("./screenshots"),
            debug_screenshots: false,
            start_page: 0,
            page_size: 200,
            wait_timeout: Duration::from_secs(100),
            poll_interval: Duration::from_millis(500),
            download_timeout: Duration::from_secs(20),
            download_link_selector: "a[href*='download/curl']".to_string(),
            selectors: TableSelectors::default(),
        }
    }
}

impl ScraperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_browser_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.browser_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    pub fn with_output_file_name(mut self, name: impl Into<String>) -> Self {
        self.output_file_name = name.into();
        self
    }

    pub fn with_screenshot_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = path.into();
        self
    }

    pub fn with_debug_screenshots(mut self, enabled: bool) -> Self {
        self.debug_screenshots = enabled;
        self
    }

    pub fn with_start_page(mut self, page: u32) -> Self {
        self.start_page = page;
        self
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_download_link_selector(mut self, selector: impl Into<String>) -> Self {
        self.download_link_selector = selector.into();
        self
    }

    pub fn with_selectors(mut self, selectors: TableSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    /// Path of the CSV file written by the price table task.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_file_name)
    }

    /// Rejects values that would make the scrape loop meaningless.
    pub fn validate(&self) -> Result<(), ScraperError> {
        if self.page_size == 0 {
            return Err(ScraperError::Config("page size must be positive".into()));
        }
        if self.wait_timeout.is_zero() {
            return Err(ScraperError::Config("wait timeout must be positive".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ScraperError::Config("poll interval must be positive".into()));
        }
        if self.output_file_name.is_empty() {
            return Err(ScraperError::Config("output file name is empty".into()));
        }
        Ok(())
    }
}

/// Settings for the HTTP binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub scraper: ScraperConfig,
}

impl ServerConfig {
    /// Reads the server settings from environment variables, falling back to
    /// [`ScraperConfig::default`] for anything unset.
    pub fn from_env() -> Result<Self, ScraperError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ScraperError> {
        let bind_addr = parse_var(&lookup, "BIND_ADDR")?
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8000)));

        let mut scraper = ScraperConfig::default();
        if let Some(endpoint) = lookup("BROWSER_ENDPOINT").filter(|v| !v.is_empty()) {
            scraper.browser_endpoint = Some(endpoint);
        }
        if let Some(dir) = lookup("OUTPUT_DIR") {
            scraper.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("SCREENSHOT_DIR") {
            scraper.screenshot_dir = PathBuf::from(dir);
        }
        if let Some(enabled) = parse_var(&lookup, "DEBUG_SCREENSHOTS")? {
            scraper.debug_screenshots = enabled;
        }
        if let Some(headless) = parse_var(&lookup, "HEADLESS")? {
            scraper.headless = headless;
        }
        if let Some(page) = parse_var(&lookup, "START_PAGE")? {
            scraper.start_page = page;
        }
        if let Some(size) = parse_var(&lookup, "PAGE_SIZE")? {
            scraper.page_size = size;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "WAIT_TIMEOUT_SECS")? {
            scraper.wait_timeout = Duration::from_secs(secs);
        }
        scraper.validate()?;

        Ok(Self { bind_addr, scraper })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ScraperError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ScraperError::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}
