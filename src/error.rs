use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("browser initialization failed: {0}")]
    BrowserInit(String),

    #[error("browser session error: {0}")]
    Session(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("file I/O error: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),
}

impl ScraperError {
    /// True for elapsed wait and download deadlines.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScraperError::Timeout(_))
    }
}
