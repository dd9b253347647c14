use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::service::ScrapeResult;
use crate::traits::{BrowserSession, Scraper, SessionFactory};
use crate::wait::{Condition, Waiter};

const DOWNLOAD_POLL_INTERVAL: Duration = Duration::from_millis(500);
const PARTIAL_SUFFIXES: [&str; 2] = [".crdownload", ".tmp"];

/// Follows the download link on `url` and waits for the file to land in
/// `config.output_dir`.
pub struct FileDownloadScraper {
    config: ScraperConfig,
    url: String,
    factory: Arc<dyn SessionFactory>,
    session: Option<Box<dyn BrowserSession>>,
}

impl FileDownloadScraper {
    pub fn new(config: ScraperConfig, url: impl Into<String>, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            config,
            url: url.into(),
            factory,
            session: None,
        }
    }

    fn get_session(&self) -> Result<&dyn BrowserSession, ScraperError> {
        self.session
            .as_deref()
            .ok_or_else(|| ScraperError::BrowserInit("browser session not initialized".into()))
    }

    /// Completed files currently in the output directory, minus the table
    /// scrape's CSV which shares the directory.
    fn finished_files(&self) -> Result<HashSet<PathBuf>, ScraperError> {
        let dir = &self.config.output_dir;
        if !dir.exists() {
            return Ok(HashSet::new());
        }

        let scrape_output = self.config.output_path();
        let mut files = HashSet::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && !is_partial(&path) && path.file_name() != scrape_output.file_name() {
                files.insert(path);
            }
        }
        Ok(files)
    }

    /// Polls the output directory until a completed file not in `before`
    /// shows up.
    async fn wait_for_download(&self, before: &HashSet<PathBuf>) -> Result<PathBuf, ScraperError> {
        let timeout = self.config.download_timeout;
        let start = tokio::time::Instant::now();

        loop {
            if let Some(path) = self
                .finished_files()?
                .into_iter()
                .find(|path| !before.contains(path))
            {
                info!("Downloaded file detected: {:?}", path);
                return Ok(path);
            }

            if start.elapsed() > timeout {
                return Err(ScraperError::Timeout(format!(
                    "download did not finish within {:?}",
                    timeout
                )));
            }

            tokio::time::sleep(DOWNLOAD_POLL_INTERVAL.min(timeout)).await;
        }
    }
}

fn is_partial(path: &Path) -> bool {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Resolves a link `href` against the page it was found on.
fn download_url(page_url: &str, href: &str) -> Result<Url, ScraperError> {
    Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map_err(|e| ScraperError::Navigation(format!("download link {:?} on {}: {}", href, page_url, e)))
}

#[async_trait]
impl Scraper for FileDownloadScraper {
    async fn initialize(&mut self) -> Result<(), ScraperError> {
        info!("Initializing file download for {}", self.url);
        std::fs::create_dir_all(&self.config.output_dir)?;
        self.session = Some(self.factory.open(&self.config).await?);
        Ok(())
    }

    async fn run(&mut self) -> Result<ScrapeResult, ScraperError> {
        let session = self.get_session()?;
        let selector = self.config.download_link_selector.as_str();
        let waiter = Waiter::new(self.config.wait_timeout, self.config.poll_interval);

        info!("Navigating to {}", self.url);
        session.navigate(&self.url).await?;

        info!("Looking for the download link");
        waiter
            .require(
                session,
                &Condition::all_of([Condition::clickable(selector), Condition::visible(selector)]),
            )
            .await?;

        let label = session.text(selector).await?.unwrap_or_default();
        let before = self.finished_files()?;

        match session.attribute(selector, "href").await? {
            Some(href) => {
                let download_url = download_url(&self.url, &href)?;
                info!("Found download URL: {} ({})", download_url, label.trim());
                match session.navigate(download_url.as_str()).await {
                    Ok(()) => {}
                    // Chrome aborts the navigation once it turns into a download.
                    Err(ScraperError::Navigation(e)) => {
                        debug!("Download navigation ended early: {}", e)
                    }
                    Err(e) => return Err(e),
                }
            }
            None => {
                // Script-driven export button.
                info!("Clicking download control ({})", label.trim());
                session.click(selector).await?;
            }
        }

        info!("Waiting for download to complete");
        let path = self.wait_for_download(&before).await?;

        let files: Vec<String> = self
            .finished_files()?
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        info!("Files in download directory: {:?}", files);

        Ok(ScrapeResult::new(path, None)?)
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        if let Some(session) = self.session.take() {
            session.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedFactory, ScriptedSession};

    const PAGE: &str = r#"<html><body>
        <a href="/download/other.zip">Other</a>
        <a class="dl" href="download/curl-8.10.1.tar.gz">curl 8.10.1</a>
    </body></html>"#;

    fn config(dir: &Path) -> ScraperConfig {
        ScraperConfig::new()
            .with_output_dir(dir)
            .with_wait_timeout(Duration::from_millis(200))
            .with_poll_interval(Duration::from_millis(5))
            .with_download_timeout(Duration::from_millis(600))
    }

    #[test]
    fn test_download_url_resolution() {
        let page = "https://host/a/b/page.html?q=1";
        let resolve = |href| download_url(page, href).unwrap().to_string();

        assert_eq!(resolve("c.zip"), "https://host/a/b/c.zip");
        assert_eq!(resolve("../c.zip"), "https://host/a/c.zip");
        assert_eq!(resolve("/x.zip"), "https://host/x.zip");
        assert_eq!(resolve("?x=1"), "https://host/a/b/page.html?x=1");
        assert_eq!(resolve("dl?u=http://x"), "https://host/a/b/dl?u=http://x");
        assert_eq!(resolve("//cdn.example/x.zip"), "https://cdn.example/x.zip");
        assert_eq!(resolve("http://other/x"), "http://other/x");
    }

    #[test]
    fn test_download_url_rejects_relative_page() {
        let err = download_url("not a url", "c.zip").unwrap_err();
        assert!(matches!(err, ScraperError::Navigation(_)));
    }

    #[test]
    fn test_partial_downloads_ignored() {
        assert!(is_partial(Path::new("/tmp/curl.tar.gz.crdownload")));
        assert!(!is_partial(Path::new("/tmp/curl.tar.gz")));
    }

    #[tokio::test]
    async fn test_download_follows_link_and_detects_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.csv"), "old").unwrap();
        let target = dir.path().join("curl-8.10.1.tar.gz");
        let session = ScriptedSession::with_document(PAGE)
            .with_download("https://curl.se/download/curl-8.10.1.tar.gz", &target);
        let factory = Arc::new(ScriptedFactory::new(session.clone()));

        let mut scraper = FileDownloadScraper::new(
            config(dir.path()).with_download_link_selector("a.dl"),
            "https://curl.se/download.html",
            factory,
        );
        let result = scraper.execute().await.unwrap();

        assert_eq!(result.output_path, target);
        assert_eq!(result.rows, None);
        assert_eq!(
            session.navigations(),
            vec![
                "https://curl.se/download.html".to_string(),
                "https://curl.se/download/curl-8.10.1.tar.gz".to_string(),
            ]
        );
        assert_eq!(session.close_count(), 1);
    }

    #[test]
    fn test_scrape_csv_is_not_a_download_candidate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.csv"), "id\n").unwrap();
        std::fs::write(dir.path().join("curl.tar.gz"), "x").unwrap();
        std::fs::write(dir.path().join("next.zip.crdownload"), "x").unwrap();

        let scraper = FileDownloadScraper::new(
            config(dir.path()),
            "https://curl.se/download.html",
            Arc::new(ScriptedFactory::unreachable()),
        );
        let files = scraper.finished_files().unwrap();

        assert_eq!(files, HashSet::from([dir.path().join("curl.tar.gz")]));
    }

    #[tokio::test]
    async fn test_parent_relative_link_is_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("c.zip");
        let session = ScriptedSession::with_document(
            r#"<html><body><a class="dl" href="../c.zip">Archive</a></body></html>"#,
        )
        .with_download("https://host/a/c.zip", &target);
        let factory = Arc::new(ScriptedFactory::new(session.clone()));

        let mut scraper = FileDownloadScraper::new(
            config(dir.path()).with_download_link_selector("a.dl"),
            "https://host/a/b/page.html",
            factory,
        );
        let result = scraper.execute().await.unwrap();

        assert_eq!(result.output_path, target);
        assert_eq!(session.navigations()[1], "https://host/a/c.zip");
    }

    #[tokio::test]
    async fn test_concurrent_scrape_csv_does_not_end_the_wait() {
        let dir = tempfile::tempdir().unwrap();
        // The link only produces the table scrape's CSV, never a real download.
        let session = ScriptedSession::with_document(PAGE)
            .with_download("https://curl.se/download/curl-8.10.1.tar.gz", dir.path().join("data.csv"));
        let factory = Arc::new(ScriptedFactory::new(session));

        let mut scraper = FileDownloadScraper::new(
            config(dir.path()).with_download_link_selector("a.dl"),
            "https://curl.se/download.html",
            factory,
        );
        let err = scraper.execute().await.unwrap_err();

        assert!(matches!(err, ScraperError::Timeout(msg) if msg.contains("download")));
    }

    #[tokio::test]
    async fn test_control_without_href_is_clicked() {
        let dir = tempfile::tempdir().unwrap();
        let session = ScriptedSession::with_document(
            r#"<html><body><section><form><div><img src="x.png"><div class="export">Excel</div></div></form></section></body></html>"#,
        );
        let factory = Arc::new(ScriptedFactory::new(session.clone()));

        let mut scraper = FileDownloadScraper::new(
            config(dir.path()).with_download_link_selector("section form div img ~ div"),
            "https://prices.example/ru/reference-prices",
            factory,
        );
        let err = scraper.execute().await.unwrap_err();

        // The scripted page never produces a file; the click itself must happen.
        assert!(err.is_timeout());
        assert_eq!(session.clicks(), vec!["section form div img ~ div".to_string()]);
        assert_eq!(session.navigations().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_link_times_out_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let session = ScriptedSession::with_document("<html><body>nothing here</body></html>");
        let factory = Arc::new(ScriptedFactory::new(session.clone()));

        let mut scraper =
            FileDownloadScraper::new(config(dir.path()), "https://curl.se/download.html", factory);
        let err = scraper.execute().await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(session.navigations().len(), 1);
        assert_eq!(session.close_count(), 1);
    }

    #[tokio::test]
    async fn test_download_that_never_lands_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let session = ScriptedSession::with_document(PAGE);
        let factory = Arc::new(ScriptedFactory::new(session.clone()));

        let mut scraper = FileDownloadScraper::new(
            config(dir.path()).with_download_link_selector("a.dl"),
            "https://curl.se/download.html",
            factory,
        );
        let err = scraper.execute().await.unwrap_err();

        assert!(matches!(err, ScraperError::Timeout(msg) if msg.contains("download")));
    }
}
