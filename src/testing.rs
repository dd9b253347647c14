//! In-memory browser session for unit tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::traits::{BrowserSession, SessionFactory};
use crate::wait::ElementState;

const LOADING_BODY: &str =
    r#"<tr class="ant-table-placeholder"><td colspan="6"><div class="ant-spin">Loading</div></td></tr>"#;
const EMPTY_BODY: &str =
    r#"<tr class="ant-table-placeholder"><td colspan="6"><div class="ant-empty">No data</div></td></tr>"#;

#[derive(Default)]
struct State {
    /// Table body rows per page number.
    pages: Vec<Vec<String>>,
    /// Document served for URLs without a `page` query parameter.
    static_document: Option<String>,
    /// Snapshots answered with the placeholder row after each navigation.
    loading_probes: usize,
    loading_remaining: usize,
    current_page: Option<usize>,
    hidden: HashSet<String>,
    broken_probe: bool,
    fail_navigation_to_page: Option<usize>,
    download: Option<(String, PathBuf)>,
    navigations: Vec<String>,
    clicks: Vec<String>,
    screenshots: Vec<PathBuf>,
    probes: usize,
    closes: usize,
    opened: usize,
}

/// Serves canned Ant Design table markup per `page` query parameter.
#[derive(Clone, Default)]
pub(crate) struct ScriptedSession {
    state: Arc<Mutex<State>>,
}

impl ScriptedSession {
    pub fn with_pages(pages: Vec<Vec<String>>) -> Self {
        let session = Self::default();
        session.lock().pages = pages;
        session
    }

    pub fn with_document(html: impl Into<String>) -> Self {
        let session = Self::default();
        session.lock().static_document = Some(html.into());
        session
    }

    /// Markup of one data row with the six table columns.
    pub fn row(id: &str, drug_name: &str) -> String {
        Self::row_with_price(id, drug_name, r#"<span>1 250.00</span><span>UZS</span>"#)
    }

    pub fn row_with_price(id: &str, drug_name: &str, price_cell: &str) -> String {
        format!(
            r#"<tr class="ant-table-row"><td>{id}</td><td>{drug_name}</td><td>Producer {id}</td><td>MNN {id}</td><td>REG-{id}</td><td>{price_cell}</td></tr>"#
        )
    }

    pub fn pages_of(count: usize, rows_per_page: usize) -> Vec<Vec<String>> {
        (0..count)
            .map(|p| {
                (0..rows_per_page)
                    .map(|r| Self::row(&format!("{}", p * rows_per_page + r + 1), "Drug"))
                    .collect()
            })
            .collect()
    }

    pub fn with_loading_probes(self, probes: usize) -> Self {
        self.lock().loading_probes = probes;
        self
    }

    pub fn with_hidden(self, selector: &str) -> Self {
        self.lock().hidden.insert(selector.to_string());
        self
    }

    pub fn with_broken_probe(self) -> Self {
        self.lock().broken_probe = true;
        self
    }

    pub fn with_failing_navigation(self, page: usize) -> Self {
        self.lock().fail_navigation_to_page = Some(page);
        self
    }

    /// Navigating to `url` drops a file at `target`, like a browser download.
    pub fn with_download(self, url: &str, target: impl Into<PathBuf>) -> Self {
        self.lock().download = Some((url.to_string(), target.into()));
        self
    }

    pub fn navigate_to_page(&self, page: usize) {
        let mut state = self.lock();
        state.current_page = Some(page);
        state.loading_remaining = state.loading_probes;
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.lock().screenshots.clone()
    }

    pub fn probe_count(&self) -> usize {
        self.lock().probes
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    pub fn opened_count(&self) -> usize {
        self.lock().opened
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn document(state: &State) -> String {
        if let Some(page) = state.current_page {
            let body = if state.loading_remaining > 0 {
                LOADING_BODY.to_string()
            } else {
                match state.pages.get(page) {
                    Some(rows) if !rows.is_empty() => rows.concat(),
                    _ => EMPTY_BODY.to_string(),
                }
            };
            return format!(
                r#"<html><body><table><tbody class="ant-table-tbody">{}</tbody></table></body></html>"#,
                body
            );
        }
        state
            .static_document
            .clone()
            .unwrap_or_else(|| "<html><body></body></html>".to_string())
    }

    fn with_first_match<T>(
        &self,
        selector: &str,
        f: impl FnOnce(scraper::ElementRef<'_>) -> T,
    ) -> Result<Option<T>, ScraperError> {
        let parsed = parse_selector(selector)?;
        let html = Html::parse_document(&Self::document(&self.lock()));
        let found = html.select(&parsed).next().map(f);
        Ok(found)
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ScraperError> {
    Selector::parse(selector)
        .map_err(|e| ScraperError::Session(format!("invalid selector {}: {:?}", selector, e)))
}

fn page_param(url: &str) -> Option<usize> {
    let query = url.split_once('?')?.1;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("page="))
        .and_then(|v| v.parse().ok())
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&self, url: &str) -> Result<(), ScraperError> {
        let mut state = self.lock();
        state.navigations.push(url.to_string());
        let page = page_param(url);
        if page.is_some() && page == state.fail_navigation_to_page {
            return Err(ScraperError::Session("remote browser went away".into()));
        }
        if let Some((download_url, target)) = &state.download {
            if download_url == url {
                std::fs::write(target, b"payload")?;
                return Ok(());
            }
        }
        state.current_page = page;
        state.loading_remaining = state.loading_probes;
        Ok(())
    }

    async fn probe_all(&self, selectors: &[&str]) -> Result<Vec<ElementState>, ScraperError> {
        let (document, hidden) = {
            let mut state = self.lock();
            if state.broken_probe {
                return Err(ScraperError::Session("connection reset".into()));
            }
            state.probes += 1;
            let document = Self::document(&state);
            state.loading_remaining = state.loading_remaining.saturating_sub(1);
            (document, state.hidden.clone())
        };

        let html = Html::parse_document(&document);
        selectors
            .iter()
            .map(|selector| {
                let present = html.select(&parse_selector(selector)?).next().is_some();
                Ok(ElementState {
                    present,
                    visible: present && !hidden.contains(*selector),
                    enabled: present,
                })
            })
            .collect()
    }

    async fn text(&self, selector: &str) -> Result<Option<String>, ScraperError> {
        self.with_first_match(selector, |el| el.text().collect::<String>())
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>, ScraperError> {
        Ok(self
            .with_first_match(selector, |el| el.value().attr(name).map(str::to_string))?
            .flatten())
    }

    async fn click(&self, selector: &str) -> Result<(), ScraperError> {
        if self.with_first_match(selector, |_| ())?.is_none() {
            return Err(ScraperError::ElementNotFound(selector.to_string()));
        }
        self.lock().clicks.push(selector.to_string());
        Ok(())
    }

    async fn snapshot_markup(&self, selector: &str) -> Result<Option<String>, ScraperError> {
        self.with_first_match(selector, |el| el.inner_html())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), ScraperError> {
        std::fs::write(path, b"\x89PNG")?;
        self.lock().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&self) -> Result<(), ScraperError> {
        self.lock().closes += 1;
        Ok(())
    }
}

/// Hands out clones of one [`ScriptedSession`] so tests can inspect it.
#[derive(Clone)]
pub(crate) struct ScriptedFactory {
    session: ScriptedSession,
    refuse: bool,
}

impl ScriptedFactory {
    pub fn new(session: ScriptedSession) -> Self {
        Self {
            session,
            refuse: false,
        }
    }

    /// Every `open` fails as if the browser endpoint were unreachable.
    pub fn unreachable() -> Self {
        Self {
            session: ScriptedSession::default(),
            refuse: true,
        }
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn open(&self, _config: &ScraperConfig) -> Result<Box<dyn BrowserSession>, ScraperError> {
        if self.refuse {
            return Err(ScraperError::BrowserInit("endpoint unreachable".into()));
        }
        self.session.lock().opened += 1;
        Ok(Box::new(self.session.clone()))
    }
}
