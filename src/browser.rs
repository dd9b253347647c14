//! DevTools-protocol backed browser sessions.

use std::path::Path;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    BrowserContextId, SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::traits::{BrowserSession, SessionFactory};
use crate::wait::ElementState;

/// Presence, visibility and enabled state of the first match for each
/// selector. One synchronous script run, so every entry describes the same
/// DOM.
const PROBE_SCRIPT: &str = r#"
(function(selectors) {
    return selectors.map(function(selector) {
        var el = document.querySelector(selector);
        if (!el) {
            return { present: false, visible: false, enabled: false };
        }
        var style = window.getComputedStyle(el);
        var rect = el.getBoundingClientRect();
        var visible = style.display !== 'none' &&
            style.visibility !== 'hidden' &&
            style.opacity !== '0' &&
            (rect.width > 0 || rect.height > 0);
        var enabled = !el.disabled && el.getAttribute('aria-disabled') !== 'true';
        return { present: true, visible: visible, enabled: enabled };
    });
})"#;

/// One page in a remote or locally launched Chrome.
///
/// On a remote endpoint the page lives in its own browser context, and
/// closing the session disposes only that context. A locally launched
/// browser belongs to the session and is shut down with it.
pub struct CdpSession {
    browser: Mutex<Option<Browser>>,
    page: Page,
    context: Option<BrowserContextId>,
    handler: JoinHandle<()>,
}

impl CdpSession {
    async fn first(&self, selector: &str) -> Result<Option<Element>, ScraperError> {
        let mut elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| ScraperError::Session(format!("query {}: {}", selector, e)))?;
        if elements.is_empty() {
            return Ok(None);
        }
        Ok(Some(elements.swap_remove(0)))
    }
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn navigate(&self, url: &str) -> Result<(), ScraperError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ScraperError::Navigation(format!("{}: {}", url, e)))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| ScraperError::Navigation(format!("{}: {}", url, e)))?;
        Ok(())
    }

    async fn probe_all(&self, selectors: &[&str]) -> Result<Vec<ElementState>, ScraperError> {
        let literal = serde_json::to_string(selectors)
            .map_err(|e| ScraperError::Session(format!("selector encoding: {}", e)))?;
        let script = format!("{}({})", PROBE_SCRIPT, literal);

        self.page
            .evaluate(script.as_str())
            .await
            .map_err(|e| ScraperError::Session(format!("probe {:?}: {}", selectors, e)))?
            .into_value::<Vec<ElementState>>()
            .map_err(|e| ScraperError::Session(format!("probe {:?} result: {}", selectors, e)))
    }

    async fn text(&self, selector: &str) -> Result<Option<String>, ScraperError> {
        match self.first(selector).await? {
            Some(el) => el
                .inner_text()
                .await
                .map_err(|e| ScraperError::Session(format!("text of {}: {}", selector, e))),
            None => Ok(None),
        }
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>, ScraperError> {
        match self.first(selector).await? {
            Some(el) => el.attribute(name).await.map_err(|e| {
                ScraperError::Session(format!("attribute {} of {}: {}", name, selector, e))
            }),
            None => Ok(None),
        }
    }

    async fn click(&self, selector: &str) -> Result<(), ScraperError> {
        let el = self
            .first(selector)
            .await?
            .ok_or_else(|| ScraperError::ElementNotFound(selector.to_string()))?;
        el.click()
            .await
            .map_err(|e| ScraperError::Session(format!("click {}: {}", selector, e)))?;
        Ok(())
    }

    async fn snapshot_markup(&self, selector: &str) -> Result<Option<String>, ScraperError> {
        match self.first(selector).await? {
            Some(el) => el
                .inner_html()
                .await
                .map_err(|e| ScraperError::Session(format!("markup of {}: {}", selector, e))),
            None => Ok(None),
        }
    }

    async fn screenshot(&self, path: &Path) -> Result<(), ScraperError> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(|e| ScraperError::Session(format!("screenshot {:?}: {}", path, e)))?;
        debug!("Saved screenshot {:?}", path);
        Ok(())
    }

    async fn close(&self) -> Result<(), ScraperError> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };

        let closed = match &self.context {
            Some(context) => {
                info!("Closing browser context {:?}...", context);
                let page_closed = self.page.clone().close().await;
                let disposed = browser.dispose_browser_context(context.clone()).await;
                page_closed
                    .and(disposed)
                    .map_err(|e| ScraperError::Session(format!("close context: {}", e)))
            }
            None => {
                info!("Closing browser...");
                let closed = browser
                    .close()
                    .await
                    .map(|_| ())
                    .map_err(|e| ScraperError::Session(format!("close: {}", e)));
                if let Err(e) = browser.wait().await {
                    debug!("Browser process wait failed: {}", e);
                }
                closed
            }
        };
        self.handler.abort();

        info!("Browser session closed");
        closed
    }
}

/// Opens [`CdpSession`]s: connects to `browser_endpoint` when configured,
/// otherwise launches Chrome from `CHROME_PATH`/`CHROMIUM_PATH`.
#[derive(Debug, Clone, Default)]
pub struct CdpConnector;

impl CdpConnector {
    pub fn new() -> Self {
        Self
    }

    fn launch_config(config: &ScraperConfig) -> Result<BrowserConfig, ScraperError> {
        // Unique profile directory so concurrent tasks never share one.
        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("price-scraper-{}", unique_id));

        let (width, height) = config.window_size;
        let mut builder = BrowserConfig::builder()
            .user_data_dir(&user_data_dir)
            .window_size(width, height)
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");

        if let Ok(path) = std::env::var("CHROME_PATH").or_else(|_| std::env::var("CHROMIUM_PATH")) {
            builder = builder.chrome_executable(path);
        }
        if !config.headless {
            builder = builder.with_head();
        }

        builder
            .build()
            .map_err(|e| ScraperError::BrowserInit(format!("browser config: {}", e)))
    }
}

#[async_trait]
impl SessionFactory for CdpConnector {
    async fn open(&self, config: &ScraperConfig) -> Result<Box<dyn BrowserSession>, ScraperError> {
        let (browser, mut handler) = match &config.browser_endpoint {
            Some(endpoint) => {
                info!("Connecting to remote browser at {}", endpoint);
                Browser::connect(endpoint.as_str())
                    .await
                    .map_err(|e| ScraperError::BrowserInit(format!("{}: {}", endpoint, e)))?
            }
            None => {
                info!("Launching local browser...");
                Browser::launch(Self::launch_config(config)?)
                    .await
                    .map_err(|e| ScraperError::BrowserInit(e.to_string()))?
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        // Tasks sharing a remote browser each get their own context.
        let context = match config.browser_endpoint {
            Some(_) => match browser.create_browser_context(CreateBrowserContextParams::default()).await {
                Ok(id) => {
                    debug!("Created browser context {:?}", id);
                    Some(id)
                }
                Err(e) => {
                    handler_task.abort();
                    return Err(ScraperError::BrowserInit(format!("browser context: {}", e)));
                }
            },
            None => None,
        };

        match Self::prepare(&browser, context.as_ref(), config).await {
            Ok(page) => {
                info!("Browser session ready");
                Ok(Box::new(CdpSession {
                    browser: Mutex::new(Some(browser)),
                    page,
                    context,
                    handler: handler_task,
                }))
            }
            Err(e) => {
                if let Some(id) = context {
                    if let Err(dispose_err) = browser.dispose_browser_context(id).await {
                        warn!("Failed to dispose browser context: {}", dispose_err);
                    }
                }
                handler_task.abort();
                Err(e)
            }
        }
    }
}

impl CdpConnector {
    /// Opens the task's page in `context` (the default context when `None`)
    /// and points downloads at the output directory.
    async fn prepare(
        browser: &Browser,
        context: Option<&BrowserContextId>,
        config: &ScraperConfig,
    ) -> Result<Page, ScraperError> {
        let mut target = CreateTargetParams::new("about:blank");
        target.browser_context_id = context.cloned();
        let page = browser
            .new_page(target)
            .await
            .map_err(|e| ScraperError::BrowserInit(format!("new page: {}", e)))?;

        let download_path = config
            .output_dir
            .canonicalize()
            .unwrap_or_else(|_| config.output_dir.clone());
        let mut download_params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_path.to_string_lossy().to_string())
            .events_enabled(true);
        if let Some(id) = context {
            download_params = download_params.browser_context_id(id.clone());
        }
        let download_params = download_params
            .build()
            .map_err(|e| ScraperError::BrowserInit(format!("download behavior: {}", e)))?;
        browser
            .execute(download_params)
            .await
            .map_err(|e| ScraperError::BrowserInit(format!("download behavior: {}", e)))?;

        Ok(page)
    }
}
