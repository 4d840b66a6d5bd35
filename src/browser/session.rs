//! Chromium-driven portal session.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::GetCookiesParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::chrome::find_chrome;
use super::scripts;
use super::BrowserSettings;
use crate::models::{Credential, DocumentKey, FileType};
use crate::portal::login::LOGIN_PATH;
use crate::portal::{
    assess_login, DateRange, LoginAssessment, NextControl, PortalSession, SessionCookie,
    SessionError, SessionFactory,
};

const LISTING_PATH: &str = "/Notas/Recebidas";
const LOGIN_SUBMIT: &str = r#"button[type="submit"].btn.btn-lg.btn-primary"#;
const ANY_SUBMIT: &str = r#"button[type="submit"], input[type="submit"]"#;
const POST_LOGIN_WAIT: Duration = Duration::from_secs(5);
const PAGINATION_SETTLE: Duration = Duration::from_secs(30);
const PAGINATION_PAUSE: Duration = Duration::from_secs(3);
const DOWNLOAD_POLL: Duration = Duration::from_millis(250);

impl From<CdpError> for SessionError {
    fn from(e: CdpError) -> Self {
        SessionError::Browser(e.to_string())
    }
}

/// One browser process with one page, positioned on the portal.
pub struct BrowserPortal {
    settings: BrowserSettings,
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    downloads: TempDir,
}

impl BrowserPortal {
    pub async fn launch(settings: BrowserSettings) -> Result<Self, SessionError> {
        let chrome = find_chrome(settings.chrome_path.as_deref()).ok_or_else(|| {
            SessionError::Launch(
                "Chrome/Chromium not found. Install it or set CHROME_PATH".to_string(),
            )
        })?;
        let downloads = TempDir::new()
            .map_err(|e| SessionError::Launch(format!("download directory: {}", e)))?;

        info!("Launching browser (headless={})", settings.headless);

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome)
            .window_size(1920, 1080);
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder
            .arg("--ignore-certificate-errors")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .build()
            .map_err(SessionError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let download_behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(downloads.path().to_string_lossy().to_string())
            .build()
            .map_err(SessionError::Launch)?;
        browser.execute(download_behavior).await?;

        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            settings,
            browser: Some(browser),
            page: Some(page),
            handler: Some(handler),
            downloads,
        })
    }

    fn page(&self) -> Result<Page, SessionError> {
        self.page
            .clone()
            .ok_or_else(|| SessionError::Browser("session already closed".to_string()))
    }

    fn portal_url(&self, path: &str) -> String {
        format!("{}{}", self.settings.portal_url.trim_end_matches('/'), path)
    }

    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        info!("Navigating to {}", url);
        let page = self.page()?;
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| SessionError::Navigation(format!("invalid URL {}: {}", url, e)))?;

        tokio::time::timeout(self.settings.navigation_timeout, page.execute(params))
            .await
            .map_err(|_| {
                SessionError::Navigation(format!(
                    "timed out after {:?} for {}",
                    self.settings.navigation_timeout, url
                ))
            })?
            .map_err(|e| SessionError::Navigation(format!("{}: {}", url, e)))?;

        self.wait_for_ready().await;
        Ok(())
    }

    async fn wait_for_ready(&self) {
        let Ok(page) = self.page() else { return };
        match tokio::time::timeout(
            self.settings.navigation_timeout,
            page.evaluate(scripts::WAIT_FOR_READY.to_string()),
        )
        .await
        {
            Ok(Ok(result)) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => debug!("Could not check ready state: {}", e),
            Err(_) => warn!("Timeout waiting for page ready state"),
        }
    }

    /// Wait for a navigation triggered by a click, bounded by `limit`.
    async fn wait_for_navigation(&self, limit: Duration) {
        let Ok(page) = self.page() else { return };
        if tokio::time::timeout(limit, page.wait_for_navigation())
            .await
            .is_err()
        {
            debug!("No navigation finished within {:?}", limit);
        }
        self.wait_for_ready().await;
    }

    async fn wait_for_selector(&self, selector: &str) -> Result<(), SessionError> {
        let page = self.page()?;
        let deadline = Instant::now() + self.settings.navigation_timeout;
        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SessionError::ElementMissing(selector.to_string()));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn evaluate_bool(&self, script: String) -> Result<bool, SessionError> {
        let page = self.page()?;
        page.evaluate(script)
            .await?
            .into_value::<bool>()
            .map_err(|e| SessionError::Browser(format!("unexpected script result: {}", e)))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), SessionError> {
        let page = self.page()?;
        let field = page
            .find_element(selector)
            .await
            .map_err(|_| SessionError::ElementMissing(selector.to_string()))?;
        field.click().await?.type_str(value).await?;
        Ok(())
    }

    async fn download_names(&self) -> HashSet<PathBuf> {
        let mut names = HashSet::new();
        if let Ok(mut entries) = tokio::fs::read_dir(self.downloads.path()).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                names.insert(entry.path());
            }
        }
        names
    }

    async fn finished_download(&self, seen: &HashSet<PathBuf>) -> Option<PathBuf> {
        let mut entries = tokio::fs::read_dir(self.downloads.path()).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let partial = path
                .extension()
                .is_some_and(|ext| ext == "crdownload" || ext == "tmp");
            if seen.contains(&path) || partial {
                continue;
            }
            if entry.metadata().await.is_ok_and(|m| m.len() > 0) {
                return Some(path);
            }
        }
        None
    }
}

#[async_trait]
impl PortalSession for BrowserPortal {
    async fn login(&mut self, credential: &Credential) -> Result<LoginAssessment, SessionError> {
        self.navigate(&self.portal_url(LOGIN_PATH)).await?;
        self.wait_for_selector("#Inscricao").await?;

        let page = self.page()?;
        page.evaluate(scripts::CLEAR_LOGIN_FIELDS.to_string()).await?;
        self.fill("#Inscricao", &credential.login).await?;
        self.fill("#Senha", &credential.password).await?;

        let submit = match page.find_element(LOGIN_SUBMIT).await {
            Ok(button) => button,
            Err(_) => page
                .find_element(ANY_SUBMIT)
                .await
                .map_err(|_| SessionError::ElementMissing("login submit button".to_string()))?,
        };
        submit.click().await?;

        tokio::time::sleep(POST_LOGIN_WAIT).await;
        self.wait_for_navigation(self.settings.navigation_timeout).await;

        let html = page.content().await?;
        let url = self.current_url().await?;
        Ok(assess_login(&html, &url))
    }

    async fn open_listing(&mut self) -> Result<(), SessionError> {
        self.navigate(&self.portal_url(LISTING_PATH)).await
    }

    async fn apply_date_filter(&mut self, range: &DateRange) -> Result<bool, SessionError> {
        let (start, end) = range.portal_format();
        let applied = self.evaluate_bool(scripts::date_filter(&start, &end)).await?;
        if applied {
            self.wait_for_navigation(self.settings.navigation_timeout)
                .await;
        }
        Ok(applied)
    }

    async fn listing_html(&mut self) -> Result<String, SessionError> {
        Ok(self.page()?.content().await?)
    }

    async fn current_url(&mut self) -> Result<String, SessionError> {
        Ok(self.page()?.url().await?.unwrap_or_default())
    }

    async fn cookies(&mut self) -> Result<Vec<SessionCookie>, SessionError> {
        let page = self.page()?;
        let url = self.current_url().await?;
        let params = GetCookiesParams::builder().urls(vec![url]).build();
        let response = page.execute(params).await?;

        Ok(response
            .result
            .cookies
            .iter()
            .map(|c| SessionCookie {
                name: c.name.clone(),
                value: c.value.clone(),
                domain: c.domain.clone(),
                path: c.path.clone(),
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect())
    }

    async fn follow_next(&mut self, control: &NextControl) -> Result<bool, SessionError> {
        let clicked = self
            .evaluate_bool(scripts::click_anchor(
                control.anchor_index,
                control.href.as_deref(),
            ))
            .await?;
        if !clicked {
            return Ok(false);
        }

        debug!("Followed next control ({})", control.rule);
        self.wait_for_navigation(PAGINATION_SETTLE).await;
        tokio::time::sleep(PAGINATION_PAUSE).await;
        Ok(true)
    }

    async fn capture_download(
        &mut self,
        key: &DocumentKey,
        file_type: FileType,
    ) -> Result<Option<Vec<u8>>, SessionError> {
        let seen = self.download_names().await;
        if !self
            .evaluate_bool(scripts::click_download(key, file_type))
            .await?
        {
            debug!("No download control for {} {}", key, file_type);
            return Ok(None);
        }

        let deadline = Instant::now() + self.settings.download_timeout;
        while Instant::now() < deadline {
            if let Some(path) = self.finished_download(&seen).await {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| SessionError::Browser(format!("reading download: {}", e)))?;
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    debug!("Could not remove {}: {}", path.display(), e);
                }
                return Ok(Some(bytes));
            }
            tokio::time::sleep(DOWNLOAD_POLL).await;
        }

        Ok(None)
    }

    async fn close(&mut self) {
        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close: {}", e);
            }
            let _ = browser.wait().await;
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

/// Launches a fresh browser per credential.
pub struct BrowserSessionFactory {
    settings: BrowserSettings,
}

impl BrowserSessionFactory {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SessionFactory for BrowserSessionFactory {
    async fn open(&self) -> Result<Box<dyn PortalSession>, SessionError> {
        let portal = BrowserPortal::launch(self.settings.clone()).await?;
        Ok(Box::new(portal))
    }
}
