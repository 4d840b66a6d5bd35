//! Browser automation for the portal.
//!
//! Uses chromiumoxide (CDP) when built with the `browser` feature. Without
//! it, [`BrowserSessionFactory`] reports the missing support at open time.

mod chrome;
mod scripts;
#[cfg(feature = "browser")]
mod session;

use std::path::PathBuf;
use std::time::Duration;

pub use chrome::{browser_available, find_chrome};
#[cfg(feature = "browser")]
pub use session::{BrowserPortal, BrowserSessionFactory};

use crate::config::Settings;

/// What a browser session needs from the settings.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub portal_url: String,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub navigation_timeout: Duration,
    pub download_timeout: Duration,
}

impl From<&Settings> for BrowserSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            portal_url: settings.portal_url.clone(),
            chrome_path: settings.chrome_path.clone(),
            headless: settings.headless,
            navigation_timeout: settings.navigation_timeout,
            download_timeout: settings.download_timeout,
        }
    }
}

#[cfg(not(feature = "browser"))]
mod stub {
    use async_trait::async_trait;

    use super::BrowserSettings;
    use crate::portal::{PortalSession, SessionError, SessionFactory};

    pub struct BrowserSessionFactory {
        _settings: BrowserSettings,
    }

    impl BrowserSessionFactory {
        pub fn new(settings: BrowserSettings) -> Self {
            Self {
                _settings: settings,
            }
        }
    }

    #[async_trait]
    impl SessionFactory for BrowserSessionFactory {
        async fn open(&self) -> Result<Box<dyn PortalSession>, SessionError> {
            Err(SessionError::Unsupported(
                "Browser support not compiled. Rebuild with: cargo build --features browser"
                    .to_string(),
            ))
        }
    }
}

#[cfg(not(feature = "browser"))]
pub use stub::BrowserSessionFactory;
