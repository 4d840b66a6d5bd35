//! Optional runtime capabilities, detected once at startup.

use std::fmt;

use crate::config::Settings;

/// What this process can do. Passed to the harvester and commands at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Browser support is compiled in and a Chrome executable was found.
    pub browser: bool,
    /// UI-driven download capture may be used when a direct fetch fails.
    pub ui_download_fallback: bool,
    /// The document database opened and its schema is in place.
    pub document_store: bool,
    /// A native certificate store is available on this platform.
    pub certificate_store: bool,
}

impl Capabilities {
    pub fn detect(settings: &Settings, document_store: bool) -> Self {
        let browser = crate::browser::browser_available(settings.chrome_path.as_deref());
        Self {
            browser,
            ui_download_fallback: browser && settings.ui_download_fallback,
            document_store,
            certificate_store: crate::certificates::native_store_available(),
        }
    }

    /// Everything on; for tests and fakes.
    pub fn all() -> Self {
        Self {
            browser: true,
            ui_download_fallback: true,
            document_store: true,
            certificate_store: true,
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |on: bool| if on { "yes" } else { "no" };
        write!(
            f,
            "browser={} ui-fallback={} document-store={} certificate-store={}",
            flag(self.browser),
            flag(self.ui_download_fallback),
            flag(self.document_store),
            flag(self.certificate_store)
        )
    }
}
