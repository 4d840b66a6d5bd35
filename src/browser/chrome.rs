//! Locating a Chrome/Chromium executable.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Windows
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    "/opt/google/chrome/google-chrome",
];

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Find Chrome: the configured path if it exists, then well-known locations, then `PATH`.
pub fn find_chrome(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        debug!("Configured Chrome path {} does not exist", path.display());
    }

    if let Some(path) = CHROME_PATHS.iter().map(Path::new).find(|p| p.exists()) {
        debug!("Found Chrome at {}", path.display());
        return Some(path.to_path_buf());
    }

    CHROME_COMMANDS.iter().find_map(|cmd| which::which(cmd).ok())
}

/// Browser support is compiled in and an executable can be found.
pub fn browser_available(configured: Option<&Path>) -> bool {
    cfg!(feature = "browser") && find_chrome(configured).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_configured_path_wins() {
        let dir = tempdir().unwrap();
        let fake = dir.path().join("chrome");
        std::fs::write(&fake, b"").unwrap();

        assert_eq!(find_chrome(Some(&fake)), Some(fake));
    }
}
