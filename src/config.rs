//! Configuration: defaults, an optional config file discovered with prefer,
//! then environment overrides. CLI flags are applied last by each command.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_PORTAL_URL: &str = "https://www.nfse.gov.br/EmissorNacional";
pub const DEFAULT_API_URL: &str = "https://api.nfse.tecnospeed.com.br/v1";
pub const DEFAULT_DATABASE_FILENAME: &str = "nfse.db";
pub const DEFAULT_DOWNLOAD_DIR: &str = "./downloads_nfse";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Vendor API settings.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub token: Option<String>,
    pub software_house_cnpj: Option<String>,
    pub recipient_cnpj: Option<String>,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
    pub default_period_days: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            token: None,
            software_house_cnpj: None,
            recipient_cnpj: None,
            poll_interval: Duration::from_secs(30),
            poll_max_attempts: 120,
            default_period_days: 30,
        }
    }
}

/// Effective runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory (database lives here by default).
    pub data_dir: PathBuf,
    /// Explicit database URL; overrides `data_dir/nfse.db`.
    pub database_url: Option<String>,
    /// Where `{key}.xml` / `{key}.pdf` files are written.
    pub download_dir: PathBuf,
    /// Portal application root.
    pub portal_url: String,
    pub lookback_days: u32,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub navigation_timeout: Duration,
    pub download_timeout: Duration,
    pub row_budget: Duration,
    pub credential_delay: Duration,
    pub row_delay: Duration,
    pub ui_download_fallback: bool,
    /// Directory scanned by `certs import`.
    pub certificate_dir: PathBuf,
    pub certificate_password: Option<String>,
    pub api: ApiSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .map(|dir| dir.join("nfse"))
            .unwrap_or_else(|| PathBuf::from("./nfse"));

        Self {
            data_dir,
            database_url: None,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            lookback_days: 10,
            headless: false,
            chrome_path: None,
            navigation_timeout: Duration::from_secs(60),
            download_timeout: Duration::from_secs(10),
            row_budget: Duration::from_secs(30),
            credential_delay: Duration::from_secs(5),
            row_delay: Duration::from_millis(500),
            ui_download_fallback: true,
            certificate_dir: PathBuf::from("./certificados"),
            certificate_password: None,
            api: ApiSettings::default(),
        }
    }
}

impl Settings {
    /// Database URL, explicit or derived from the data directory.
    pub fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!(
                "sqlite:{}",
                self.data_dir.join(DEFAULT_DATABASE_FILENAME).display()
            ),
        }
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })?;
        fs::create_dir_all(&self.download_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create download directory '{}': {}",
                    self.download_dir.display(),
                    e
                ),
            )
        })?;
        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(dir) = get("NFSE_DOWNLOAD_DIR") {
            self.download_dir = expand_path(&dir);
        }
        if let Some(url) = get("NFSE_PORTAL_URL") {
            self.portal_url = url.trim_end_matches('/').to_string();
        }
        if let Some(days) = get("NFSE_LOOKBACK_DAYS") {
            match days.trim().parse() {
                Ok(days) => self.lookback_days = days,
                Err(_) => warn!("Ignoring NFSE_LOOKBACK_DAYS={}: not a number", days),
            }
        }
        if let Some(headless) = get("NFSE_HEADLESS") {
            self.headless = parse_bool(&headless);
        }
        if let Some(path) = get("CHROME_PATH") {
            self.chrome_path = Some(expand_path(&path));
        }
        if let Some(password) = get("NFSE_CERT_PASSWORD") {
            self.certificate_password = Some(password);
        }
        if let Some(token) = get("TECNOSPEED_TOKEN") {
            self.api.token = Some(token);
        }
        if let Some(cnpj) = get("TECNOSPEED_CNPJ_SH") {
            self.api.software_house_cnpj = Some(cnpj);
        }
        if let Some(cnpj) = get("TECNOSPEED_CNPJ_TOMADOR") {
            self.api.recipient_cnpj = Some(cnpj);
        }

        self
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Vendor API section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub software_house_cnpj: Option<String>,
    pub recipient_cnpj: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub poll_max_attempts: Option<u32>,
    pub default_period_days: Option<u32>,
}

/// Config file contents. Every field is an optional override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<String>,
    pub database_url: Option<String>,
    pub download_dir: Option<String>,
    pub portal_url: Option<String>,
    pub lookback_days: Option<u32>,
    pub headless: Option<bool>,
    pub chrome_path: Option<String>,
    pub navigation_timeout_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
    pub row_budget_secs: Option<u64>,
    pub credential_delay_secs: Option<u64>,
    pub row_delay_ms: Option<u64>,
    pub ui_download_fallback: Option<bool>,
    pub certificate_dir: Option<String>,
    pub api: ApiConfig,

    /// Path the config was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover `nfse.{toml,yaml,json}` with prefer; defaults if none is found.
    pub async fn load() -> Self {
        match prefer::load("nfse").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("{}", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load a config file, choosing the parser by extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error(e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_error(e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_error(e.to_string()))?,
        };

        debug!("Loaded config from {}", path.display());
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory relative paths resolve against: the config file's, else the CWD.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Expand `~` and resolve relative paths against [`Config::base_dir`].
    pub fn resolve_path(&self, path_str: &str) -> PathBuf {
        let expanded = expand_path(path_str);
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir().join(expanded)
        }
    }

    /// Overlay file values onto settings.
    pub fn apply_to(&self, mut settings: Settings) -> Settings {
        if let Some(dir) = &self.data_dir {
            settings.data_dir = self.resolve_path(dir);
        }
        if let Some(url) = &self.database_url {
            settings.database_url = Some(url.clone());
        }
        if let Some(dir) = &self.download_dir {
            settings.download_dir = self.resolve_path(dir);
        }
        if let Some(url) = &self.portal_url {
            settings.portal_url = url.trim_end_matches('/').to_string();
        }
        if let Some(days) = self.lookback_days {
            settings.lookback_days = days;
        }
        if let Some(headless) = self.headless {
            settings.headless = headless;
        }
        if let Some(path) = &self.chrome_path {
            settings.chrome_path = Some(self.resolve_path(path));
        }
        if let Some(secs) = self.navigation_timeout_secs {
            settings.navigation_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.download_timeout_secs {
            settings.download_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.row_budget_secs {
            settings.row_budget = Duration::from_secs(secs);
        }
        if let Some(secs) = self.credential_delay_secs {
            settings.credential_delay = Duration::from_secs(secs);
        }
        if let Some(ms) = self.row_delay_ms {
            settings.row_delay = Duration::from_millis(ms);
        }
        if let Some(enabled) = self.ui_download_fallback {
            settings.ui_download_fallback = enabled;
        }
        if let Some(dir) = &self.certificate_dir {
            settings.certificate_dir = self.resolve_path(dir);
        }

        let api = &self.api;
        if let Some(url) = &api.base_url {
            settings.api.base_url = url.trim_end_matches('/').to_string();
        }
        if api.token.is_some() {
            settings.api.token = api.token.clone();
        }
        if api.software_house_cnpj.is_some() {
            settings.api.software_house_cnpj = api.software_house_cnpj.clone();
        }
        if api.recipient_cnpj.is_some() {
            settings.api.recipient_cnpj = api.recipient_cnpj.clone();
        }
        if let Some(secs) = api.poll_interval_secs {
            settings.api.poll_interval = Duration::from_secs(secs);
        }
        if let Some(attempts) = api.poll_max_attempts {
            settings.api.poll_max_attempts = attempts;
        }
        if let Some(days) = api.default_period_days {
            settings.api.default_period_days = days;
        }

        settings
    }
}

/// Options for loading settings.
#[derive(Debug, Default)]
pub struct LoadOptions {
    /// Explicit config file path (skips discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory override from the CLI.
    pub data_dir: Option<PathBuf>,
}

/// Load settings: defaults, then config file, then environment, then CLI overrides.
pub async fn load_settings(options: LoadOptions) -> Result<(Settings, Config), ConfigError> {
    let config = match &options.config_path {
        Some(path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let mut settings = config.apply_to(Settings::default()).with_env_overrides();
    if let Some(dir) = options.data_dir {
        settings.data_dir = dir;
    }

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.lookback_days, 10);
        assert_eq!(settings.row_budget, Duration::from_secs(30));
        assert_eq!(settings.credential_delay, Duration::from_secs(5));
        assert_eq!(settings.download_dir, PathBuf::from("./downloads_nfse"));
        assert!(settings.database_url().starts_with("sqlite:"));
        assert!(settings.database_url().ends_with("nfse.db"));
    }

    #[tokio::test]
    async fn test_toml_config_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nfse.toml");
        std::fs::write(
            &path,
            r#"
download_dir = "xml"
lookback_days = 3
headless = true

[api]
poll_interval_secs = 5
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let settings = config.apply_to(Settings::default());

        assert_eq!(settings.download_dir, dir.path().join("xml"));
        assert_eq!(settings.lookback_days, 3);
        assert!(settings.headless);
        assert_eq!(settings.api.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.api.poll_max_attempts, 120);
    }

    #[tokio::test]
    async fn test_yaml_and_json_configs() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("nfse.yaml");
        std::fs::write(&yaml, "portal_url: https://example.test/Emissor/\nrow_budget_secs: 45\n")
            .unwrap();
        let json = dir.path().join("nfse.json");
        std::fs::write(&json, r#"{"ui_download_fallback": false}"#).unwrap();

        let from_yaml = Config::load_from_path(&yaml).await.unwrap().apply_to(Settings::default());
        let from_json = Config::load_from_path(&json).await.unwrap().apply_to(Settings::default());

        assert_eq!(from_yaml.portal_url, "https://example.test/Emissor");
        assert_eq!(from_yaml.row_budget, Duration::from_secs(45));
        assert!(!from_json.ui_download_fallback);
    }

    #[tokio::test]
    async fn test_bad_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nfse.toml");
        std::fs::write(&path, "lookback_days = \"many\"").unwrap();

        let err = Config::load_from_path(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("NFSE_LOOKBACK_DAYS", "7"),
            ("NFSE_HEADLESS", "true"),
            ("DATABASE_URL", "sqlite:/tmp/other.db"),
            ("TECNOSPEED_TOKEN", "abc"),
            ("NFSE_PORTAL_URL", ""),
        ]);
        let settings = Settings::default()
            .with_overrides_from(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(settings.lookback_days, 7);
        assert!(settings.headless);
        assert_eq!(settings.database_url(), "sqlite:/tmp/other.db");
        assert_eq!(settings.api.token.as_deref(), Some("abc"));
        assert_eq!(settings.portal_url, DEFAULT_PORTAL_URL);
    }
}
