//! Application configuration for siren-enrich.
//!
//! User config lives at `~/.siren-enrich/siren-enrich.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{EnrichError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "siren-enrich.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".siren-enrich";

/// Registry page prefix; the identifier is appended to it.
pub const DEFAULT_BASE_URL: &str = "https://www.pappers.fr/entreprise/";

/// Browser user agent. The registry serves a degraded page to unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Language preference sent with every request.
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7";

// ---------------------------------------------------------------------------
// Config structs (matching siren-enrich.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// HTTP fetch settings.
    #[serde(default)]
    pub fetch: FetchSection,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Number of parallel workers.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Pause after every request, per worker, in milliseconds.
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            pace_ms: default_pace_ms(),
        }
    }
}

fn default_workers() -> u32 {
    1
}
fn default_pace_ms() -> u64 {
    500
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// URL prefix of company pages.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// `User-Agent` header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// `Accept-Language` header value.
    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}
fn default_accept_language() -> String {
    DEFAULT_ACCEPT_LANGUAGE.into()
}
fn default_timeout_secs() -> u64 {
    15
}

// ---------------------------------------------------------------------------
// Fetch config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// URL prefix of company pages, always ending in `/`.
    pub base_url: Url,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// `Accept-Language` header value.
    pub accept_language: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Sleep applied by a worker after every attempt.
    pub pace: Duration,
}

impl FetchConfig {
    /// Replace the base URL, normalising the trailing slash.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = parse_base_url(base_url)?;
        Ok(self)
    }

    /// Replace the pacing delay.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }
}

impl TryFrom<&AppConfig> for FetchConfig {
    type Error = EnrichError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            base_url: parse_base_url(&config.fetch.base_url)?,
            user_agent: config.fetch.user_agent.clone(),
            accept_language: config.fetch.accept_language.clone(),
            timeout: Duration::from_secs(config.fetch.timeout_secs),
            pace: Duration::from_millis(config.defaults.pace_ms),
        })
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            user_agent: DEFAULT_USER_AGENT.into(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.into(),
            timeout: Duration::from_secs(default_timeout_secs()),
            pace: Duration::from_millis(default_pace_ms()),
        }
    }
}

/// Parse a base URL so that `join(siren)` appends instead of replacing the last segment.
fn parse_base_url(raw: &str) -> Result<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|e| EnrichError::config(format!("invalid base URL '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(EnrichError::config(format!(
            "unsupported base URL scheme '{other}': expected http or https"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.siren-enrich/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EnrichError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.siren-enrich/siren-enrich.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EnrichError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| EnrichError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EnrichError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EnrichError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EnrichError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
