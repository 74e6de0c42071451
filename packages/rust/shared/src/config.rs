//! Application configuration for storygraph.
//!
//! User config lives at `<config dir>/storygraph/storygraph.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, StoryGraphError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "storygraph.toml";

/// Config directory name under the platform config dir.
const CONFIG_DIR_NAME: &str = "storygraph";

/// Site the session talks to.
pub const DEFAULT_BASE_URL: &str = "https://app.thestorygraph.com";

// ---------------------------------------------------------------------------
// Config structs (matching storygraph.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote site settings.
    #[serde(default)]
    pub site: SiteConfig,

    /// Where login credentials and the session cookie are kept.
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Origin every request path is resolved against.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Redirects followed before giving up (form posts redirect once or twice).
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_redirects() -> usize {
    10
}

/// `[credentials]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Path of the JSON credentials file. A leading `~` is the home directory.
    #[serde(default = "default_credentials_path")]
    pub path: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
        }
    }
}

fn default_credentials_path() -> String {
    "~/.storygraph".into()
}

// ---------------------------------------------------------------------------
// Session config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime session configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Origin of the site.
    pub base_url: Url,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Redirect limit.
    pub max_redirects: usize,
    /// Resolved credentials file path.
    pub credentials_path: PathBuf,
}

impl SessionConfig {
    /// Resolve an [`AppConfig`] into runtime settings.
    ///
    /// `base_url` must be a bare origin: site paths are absolute, so a path
    /// prefix would be dropped when joining.
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        let base_url = Url::parse(&config.site.base_url).map_err(|e| {
            StoryGraphError::config(format!("invalid base_url '{}': {e}", config.site.base_url))
        })?;
        if base_url.path() != "/" {
            return Err(StoryGraphError::config(format!(
                "base_url '{}' must not have a path",
                config.site.base_url
            )));
        }

        Ok(Self {
            base_url,
            timeout_secs: config.site.timeout_secs,
            max_redirects: config.site.max_redirects,
            credentials_path: expand_home(&config.credentials.path)?,
        })
    }

    /// Settings pointing at an arbitrary origin (mock servers, mirrors).
    pub fn for_base_url(base_url: Url) -> Self {
        Self {
            base_url,
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
            credentials_path: PathBuf::from(".storygraph"),
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| StoryGraphError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None if path == "~" => dirs::home_dir()
            .ok_or_else(|| StoryGraphError::config("could not determine home directory")),
        None => Ok(PathBuf::from(path)),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`<config dir>/storygraph/`).
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| StoryGraphError::config("could not determine config directory"))?;
    Ok(base.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file.
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
    let content = std::fs::read_to_string(path).map_err(|e| StoryGraphError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| StoryGraphError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| StoryGraphError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| StoryGraphError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| StoryGraphError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
