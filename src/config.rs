//! Configuration for skyras agents.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SKYRAS_HOME, SKYRAS_NAMESPACE, SKYRAS_AGENT,
//!    SKYSKY_ROOT, N8N_URL, N8N_API_KEY, NOTION_API_KEY, NOTION_DATABASE_ID)
//! 2. Config file (.skyras/config.yaml)
//! 3. Defaults (~/.skyras)
//!
//! Config file discovery:
//! - Searches current directory and parents for .skyras/config.yaml
//! - Relative paths in the config file resolve against the project root
//!   (the directory containing .skyras/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::ChannelMap;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub version: Option<String>,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusConfig {
    pub agent_name: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub channels: Option<ChannelMap>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayoutConfig {
    /// Root folder for episode layouts
    pub root: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifierConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerConfig {
    pub api_key: Option<String>,
    pub database_id: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to skyras home
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Key namespace in the shared store
    pub namespace: String,
    /// Agent name stamped on published events
    pub agent_name: String,
    pub poll_interval: Duration,
    pub channels: ChannelMap,
    /// Root folder for episode layouts
    pub episodes_root: PathBuf,
    pub notifier: NotifierSettings,
    pub tracker: TrackerSettings,
}

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:5678".to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackerSettings {
    pub api_key: Option<String>,
    pub database_id: Option<String>,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".skyras").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Merge defaults, config file and environment into a resolved config.
///
/// `env` looks up environment variables; empty values count as unset.
fn resolve(
    default_home: PathBuf,
    config_path: Option<PathBuf>,
    file: ConfigFile,
    env: &dyn Fn(&str) -> Option<String>,
) -> ResolvedConfig {
    let env = |name: &str| env(name).filter(|v| !v.is_empty());

    // project root is the parent of .skyras/
    let base_dir = config_path
        .as_deref()
        .and_then(|p| p.parent())
        .and_then(|p| p.parent())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let home = env("SKYRAS_HOME")
        .map(PathBuf::from)
        .or_else(|| file.home.as_deref().map(|h| resolve_path(&base_dir, h)))
        .unwrap_or(default_home);

    let episodes_root = env("SKYSKY_ROOT")
        .map(PathBuf::from)
        .or_else(|| file.layout.root.as_deref().map(|r| resolve_path(&base_dir, r)))
        .unwrap_or_else(|| home.join("episodes"));

    let namespace = env("SKYRAS_NAMESPACE")
        .or(file.store.namespace)
        .unwrap_or_else(|| "skyras".to_string());

    let agent_name = env("SKYRAS_AGENT")
        .or(file.bus.agent_name)
        .unwrap_or_else(|| crate::core::workflow::DEFAULT_AGENT_NAME.to_string());

    let poll_interval = file
        .bus
        .poll_interval_ms
        .map(Duration::from_millis)
        .unwrap_or(crate::core::DEFAULT_POLL_INTERVAL);

    let defaults = NotifierSettings::default();
    let notifier = NotifierSettings {
        url: env("N8N_URL").or(file.notifier.url).unwrap_or(defaults.url),
        api_key: env("N8N_API_KEY").or(file.notifier.api_key),
        timeout: file
            .notifier
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout),
    };

    let tracker = TrackerSettings {
        api_key: env("NOTION_API_KEY").or(file.tracker.api_key),
        database_id: env("NOTION_DATABASE_ID").or(file.tracker.database_id),
    };

    ResolvedConfig {
        home,
        config_file: config_path,
        namespace,
        agent_name,
        poll_interval,
        channels: file.bus.channels.unwrap_or_default(),
        episodes_root,
        notifier,
        tracker,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".skyras");

    let config_path = find_config_file();
    let file = match config_path {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    Ok(resolve(default_home, config_path, file, &|name| {
        std::env::var(name).ok()
    }))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
