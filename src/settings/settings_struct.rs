use std::sync::{Arc, LazyLock, RwLock};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generator::CompileTarget;
use crate::utils::file::file_get;
use crate::utils::http::{CancelFlag, FetchError, FetchOptions, Fetcher, HttpFetcher, DEFAULT_TIMEOUT};
use crate::utils::url::is_link;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch settings: {0}")]
    Fetch(#[from] FetchError),

    #[error("invalid TOML settings: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid YAML settings: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_user_agent() -> String {
    "subcompiler".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT
}

fn default_max_download_size() -> u64 {
    32 * 1024 * 1024 // 32MB
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonSettings {
    pub log_level: String,
    /// User-Agent sent with outbound fetches
    pub user_agent: String,
}

impl Default for CommonSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            user_agent: default_user_agent(),
        }
    }
}

/// Outbound fetch limits, used for remote templates and sub-subscriptions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    /// Upstream proxy for outbound fetches, empty for a direct connection
    pub proxy: String,
    pub max_download_size: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            proxy: String::new(),
            max_download_size: default_max_download_size(),
        }
    }
}

/// Default base template references per target
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    pub clash: String,
    pub surge: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Base64-wrap plain link lists
    pub list_base64: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self { list_base64: true }
    }
}

/// Settings structure to hold global configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub common: CommonSettings,
    pub fetch: FetchSettings,
    pub templates: TemplateSettings,
    pub output: OutputSettings,

    /// Where these settings were loaded from
    #[serde(skip)]
    pub pref_path: String,
}

impl Settings {
    /// Create a new settings instance with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current() -> Arc<Settings> {
        match GLOBAL.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Parse settings content, YAML when it has a `common:` key, TOML otherwise
    pub fn from_content(content: &str) -> Result<Self, SettingsError> {
        if content.contains("common:") {
            return Ok(serde_yaml::from_str(content)?);
        }
        Ok(toml::from_str(content)?)
    }

    /// Load settings from a local file or an http(s) URL
    pub fn from_path(path: &str) -> Result<Self, SettingsError> {
        let content = if is_link(path) {
            HttpFetcher::new(&FetchOptions::default())?
                .fetch(path, &CancelFlag::new())?
                .body
        } else {
            file_get(path).map_err(|source| SettingsError::Io {
                path: path.to_string(),
                source,
            })?
        };
        let mut settings = Settings::from_content(&content)?;
        settings.pref_path = path.to_owned();
        Ok(settings)
    }

    /// Options for the outbound fetcher
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.fetch.timeout_secs.max(1)),
            user_agent: self.common.user_agent.clone(),
            proxy: Some(self.fetch.proxy.trim().to_string()).filter(|p| !p.is_empty()),
            max_download_size: self.fetch.max_download_size,
        }
    }

    /// Default base template for a target, empty when none is configured
    pub fn default_template(&self, target: CompileTarget) -> &str {
        match target {
            CompileTarget::Clash => &self.templates.clash,
            CompileTarget::Surge => &self.templates.surge,
            CompileTarget::List => "",
        }
    }

    /// The configured log level, if it names a valid filter
    pub fn log_level_filter(&self) -> Option<log::LevelFilter> {
        self.common.log_level.trim().parse().ok()
    }
}

// Global settings instance
pub static GLOBAL: LazyLock<RwLock<Arc<Settings>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Settings::new())));

fn replace_global(settings: Settings) {
    let settings = Arc::new(settings);
    match GLOBAL.write() {
        Ok(mut guard) => *guard = settings,
        Err(poisoned) => *poisoned.into_inner() = settings,
    }
}

/// Update settings directly from file path with proper locking
pub fn update_settings_from_file(path: &str) -> Result<(), SettingsError> {
    let settings = Settings::from_path(path)?;
    info!("Loaded settings from {}", path);
    replace_global(settings);
    Ok(())
}

pub fn update_settings_from_content(content: &str) -> Result<(), SettingsError> {
    replace_global(Settings::from_content(content)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::new();
        assert_eq!(settings.fetch.timeout_secs, 15);
        assert_eq!(settings.fetch.max_download_size, 32 * 1024 * 1024);
        assert!(settings.output.list_base64);
        assert_eq!(settings.log_level_filter(), Some(log::LevelFilter::Info));
    }

    #[test]
    fn test_fetch_options_ignore_blank_proxy() {
        let mut settings = Settings::new();
        settings.fetch.proxy = "  ".to_string();
        settings.fetch.timeout_secs = 3;
        let opts = settings.fetch_options();
        assert_eq!(opts.proxy, None);
        assert_eq!(opts.timeout, Duration::from_secs(3));
    }
}
