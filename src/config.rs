//! Persisted settings and the provider seam the core reads them through.
//!
//! The JSON layout mirrors the browser extension's storage keys, so a
//! settings file can be exported from one and read by the other.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::domain::{BackendConfig, ConfigError, Credentials};

pub const DEFAULT_BACKEND_URL: &str = "https://api.example.com";

const APP_DIR: &str = "ytdl-relay";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettings {
    pub backend_url: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub need_auth: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub general_options: GeneralSettings,
    #[serde(default)]
    pub auth_options: AuthSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_token: Option<String>,
}

impl Settings {
    /// Validate and store a backend URL in its normalized form.
    pub fn set_backend_url(&mut self, backend_url: &str) -> Result<(), ConfigError> {
        let url = Url::parse(backend_url)
            .map_err(|e| ConfigError::InvalidBackendUrl(backend_url.to_string(), e))?;
        self.general_options.backend_url = url.to_string();
        Ok(())
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        if self.general_options.backend_url.trim_end_matches('/') == DEFAULT_BACKEND_URL {
            warn!("backend URL is still {}, update it in the settings", DEFAULT_BACKEND_URL);
        }

        ConfigSnapshot {
            backend: BackendConfig::new(self.general_options.backend_url.clone()),
            credentials: Credentials {
                api_key: self.auth_options.api_key.clone(),
                session_token: self.jwt_token.clone(),
            },
        }
    }
}

/// Immutable view of the configuration for a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub backend: BackendConfig,
    pub credentials: Credentials,
}

pub trait ConfigProvider: Send + Sync {
    fn snapshot(&self) -> Result<ConfigSnapshot, ConfigError>;
}

/// Always hands out the same snapshot.
#[derive(Debug, Clone)]
pub struct StaticConfigProvider(pub ConfigSnapshot);

impl ConfigProvider for StaticConfigProvider {
    fn snapshot(&self) -> Result<ConfigSnapshot, ConfigError> {
        Ok(self.0.clone())
    }
}

/// Settings stored as a JSON file. A missing file reads as defaults.
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/ytdl-relay/settings.json`
    pub fn default_location() -> Result<Self, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::new(dir.join(APP_DIR).join(SETTINGS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings, ConfigError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no settings file, using defaults");
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl ConfigProvider for FileConfigProvider {
    fn snapshot(&self) -> Result<ConfigSnapshot, ConfigError> {
        Ok(self.load()?.snapshot())
    }
}
