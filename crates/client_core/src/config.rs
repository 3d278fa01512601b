use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use shared::protocol::ResponseConvention;
use url::Url;

use crate::error::ClientError;

pub const DEFAULT_SETTINGS_FILE: &str = "client.toml";

/// Which product's pages the router serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    Blog,
    #[default]
    Shop,
}

impl std::str::FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blog" => Ok(Self::Blog),
            "shop" | "ecommerce" | "marketplace" => Ok(Self::Shop),
            other => Err(format!("unknown product '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    pub convention: ResponseConvention,
    pub product: Product,
    pub database_url: String,
    pub request_timeout_secs: u64,
    pub home_path: String,
    pub login_path: String,
    /// Re-fetch `/auth/user` after loading a persisted session.
    pub restore_user_on_start: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080/api".into(),
            convention: ResponseConvention::Auto,
            product: Product::Shop,
            database_url: storage::DEFAULT_DATABASE_URL.into(),
            request_timeout_secs: 30,
            home_path: "/".into(),
            login_path: "/login".into(),
            restore_user_on_start: false,
        }
    }
}

impl Settings {
    /// Base URL without a trailing slash, ready for `base + "/path"`.
    pub fn api_base(&self) -> Result<String, ClientError> {
        let trimmed = self.api_base_url.trim().trim_end_matches('/');
        Url::parse(trimmed).map_err(|source| ClientError::InvalidBaseUrl {
            url: self.api_base_url.clone(),
            source,
        })?;
        Ok(trimmed.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Reads `path` (or `client.toml` when it exists) and applies `APP__*`
/// environment overrides.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ClientError> {
    let settings = match path {
        Some(path) => read_settings_file(path)?,
        None => {
            let default_path = Path::new(DEFAULT_SETTINGS_FILE);
            match read_settings_file(default_path) {
                Ok(settings) => settings,
                Err(ClientError::SettingsRead { source, .. })
                    if source.kind() == io::ErrorKind::NotFound =>
                {
                    Settings::default()
                }
                Err(err) => return Err(err),
            }
        }
    };

    apply_overrides(settings, |key| std::env::var(key).ok())
}

fn read_settings_file(path: &Path) -> Result<Settings, ClientError> {
    let raw = fs::read_to_string(path).map_err(|source| ClientError::SettingsRead {
        path: PathBuf::from(path),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ClientError::SettingsParse {
        path: PathBuf::from(path),
        source,
    })
}

pub(crate) fn apply_overrides(
    mut settings: Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Settings, ClientError> {
    if let Some(v) = lookup("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__CONVENTION") {
        settings.convention = v.parse().map_err(|message| ClientError::InvalidSetting {
            key: "APP__CONVENTION",
            message,
        })?;
    }
    if let Some(v) = lookup("APP__PRODUCT") {
        settings.product = v.parse().map_err(|message| ClientError::InvalidSetting {
            key: "APP__PRODUCT",
            message,
        })?;
    }
    if let Some(v) = lookup("APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs =
            v.parse().map_err(|err| ClientError::InvalidSetting {
                key: "APP__REQUEST_TIMEOUT_SECS",
                message: format!("{err}"),
            })?;
    }
    if let Some(v) = lookup("APP__RESTORE_USER_ON_START") {
        settings.restore_user_on_start = matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );
    }

    settings.api_base()?;
    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
