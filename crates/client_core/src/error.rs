use std::path::PathBuf;

use thiserror::Error;

use crate::router::RouteError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid api base url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to read settings file '{}': {source}", path.display())]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file '{}': {source}", path.display())]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {message}")]
    InvalidSetting { key: &'static str, message: String },
    #[error(transparent)]
    Route(#[from] RouteError),
}
