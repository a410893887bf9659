use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::FetcherError;

pub const DEFAULT_CONFIG_FILE: &str = "patent-fetcher.json";
pub const DEFAULT_BUFFER_SIZE: usize = 10_000;
/// Exclusive upper bound for `buffer_size`.
pub const MAX_BUFFER_SIZE: usize = 100_000;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 1_000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SQLITE_DB: &str = "patents.db";

const ENV_PREFIX: &str = "PATENT_FETCHER_";

/// On-disk settings file. Every field is optional; environment variables win.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub sqlite_db: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub buffer_size: Option<usize>,
    #[serde(default)]
    pub max_page_size: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Bearer token. Never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(**********)")
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: Url,
    pub api_token: ApiToken,
    pub sqlite_db: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub buffer_size: usize,
    pub max_page_size: u32,
    pub timeout: Duration,
}

impl Settings {
    /// Settings for `api_url` with every other field at its default.
    pub fn with_api_url(api_url: Url) -> Self {
        Self {
            api_url,
            api_token: ApiToken::default(),
            sqlite_db: Utf8PathBuf::from(DEFAULT_SQLITE_DB),
            output_dir: Utf8PathBuf::from("."),
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the settings file (if any) and applies `PATENT_FETCHER_*` overrides.
    ///
    /// An explicit `path` must exist; the default `patent-fetcher.json` is optional.
    pub fn resolve(path: Option<&str>) -> Result<Settings, FetcherError> {
        let mut file = Self::read_file(path)?;
        file.apply_env(|key| std::env::var(key).ok())?;
        Self::resolve_config(file)
    }

    pub fn read_file(path: Option<&str>) -> Result<ConfigFile, FetcherError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ConfigFile::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| FetcherError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| FetcherError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: ConfigFile) -> Result<Settings, FetcherError> {
        let raw_url = config
            .api_url
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                FetcherError::InvalidConfig(format!(
                    "api_url is required (set it in {DEFAULT_CONFIG_FILE} or {ENV_PREFIX}API_URL)"
                ))
            })?;
        let api_url = Url::parse(raw_url.trim())
            .map_err(|err| FetcherError::InvalidConfig(format!("api_url {raw_url}: {err}")))?;

        let buffer_size = config.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        if buffer_size == 0 || buffer_size >= MAX_BUFFER_SIZE {
            return Err(FetcherError::InvalidConfig(format!(
                "buffer_size {buffer_size} must be at least 1 and below {MAX_BUFFER_SIZE}"
            )));
        }

        let max_page_size = config.max_page_size.unwrap_or(DEFAULT_MAX_PAGE_SIZE);
        if max_page_size == 0 {
            return Err(FetcherError::InvalidConfig(
                "max_page_size must be at least 1".to_string(),
            ));
        }

        let timeout_secs = config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(FetcherError::InvalidConfig(
                "timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(Settings {
            api_url,
            api_token: ApiToken::new(config.api_token.unwrap_or_default()),
            sqlite_db: Utf8PathBuf::from(
                config
                    .sqlite_db
                    .unwrap_or_else(|| DEFAULT_SQLITE_DB.to_string()),
            ),
            output_dir: Utf8PathBuf::from(config.output_dir.unwrap_or_else(|| ".".to_string())),
            buffer_size,
            max_page_size,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl ConfigFile {
    /// Overlays `PATENT_FETCHER_*` values looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), FetcherError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = get("API_URL") {
            self.api_url = Some(value);
        }
        if let Some(value) = get("API_TOKEN") {
            self.api_token = Some(value);
        }
        if let Some(value) = get("SQLITE_DB") {
            self.sqlite_db = Some(value);
        }
        if let Some(value) = get("OUTPUT_DIR") {
            self.output_dir = Some(value);
        }
        if let Some(value) = get("BUFFER_SIZE") {
            self.buffer_size = Some(parse_env_number("BUFFER_SIZE", &value)?);
        }
        if let Some(value) = get("MAX_PAGE_SIZE") {
            self.max_page_size = Some(parse_env_number("MAX_PAGE_SIZE", &value)?);
        }
        if let Some(value) = get("TIMEOUT_SECS") {
            self.timeout_secs = Some(parse_env_number("TIMEOUT_SECS", &value)?);
        }
        Ok(())
    }
}

fn parse_env_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, FetcherError> {
    value.trim().parse().map_err(|_| {
        FetcherError::InvalidConfig(format!("{ENV_PREFIX}{name} is not a number: {value}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let config = ConfigFile {
            api_url: Some("https://patents.example.com/api/".to_string()),
            ..ConfigFile::default()
        };

        let settings = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(settings.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(settings.max_page_size, DEFAULT_MAX_PAGE_SIZE);
        assert_eq!(settings.sqlite_db.as_str(), DEFAULT_SQLITE_DB);
        assert!(settings.api_token.is_empty());
    }

    #[test]
    fn token_is_redacted() {
        let token = ApiToken::new("super-secret");
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
