use std::env;
use std::time::Duration;

use storage::remote::RemoteConfig;

use crate::autosave::DEFAULT_AUTOSAVE_DELAY;
use crate::error::ConfigError;

pub const DEFAULT_DB_URL: &str = "sqlite://study.sqlite3";
pub const DEFAULT_IMAGE_BUCKET: &str = "article-images";
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime settings, read from `STUDY_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_url: String,
    /// `None` runs without a hosted backend; every write stays on the device.
    pub remote: Option<RemoteConfig>,
    pub autosave_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_url: DEFAULT_DB_URL.to_owned(),
            remote: None,
            autosave_delay: DEFAULT_AUTOSAVE_DELAY,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a remote URL is given without a key, or a
    /// numeric setting does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its
    /// value. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Same as [`AppConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let db_url = get("STUDY_DB_URL").unwrap_or_else(|| DEFAULT_DB_URL.to_owned());
        let autosave_delay = match get("STUDY_AUTOSAVE_SECS") {
            Some(raw) => Duration::from_secs(parse_secs("STUDY_AUTOSAVE_SECS", &raw)?),
            None => DEFAULT_AUTOSAVE_DELAY,
        };

        let remote = match get("STUDY_REMOTE_URL") {
            None => None,
            Some(base_url) => {
                let api_key = get("STUDY_REMOTE_KEY")
                    .ok_or_else(|| ConfigError::MissingRemoteKey(base_url.clone()))?;
                let timeout = match get("STUDY_REMOTE_TIMEOUT_SECS") {
                    Some(raw) => Duration::from_secs(parse_secs("STUDY_REMOTE_TIMEOUT_SECS", &raw)?),
                    None => DEFAULT_REMOTE_TIMEOUT,
                };
                Some(RemoteConfig {
                    base_url,
                    api_key,
                    bucket: get("STUDY_IMAGE_BUCKET")
                        .unwrap_or_else(|| DEFAULT_IMAGE_BUCKET.to_owned()),
                    timeout,
                })
            }
        };

        Ok(Self {
            db_url,
            remote,
            autosave_delay,
        })
    }
}

fn parse_secs(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: raw.to_owned(),
    })
}
