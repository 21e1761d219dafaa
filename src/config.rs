//! Configuration for the ShotGrid connection.
//!
//! Configuration can be set via environment variables:
//! - `SG_SCRIPT_URL` - Required. Site base URL, e.g. `https://studio.shotgrid.autodesk.com`.
//! - `SG_SCRIPT_NAME` - Required. API script name.
//! - `SG_SCRIPT_KEY` - Required. API script key.
//! - `SG_AUTO_TAG_ID` - Optional. Tag applied on every create/update. Defaults to `341`; `0` disables it.
//! - `SG_LOOKUP_CACHE_CAPACITY` - Optional. Max memoized lookup tables. Defaults to `64`.
//! - `SG_LOOKUP_CACHE_TTL_SECS` - Optional. Lookup table lifetime. Defaults to `0` (never expire).
//! - `SG_RETIRE_CREATED_BY_ID` / `SG_RETIRE_CREATED_BY_NAME` - Optional. ApiUser whose entities may be retired.
//! - `SG_HTTP_TIMEOUT_SECS` - Optional. Request timeout. Defaults to `30`.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::fields::EntityRef;

pub const DEFAULT_AUTO_TAG_ID: i64 = 341;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Lookup cache configuration.
#[derive(Debug, Clone)]
pub struct LookupCacheConfig {
    /// Maximum number of memoized lookup tables
    pub capacity: usize,

    /// Lifetime of a memoized table; `None` keeps it until invalidated
    pub ttl: Option<Duration>,
}

impl Default for LookupCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            ttl: None,
        }
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Site base URL
    pub base_url: String,

    /// API script name
    pub script_name: String,

    /// API script key
    pub api_key: String,

    /// Tag id applied on every create/update, if any
    pub auto_tag_id: Option<i64>,

    /// Lookup cache settings
    pub lookup_cache: LookupCacheConfig,

    /// ApiUser whose recent entities `retire_recent_entities` may delete
    pub retire_created_by: Option<EntityRef>,

    /// Per-request timeout
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if any of the script credentials is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = required("SG_SCRIPT_URL")?;
        url::Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidValue("SG_SCRIPT_URL".to_string(), e.to_string()))?;

        let script_name = required("SG_SCRIPT_NAME")?;
        let api_key = required("SG_SCRIPT_KEY")?;

        let auto_tag_id: i64 = parsed("SG_AUTO_TAG_ID", DEFAULT_AUTO_TAG_ID)?;

        let capacity = parsed("SG_LOOKUP_CACHE_CAPACITY", 64usize)?;
        if capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "SG_LOOKUP_CACHE_CAPACITY".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let ttl_secs: u64 = parsed("SG_LOOKUP_CACHE_TTL_SECS", 0)?;

        let retire_created_by = match std::env::var("SG_RETIRE_CREATED_BY_ID") {
            Ok(raw) => {
                let id = raw.parse::<i64>().map_err(|e| {
                    ConfigError::InvalidValue("SG_RETIRE_CREATED_BY_ID".to_string(), e.to_string())
                })?;
                let mut user = EntityRef::new("ApiUser", id);
                if let Ok(name) = std::env::var("SG_RETIRE_CREATED_BY_NAME") {
                    user = user.with_name(name);
                }
                Some(user)
            }
            Err(_) => None,
        };

        let timeout_secs: u64 = parsed("SG_HTTP_TIMEOUT_SECS", 30)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            script_name,
            api_key,
            auto_tag_id: (auto_tag_id != 0).then_some(auto_tag_id),
            lookup_cache: LookupCacheConfig {
                capacity,
                ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            },
            retire_created_by,
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(base_url: &str, script_name: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            script_name: script_name.to_string(),
            api_key: api_key.to_string(),
            auto_tag_id: Some(DEFAULT_AUTO_TAG_ID),
            lookup_cache: LookupCacheConfig::default(),
            retire_created_by: None,
            http_timeout: Duration::from_secs(30),
        }
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn parsed<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults() {
        let config = Config::new("https://studio.example.com/", "pipeline", "secret");
        assert_eq!(config.base_url, "https://studio.example.com");
        assert_eq!(config.auto_tag_id, Some(341));
        assert_eq!(config.lookup_cache.capacity, 64);
        assert!(config.lookup_cache.ttl.is_none());
        assert!(config.retire_created_by.is_none());
    }

    #[test]
    fn test_parsed_default_when_unset() {
        let value: u64 = parsed("SG_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    // Process environment is shared, so every from_env case runs in this one test.
    #[test]
    fn test_from_env() {
        for var in [
            "SG_SCRIPT_URL",
            "SG_SCRIPT_NAME",
            "SG_SCRIPT_KEY",
            "SG_AUTO_TAG_ID",
            "SG_RETIRE_CREATED_BY_ID",
        ] {
            std::env::remove_var(var);
        }

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref var) if var == "SG_SCRIPT_URL"));

        std::env::set_var("SG_SCRIPT_URL", "https://studio.example.com/");
        std::env::set_var("SG_SCRIPT_NAME", "pipeline");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref var) if var == "SG_SCRIPT_KEY"));

        std::env::set_var("SG_SCRIPT_KEY", "secret");
        let config = Config::from_env().unwrap();
        assert_eq!(config.base_url, "https://studio.example.com");
        assert_eq!(config.auto_tag_id, Some(341));

        std::env::set_var("SG_AUTO_TAG_ID", "0");
        assert_eq!(Config::from_env().unwrap().auto_tag_id, None);

        std::env::set_var("SG_AUTO_TAG_ID", "many");
        assert!(matches!(Config::from_env(), Err(ConfigError::InvalidValue(..))));

        for var in ["SG_SCRIPT_URL", "SG_SCRIPT_NAME", "SG_SCRIPT_KEY", "SG_AUTO_TAG_ID"] {
            std::env::remove_var(var);
        }
    }
}
