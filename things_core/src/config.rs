//! Server configuration.
//!
//! Settings are read from an optional YAML file
//! (`$THINGS_MCP_CONFIG`, else `<config dir>/things-mcp/config.yaml`) and then
//! overridden by `THINGS_MCP_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ThingsError;
use crate::logging::LogLevel;

const ENV_PREFIX: &str = "THINGS_MCP_";

/// What to do with tags that do not exist in Things yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TagCreationPolicy {
    /// Create missing tags before writing.
    #[default]
    Create,
    /// Drop unknown tags and report them.
    Skip,
    /// Reject the write with `TAG_NOT_FOUND`.
    Fail,
}

impl FromStr for TagCreationPolicy {
    type Err = ThingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "allow" | "allow_all" => Ok(TagCreationPolicy::Create),
            "skip" | "ignore" | "existing_only" => Ok(TagCreationPolicy::Skip),
            "fail" | "reject" => Ok(TagCreationPolicy::Fail),
            other => Err(ThingsError::Config(format!(
                "Unknown tag creation policy: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds before an osascript/open subprocess is killed.
    pub applescript_timeout: u64,
    /// Total attempts per invocation (first try included).
    pub applescript_retry_count: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Seconds a cached read stays fresh.
    pub cache_default_ttl: u64,
    /// Upper bound on cached entries.
    pub cache_max_size: usize,
    /// Concurrency limit for bulk operations.
    pub max_concurrent_operations: usize,
    pub tag_creation_policy: TagCreationPolicy,
    /// Replace subprocesses with a dry-run runner.
    pub mock_mode: bool,
    pub log_level: LogLevel,
    /// Application name used in `tell application` blocks.
    pub things_app_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            applescript_timeout: default_timeout(),
            applescript_retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            cache_default_ttl: default_cache_ttl(),
            cache_max_size: default_cache_max_size(),
            max_concurrent_operations: default_max_concurrent(),
            tag_creation_policy: TagCreationPolicy::default(),
            mock_mode: false,
            log_level: LogLevel::default(),
            things_app_name: "Things3".to_string(),
        }
    }
}

const fn default_timeout() -> u64 {
    30
}

const fn default_retry_count() -> u32 {
    3
}

const fn default_retry_base_delay_ms() -> u64 {
    1000
}

const fn default_cache_ttl() -> u64 {
    300
}

const fn default_cache_max_size() -> usize {
    1000
}

const fn default_max_concurrent() -> usize {
    5
}

impl Config {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self, ThingsError> {
        let path = std::env::var(format!("{}CONFIG", ENV_PREFIX))
            .ok()
            .map(PathBuf::from)
            .or_else(Self::default_path);

        let mut config = match path {
            Some(path) => Self::load_from_path(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("things-mcp").join("config.yaml"))
    }

    /// Returns defaults when the file does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self, ThingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ThingsError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| {
            ThingsError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Apply `THINGS_MCP_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ThingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("APPLESCRIPT_TIMEOUT") {
            self.applescript_timeout = parse_number("APPLESCRIPT_TIMEOUT", &v)?;
        }
        if let Some(v) = get("APPLESCRIPT_RETRY_COUNT") {
            self.applescript_retry_count = parse_number("APPLESCRIPT_RETRY_COUNT", &v)?;
        }
        if let Some(v) = get("RETRY_BASE_DELAY_MS") {
            self.retry_base_delay_ms = parse_number("RETRY_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = get("CACHE_DEFAULT_TTL") {
            self.cache_default_ttl = parse_number("CACHE_DEFAULT_TTL", &v)?;
        }
        if let Some(v) = get("CACHE_MAX_SIZE") {
            self.cache_max_size = parse_number("CACHE_MAX_SIZE", &v)?;
        }
        if let Some(v) = get("MAX_CONCURRENT_OPERATIONS") {
            self.max_concurrent_operations = parse_number("MAX_CONCURRENT_OPERATIONS", &v)?;
        }
        if let Some(v) = get("TAG_CREATION_POLICY") {
            self.tag_creation_policy = v.parse()?;
        }
        if let Some(v) = get("MOCK_MODE") {
            self.mock_mode = parse_bool(&v).ok_or_else(|| {
                ThingsError::Config(format!("{}MOCK_MODE must be a boolean, got '{}'", ENV_PREFIX, v))
            })?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v.parse()?;
        }
        if let Some(v) = get("THINGS_APP_NAME") {
            self.things_app_name = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ThingsError> {
        if self.applescript_timeout == 0 {
            return Err(ThingsError::Config(
                "applescript_timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_operations == 0 {
            return Err(ThingsError::Config(
                "max_concurrent_operations must be greater than zero".to_string(),
            ));
        }
        if self.cache_max_size == 0 {
            return Err(ThingsError::Config(
                "cache_max_size must be greater than zero".to_string(),
            ));
        }
        if self.things_app_name.trim().is_empty() {
            return Err(ThingsError::Config(
                "things_app_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.applescript_timeout)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_default_ttl)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Lenient boolean parsing for env values and MCP string arguments.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, ThingsError> {
    value.parse::<T>().map_err(|_| {
        ThingsError::Config(format!(
            "{}{} must be a non-negative integer, got '{}'",
            ENV_PREFIX, name, value
        ))
    })
}
