//! Configuration management for Ipwarden.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, WardenError};
use crate::ratelimit::IpList;

/// Prefix for environment variable overrides, e.g.
/// `IPWARDEN_RATE_LIMITING__REQUESTS_PER_MINUTE=120`.
const ENV_PREFIX: &str = "IPWARDEN";

/// Longest accepted block penalty (about 100 years).
pub const MAX_BLOCK_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Longest accepted sweep period (one day).
pub const MAX_CLEANUP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Main configuration for the Ipwarden service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitConfig,

    /// Admission service configuration
    #[serde(default)]
    pub service: ServiceConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Rate limiting configuration.
///
/// Read-only once a limiter has been built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per one-minute window
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Reserved; not used by the fixed-window algorithm
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// How long an IP stays blocked once it exceeds the limit, in seconds
    #[serde(default = "default_block_duration")]
    pub block_duration_secs: u64,

    /// IPs or CIDR ranges that are always allowed
    #[serde(default)]
    pub whitelisted_ips: Vec<String>,

    /// IPs or CIDR ranges that are always denied
    #[serde(default)]
    pub blacklisted_ips: Vec<String>,

    /// How often stale entries are swept, in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            burst_size: default_burst_size(),
            block_duration_secs: default_block_duration(),
            whitelisted_ips: Vec::new(),
            blacklisted_ips: Vec::new(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_burst_size() -> u32 {
    10
}

fn default_block_duration() -> u64 {
    300
}

fn default_cleanup_interval() -> u64 {
    300
}

impl RateLimitConfig {
    /// The block penalty as a [`Duration`], capped at
    /// [`MAX_BLOCK_DURATION_SECS`].
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_duration_secs.min(MAX_BLOCK_DURATION_SECS))
    }

    /// The sweep period as a [`Duration`], capped at
    /// [`MAX_CLEANUP_INTERVAL_SECS`].
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.min(MAX_CLEANUP_INTERVAL_SECS))
    }

    /// Check the lists and intervals for problems.
    ///
    /// The limiter itself tolerates malformed list entries by never matching
    /// them; this is for callers that want to refuse such configuration at
    /// startup instead.
    pub fn validate(&self) -> Result<()> {
        if self.cleanup_interval_secs == 0 {
            return Err(WardenError::Config(
                "cleanup_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.cleanup_interval_secs > MAX_CLEANUP_INTERVAL_SECS {
            return Err(WardenError::Config(format!(
                "cleanup_interval_secs must be at most {}",
                MAX_CLEANUP_INTERVAL_SECS
            )));
        }

        if self.block_duration_secs > MAX_BLOCK_DURATION_SECS {
            return Err(WardenError::Config(format!(
                "block_duration_secs must be at most {}",
                MAX_BLOCK_DURATION_SECS
            )));
        }

        let lists = [
            IpList::new("whitelist", &self.whitelisted_ips),
            IpList::new("blacklist", &self.blacklisted_ips),
        ];
        for list in &lists {
            if let Some(entry) = list.malformed_entries().next() {
                return Err(WardenError::InvalidListEntry {
                    list: list.name(),
                    entry: entry.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Admission service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Reject requests whose client IP is not a valid IP literal
    #[serde(default = "default_reject_invalid_ip")]
    pub reject_invalid_ip: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            reject_invalid_ip: default_reject_invalid_ip(),
        }
    }
}

fn default_reject_invalid_ip() -> bool {
    true
}

impl WardenConfig {
    /// Load configuration from defaults, an optional YAML file and
    /// `IPWARDEN_*` environment variables, in increasing precedence.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("rate_limiting.whitelisted_ips")
                .with_list_parse_key("rate_limiting.blacklisted_ips"),
        );

        let config = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Load configuration from a YAML file path, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| WardenError::Config(format!("Failed to parse configuration: {}", e)))
    }
}
