//! Client configuration.
//!
//! Configuration for one gateway session, including:
//! - Endpoint lookup and protocol version
//! - Identify capabilities (intents, compression, large-guild threshold)
//! - Shard assignment
//! - Heartbeat, rate-limit and reconnect tuning

use std::path::Path;
use std::time::Duration;

use gatelink_proto::{ConnectionProperties, Encoding, Intents};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};
use crate::rate_limit::RateLimitConfig;
use crate::reconnect::ReconnectConfig;

/// Smallest accepted large-guild threshold.
pub const MIN_LARGE_THRESHOLD: u32 = 50;
/// Largest accepted large-guild threshold.
pub const MAX_LARGE_THRESHOLD: u32 = 250;

/// Shard this session serves, assigned by the process launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    /// Zero-based shard index.
    pub index: u32,
    /// Total number of shards.
    pub count: u32,
}

impl Default for ShardInfo {
    fn default() -> Self {
        Self { index: 0, count: 1 }
    }
}

impl ShardInfo {
    /// Shard pair as sent in the identify payload.
    #[must_use]
    pub const fn as_pair(self) -> [u32; 2] {
        [self.index, self.count]
    }
}

/// Heartbeat tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSettings {
    /// How long to wait for a heartbeat ack, in milliseconds.
    pub ack_timeout_ms: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 15_000,
        }
    }
}

impl HeartbeatSettings {
    /// Ack watchdog duration.
    #[must_use]
    pub const fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Main gateway client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the REST API used for endpoint lookup.
    pub api_base_url: String,
    /// Gateway protocol version.
    pub version: u8,
    /// Frame encoding requested from the gateway.
    pub encoding: Encoding,
    /// Requested intents.
    pub intents: Intents,
    /// Whether to request payload compression.
    pub compress: bool,
    /// Member count above which a guild is considered large.
    pub large_threshold: u32,
    /// Client name reported in identify properties.
    pub client_name: String,
    /// Platform reported in identify properties.
    pub platform: String,
    /// Publish every decoded frame as a raw event.
    pub emit_raw: bool,
    /// Shard assignment.
    pub shard: ShardInfo,
    /// Heartbeat tuning.
    pub heartbeat: HeartbeatSettings,
    /// Delay before re-identifying after a non-resumable invalid session, in milliseconds.
    pub invalid_session_backoff_ms: u64,
    /// Outbound rate budgets.
    pub rate_limit: RateLimitConfig,
    /// Reconnect policy.
    pub reconnect: ReconnectConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://discord.com/api/v8".to_string(),
            version: 8,
            encoding: Encoding::Json,
            intents: Intents::GUILDS,
            compress: false,
            large_threshold: MIN_LARGE_THRESHOLD,
            client_name: "gatelink".to_string(),
            platform: std::env::consts::OS.to_string(),
            emit_raw: true,
            shard: ShardInfo::default(),
            heartbeat: HeartbeatSettings::default(),
            invalid_session_backoff_ms: 5_000,
            rate_limit: RateLimitConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> GatewayResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GatewayError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> GatewayResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| GatewayError::Config(format!("failed to serialize config: {e}")))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.api_base_url.is_empty() {
            return Err(GatewayError::Config(
                "api_base_url cannot be empty".to_string(),
            ));
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(GatewayError::Config(
                "api_base_url must start with http:// or https://".to_string(),
            ));
        }

        if self.version == 0 {
            return Err(GatewayError::Config(
                "version must be greater than 0".to_string(),
            ));
        }

        if !(MIN_LARGE_THRESHOLD..=MAX_LARGE_THRESHOLD).contains(&self.large_threshold) {
            return Err(GatewayError::Config(format!(
                "large_threshold must be between {MIN_LARGE_THRESHOLD} and {MAX_LARGE_THRESHOLD}"
            )));
        }

        if self.client_name.is_empty() {
            return Err(GatewayError::Config(
                "client_name cannot be empty".to_string(),
            ));
        }

        if self.shard.count == 0 {
            return Err(GatewayError::Config(
                "shard.count must be at least 1".to_string(),
            ));
        }

        if self.shard.index >= self.shard.count {
            return Err(GatewayError::Config(format!(
                "shard.index {} must be less than shard.count {}",
                self.shard.index, self.shard.count
            )));
        }

        if self.heartbeat.ack_timeout_ms == 0 {
            return Err(GatewayError::Config(
                "heartbeat.ack_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let limits = &self.rate_limit;
        if limits.events_per_second == 0
            || limits.events_per_minute == 0
            || limits.identifies_per_window == 0
        {
            return Err(GatewayError::Config(
                "rate_limit budgets must be greater than 0".to_string(),
            ));
        }

        if limits.identify_window_ms == 0 {
            return Err(GatewayError::Config(
                "rate_limit.identify_window_ms must be greater than 0".to_string(),
            ));
        }

        if self.reconnect.backoff_multiplier < 1.0 {
            return Err(GatewayError::Config(
                "reconnect.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(GatewayError::Config(
                "reconnect.initial_delay_ms cannot exceed reconnect.max_delay_ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Identify properties derived from this configuration.
    #[must_use]
    pub fn connection_properties(&self) -> ConnectionProperties {
        ConnectionProperties::new(&self.platform, &self.client_name)
    }

    /// Delay before re-identifying after a non-resumable invalid session.
    #[must_use]
    pub const fn invalid_session_backoff(&self) -> Duration {
        Duration::from_millis(self.invalid_session_backoff_ms)
    }
}
