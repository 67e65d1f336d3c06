//! Gateway binary configuration
//!
//! Settings come from a YAML file; the bot token comes from the environment
//! (`GATEWAY_TOKEN`, optionally via `.env`) and never from the file.

use gateway_shard::{ExponentialBackoff, GatewayManager, Intents, JsonEventDecoder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Environment variable holding the bot token
pub const TOKEN_ENV_VAR: &str = "GATEWAY_TOKEN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the `gateway_events` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayAppConfig {
    /// Gateway WebSocket URL
    pub gateway_url: String,
    /// Intent names, e.g. `GUILDS` or `GUILD_MESSAGES`
    #[serde(default = "default_intents")]
    pub intents: Vec<String>,
    /// `[shard_id, shard_count]`
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seconds between status lines
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub commands: CommandConfig,

    /// Bot token from the environment (not in YAML)
    #[serde(skip)]
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// `None` retries forever
    #[serde(default)]
    pub max_attempts: Option<usize>,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            max_attempts: None,
            jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub capacity: u32,
    pub window_secs: u64,
    pub timeout_secs: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            capacity: 110,
            window_secs: 60,
            timeout_secs: 10,
        }
    }
}

fn default_intents() -> Vec<String> {
    vec!["GUILDS".to_string(), "GUILD_MESSAGES".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_status_interval() -> u64 {
    300
}

fn default_jitter() -> f64 {
    0.5
}

impl GatewayAppConfig {
    /// Load configuration from a YAML file and the token from the environment
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        // Pick up GATEWAY_TOKEN from .env when present
        dotenv::dotenv().ok();

        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::parse(&yaml_content)?;

        config.token = std::env::var(TOKEN_ENV_VAR)
            .map_err(|_| ConfigError::EnvVarMissing(TOKEN_ENV_VAR.to_string()))?;
        if config.token.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("{TOKEN_ENV_VAR} is empty")));
        }

        Ok(config)
    }

    /// Parse and validate YAML without touching the environment
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: GatewayAppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.gateway_url.starts_with("ws://") && !self.gateway_url.starts_with("wss://") {
            return Err(ConfigError::ValidationError(
                "gateway_url must start with ws:// or wss://".to_string(),
            ));
        }

        self.intent_flags()?;

        if let Some([id, count]) = self.shard {
            if count == 0 || id >= count {
                return Err(ConfigError::ValidationError(format!(
                    "shard id {id} is out of range for {count} shards"
                )));
            }
        }

        if self.commands.capacity == 0 || self.commands.window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "commands.capacity and commands.window_secs must be greater than 0".to_string(),
            ));
        }

        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "reconnect.initial_delay_ms must not exceed reconnect.max_delay_ms".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        if self.status_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "status_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Intent names resolved to flags
    pub fn intent_flags(&self) -> Result<Intents> {
        self.intents.iter().try_fold(Intents::empty(), |flags, name| {
            Intents::from_name(name.trim())
                .map(|intent| flags | intent)
                .ok_or_else(|| ConfigError::ValidationError(format!("unknown intent: {name}")))
        })
    }

    /// Build a manager from this configuration
    pub fn build_manager(&self) -> anyhow::Result<GatewayManager<JsonEventDecoder>> {
        let strategy = ExponentialBackoff::new(
            Duration::from_millis(self.reconnect.initial_delay_ms),
            Duration::from_millis(self.reconnect.max_delay_ms),
            self.reconnect.max_attempts,
        )
        .with_jitter(self.reconnect.jitter);

        let mut builder = gateway_shard::builder()
            .token(self.token.clone())
            .url(self.gateway_url.clone())
            .intents(self.intent_flags()?)
            .reconnect_strategy(strategy)
            .command_rate_limit(
                self.commands.capacity,
                Duration::from_secs(self.commands.window_secs),
            )
            .command_timeout(Duration::from_secs(self.commands.timeout_secs));

        if let Some([id, count]) = self.shard {
            builder = builder.shard(id, count);
        }

        Ok(builder.build()?)
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Gateway URL: {}", self.gateway_url);
        info!("  Intents: {}", self.intents.join(" | "));
        if let Some([id, count]) = self.shard {
            info!("  Shard: {}/{}", id, count);
        }
        info!(
            "  Reconnect: {}ms..{}ms, attempts: {:?}",
            self.reconnect.initial_delay_ms, self.reconnect.max_delay_ms, self.reconnect.max_attempts
        );
        info!(
            "  Commands: {} per {}s, timeout {}s",
            self.commands.capacity, self.commands.window_secs, self.commands.timeout_secs
        );
        info!("  Log level: {}", self.log_level);
    }
}
