//! Gateway Runner - Main Library
//!
//! Wires the `gateway-shard` library into runnable binaries.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (config, logging,
//!   CLI, runner, shutdown)
//! - **gateway_shard**: The gateway client library (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use gateway_runner::bin_common::{load_config_from_env, ConfigType, GatewayAppConfig};
//!
//! let config = GatewayAppConfig::load(load_config_from_env(ConfigType::Gateway))?;
//! let manager = config.build_manager()?;
//! ```

// Re-export workspace libraries for convenience
pub use gateway_shard;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod config;
    pub mod logging;
    pub mod runner;
    pub mod shutdown;

    pub use cli::{config_type_from_args, load_config_from_env, parse_args, ConfigType};
    pub use config::{CommandConfig, ConfigError, GatewayAppConfig, ReconnectConfig};
    pub use logging::init_logging_with_level;
    pub use runner::{BinaryRunner, RunConfig};
    pub use shutdown::ShutdownManager;
}
