//! Configuration management
//!
//! TOML configuration with user-level and project-level files, defaults for
//! every field and `${VAR:default}` interpolation.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    DatabaseConfig, GatewayConfig, GatewayEndpoints, LoggingConfig, RecoveryConfig, ScoutConfig,
};
