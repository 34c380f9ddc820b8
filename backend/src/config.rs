//! Configuration management for the pharmacy management platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with PHARMACY_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::UnitType;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Inventory behaviour
    pub inventory: InventoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a free pooled connection
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key used to verify bearer tokens
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable output
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    /// Unit assumed for sale lines with a missing or unknown unit type
    pub default_sale_unit: String,
}

impl InventoryConfig {
    pub fn sale_unit(&self) -> UnitType {
        UnitType::parse_or(Some(&self.default_sale_unit), UnitType::Pack)
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("PHARMACY_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("logging.json", false)?
            .set_default("inventory.default_sale_unit", "pack")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (PHARMACY_ prefix)
            .add_source(
                Environment::with_prefix("PHARMACY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sale_unit_falls_back_to_pack() {
        let inventory = InventoryConfig {
            default_sale_unit: "strip".to_string(),
        };
        assert_eq!(inventory.sale_unit(), UnitType::Pack);

        let inventory = InventoryConfig {
            default_sale_unit: "tablet".to_string(),
        };
        assert_eq!(inventory.sale_unit(), UnitType::Tablet);
    }
}
