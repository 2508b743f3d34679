//! Configuration for final-account-service.

use account_core::config as core_config;
use account_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct FinalAccountConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl FinalAccountConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let config = FinalAccountConfig {
            common,
            service_name: get_env("SERVICE_NAME", Some("final-account-service"))?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")))?,
            log_level: get_env("LOG_LEVEL", Some("info"))?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None)?,
                max_connections: get_env("DB_MAX_CONNECTIONS", Some("10"))?
                    .parse()
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!("Invalid DB_MAX_CONNECTIONS: {}", e))
                    })?,
                min_connections: get_env("DB_MIN_CONNECTIONS", Some("1"))?
                    .parse()
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!("Invalid DB_MIN_CONNECTIONS: {}", e))
                    })?,
            },
        };

        Ok(config)
    }
}

fn get_env(key: &str, default: Option<&str>) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => match default {
            Some(def) => Ok(def.to_string()),
            None => Err(AppError::ConfigError(anyhow::anyhow!(format!(
                "{} is required but not set",
                key
            )))),
        },
    }
}
