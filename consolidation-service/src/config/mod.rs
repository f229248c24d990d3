//! Configuration module for consolidation-service.

use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ConsolidationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub engine: EngineSettings,
    pub cors_allowed_origins: Vec<String>,
    pub seed_dev: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Fixed knobs of the ingestion and reconciliation engine. Handed to the
/// store at construction so tests can pin boundary values.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Rows per multi-row insert statement during bulk ingestion.
    pub bulk_chunk_size: usize,
    /// Rows per multi-row insert statement when writing allocations.
    pub allocation_chunk_size: usize,
    pub default_page_limit: i64,
    pub max_page_limit: i64,
    /// Amount an invoice may be over-allocated by to absorb rounding.
    pub allocation_tolerance: Decimal,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            bulk_chunk_size: 200,
            allocation_chunk_size: 100,
            default_page_limit: 50,
            max_page_limit: 500,
            allocation_tolerance: Decimal::new(1, 2),
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let settings = Self {
            bulk_chunk_size: env_or("BULK_CHUNK_SIZE", defaults.bulk_chunk_size),
            allocation_chunk_size: env_or("ALLOCATION_CHUNK_SIZE", defaults.allocation_chunk_size),
            default_page_limit: env_or("DEFAULT_PAGE_LIMIT", defaults.default_page_limit),
            max_page_limit: env_or("MAX_PAGE_LIMIT", defaults.max_page_limit),
            allocation_tolerance: match env::var("ALLOCATION_TOLERANCE") {
                Ok(raw) => Decimal::from_str(raw.trim()).map_err(|e| {
                    AppError::ConfigError(anyhow::anyhow!("Invalid ALLOCATION_TOLERANCE: {}", e))
                })?,
                Err(_) => defaults.allocation_tolerance,
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.bulk_chunk_size == 0 || self.allocation_chunk_size == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Chunk sizes must be greater than zero"
            )));
        }
        if self.default_page_limit < 1 || self.default_page_limit > self.max_page_limit {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DEFAULT_PAGE_LIMIT must be between 1 and MAX_PAGE_LIMIT"
            )));
        }
        if self.allocation_tolerance.is_sign_negative() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ALLOCATION_TOLERANCE must not be negative"
            )));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl ConsolidationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "consolidation-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", 2),
            },
            engine: EngineSettings::from_env()?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|raw| parse_origins(&raw))
                .unwrap_or_else(|_| {
                    vec![
                        "http://localhost:3000".to_string(),
                        "http://127.0.0.1:3000".to_string(),
                    ]
                }),
            seed_dev: env::var("SEED_DEV").map(|v| v == "1").unwrap_or(false),
        })
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = EngineSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.allocation_tolerance.to_string(), "0.01");
        assert_eq!(settings.max_page_limit, 500);
    }

    #[test]
    fn rejects_default_limit_above_max() {
        let settings = EngineSettings {
            default_page_limit: 600,
            ..EngineSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let settings = EngineSettings {
            bulk_chunk_size: 0,
            ..EngineSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn parses_comma_separated_origins() {
        assert_eq!(
            parse_origins(" http://a.test , ,http://b.test"),
            vec!["http://a.test", "http://b.test"]
        );
    }
}
