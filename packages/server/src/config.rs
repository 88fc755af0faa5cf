use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Runtime configuration loaded from environment variables.
///
/// Platform tunables (voting increments, termination limits, edit budgets)
/// live in the `platform_config` database row instead - see
/// [`crate::domains::platform::models::PlatformConfig`].
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Cron expression for the MRP expiration sweep.
    pub sweep_schedule: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            sweep_schedule: env::var("SWEEP_SCHEDULE")
                .unwrap_or_else(|_| "0 * * * * *".to_string()),
        })
    }
}
