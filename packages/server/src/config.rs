// ABOUTME: Environment-driven server configuration
// ABOUTME: All knobs come from VANTAGE_* variables with workable defaults

use std::env;
use std::num::ParseIntError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid port number: {0}")]
    InvalidPort(#[from] ParseIntError),
    #[error("Port {0} is out of valid range (1-65535)")]
    PortOutOfRange(u16),
    #[error("Invalid value for {0}: {1}")]
    InvalidNumber(&'static str, String),
}

#[derive(Debug)]
pub struct Config {
    pub port: u16,
    pub db_path: String,
    pub cors_origin: String,
    pub anthropic_api_key: Option<String>,
    pub generation_timeout_secs: u64,
    pub replay_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port_str = env::var("VANTAGE_PORT").unwrap_or_else(|_| "4820".to_string());

        let port = port_str.parse::<u16>()?;

        if port == 0 {
            return Err(ConfigError::PortOutOfRange(port));
        }

        let db_path = env::var("VANTAGE_DB_PATH").unwrap_or_else(|_| default_db_path());

        let cors_origin = env::var("VANTAGE_CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        let anthropic_api_key = env::var("ANTHROPIC_API_KEY").ok();

        let generation_timeout_secs =
            parse_u64("VANTAGE_GENERATION_TIMEOUT_SECS", vantage_ai::DEFAULT_TIMEOUT_SECS)?;

        let replay_delay_ms =
            parse_u64("VANTAGE_REPLAY_DELAY_MS", vantage_api::DEFAULT_REPLAY_DELAY_MS)?;

        Ok(Config {
            port,
            db_path,
            cors_origin,
            anthropic_api_key,
            generation_timeout_secs,
            replay_delay_ms,
        })
    }
}

fn parse_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber(var, raw)),
        Err(_) => Ok(default),
    }
}

fn default_db_path() -> String {
    vantage_core::database_file().display().to_string()
}
