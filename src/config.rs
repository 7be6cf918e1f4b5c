//! Environment-based configuration

use crate::pipeline::Backpressure;
use std::env;
use std::str::FromStr;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub pipeline: PipelineConfig,
    /// Frames queued per socket before broadcasts start dropping for it
    pub outbound_buffer: usize,
    /// JSON seed for the in-process directory
    pub directory_file: Option<String>,
    pub log_level: String,
}

/// Edit pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub capacity: usize,
    /// 0 blocks producers until a slot frees
    pub submit_timeout_ms: u64,
}

impl PipelineConfig {
    pub fn backpressure(&self) -> Backpressure {
        Backpressure::from_millis(self.submit_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8123,
            host: "0.0.0.0".to_string(),
            pipeline: PipelineConfig {
                capacity: 1024,
                submit_timeout_ms: 5000,
            },
            outbound_buffer: 256,
            directory_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load settings from the environment, after reading `.env` if present
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            port: parse_or("PORT", defaults.port),
            host: env::var("HOST").unwrap_or(defaults.host),
            pipeline: PipelineConfig {
                capacity: parse_or("PIPELINE_CAPACITY", defaults.pipeline.capacity).max(1),
                submit_timeout_ms: parse_or(
                    "PIPELINE_SUBMIT_TIMEOUT_MS",
                    defaults.pipeline.submit_timeout_ms,
                ),
            },
            outbound_buffer: parse_or("OUTBOUND_BUFFER", defaults.outbound_buffer).max(1),
            directory_file: env::var("DIRECTORY_FILE").ok().filter(|s| !s.trim().is_empty()),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
