//! Application configuration
//!
//! Settings of the `actionflow` binary itself, separate from the engine's
//! [`FlowConfig`](crate::config::FlowConfig).

use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
    pub working_dir: PathBuf,
    /// Optional TOML file with engine settings
    pub config_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn new(verbose: u8) -> Result<Self> {
        let working_dir = std::env::current_dir()
            .map_err(|e| anyhow::anyhow!("Failed to get current directory: {}", e))?;

        Ok(Self {
            verbose,
            working_dir,
            config_file: None,
        })
    }

    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    /// Get the log level string based on verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            working_dir: PathBuf::from("."),
            config_file: None,
        }
    }
}
