//! Engine configuration and flow document loading

use crate::error::{FlowError, FlowResult};
use crate::template::TemplateDelimiters;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod loader;

pub use loader::{load_flow_document, parse_flow_document};

/// Environment variable enabling debug recording
pub const DEBUG_ENV: &str = "ACTIONFLOW_DEBUG";

/// Settings threaded into the dispatcher at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Record every snapshot step, not just children and failures
    pub debug: bool,
    pub delimiters: TemplateDelimiters,
    /// Capture ctx before and after the run in the report
    pub report_context: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            debug: false,
            delimiters: TemplateDelimiters::default(),
            report_context: true,
        }
    }
}

impl FlowConfig {
    pub fn from_toml_str(content: &str) -> FlowResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> FlowResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> FlowResult<()> {
        self.delimiters.validate().map_err(FlowError::Validation)
    }

    /// Apply `ACTIONFLOW_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(debug) = lookup(DEBUG_ENV) {
            self.debug = matches!(
                debug.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }
        self
    }
}
