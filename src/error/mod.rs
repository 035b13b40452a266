//! Error taxonomy for the execution core
//!
//! Validation and execution errors raised inside a step never escape the
//! dispatcher: they are recorded as `failure` steps on the step's snapshot.
//! Structural errors (malformed step, missing handler, malformed document)
//! and the top-level `FlowFailed` summary are the only errors callers of the
//! runner observe.

use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

/// The unified error type for the engine
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid step: {0}")]
    InvalidStep(String),

    #[error("No handler found for step key \"{0}\"")]
    HandlerNotFound(String),

    #[error("Invalid flow document: {0}")]
    InvalidDocument(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid path \"{path}\": {reason}")]
    Path { path: String, reason: String },

    #[error("{message}")]
    Action {
        message: String,
        code: Option<String>,
    },

    #[error("Flow failed:\n{}", .0.join("\n"))]
    FlowFailed(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl FlowError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a template error
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template(message.into())
    }

    /// Create an execution failure without an explicit code
    pub fn action(message: impl Into<String>) -> Self {
        Self::Action {
            message: message.into(),
            code: None,
        }
    }

    /// Create an execution failure carrying an error code
    pub fn action_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Action {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    /// Create a path error
    pub fn path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Code explicitly attached by the raiser of the error
    pub fn explicit_code(&self) -> Option<&str> {
        match self {
            Self::Action { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Code describing the error: the explicit code, or the category code
    pub fn code(&self) -> &str {
        match self {
            Self::Validation(_) => ErrorCode::VALIDATION,
            Self::InvalidStep(_) => ErrorCode::INVALID_STEP,
            Self::HandlerNotFound(_) => ErrorCode::HANDLER_NOT_FOUND,
            Self::InvalidDocument(_) => ErrorCode::INVALID_DOCUMENT,
            Self::Registry(_) => ErrorCode::REGISTRY,
            Self::Template(_) => ErrorCode::TEMPLATE,
            Self::Path { .. } => ErrorCode::PATH,
            Self::Action { code, .. } => code.as_deref().unwrap_or(ErrorCode::UNEXPECTED),
            Self::FlowFailed(_) => ErrorCode::FLOW_FAILED,
            Self::Io(_) => ErrorCode::IO,
            Self::Json(_) | Self::Yaml(_) | Self::Toml(_) => ErrorCode::SERIALIZATION,
        }
    }

    /// Whether the error is structural, i.e. detected before any step ran
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::InvalidStep(_) | Self::HandlerNotFound(_) | Self::InvalidDocument(_)
        )
    }
}

pub type FlowResult<T> = std::result::Result<T, FlowError>;
