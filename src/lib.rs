//! # actionflow
//!
//! A declarative pipeline executor. A YAML flow document describes a tree of
//! actions; every step is dispatched to a registered handler, and the run
//! produces a tree of execution snapshots.
//!
//! ## Usage
//!
//! ```bash
//! actionflow run flow.yml [--debug] [--report] [-v]
//! ```
//!
//! ## Modules
//!
//! - `actions` - Handler and processor traits, the handler registry, snapshots and built-in handlers
//! - `app` - Binary-level logging and fatal error handling
//! - `config` - Engine configuration and flow document loading
//! - `context` - Shared flow context, delegated parameters and the path mini-language
//! - `error` - Error type and error codes
//! - `flow` - The dispatcher and the top-level runner
//! - `template` - Template tag resolution
//! - `testing` - Mock handlers and helpers for tests
pub mod actions;
pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod flow;
pub mod template;

pub mod testing;

pub use actions::{
    ActionHandler, ActionHandlerMetadata, ActionHandlersRegistry, ActionInvocation,
    ActionProcessor, ActionSnapshot,
};
pub use config::FlowConfig;
pub use context::{DelegatedParameters, FlowContext, SharedParameters};
pub use error::{ErrorCode, FlowError, FlowResult};
pub use flow::{FlowDocument, FlowRunReport, FlowRunner, FlowService};
