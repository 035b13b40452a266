//! Flow execution
//!
//! [`FlowService`] dispatches single steps to their handlers and records
//! snapshots; [`FlowRunner`] runs a whole [`FlowDocument`].

pub mod document;
pub mod runner;
pub mod service;

pub use document::{FlowDocument, Requirements};
pub use runner::{FlowRunReport, FlowRunner};
pub use service::FlowService;
