//! Top-level run of a flow document

use super::{FlowDocument, FlowService};
use crate::actions::{ActionSnapshot, StepDocument};
use crate::config::load_flow_document;
use crate::context::{FlowContext, SharedParameters};
use crate::error::{FlowError, FlowResult};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Snapshot tree of a run plus ctx before and after it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRunReport {
    pub snapshot: ActionSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_after: Option<Value>,
}

impl FlowRunReport {
    pub fn successful(&self) -> bool {
        self.snapshot.successful
    }

    /// Turn a failed run into [`FlowError::FlowFailed`] with the leaf messages
    pub fn into_result(self) -> FlowResult<Self> {
        if self.successful() {
            Ok(self)
        } else {
            Err(FlowError::FlowFailed(self.snapshot.failure_messages()))
        }
    }
}

pub struct FlowRunner {
    service: FlowService,
}

impl FlowRunner {
    pub fn new(service: FlowService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &FlowService {
        &self.service
    }

    /// Fresh context using the configured delimiters
    pub fn new_context(&self) -> Arc<FlowContext> {
        Arc::new(FlowContext::new(self.service.config().delimiters))
    }

    /// Load a YAML document and run it with its directory as working directory
    pub async fn run_file(
        &self,
        path: &Path,
        context: Arc<FlowContext>,
    ) -> FlowResult<FlowRunReport> {
        let document = load_flow_document(path).await?;
        let wd = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| std::path::PathBuf::from("."));
        self.run(&wd, &document, context, SharedParameters::default())
            .await
    }

    /// Resolve global templates, check the root step and dispatch it.
    ///
    /// Structural problems are returned as errors before anything runs; a
    /// failed run still returns its report. `wd` is recorded on `parameters`
    /// unless the caller already set one.
    pub async fn run(
        &self,
        wd: &Path,
        document: &FlowDocument,
        context: Arc<FlowContext>,
        parameters: SharedParameters,
    ) -> FlowResult<FlowRunReport> {
        document.validate()?;
        parameters.update(|p| {
            p.wd.get_or_insert_with(|| wd.to_path_buf());
        });

        let pipeline =
            self.service
                .resolve_global(&document.pipeline, &context, &parameters, wd)?;
        let root = StepDocument::parse(&pipeline)
            .map_err(|e| FlowError::InvalidDocument(format!("pipeline: {e}")))?;
        if self.service.find_handler(&context, &root.id_or_alias).is_none() {
            return Err(FlowError::HandlerNotFound(root.id_or_alias));
        }

        let report_context = self.service.config().report_context;
        let context_before = report_context.then(|| context.ctx());

        info!(
            "Running flow {}{}",
            document.version,
            document
                .description
                .as_deref()
                .map(|d| format!(": {d}"))
                .unwrap_or_default()
        );
        let snapshot = self
            .service
            .execute_document(wd, &root, &context, &parameters)
            .await;

        if snapshot.successful {
            info!("Flow succeeded in {}ms", snapshot.duration);
        } else {
            error!("Flow failed in {}ms", snapshot.duration);
        }

        Ok(FlowRunReport {
            snapshot,
            context_before,
            context_after: report_context.then(|| context.ctx()),
        })
    }
}
