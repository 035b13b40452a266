//! Execution record of one step invocation
//!
//! A snapshot is created by the dispatcher before validation and finalized
//! by exactly one of [`ActionSnapshot::success`], [`ActionSnapshot::skipped`]
//! or [`ActionSnapshot::failure`]. Child snapshots and failures are always
//! recorded; every other step kind only when debug recording is enabled.

use crate::context::{DelegatedParameters, ValueChange};
use crate::error::FlowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StepPayload {
    Log(String),
    Options(Value),
    Context(Vec<ValueChange>),
    Start,
    Validated,
    Success,
    Skipped,
    Failure(FailureRecord),
    Child(Box<ActionSnapshot>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStep {
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub step: StepPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSnapshot {
    pub id_or_alias: String,
    pub metadata: Map<String, Value>,
    pub wd: PathBuf,
    pub idx: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<DelegatedParameters>,
    pub successful: bool,
    pub child_failure: bool,
    pub ignore_child_failure: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds between creation and completion
    pub duration: i64,
    pub steps: Vec<SnapshotStep>,
    #[serde(skip)]
    debug: bool,
}

impl ActionSnapshot {
    pub fn new(
        id_or_alias: impl Into<String>,
        metadata: Map<String, Value>,
        wd: impl Into<PathBuf>,
        idx: usize,
        debug: bool,
    ) -> Self {
        Self {
            id_or_alias: id_or_alias.into(),
            metadata,
            wd: wd.into(),
            idx,
            parameters: None,
            successful: false,
            child_failure: false,
            ignore_child_failure: false,
            created_at: Utc::now(),
            completed_at: None,
            duration: 0,
            steps: Vec::new(),
            debug,
        }
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    fn push(&mut self, step: StepPayload) {
        self.steps.push(SnapshotStep {
            created_at: Utc::now(),
            step,
        });
    }

    fn push_debug(&mut self, step: StepPayload) {
        if self.debug {
            self.push(step);
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.push_debug(StepPayload::Log(message.into()));
    }

    pub fn set_options(&mut self, options: Value) {
        self.push_debug(StepPayload::Options(options));
    }

    pub fn set_parameters(&mut self, parameters: DelegatedParameters) {
        if self.debug {
            self.parameters = Some(parameters);
        }
    }

    pub fn set_context_changes(&mut self, changes: Vec<ValueChange>) {
        if !changes.is_empty() {
            self.push_debug(StepPayload::Context(changes));
        }
    }

    pub fn start(&mut self) {
        self.push_debug(StepPayload::Start);
    }

    pub fn validated(&mut self) {
        self.push_debug(StepPayload::Validated);
    }

    pub fn success(&mut self) {
        self.push_debug(StepPayload::Success);
        self.complete(true);
    }

    pub fn skipped(&mut self) {
        self.push_debug(StepPayload::Skipped);
        self.complete(true);
    }

    pub fn failure(&mut self, err: &FlowError) {
        self.push(StepPayload::Failure(FailureRecord {
            message: err.to_string(),
            code: err.explicit_code().map(str::to_string),
        }));
        self.complete(false);
    }

    fn complete(&mut self, own_success: bool) {
        let now = Utc::now();
        self.duration = (now - self.created_at).num_milliseconds();
        self.completed_at = Some(now);
        self.successful = own_success && (self.ignore_child_failure || !self.child_failure);
    }

    /// Attach a child's record; a failed child marks this snapshot's `childFailure`
    pub fn register_child_action_snapshot(&mut self, child: ActionSnapshot) {
        if !child.successful {
            self.child_failure = true;
        }
        self.push(StepPayload::Child(Box::new(child)));
    }

    pub fn children(&self) -> impl Iterator<Item = &ActionSnapshot> {
        self.steps.iter().filter_map(|s| match &s.step {
            StepPayload::Child(child) => Some(child.as_ref()),
            _ => None,
        })
    }

    pub fn failure_record(&self) -> Option<&FailureRecord> {
        self.steps.iter().rev().find_map(|s| match &s.step {
            StepPayload::Failure(record) => Some(record),
            _ => None,
        })
    }

    /// Code of this snapshot's failure, else of its last failed child
    pub fn error_code(&self) -> Option<String> {
        if let Some(code) = self.failure_record().and_then(|r| r.code.clone()) {
            return Some(code);
        }
        self.children()
            .filter(|child| !child.successful)
            .last()
            .and_then(ActionSnapshot::error_code)
    }

    /// Leaf failure messages prefixed by the chain of step keys leading to them
    pub fn failure_messages(&self) -> Vec<String> {
        let mut messages = Vec::new();
        self.collect_failures("", &mut messages);
        messages
    }

    fn collect_failures(&self, prefix: &str, out: &mut Vec<String>) {
        if self.successful {
            return;
        }
        let path = if prefix.is_empty() {
            self.id_or_alias.clone()
        } else {
            format!("{prefix} > {}", self.id_or_alias)
        };

        let before = out.len();
        for child in self.children() {
            child.collect_failures(&path, out);
        }
        if let Some(record) = self.failure_record() {
            out.push(format!("{path}: {}", record.message));
        }
        if out.len() == before {
            out.push(format!("{path}: failed"));
        }
    }
}
