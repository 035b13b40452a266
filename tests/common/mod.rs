//! Common test utilities and helpers

#![allow(dead_code)]

use actionflow::actions::StepPayload;
use actionflow::ActionSnapshot;
use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Log messages a snapshot recorded (debug mode only)
pub fn logs_of(snapshot: &ActionSnapshot) -> Vec<String> {
    snapshot
        .steps
        .iter()
        .filter_map(|step| match &step.step {
            StepPayload::Log(message) => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Log messages of each direct child, in registration order
pub fn child_logs(snapshot: &ActionSnapshot) -> Vec<Vec<String>> {
    snapshot.children().map(logs_of).collect()
}

/// Temporary directory holding flow documents
pub struct FlowDir {
    temp_dir: TempDir,
}

impl FlowDir {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    pub fn path(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    /// Write `content` to `name` inside the directory
    pub fn write(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, content)?;
        Ok(path)
    }
}
