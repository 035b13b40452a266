//! Top-level flow document

use crate::actions::StepDocument;
use crate::error::{FlowError, FlowResult};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Declared requirements; parsed and checked for syntax only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Requirements {
    /// Engine version range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Plugin id -> version range
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugins: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowDocument {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Requirements>,
    pub pipeline: Value,
}

impl FlowDocument {
    /// Build from an already parsed tree and check its shape
    pub fn from_value(value: Value) -> FlowResult<Self> {
        let document: Self = serde_json::from_value(value)
            .map_err(|e| FlowError::InvalidDocument(e.to_string()))?;
        document.validate()?;
        Ok(document)
    }

    pub fn validate(&self) -> FlowResult<()> {
        Version::parse(&self.version).map_err(|e| {
            FlowError::InvalidDocument(format!("version \"{}\": {e}", self.version))
        })?;

        if let Some(requires) = &self.requires {
            let ranges = requires
                .engine
                .iter()
                .map(|range| ("engine", range))
                .chain(requires.plugins.iter().map(|(id, range)| (id.as_str(), range)));
            for (name, range) in ranges {
                VersionReq::parse(range).map_err(|e| {
                    FlowError::InvalidDocument(format!("requires {name} \"{range}\": {e}"))
                })?;
            }
        }

        self.root_step().map(|_| ())
    }

    /// The single root step of the pipeline
    pub fn root_step(&self) -> FlowResult<StepDocument> {
        StepDocument::parse(&self.pipeline)
            .map_err(|e| FlowError::InvalidDocument(format!("pipeline: {e}")))
    }

    pub fn parsed_version(&self) -> FlowResult<Version> {
        Version::parse(&self.version)
            .map_err(|e| FlowError::InvalidDocument(e.to_string()))
    }
}
