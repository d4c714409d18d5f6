//! Plain and advanced merges of a contribution into a target document.
//!
//! A contribution is "advanced" when it names at least one target id and
//! carries an instruction list:
//!
//! ```json
//! {
//!   "TargetID": "mech_def_1",
//!   "Instructions": [
//!     { "Action": "Replace", "JSONPath": "$.Description.Cost", "Value": 250 }
//!   ]
//! }
//! ```
//!
//! Anything else is deep-merged with [`merge_replace_arrays`].

use crate::error::{Error, Result};
use crate::instruction::Instruction;
use crate::json::{merge_replace_arrays, parse_game_json_file};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdvancedMerge {
    #[serde(rename = "TargetID", default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,

    #[serde(rename = "TargetIDs", default, skip_serializing_if = "Option::is_none")]
    pub target_ids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,

    pub instructions: Vec<Instruction>,
}

impl AdvancedMerge {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Reads an advanced merge file. Unreadable files are logged and yield `None`.
    pub fn from_file(path: &Utf8Path) -> Option<Self> {
        match parse_game_json_file(path).and_then(Self::from_value) {
            Ok(merge) => Some(merge),
            Err(e) => {
                tracing::warn!("Could not read AdvancedJSONMerge in path: {}: {}", path, e);
                None
            }
        }
    }

    /// `TargetID` followed by `TargetIDs`, skipping empty ids.
    pub fn targets(&self) -> Vec<&str> {
        self.target_id
            .iter()
            .chain(self.target_ids.iter().flatten())
            .map(String::as_str)
            .filter(|id| !id.is_empty())
            .collect()
    }

    /// Runs every instruction in order, stopping at the first failure.
    ///
    /// Instructions that select nothing are logged and skipped.
    pub fn apply(&self, target: &mut Value) -> Result<()> {
        for instruction in &self.instructions {
            if !instruction.process(target)? {
                tracing::warn!(
                    "An instruction (Action: '{}' JSONPath: '{}') did not perform anything",
                    instruction.action,
                    instruction.json_path
                );
            }
        }
        Ok(())
    }
}

pub fn is_advanced_merge(document: &Value) -> bool {
    let has = |key: &str| document.get(key).is_some_and(|v| !v.is_null());
    (has("TargetID") || has("TargetIDs")) && has("Instructions")
}

/// Merges one contribution into `target`, advanced or plain.
pub fn merge_into_target(target: &mut Value, contribution: Value) -> Result<()> {
    if is_advanced_merge(&contribution) {
        return AdvancedMerge::from_value(contribution)?.apply(target);
    }
    merge_replace_arrays(target, contribution);
    Ok(())
}

/// A target document and the contributions to fold into it, in load order.
#[derive(Debug, Clone)]
pub struct MergeJob {
    pub name: String,
    pub target: Value,
    pub contributions: Vec<Value>,
}

impl MergeJob {
    pub fn new(name: impl Into<String>, target: Value) -> Self {
        Self {
            name: name.into(),
            target,
            contributions: Vec::new(),
        }
    }

    pub fn with_contribution(mut self, contribution: Value) -> Self {
        self.contributions.push(contribution);
        self
    }
}

#[derive(Debug)]
pub struct MergeFailure {
    pub name: String,
    pub error: Error,
}

/// Runs every job, collecting failures instead of stopping at the first.
///
/// A failing job keeps whatever earlier contributions and instructions already
/// changed; its remaining contributions are skipped.
pub fn merge_documents(jobs: &mut [MergeJob]) -> Vec<MergeFailure> {
    let mut failures = Vec::new();
    for job in jobs.iter_mut() {
        let contributions = std::mem::take(&mut job.contributions);
        for contribution in contributions {
            if let Err(error) = merge_into_target(&mut job.target, contribution) {
                tracing::error!("Failed to merge into {}: {}", job.name, error);
                failures.push(MergeFailure {
                    name: job.name.clone(),
                    error,
                });
                break;
            }
        }
    }
    failures
}
