//! Runtime configuration for the reasoning engine.
//!
//! Settings deserialize from YAML with serde; every field is optional and
//! falls back to the defaults below, so an empty document is a valid
//! configuration.

use serde::{Deserialize, Serialize};

/// Budgets and toggles for a [`crate::reasoning::ReasoningDomain`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerSettings {
    /// Maximum interpreter stack depth; exceeding it ends the query as
    /// exhausted rather than as an error.
    pub max_depth: usize,
    /// Maximum interpreter steps per query.
    pub max_tries: usize,
    /// Number of recent stack snapshots retained for the trace.
    pub stacks_to_keep: usize,
    /// Which derived ontologies to feed into the axiom set.
    pub inference: InferenceSettings,
}

impl Default for ReasonerSettings {
    fn default() -> Self {
        Self {
            max_depth: 128,
            max_tries: 50_000,
            stacks_to_keep: 16,
            inference: InferenceSettings::default(),
        }
    }
}

/// Toggles for the derived closure ontologies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// Materialise the `sub-type-of` closure.
    pub sub_type_closure: bool,
    /// Materialise the `instance-of` closure.
    pub instance_of_closure: bool,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            sub_type_closure: true,
            instance_of_closure: true,
        }
    }
}

impl ReasonerSettings {
    /// Parses settings from a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}
