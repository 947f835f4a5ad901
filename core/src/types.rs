use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::Line;

/// Assembler flags keyed by name, sent along with every assemble request
pub type FlagConfiguration = BTreeMap<String, bool>;

/// Opaque presentation fragments (rendered panels) returned by the service
pub type Fragments = Map<String, JsonValue>;

/// Simulator state metadata attached to service responses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimState {
    #[serde(default)]
    pub run_index: u64,
    #[serde(default)]
    pub instruction_count: u64,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub next_source_line: Option<Line>,
}

/// Result of a single step on the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub executed_index: Option<u64>,
    #[serde(default)]
    pub next_index: u64,
    #[serde(default)]
    pub source_line: Option<Line>,
    #[serde(default)]
    pub source_command: Option<String>,
    #[serde(default)]
    pub next_source_line: Option<Line>,
}

/// Any successful service response
///
/// Only `state` and `step` are interpreted. Everything else is kept as-is
/// and forwarded to the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SimState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepReport>,
    #[serde(flatten)]
    pub fragments: Fragments,
}

/// Error body returned with a non-success status
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub line: Option<Line>,
}

/// Body of an assemble request
#[derive(Debug, Clone, Serialize)]
pub struct AssembleRequest<'a> {
    pub code: &'a str,
    pub flags: &'a FlagConfiguration,
}
