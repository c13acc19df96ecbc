//! Workflow specification data model
//!
//! Raw types mirror the document shape; validated types are the flattened
//! view the rest of the pipeline consumes. All of them are created fresh per
//! compilation and immutable once their stage completes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Document keys consumed by the compiler itself, never forwarded to an
/// operator constructor.
pub const RESERVED_TASK_FIELDS: &[&str] = &[
    "name",
    "operator",
    "depends_on",
    "retries",
    "retry_delay_minutes",
    "pool",
    "priority_weight",
    "queue",
    "trigger_rule",
];

/// Workflow metadata from the `dag` block.
///
/// Schedule, dates, and concurrency limits are opaque pass-through
/// configuration for the target engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowSpec {
    pub dag_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schedule_interval: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub catchup: Option<bool>,
    #[serde(default)]
    pub max_active_runs: Option<u32>,
    #[serde(default)]
    pub max_active_tasks: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub default_args: BTreeMap<String, Value>,
}

/// Raw task entry as declared in the document
#[derive(Debug, Clone, Deserialize)]
pub struct RawTask {
    pub name: String,
    pub operator: String,
    #[serde(default)]
    pub depends_on: Option<DependsOn>,
    /// Everything else: operator parameters and reserved engine controls
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// Handles string OR array for depends_on
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    Single(String),
    Multiple(Vec<String>),
}

impl DependsOn {
    /// Normalize to a duplicate-free list, preserving declaration order
    pub fn into_names(self) -> Vec<String> {
        let raw = match self {
            DependsOn::Single(s) => vec![s],
            DependsOn::Multiple(v) => v,
        };
        let mut names = Vec::with_capacity(raw.len());
        for name in raw {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// Typed view of the whole raw document
#[derive(Debug, Clone, Deserialize)]
pub struct RawDocument {
    pub dag: WorkflowSpec,
    pub tasks: Vec<RawTask>,
}

/// Engine-level task controls lifted out of the parameter bag.
///
/// Pass-through configuration: the compiler records these but never
/// interprets them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_minutes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_weight: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_rule: Option<String>,
}

impl TaskOverrides {
    /// Absorb one reserved key. Returns false if the key is not an engine
    /// control (callers keep it in the bag).
    pub(crate) fn absorb(&mut self, key: &str, value: &Value) -> bool {
        match key {
            "retries" => self.retries = value.as_u64().map(|v| v as u32),
            "retry_delay_minutes" => self.retry_delay_minutes = value.as_f64(),
            "pool" => self.pool = value.as_str().map(String::from),
            "priority_weight" => self.priority_weight = value.as_i64(),
            "queue" => self.queue = value.as_str().map(String::from),
            "trigger_rule" => self.trigger_rule = value.as_str().map(String::from),
            _ => return false,
        }
        true
    }
}

/// Validated task: graph node identity plus the flattened parameter view
/// (workflow defaults already merged, reserved fields already lifted out).
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub operator: String,
    pub depends_on: Vec<String>,
    pub params: BTreeMap<String, Value>,
    pub overrides: TaskOverrides,
}

/// Output of the validation stage: workflow metadata plus tasks in
/// declaration order.
#[derive(Debug, Clone)]
pub struct ValidatedSpec {
    pub workflow: WorkflowSpec,
    pub tasks: Vec<TaskSpec>,
}

impl ValidatedSpec {
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }
}
