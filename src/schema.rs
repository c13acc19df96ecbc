//! Schema validation
//!
//! Validates the raw document against the recognized shape of workflow and
//! task declarations. Findings are collected across the whole document and
//! reported together, each with a path to the offending field. Unknown
//! fields are ignored for forward compatibility; wrong types of known
//! fields are rejected.
//!
//! This stage also produces the flattened per-task view: `depends_on`
//! normalized to a list, workflow `default_args` merged as a base that
//! per-task fields override, and reserved engine controls lifted out of the
//! parameter bag.

use std::collections::{BTreeMap, HashSet};

use jsonschema::Validator;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::error::{CompileError, SchemaViolation};
use crate::spec::{RawDocument, TaskOverrides, TaskSpec, ValidatedSpec, RESERVED_TASK_FIELDS};

/// dag_id and task names: graph identities, kept engine-safe
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap());

/// Opaque to the compiler beyond the format check
static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

static DOCUMENT_SCHEMA: Lazy<serde_json::Value> = Lazy::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["dag", "tasks"],
        "properties": {
            "dag": {
                "type": "object",
                "required": ["dag_id"],
                "properties": {
                    "dag_id": {"type": "string"},
                    "description": {"type": "string"},
                    "schedule_interval": {"type": ["string", "null"]},
                    "start_date": {"type": "string"},
                    "end_date": {"type": "string"},
                    "catchup": {"type": "boolean"},
                    "max_active_runs": {"type": "integer", "minimum": 1},
                    "max_active_tasks": {"type": "integer", "minimum": 1},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "default_args": {"type": "object"}
                }
            },
            "tasks": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["name", "operator"],
                    "properties": {
                        "name": {"type": "string"},
                        "operator": {"type": "string", "minLength": 1},
                        "depends_on": {
                            "oneOf": [
                                {"type": "string"},
                                {"type": "array", "items": {"type": "string"}}
                            ]
                        },
                        "retries": {"type": "integer", "minimum": 0},
                        "retry_delay_minutes": {"type": "number", "minimum": 0},
                        "pool": {"type": "string"},
                        "priority_weight": {"type": "integer"},
                        "queue": {"type": "string"},
                        "trigger_rule": {
                            "enum": [
                                "all_success",
                                "all_failed",
                                "all_done",
                                "one_success",
                                "one_failed",
                                "none_failed",
                                "none_skipped",
                                "dummy"
                            ]
                        }
                    }
                }
            }
        }
    })
});

static COMPILED_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    jsonschema::validator_for(&DOCUMENT_SCHEMA).expect("embedded document schema is valid")
});

/// Validates raw documents into [`ValidatedSpec`]s
pub struct SchemaValidator;

impl SchemaValidator {
    /// Run the full validation pass.
    ///
    /// Schema findings are aggregated into a single `CompileError::Schema`;
    /// a duplicate task name aborts with `DuplicateTaskNameError` semantics
    /// once the document shape itself is sound.
    pub fn validate(doc: &serde_yaml::Value) -> Result<ValidatedSpec, CompileError> {
        let instance = match serde_json::to_value(doc) {
            Ok(v) => v,
            Err(e) => {
                return Err(CompileError::Schema(vec![SchemaViolation::new(
                    "$",
                    format!("document is not a plain nested mapping: {}", e),
                )]))
            }
        };

        let mut violations: Vec<SchemaViolation> = COMPILED_SCHEMA
            .iter_errors(&instance)
            .map(|e| {
                let path = e.instance_path.to_string();
                let path = if path.is_empty() { "$".to_string() } else { path };
                SchemaViolation::new(path, e.to_string())
            })
            .collect();

        check_identifier_formats(&instance, &mut violations);

        if !violations.is_empty() {
            return Err(CompileError::Schema(violations));
        }

        // Shape is sound; the typed view cannot fail past this point
        let raw: RawDocument = serde_yaml::from_value(doc.clone())?;

        let mut seen: HashSet<&str> = HashSet::with_capacity(raw.tasks.len());
        for task in &raw.tasks {
            if !seen.insert(task.name.as_str()) {
                return Err(CompileError::DuplicateTaskName {
                    name: task.name.clone(),
                });
            }
        }

        Ok(flatten(raw))
    }
}

/// Format checks the JSON Schema types alone cannot express nicely.
/// Only fields that exist and already have the right type are checked;
/// everything else is reported by the schema pass.
fn check_identifier_formats(instance: &serde_json::Value, violations: &mut Vec<SchemaViolation>) {
    if let Some(dag) = instance.get("dag").and_then(|v| v.as_object()) {
        if let Some(id) = dag.get("dag_id").and_then(|v| v.as_str()) {
            if !IDENT_RE.is_match(id) {
                violations.push(SchemaViolation::new(
                    "/dag/dag_id",
                    format!(
                        "'{}' is not a valid identifier (letters, digits, '-', '_')",
                        id
                    ),
                ));
            }
        }
        for key in ["start_date", "end_date"] {
            if let Some(date) = dag.get(key).and_then(|v| v.as_str()) {
                if !DATE_RE.is_match(date) {
                    violations.push(SchemaViolation::new(
                        format!("/dag/{}", key),
                        format!("'{}' is not a YYYY-MM-DD date", date),
                    ));
                }
            }
        }
    }

    if let Some(tasks) = instance.get("tasks").and_then(|v| v.as_array()) {
        for (idx, task) in tasks.iter().enumerate() {
            if let Some(name) = task.get("name").and_then(|v| v.as_str()) {
                if !IDENT_RE.is_match(name) {
                    violations.push(SchemaViolation::new(
                        format!("/tasks/{}/name", idx),
                        format!(
                            "'{}' is not a valid task name (letters, digits, '-', '_')",
                            name
                        ),
                    ));
                }
            }
        }
    }
}

/// Produce the flattened per-task parameter view: workflow defaults as the
/// base, per-task fields overriding, reserved controls lifted out.
fn flatten(raw: RawDocument) -> ValidatedSpec {
    let mut base_params: BTreeMap<String, serde_yaml::Value> = BTreeMap::new();
    let mut base_overrides = TaskOverrides::default();
    for (key, value) in &raw.dag.default_args {
        if RESERVED_TASK_FIELDS.contains(&key.as_str()) {
            base_overrides.absorb(key, value);
        } else {
            base_params.insert(key.clone(), value.clone());
        }
    }

    let tasks = raw
        .tasks
        .into_iter()
        .map(|task| {
            let mut params = base_params.clone();
            let mut overrides = base_overrides.clone();
            for (key, value) in task.fields {
                if RESERVED_TASK_FIELDS.contains(&key.as_str()) {
                    overrides.absorb(&key, &value);
                } else {
                    params.insert(key, value);
                }
            }
            TaskSpec {
                name: task.name,
                operator: task.operator,
                depends_on: task
                    .depends_on
                    .map(|d| d.into_names())
                    .unwrap_or_default(),
                params,
                overrides,
            }
        })
        .collect();

    ValidatedSpec {
        workflow: raw.dag,
        tasks,
    }
}
