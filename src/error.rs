//! Error types with fix suggestions

use std::fmt;

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// A single schema finding with a path-like pointer to the offending field.
///
/// Collected across the whole document so one compile attempt reports every
/// structural problem at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// JSON-pointer style path ("$" for the document root)
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn format_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compiler error taxonomy.
///
/// `Schema` aggregates every finding from the validation pass; all other
/// variants abort the pipeline at the stage they occur.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema validation failed ({} violation{}):\n{}",
        .0.len(),
        if .0.len() == 1 { "" } else { "s" },
        format_violations(.0))]
    Schema(Vec<SchemaViolation>),

    #[error("duplicate task name '{name}'")]
    DuplicateTaskName { name: String },

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    Cycle {
        /// Ordered cycle, starting and ending at the repeated task
        path: Vec<String>,
    },

    #[error("operator '{identifier}' could not be resolved: {reason}")]
    UnresolvableOperator { identifier: String, reason: String },

    #[error("failed to construct task '{task}' with operator '{operator}': {reason}")]
    Construction {
        task: String,
        operator: String,
        reason: String,
    },
}

impl CompileError {
    /// Ordered cycle path, if this is a cycle error
    pub fn cycle_path(&self) -> Option<&[String]> {
        match self {
            CompileError::Cycle { path } => Some(path),
            _ => None,
        }
    }

    /// Aggregated schema violations, if this is a schema error
    pub fn schema_violations(&self) -> Option<&[SchemaViolation]> {
        match self {
            CompileError::Schema(violations) => Some(violations),
            _ => None,
        }
    }
}

impl FixSuggestion for CompileError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            CompileError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            CompileError::Io(_) => Some("Check file path and permissions"),
            CompileError::Schema(_) => {
                Some("Fix the listed fields; every violation carries its document path")
            }
            CompileError::DuplicateTaskName { .. } => {
                Some("Task names are graph node identities and must be unique")
            }
            CompileError::UnknownDependency { .. } => {
                Some("depends_on entries must name tasks declared in this workflow")
            }
            CompileError::Cycle { .. } => {
                Some("Remove one edge of the cycle; tasks cannot depend on themselves transitively")
            }
            CompileError::UnresolvableOperator { .. } => Some(
                "Use a built-in operator name (see `dagsmith operators`) or a fully-qualified \
                 name resolvable by the configured loader",
            ),
            CompileError::Construction { .. } => {
                Some("Check the operator's required parameters in the task block")
            }
        }
    }
}
