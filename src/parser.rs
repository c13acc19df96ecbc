//! YAML front door
//!
//! Turns file bytes into the generic nested-mapping document the compiler
//! consumes. Parsing itself is serde_yaml's job; this module only maps
//! failures into the compiler taxonomy and rejects empty documents.

use std::path::Path;

use serde_yaml::Value;

use crate::error::{CompileError, SchemaViolation};

/// Parse a specification file into a raw document value
pub fn parse_file(path: impl AsRef<Path>) -> Result<Value, CompileError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    parse_str(&content)
}

/// Parse specification content into a raw document value
pub fn parse_str(content: &str) -> Result<Value, CompileError> {
    if content.trim().is_empty() {
        return Err(CompileError::Schema(vec![SchemaViolation::new(
            "$",
            "document is empty",
        )]));
    }
    let doc: Value = serde_yaml::from_str(content)?;
    if doc.is_null() {
        return Err(CompileError::Schema(vec![SchemaViolation::new(
            "$",
            "document is empty",
        )]));
    }
    Ok(doc)
}
