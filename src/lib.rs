//! Dagsmith - compiler for declarative YAML workflow specifications
//!
//! Turns a `dag` + `tasks` document into a validated, topologically ordered
//! task graph with concrete, engine-consumable task objects. The compiler
//! never executes tasks and never talks to a live system.

pub mod compiler;
pub mod error;
pub mod graph;
pub mod operators;
pub mod parser;
pub mod registry;
pub mod schema;
pub mod spec;

pub use compiler::{CompiledWorkflow, ResolvedTask, WorkflowCompiler, WorkflowSummary};
pub use error::{CompileError, FixSuggestion, SchemaViolation};
pub use graph::DependencyGraph;
pub use operators::Operator;
pub use registry::{OperatorConstructor, OperatorLoader, OperatorRegistry, TaskContext, TaskFactory};
pub use schema::SchemaValidator;
pub use spec::{TaskOverrides, TaskSpec, ValidatedSpec, WorkflowSpec};
