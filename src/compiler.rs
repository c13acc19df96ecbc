//! Compilation pipeline
//!
//! One strict pass: validate → build graph → detect cycle → order →
//! instantiate → assemble. The schema stage aggregates its findings;
//! every later stage fails fast. A failed compilation exposes nothing.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Serialize;
use serde_yaml::Value;
use tracing::{debug, info};

use crate::error::CompileError;
use crate::graph::DependencyGraph;
use crate::operators::Operator;
use crate::parser;
use crate::registry::{OperatorRegistry, TaskFactory};
use crate::schema::SchemaValidator;
use crate::spec::{TaskSpec, ValidatedSpec, WorkflowSpec};

/// A task spec paired with its instantiated concrete object and its
/// materialized upstream edges.
#[derive(Debug)]
pub struct ResolvedTask {
    pub spec: TaskSpec,
    /// Names of tasks that must complete before this one
    pub upstream: Vec<String>,
    pub instance: Box<dyn Operator>,
}

/// Structural summary of a compiled (or structurally checked) workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSummary {
    pub dag_id: String,
    pub task_count: usize,
    /// Operator identifier multiset; the key set is the operator set
    pub operators: BTreeMap<String, usize>,
    /// Longest dependency chain, in edges
    pub max_depth: usize,
    pub parallel_groups: usize,
    pub has_dependencies: bool,
}

/// The final artifact: workflow metadata plus resolved tasks in
/// topological order.
#[derive(Debug)]
pub struct CompiledWorkflow {
    pub workflow: WorkflowSpec,
    pub order: Vec<String>,
    pub tasks: Vec<ResolvedTask>,
    pub summary: WorkflowSummary,
}

impl CompiledWorkflow {
    /// Engine-consumable JSON manifest. The compiler never writes this to
    /// disk itself; that is the CLI's job.
    pub fn manifest(&self) -> serde_json::Value {
        let tasks: Vec<serde_json::Value> = self
            .tasks
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.spec.name,
                    "operator": t.spec.operator,
                    "upstream": t.upstream,
                    "config": to_json(&t.spec.overrides),
                    "params": t.instance.engine_payload(),
                })
            })
            .collect();

        serde_json::json!({
            "dag": to_json(&self.workflow),
            "execution_order": self.order,
            "tasks": tasks,
            "summary": to_json(&self.summary),
        })
    }
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    // Validated documents already round-tripped through serde_json once
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// Orchestrates the compilation stages against one registry.
///
/// The registry is treated as read-only for the duration of every
/// compilation; register extra built-ins via [`registry_mut`] before the
/// first compile.
///
/// [`registry_mut`]: WorkflowCompiler::registry_mut
pub struct WorkflowCompiler {
    registry: OperatorRegistry,
}

impl WorkflowCompiler {
    /// Compiler over the built-in operator set
    pub fn new() -> Self {
        Self::with_registry(OperatorRegistry::with_builtins())
    }

    pub fn with_registry(registry: OperatorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    /// Mutable registry access, for pre-registration before compiling
    pub fn registry_mut(&mut self) -> &mut OperatorRegistry {
        &mut self.registry
    }

    /// Full compilation of a raw document
    pub fn compile(&self, doc: &Value) -> Result<CompiledWorkflow, CompileError> {
        let (spec, order, summary) = self.structural_pass(doc)?;

        let factory = TaskFactory::new(&self.registry);
        let by_name: HashMap<&str, &TaskSpec> =
            spec.tasks.iter().map(|t| (t.name.as_str(), t)).collect();

        let mut tasks = Vec::with_capacity(order.len());
        for name in &order {
            // topological order only ever names validated tasks
            let Some(&task) = by_name.get(name.as_str()) else {
                continue;
            };
            let instance = factory.instantiate(task)?;
            debug!(task = %task.name, operator = %task.operator, "instantiated task");
            tasks.push(ResolvedTask {
                spec: task.clone(),
                upstream: task.depends_on.clone(),
                instance,
            });
        }

        info!(
            dag_id = %summary.dag_id,
            tasks = summary.task_count,
            max_depth = summary.max_depth,
            "compiled workflow"
        );
        Ok(CompiledWorkflow {
            workflow: spec.workflow,
            order,
            tasks,
            summary,
        })
    }

    /// Structural-only entry point: validate, build the graph, prove
    /// acyclicity, and summarize — without resolving any operator type.
    pub fn check(&self, doc: &Value) -> Result<WorkflowSummary, CompileError> {
        let (_, _, summary) = self.structural_pass(doc)?;
        Ok(summary)
    }

    pub fn compile_str(&self, content: &str) -> Result<CompiledWorkflow, CompileError> {
        self.compile(&parser::parse_str(content)?)
    }

    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<CompiledWorkflow, CompileError> {
        self.compile(&parser::parse_file(path)?)
    }

    pub fn check_str(&self, content: &str) -> Result<WorkflowSummary, CompileError> {
        self.check(&parser::parse_str(content)?)
    }

    pub fn check_file(&self, path: impl AsRef<Path>) -> Result<WorkflowSummary, CompileError> {
        self.check(&parser::parse_file(path)?)
    }

    fn structural_pass(
        &self,
        doc: &Value,
    ) -> Result<(ValidatedSpec, Vec<String>, WorkflowSummary), CompileError> {
        let spec = SchemaValidator::validate(doc)?;
        debug!(dag_id = %spec.workflow.dag_id, tasks = spec.tasks.len(), "validated specification");

        let graph = DependencyGraph::build(&spec.tasks)?;
        if let Some(path) = graph.detect_cycle() {
            return Err(CompileError::Cycle { path });
        }
        let order = graph.topological_order()?;

        let mut operators: BTreeMap<String, usize> = BTreeMap::new();
        for task in &spec.tasks {
            *operators.entry(task.operator.clone()).or_insert(0) += 1;
        }
        let summary = WorkflowSummary {
            dag_id: spec.workflow.dag_id.clone(),
            task_count: spec.tasks.len(),
            operators,
            max_depth: graph.max_depth()?,
            parallel_groups: graph.parallel_groups()?.len(),
            has_dependencies: graph.has_edges(),
        };

        Ok((spec, order, summary))
    }
}

impl Default for WorkflowCompiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINE: &str = r#"
dag:
  dag_id: etl
  default_args:
    owner: data-team
tasks:
  - name: extract
    operator: BashOperator
    bash_command: "echo extract"
  - name: transform
    operator: BashOperator
    bash_command: "echo transform"
    depends_on: extract
  - name: load
    operator: BashOperator
    bash_command: "echo load"
    depends_on: [transform]
"#;

    #[test]
    fn compiles_linear_pipeline_in_order() {
        let compiled = WorkflowCompiler::new().compile_str(PIPELINE).unwrap();
        assert_eq!(compiled.order, vec!["extract", "transform", "load"]);
        assert_eq!(compiled.tasks.len(), 3);
        assert_eq!(compiled.tasks[2].upstream, vec!["transform"]);
        assert_eq!(compiled.summary.max_depth, 2);
        assert_eq!(compiled.summary.operators["BashOperator"], 3);
        assert!(compiled.summary.has_dependencies);
    }

    #[test]
    fn check_skips_operator_resolution() {
        let compiler = WorkflowCompiler::new();
        let yaml = r#"
dag: {dag_id: dry}
tasks:
  - name: mystery
    operator: some.unresolvable.Op
"#;
        // full compile fails on resolution, structural check passes
        assert!(matches!(
            compiler.compile_str(yaml),
            Err(CompileError::UnresolvableOperator { .. })
        ));
        let summary = compiler.check_str(yaml).unwrap();
        assert_eq!(summary.task_count, 1);
        assert_eq!(summary.operators.len(), 1);
    }

    #[test]
    fn cycle_aborts_before_instantiation() {
        let err = WorkflowCompiler::new()
            .compile_str(
                r#"
dag: {dag_id: looped}
tasks:
  - {name: a, operator: DummyOperator, depends_on: b}
  - {name: b, operator: DummyOperator, depends_on: a}
"#,
            )
            .unwrap_err();
        let path = err.cycle_path().expect("cycle error");
        assert_eq!(path.first(), path.last());
    }

    #[test]
    fn manifest_is_engine_shaped() {
        let compiled = WorkflowCompiler::new().compile_str(PIPELINE).unwrap();
        let manifest = compiled.manifest();
        assert_eq!(manifest["dag"]["dag_id"], "etl");
        assert_eq!(manifest["execution_order"][0], "extract");
        assert_eq!(manifest["tasks"][1]["upstream"][0], "extract");
        assert_eq!(
            manifest["tasks"][0]["params"]["bash_command"],
            "echo extract"
        );
        assert_eq!(manifest["summary"]["task_count"], 3);
    }

    #[test]
    fn recompilation_is_deterministic() {
        let compiler = WorkflowCompiler::new();
        let a = compiler.compile_str(PIPELINE).unwrap();
        let b = compiler.compile_str(PIPELINE).unwrap();
        assert_eq!(a.order, b.order);
        assert_eq!(a.summary, b.summary);
        assert_eq!(a.manifest(), b.manifest());
    }
}
