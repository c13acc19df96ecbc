//! Operator resolution
//!
//! Maps a type identifier to a constructor capability. Built-ins live in a
//! table that callers may extend before compilation begins; identifiers
//! containing a qualifying separator are external and go through an
//! injectable [`OperatorLoader`] (stubbable in tests, never a hidden global
//! lookup). Loaded constructors are cached per identifier, so the registry
//! stays cheap to share read-only across compilations.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::CompileError;
use crate::operators::{
    BashOperator, BranchPythonOperator, DummyOperator, EmailOperator, ExternalTaskSensor,
    FileSensor, HttpSensor, Operator, PythonOperator, S3KeySensor, ShortCircuitOperator,
    SqlSensor,
};
use crate::spec::TaskSpec;

/// Identifiers containing this separator are fully-qualified external names
pub const QUALIFIED_SEPARATOR: char = '.';

/// Everything a constructor gets to see: the task identity and its
/// non-reserved parameter bag.
pub struct TaskContext<'a> {
    pub name: &'a str,
    pub operator: &'a str,
    pub params: &'a BTreeMap<String, serde_yaml::Value>,
}

/// Constructor capability: turns a task context into a concrete task object
pub trait OperatorConstructor: Send + Sync {
    fn construct(&self, ctx: &TaskContext<'_>) -> Result<Box<dyn Operator>, String>;
}

impl std::fmt::Debug for dyn OperatorConstructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OperatorConstructor")
    }
}

impl<F> OperatorConstructor for F
where
    F: Fn(&TaskContext<'_>) -> Result<Box<dyn Operator>, String> + Send + Sync,
{
    fn construct(&self, ctx: &TaskContext<'_>) -> Result<Box<dyn Operator>, String> {
        self(ctx)
    }
}

/// Load-by-qualified-name capability for external operator types.
///
/// An injectable dependency: embedders wire their plugin mechanism in,
/// tests stub it out.
pub trait OperatorLoader: Send + Sync {
    fn load(&self, identifier: &str) -> Result<Arc<dyn OperatorConstructor>, String>;
}

/// Registry of operator identifiers → constructor capabilities.
///
/// Mutable before use, read-only during compilation.
pub struct OperatorRegistry {
    builtins: BTreeMap<String, Arc<dyn OperatorConstructor>>,
    loader: Option<Box<dyn OperatorLoader>>,
    /// Dynamic-load results, keyed by identifier
    loaded: Mutex<HashMap<String, Arc<dyn OperatorConstructor>>>,
}

fn constructor<F>(f: F) -> Arc<dyn OperatorConstructor>
where
    F: Fn(&TaskContext<'_>) -> Result<Box<dyn Operator>, String> + Send + Sync + 'static,
{
    Arc::new(f)
}

macro_rules! builtin {
    ($registry:expr, $name:literal, $type:ident) => {
        $registry.register(
            $name,
            constructor(|ctx: &TaskContext<'_>| {
                $type::from_params(ctx.params).map(|op| Box::new(op) as Box<dyn Operator>)
            }),
        );
    };
}

impl OperatorRegistry {
    /// Registry with no built-ins and no loader
    pub fn empty() -> Self {
        Self {
            builtins: BTreeMap::new(),
            loader: None,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Registry pre-populated with the built-in operator set
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        builtin!(registry, "BashOperator", BashOperator);
        builtin!(registry, "PythonOperator", PythonOperator);
        builtin!(registry, "BranchPythonOperator", BranchPythonOperator);
        builtin!(registry, "ShortCircuitOperator", ShortCircuitOperator);
        builtin!(registry, "EmailOperator", EmailOperator);
        builtin!(registry, "DummyOperator", DummyOperator);
        builtin!(registry, "FileSensor", FileSensor);
        builtin!(registry, "HttpSensor", HttpSensor);
        builtin!(registry, "S3KeySensor", S3KeySensor);
        builtin!(registry, "SqlSensor", SqlSensor);
        builtin!(registry, "ExternalTaskSensor", ExternalTaskSensor);
        registry
    }

    /// Register an additional built-in mapping. Must happen before any
    /// compilation that uses this registry begins.
    pub fn register(&mut self, name: impl Into<String>, ctor: Arc<dyn OperatorConstructor>) {
        self.builtins.insert(name.into(), ctor);
    }

    /// Install the dynamic loader for fully-qualified identifiers
    pub fn set_loader(&mut self, loader: Box<dyn OperatorLoader>) {
        self.loader = Some(loader);
    }

    pub fn with_loader(mut self, loader: Box<dyn OperatorLoader>) -> Self {
        self.set_loader(loader);
        self
    }

    /// Built-in identifiers in sorted order
    pub fn builtin_names(&self) -> Vec<&str> {
        self.builtins.keys().map(String::as_str).collect()
    }

    pub fn is_builtin(&self, identifier: &str) -> bool {
        self.builtins.contains_key(identifier)
    }

    /// Resolve an identifier: built-in table first, then the dynamic loader
    /// for qualified names. Load results are cached per identifier.
    pub fn resolve(
        &self,
        identifier: &str,
    ) -> Result<Arc<dyn OperatorConstructor>, CompileError> {
        if let Some(ctor) = self.builtins.get(identifier) {
            return Ok(Arc::clone(ctor));
        }

        if !identifier.contains(QUALIFIED_SEPARATOR) {
            return Err(CompileError::UnresolvableOperator {
                identifier: identifier.to_string(),
                reason: format!(
                    "not a built-in operator (known: {})",
                    self.builtin_names().join(", ")
                ),
            });
        }

        {
            let cache = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(ctor) = cache.get(identifier) {
                return Ok(Arc::clone(ctor));
            }
        }

        let loader = self.loader.as_ref().ok_or_else(|| {
            CompileError::UnresolvableOperator {
                identifier: identifier.to_string(),
                reason: "no dynamic loader configured for external operator types".to_string(),
            }
        })?;

        let ctor = loader
            .load(identifier)
            .map_err(|reason| CompileError::UnresolvableOperator {
                identifier: identifier.to_string(),
                reason,
            })?;

        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identifier.to_string(), Arc::clone(&ctor));
        Ok(ctor)
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Consumes validated task descriptors plus the registry to produce concrete
/// task instances, wrapping constructor failures with the task identity.
pub struct TaskFactory<'r> {
    registry: &'r OperatorRegistry,
}

impl<'r> TaskFactory<'r> {
    pub fn new(registry: &'r OperatorRegistry) -> Self {
        Self { registry }
    }

    pub fn instantiate(&self, task: &TaskSpec) -> Result<Box<dyn Operator>, CompileError> {
        let ctor = self.registry.resolve(&task.operator)?;
        let ctx = TaskContext {
            name: &task.name,
            operator: &task.operator,
            params: &task.params,
        };
        ctor.construct(&ctx)
            .map_err(|reason| CompileError::Construction {
                task: task.name.clone(),
                operator: task.operator.clone(),
                reason,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::TaskOverrides;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn task(operator: &str, params_yaml: &str) -> TaskSpec {
        TaskSpec {
            name: "t".to_string(),
            operator: operator.to_string(),
            depends_on: Vec::new(),
            params: serde_yaml::from_str(params_yaml).unwrap(),
            overrides: TaskOverrides::default(),
        }
    }

    /// Stub loader that accepts one qualified name and counts loads
    struct StubLoader {
        known: String,
        loads: Arc<AtomicUsize>,
    }

    impl OperatorLoader for StubLoader {
        fn load(&self, identifier: &str) -> Result<Arc<dyn OperatorConstructor>, String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if identifier == self.known {
                Ok(constructor(|ctx: &TaskContext<'_>| {
                    DummyOperator::from_params(ctx.params)
                        .map(|op| Box::new(op) as Box<dyn Operator>)
                }))
            } else {
                Err(format!("module path '{}' not found", identifier))
            }
        }
    }

    #[test]
    fn builtins_resolve_directly() {
        let registry = OperatorRegistry::with_builtins();
        assert!(registry.resolve("BashOperator").is_ok());
        assert!(registry.is_builtin("DummyOperator"));
        assert_eq!(registry.builtin_names().len(), 11);
    }

    #[test]
    fn unqualified_unknown_name_lists_builtins() {
        let registry = OperatorRegistry::with_builtins();
        let err = registry.resolve("NopeOperator").unwrap_err();
        match err {
            CompileError::UnresolvableOperator { identifier, reason } => {
                assert_eq!(identifier, "NopeOperator");
                assert!(reason.contains("BashOperator"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn qualified_name_without_loader_fails_with_reason() {
        let registry = OperatorRegistry::with_builtins();
        let err = registry.resolve("mycompany.operators.CustomOp").unwrap_err();
        match err {
            CompileError::UnresolvableOperator { identifier, reason } => {
                assert_eq!(identifier, "mycompany.operators.CustomOp");
                assert!(reason.contains("no dynamic loader"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn loader_results_are_cached_per_identifier() {
        let loads = Arc::new(AtomicUsize::new(0));
        let mut registry = OperatorRegistry::with_builtins();
        registry.set_loader(Box::new(StubLoader {
            known: "ext.Op".to_string(),
            loads: Arc::clone(&loads),
        }));

        assert!(registry.resolve("ext.Op").is_ok());
        assert!(registry.resolve("ext.Op").is_ok());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn loader_failure_carries_underlying_message() {
        let registry = OperatorRegistry::with_builtins().with_loader(Box::new(StubLoader {
            known: "ext.Op".to_string(),
            loads: Arc::new(AtomicUsize::new(0)),
        }));
        let err = registry.resolve("no.such.Operator").unwrap_err();
        assert!(err.to_string().contains("no.such.Operator"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn pre_registered_builtins_take_precedence() {
        let mut registry = OperatorRegistry::with_builtins();
        registry.register(
            "TeamOperator",
            constructor(|ctx: &TaskContext<'_>| {
                DummyOperator::from_params(ctx.params)
                    .map(|op| Box::new(op) as Box<dyn Operator>)
            }),
        );
        assert!(registry.resolve("TeamOperator").is_ok());
    }

    #[test]
    fn factory_wraps_constructor_failures() {
        let registry = OperatorRegistry::with_builtins();
        let factory = TaskFactory::new(&registry);
        let err = factory
            .instantiate(&task("BashOperator", "{}"))
            .unwrap_err();
        match err {
            CompileError::Construction {
                task,
                operator,
                reason,
            } => {
                assert_eq!(task, "t");
                assert_eq!(operator, "BashOperator");
                assert!(reason.contains("bash_command"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn factory_builds_concrete_instances() {
        let registry = OperatorRegistry::with_builtins();
        let factory = TaskFactory::new(&registry);
        let op = factory
            .instantiate(&task("BashOperator", r#"{bash_command: "echo"}"#))
            .unwrap();
        assert_eq!(op.operator_type(), "BashOperator");
    }
}
