//! The program object: global state shared by every task, global-init, and
//! `entrypoint` invocation (§4.5).

use std::sync::Arc;

use hashbrown::HashMap;

use crate::concurrency::{PoolRegistry, ResponseMapRegistry, TaskRegistry};
use crate::config::ProgramConfig;
use crate::error::{VmError, VmResult};
use crate::function::Function;
use crate::handles::{ArrayPool, BufferPool, StringPool};
use crate::ids::{FunctionId, TaskHandle};
use crate::operation::{Block, Context};
use crate::scope::{ActivatedScope, ScopeDescription, SharedScope};
use crate::types::TypeRegistry;
use crate::value::RValue;

/// Owns every piece of process-wide state a running program needs: the
/// type registries, the three handle pools, the global scope, the
/// function table, and the concurrency registries (§4.5, §9 open question
/// on per-program vs. process-global registries — resolved in DESIGN.md by
/// making all of this live on `Program` rather than in statics).
pub struct Program {
    pub config: ProgramConfig,
    pub types: TypeRegistry,
    pub strings: StringPool,
    pub buffers: BufferPool,
    pub arrays: ArrayPool,
    pub task_registry: TaskRegistry,
    pub thread_pools: PoolRegistry,
    pub response_maps: ResponseMapRegistry,

    global_scope: SharedScope,
    global_init: Option<Block>,
    functions: HashMap<FunctionId, Arc<Function>>,
    entrypoint_name: Arc<str>,
    function_names: HashMap<Arc<str>, FunctionId>,
}

impl Program {
    /// Builds a program from the loader's already-constructed pieces: the
    /// global scope description, every function definition, an optional
    /// global-init block, and the name of the function to invoke as
    /// `entrypoint` (§4.5, §6). Resets the type registries and handle
    /// pools as part of construction, matching the source's "construction
    /// resets the process-global tables" rule (§4.5) — here scoped to this
    /// one `Program` instance instead of a process-wide static.
    pub fn new(
        config: ProgramConfig,
        global_description: Arc<ScopeDescription>,
        functions: Vec<Function>,
        global_init: Option<Block>,
        entrypoint_name: impl Into<Arc<str>>,
    ) -> Arc<Self> {
        let types = TypeRegistry::new();
        types.reset();
        let strings = StringPool::new();
        strings.clear();
        let buffers = BufferPool::new();
        let arrays = ArrayPool::new();

        let global_scope = ActivatedScope::enter_heap_frame(global_description, TaskHandle::INVALID);

        let mut function_names = HashMap::new();
        let mut function_table = HashMap::new();
        for function in functions {
            function_names.insert(function.name.clone(), function.id);
            function_table.insert(function.id, Arc::new(function));
        }

        Arc::new(Self {
            config,
            types,
            strings,
            buffers,
            arrays,
            task_registry: TaskRegistry::new(),
            thread_pools: PoolRegistry::new(),
            response_maps: ResponseMapRegistry::new(),
            global_scope,
            global_init,
            functions: function_table,
            entrypoint_name: entrypoint_name.into(),
            function_names,
        })
    }

    /// A bare program with an empty global scope and no functions, for
    /// exercising individual operations/blocks/functions in isolation
    /// without going through the loader.
    pub fn new_for_tests() -> Arc<Self> {
        Self::new(
            ProgramConfig::default(),
            Arc::new(ScopeDescription::new(None)),
            Vec::new(),
            None,
            "entrypoint",
        )
    }

    /// A fresh `Context` on the main task's identity, for unit tests that
    /// only need to execute one block/operation/function in isolation.
    /// Consumes the `Arc<Program>` the way `execute` consumes its own
    /// top-level context, since a test only needs one context per program.
    pub fn test_context(self: Arc<Self>) -> Context {
        let handle = self.task_registry.allocate();
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.task_registry.register(handle, sender, None);
        let scope = self.global_scope();
        Context::new(self, scope, handle, receiver)
    }

    pub fn global_scope(&self) -> SharedScope {
        self.global_scope.clone()
    }

    pub fn function(&self, id: FunctionId) -> VmResult<Arc<Function>> {
        self.functions
            .get(&id)
            .cloned()
            .ok_or_else(|| VmError::internal_failure(format!("unknown function id {id}")))
    }

    pub fn function_by_name(&self, name: &str) -> VmResult<Arc<Function>> {
        let id = self
            .function_names
            .get(name)
            .copied()
            .ok_or_else(|| VmError::internal_failure(format!("unknown function '{name}'")))?;
        self.function(id)
    }

    pub fn response_map(&self, name: &str) -> VmResult<Arc<crate::concurrency::messaging::ResponseMap>> {
        self.response_maps
            .get(name)
            .ok_or_else(|| VmError::internal_failure(format!("unknown response map '{name}'")))
    }

    /// Materializes an array RValue into the array pool, allocating a
    /// fresh backing handle the first time a value escapes into a
    /// variable assignment (§4.3 last paragraph). Already-backed arrays are
    /// refreshed in place so repeated assignment of the same variable does
    /// not leak pool entries.
    pub fn materialize_array(&self, value: RValue) -> RValue {
        match value {
            RValue::Array {
                element_type,
                elements,
                backing: None,
            } => {
                let handle = self.arrays.add(element_type.clone(), elements.clone());
                RValue::Array {
                    element_type,
                    elements,
                    backing: Some(handle),
                }
            }
            RValue::Array {
                element_type,
                elements,
                backing: Some(handle),
            } => {
                self.arrays.set(handle, elements.clone());
                RValue::Array {
                    element_type,
                    elements,
                    backing: Some(handle),
                }
            }
            other => other,
        }
    }

    /// Runs the program exactly once (§4.5): calls the host's
    /// pre-execution hook, activates the global scope's heap frame
    /// already built during construction, runs the global-init block (if
    /// any) against it, invokes `entrypoint`, waits for every spawned
    /// thread to finish, and returns entrypoint's result.
    pub fn execute(self: Arc<Self>) -> VmResult<RValue> {
        self.config
            .host
            .pre_execution()
            .map_err(VmError::internal_failure)?;

        let handle = self.task_registry.allocate();
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.task_registry.register(handle, sender, None);
        let mut ctx = Context::new(self.clone(), self.global_scope(), handle, receiver);

        if let Some(init) = &self.global_init {
            log::debug!("running global-init block");
            init.execute(&mut ctx, false, true, 0)?;
        }

        let entrypoint = self.function_by_name(&self.entrypoint_name)?;
        log::info!("invoking entrypoint '{}'", self.entrypoint_name);
        let result = entrypoint.invoke(&mut ctx, Vec::new())?;

        self.task_registry.join_all();
        if !ctx.stack.is_empty() {
            return Err(VmError::internal_failure(
                "primary stack was not empty at program exit",
            ));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    #[test]
    fn new_for_tests_has_an_empty_global_scope() {
        let program = Program::new_for_tests();
        assert!(program.function_by_name("entrypoint").is_err());
        let _ = program.global_scope();
    }

    #[test]
    fn materialize_array_assigns_a_stable_backing_handle() {
        let program = Program::new_for_tests();
        let value = RValue::Array {
            element_type: ValueKind::Integer,
            elements: vec![RValue::Integer(1)],
            backing: None,
        };
        let materialized = program.materialize_array(value);
        match materialized {
            RValue::Array { backing: Some(handle), .. } => {
                assert!(!handle.is_invalid());
            }
            other => panic!("expected a backed array, got {other:?}"),
        }
    }

    #[test]
    fn execute_runs_entrypoint_and_reports_its_result() {
        let returns = {
            let mut returns = ScopeDescription::new(None);
            returns.declare_variable("result", ValueKind::Integer).unwrap();
            returns
        };
        let body = Block::with_scope(
            vec![
                crate::operation::Operation::Assign {
                    target: Arc::from("result"),
                    value: Box::new(crate::operation::Operation::Literal(RValue::Integer(42))),
                },
                crate::operation::Operation::Return,
            ],
            Arc::new(ScopeDescription::new(None)),
        );
        let entrypoint = Function {
            id: FunctionId(1),
            name: Arc::from("entrypoint"),
            params: Arc::new(ScopeDescription::new(None)),
            returns: Arc::new(returns),
            signature: crate::types::FunctionSignature::default(),
            body,
        };
        let program = Program::new(
            ProgramConfig::default(),
            Arc::new(ScopeDescription::new(None)),
            vec![entrypoint],
            None,
            "entrypoint",
        );
        let result = program.execute().expect("entrypoint should run to completion");
        assert_eq!(result, RValue::Integer(42));
    }
}
