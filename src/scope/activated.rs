//! Runtime activation of a [`ScopeDescription`] (§3, §4.2): variable
//! storage, ghost sets, futures, and the `effective-tuple` multi-return
//! rule.
//!
//! Activated scopes form a tree whose edges only ever point from a child
//! towards its parent or its ghosted sources — never back down — so the
//! redesign note's goal ("replace cyclic parent-scope pointers with arena
//! indices") is satisfied here by a plain `Arc<Mutex<ActivatedScope>>`
//! tree instead of a hand-rolled index arena: there is no cycle to break
//! out of in the first place, and `Arc` already gives the "lifetime
//! matches the call stack, dropped when the last reference goes away"
//! behaviour the arena was chasing, without introducing a second indexing
//! scheme alongside it (see DESIGN.md).

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

use hashbrown::HashMap;

use crate::error::{VmError, VmResult};
use crate::ids::TaskHandle;
use crate::scope::description::{MemberKind, ScopeDescription};
use crate::stack::ValueStack;
use crate::value::RValue;

/// Shared handle to one runtime scope activation. Parent links, ghost
/// targets, and reference bindings all clone this handle rather than
/// borrowing, so a scope outlives any one of its referrers.
pub type SharedScope = Arc<Mutex<ActivatedScope>>;

/// A bound reference-parameter target: which scope owns the storage and
/// at what member index (§3 "Address" primitive kind).
#[derive(Clone)]
pub struct StorageSlot {
    pub scope: SharedScope,
    pub index: usize,
}

impl StorageSlot {
    pub fn read(&self) -> RValue {
        self.scope.lock().unwrap().storage[self.index].clone()
    }

    pub fn write(&self, value: RValue) {
        self.scope.lock().unwrap().storage[self.index] = value;
    }
}

impl fmt::Debug for StorageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSlot").field("index", &self.index).finish()
    }
}

impl PartialEq for StorageSlot {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.scope, &other.scope) && self.index == other.index
    }
}

/// A single-assignment cell for a future's result (§4.2, §4.4): a mutex
/// guarding an `Option<RValue>` plus a condvar, per the "portable
/// single-shot notifier" redesign note.
#[derive(Default)]
pub struct FutureCell {
    slot: Mutex<Option<RValue>>,
    ready: Condvar,
}

impl FutureCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the result exactly once and wakes every blocked reader.
    /// Called more than once, this is a VM bug (§3 lifecycle: "its result
    /// slot is written exactly once").
    pub fn set_result(&self, value: RValue) {
        let mut slot = self.slot.lock().unwrap();
        debug_assert!(slot.is_none(), "future result written more than once");
        *slot = Some(value);
        self.ready.notify_all();
    }

    /// Blocks until the result is available, then returns a clone of it
    /// (§8 property 6: "all subsequent and concurrent get-value calls
    /// return a deep copy").
    pub fn get_value(&self) -> RValue {
        let mut slot = self.slot.lock().unwrap();
        while slot.is_none() {
            slot = self.ready.wait(slot).unwrap();
        }
        slot.clone().expect("checked above")
    }
}

/// The runtime instance of one scope entry (§3).
pub struct ActivatedScope {
    pub description: Arc<ScopeDescription>,
    /// One slot per declared member, in declared order. Unlike the
    /// original byte-stack layout, every member (including references and
    /// function bindings) occupies exactly one `RValue` slot here; see
    /// `stack.rs` for why.
    pub storage: Vec<RValue>,
    /// Stack of ghost sets; only the top set is consulted on lookup (§4.2
    /// ghosting).
    ghosts: Vec<HashMap<Arc<str>, SharedScope>>,
    pub parent: Option<SharedScope>,
    pub task_origin: TaskHandle,
    pub last_message_origin: TaskHandle,
    futures: HashMap<Arc<str>, (Arc<crate::operation::Operation>, Arc<FutureCell>)>,
    /// Per-enter slot counts, so `exit` releases exactly what the matching
    /// `enter` reserved (§3 invariant 1).
    enter_counts: Vec<usize>,
}

impl ActivatedScope {
    /// Activates `description` against the stack, reserving one slot per
    /// declared member (§4.2: "for each non-reference, non-function-
    /// signature variable reserves its storage" — generalised here to one
    /// slot per member since every member kind needs a slot to hold
    /// whatever gets bound into it, reference and function members
    /// included).
    pub fn enter(
        description: Arc<ScopeDescription>,
        parent: Option<SharedScope>,
        task_origin: TaskHandle,
        stack: &mut ValueStack,
    ) -> SharedScope {
        let count = description.members.len();
        stack.push(count);
        let scope = ActivatedScope {
            storage: vec![RValue::Null; count],
            ghosts: Vec::new(),
            parent,
            task_origin,
            last_message_origin: TaskHandle::INVALID,
            futures: HashMap::new(),
            enter_counts: vec![count],
            description,
        };
        Arc::new(Mutex::new(scope))
    }

    /// Activates a scope directly against heap storage (the global-init
    /// block, §4.5). Storage is identical to the stack case — see
    /// `stack.rs` — so this exists only to document the call site, not
    /// because the representation differs.
    pub fn enter_heap_frame(description: Arc<ScopeDescription>, task_origin: TaskHandle) -> SharedScope {
        let count = description.members.len();
        Arc::new(Mutex::new(ActivatedScope {
            storage: vec![RValue::Null; count],
            ghosts: Vec::new(),
            parent: None,
            task_origin,
            last_message_origin: TaskHandle::INVALID,
            futures: HashMap::new(),
            enter_counts: vec![count],
            description,
        }))
    }

    /// Releases the slots this scope's most recent `enter` reserved.
    pub fn exit(scope: &SharedScope, stack: &mut ValueStack) -> VmResult<()> {
        let count = {
            let mut guard = scope.lock().unwrap();
            guard.enter_counts.pop().ok_or_else(|| {
                VmError::internal_failure("scope exited more times than it was entered")
            })?
        };
        stack.pop(count)
    }

    /// Binds a freshly-evaluated argument list to a parameter scope's
    /// members, in declared order (reverse order when `reverse` is set,
    /// for `invoke_with_external_params`'s host-ABI argument layout, §6).
    pub fn bind_parameters(scope: &SharedScope, mut values: Vec<RValue>, reverse: bool) -> VmResult<()> {
        if reverse {
            values.reverse();
        }
        let mut guard = scope.lock().unwrap();
        if values.len() != guard.storage.len() {
            return Err(VmError::internal_failure(format!(
                "parameter count mismatch: expected {}, got {}",
                guard.storage.len(),
                values.len()
            )));
        }
        guard.storage = values;
        Ok(())
    }

    /// Pushes one new ghost set onto `target`, mapping every variable,
    /// reference, and function binding declared in each of `sources` to
    /// that source (§4.2). A function body ghosts both its parameter scope
    /// and its return scope at once, as a single top set, since lookup
    /// only ever consults the top of the ghost stack — pushing them as two
    /// separate sets would bury the first under the second and make its
    /// names unreachable.
    pub fn ghost_into(sources: &[SharedScope], target: &SharedScope) {
        let mut set = HashMap::new();
        for source in sources {
            let guard = source.lock().unwrap();
            for member in &guard.description.members {
                set.insert(member.name.clone(), source.clone());
            }
            for name in guard.description.function_bindings.keys() {
                set.insert(name.clone(), source.clone());
            }
        }
        target.lock().unwrap().ghosts.push(set);
    }

    /// Pops the top ghost set, mirroring one [`Self::ghost_into`] call.
    pub fn pop_ghost(target: &SharedScope) {
        target.lock().unwrap().ghosts.pop();
    }

    /// Resolves `name` through the ghost stack (top only), this scope's
    /// own storage, then the parent chain (§4.2).
    pub fn get_variable(scope: &SharedScope, name: &str) -> VmResult<RValue> {
        let guard = scope.lock().unwrap();
        if let Some(future) = guard.futures.get(name) {
            let cell = future.1.clone();
            drop(guard);
            return Ok(cell.get_value());
        }
        if let Some(top) = guard.ghosts.last() {
            if let Some(source) = top.get(name) {
                let source = source.clone();
                drop(guard);
                return Self::get_variable(&source, name);
            }
        }
        if let Some(index) = guard.description.member_index(name) {
            return Ok(guard.storage[index].clone());
        }
        if let Some(value) = guard.description.constants.get(name) {
            return Ok(value.clone());
        }
        if let Some(parent) = guard.parent.clone() {
            drop(guard);
            return Self::get_variable(&parent, name);
        }
        Err(VmError::missing_variable(name))
    }

    /// Writes `value` into `name`'s bound storage, following the same
    /// ghost/own/parent search order as [`Self::get_variable`].
    pub fn set_variable(scope: &SharedScope, name: &str, value: RValue) -> VmResult<()> {
        let mut guard = scope.lock().unwrap();
        if let Some(top) = guard.ghosts.last() {
            if let Some(source) = top.get(name) {
                let source = source.clone();
                drop(guard);
                return Self::set_variable(&source, name, value);
            }
        }
        if let Some(index) = guard.description.member_index(name) {
            guard.storage[index] = value;
            return Ok(());
        }
        if let Some(parent) = guard.parent.clone() {
            drop(guard);
            return Self::set_variable(&parent, name, value);
        }
        Err(VmError::missing_variable(name))
    }

    /// Reads a variable's current value off its bound storage, writes the
    /// replacement value, and returns the previous value as an `RValue`
    /// (`pop-variable-off-stack`, §4.2). Stack accounting is implicit in
    /// this crate's representation (see `stack.rs`), so this is simply a
    /// swap.
    pub fn pop_variable(scope: &SharedScope, name: &str, incoming: RValue) -> VmResult<RValue> {
        let previous = Self::get_variable(scope, name)?;
        Self::set_variable(scope, name, incoming)?;
        Ok(previous)
    }

    /// Declares a future: records its computation without evaluating it
    /// (§4.2).
    pub fn declare_future(
        scope: &SharedScope,
        name: impl Into<Arc<str>>,
        operation: Arc<crate::operation::Operation>,
    ) -> Arc<FutureCell> {
        let cell = Arc::new(FutureCell::new());
        scope
            .lock()
            .unwrap()
            .futures
            .insert(name.into(), (operation, cell.clone()));
        cell
    }

    pub fn future_operation(scope: &SharedScope, name: &str) -> Option<Arc<crate::operation::Operation>> {
        scope
            .lock()
            .unwrap()
            .futures
            .get(name)
            .map(|(op, _)| op.clone())
    }

    /// Finds the first non-invalid `task_origin` walking up the parent
    /// chain (`GetTaskCaller`, §4.4).
    pub fn task_caller(scope: &SharedScope) -> TaskHandle {
        let guard = scope.lock().unwrap();
        if !guard.task_origin.is_invalid() {
            return guard.task_origin;
        }
        match guard.parent.clone() {
            Some(parent) => {
                drop(guard);
                Self::task_caller(&parent)
            }
            None => TaskHandle::INVALID,
        }
    }

    /// Finds the first non-invalid `last_message_origin` walking up the
    /// parent chain (`GetMessageSender`, §4.4).
    pub fn message_sender(scope: &SharedScope) -> TaskHandle {
        let guard = scope.lock().unwrap();
        if !guard.last_message_origin.is_invalid() {
            return guard.last_message_origin;
        }
        match guard.parent.clone() {
            Some(parent) => {
                drop(guard);
                Self::message_sender(&parent)
            }
            None => TaskHandle::INVALID,
        }
    }

    /// Sets `last_message_origin` on this scope (done once, when a
    /// response-map match activates the body, §4.4).
    pub fn set_message_origin(scope: &SharedScope, sender: TaskHandle) {
        scope.lock().unwrap().last_message_origin = sender;
    }

    /// Builds the `effective-tuple` RValue for a function's return-values
    /// scope (§4.2): zero members emit `Null`, one member emits its value
    /// directly, more than one searches the tuple registry for a matching
    /// descriptor and wraps the members as a `Tuple` RValue.
    pub fn effective_tuple(
        scope: &SharedScope,
        registry: &crate::types::TypeRegistry,
    ) -> VmResult<RValue> {
        let guard = scope.lock().unwrap();
        match guard.description.members.len() {
            0 => Ok(RValue::Null),
            1 => Ok(guard.storage[0].clone()),
            _ => {
                let members: Vec<(Arc<str>, crate::value::ValueKind)> = guard
                    .description
                    .members
                    .iter()
                    .map(|m| (m.name.clone(), m.kind.clone()))
                    .collect();
                let type_id = registry
                    .tuple_descriptor_matching(&members)
                    .ok_or_else(|| {
                        VmError::internal_failure(
                            "effective-tuple: no matching tuple type registered for this return scope",
                        )
                    })?;
                let values = guard
                    .description
                    .members
                    .iter()
                    .zip(guard.storage.iter())
                    .map(|(m, v)| (m.name.clone(), v.clone()))
                    .collect();
                Ok(RValue::Tuple {
                    type_id,
                    members: values,
                })
            }
        }
    }

    /// Looks a name up in this scope's own declared function bindings and
    /// nested function definitions only (no ghost/parent search); used by
    /// `InvokeIndirect` after the ghost/parent search in
    /// [`crate::scope::ActivatedScope::resolve_function`] has already run.
    pub fn own_function(&self, name: &str) -> Option<crate::ids::FunctionId> {
        self.description
            .function_bindings
            .get(name)
            .or_else(|| self.description.nested_functions.get(name))
            .copied()
    }

    /// Resolves a name to a function id, handling scopes that registered
    /// it as a variable-bound function value (§4.1 `InvokeIndirect`).
    pub fn resolve_function(scope: &SharedScope, name: &str) -> VmResult<crate::ids::FunctionId> {
        let guard = scope.lock().unwrap();
        if let Some(top) = guard.ghosts.last() {
            if let Some(source) = top.get(name) {
                let source = source.clone();
                drop(guard);
                return Self::resolve_function(&source, name);
            }
        }
        if let Some(id) = guard.own_function(name) {
            return Ok(id);
        }
        if let RValue::Function(id) = guard
            .description
            .member_index(name)
            .map(|i| guard.storage[i].clone())
            .unwrap_or(RValue::Null)
        {
            return Ok(id);
        }
        if let Some(parent) = guard.parent.clone() {
            drop(guard);
            return Self::resolve_function(&parent, name);
        }
        Err(VmError::missing_variable(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn description_with_vars(names: &[&str]) -> Arc<ScopeDescription> {
        let mut description = ScopeDescription::new(None);
        for name in names {
            description.declare_variable(*name, ValueKind::Integer).unwrap();
        }
        Arc::new(description)
    }

    #[test]
    fn enter_reserves_one_slot_per_member_and_exit_balances() {
        let description = description_with_vars(&["a", "b"]);
        let mut stack = ValueStack::new(0);
        let scope = ActivatedScope::enter(description, None, TaskHandle::INVALID, &mut stack);
        assert_eq!(stack.current_top(), 2);
        ActivatedScope::exit(&scope, &mut stack).unwrap();
        assert!(stack.is_empty());
    }

    #[test]
    fn set_then_get_round_trips() {
        let description = description_with_vars(&["x"]);
        let mut stack = ValueStack::new(0);
        let scope = ActivatedScope::enter(description, None, TaskHandle::INVALID, &mut stack);
        ActivatedScope::set_variable(&scope, "x", RValue::Integer(42)).unwrap();
        assert_eq!(ActivatedScope::get_variable(&scope, "x").unwrap(), RValue::Integer(42));
    }

    #[test]
    fn lookup_falls_through_to_parent() {
        let parent_description = description_with_vars(&["outer"]);
        let mut stack = ValueStack::new(0);
        let parent = ActivatedScope::enter(parent_description, None, TaskHandle::INVALID, &mut stack);
        ActivatedScope::set_variable(&parent, "outer", RValue::Integer(7)).unwrap();

        let child_description = description_with_vars(&["inner"]);
        let child = ActivatedScope::enter(child_description, Some(parent.clone()), TaskHandle::INVALID, &mut stack);
        assert_eq!(ActivatedScope::get_variable(&child, "outer").unwrap(), RValue::Integer(7));
    }

    #[test]
    fn ghosting_makes_source_names_visible_and_pop_removes_them() {
        let source_description = description_with_vars(&["x"]);
        let mut stack = ValueStack::new(0);
        let source = ActivatedScope::enter(source_description, None, TaskHandle::INVALID, &mut stack);
        ActivatedScope::set_variable(&source, "x", RValue::Integer(5)).unwrap();

        let body_description = description_with_vars(&[]);
        let body = ActivatedScope::enter(body_description, None, TaskHandle::INVALID, &mut stack);
        ActivatedScope::ghost_into(&[source.clone()], &body);
        assert_eq!(ActivatedScope::get_variable(&body, "x").unwrap(), RValue::Integer(5));
        ActivatedScope::pop_ghost(&body);
        assert!(ActivatedScope::get_variable(&body, "x").is_err());
    }

    #[test]
    fn exiting_more_than_entering_is_an_internal_failure() {
        let description = description_with_vars(&["a"]);
        let mut stack = ValueStack::new(0);
        let scope = ActivatedScope::enter(description, None, TaskHandle::INVALID, &mut stack);
        ActivatedScope::exit(&scope, &mut stack).unwrap();
        let err = ActivatedScope::exit(&scope, &mut stack).unwrap_err();
        assert!(matches!(err, VmError::InternalFailure { .. }));
    }

    #[test]
    fn future_blocks_until_result_is_set() {
        let cell = Arc::new(FutureCell::new());
        let reader_cell = cell.clone();
        let handle = std::thread::spawn(move || reader_cell.get_value());
        std::thread::sleep(std::time::Duration::from_millis(20));
        cell.set_result(RValue::Integer(9));
        assert_eq!(handle.join().unwrap(), RValue::Integer(9));
    }
}
