//! The execution context threaded through every operation (§2, §6).
//!
//! The source VM stashes the running program in a process-wide slot (§4.5)
//! and a single-instance counter forbids more than one. Per the "replace
//! the process-global running program with explicit threading of context"
//! redesign note, this crate carries an `Arc<Program>` directly in
//! [`Context`] instead, and drops the instance counter entirely.

use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::concurrency::task::Message;
use crate::ids::TaskHandle;
use crate::program::Program;
use crate::scope::SharedScope;
use crate::stack::ValueStack;

/// How a running block most recently left the operation loop (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowResult {
    #[default]
    Normal,
    /// Exit the innermost loop.
    Break,
    /// Shortcut a running if/elseif/else chain; collapsed back to
    /// `Normal` once the chain has unwound to its owning `If`.
    ExitElseIfWrapper,
    /// Unwind to the enclosing function.
    Return,
}

/// Everything one operation needs to execute: the owning program, the
/// current value stack, the current activated scope, the running flow
/// result, and this thread's task identity and inbox (§2, §5).
pub struct Context {
    pub program: Arc<Program>,
    pub stack: ValueStack,
    pub scope: SharedScope,
    pub flow: FlowResult,
    pub task_handle: TaskHandle,
    pub inbox: Receiver<Message>,
}

impl Context {
    pub fn new(
        program: Arc<Program>,
        scope: SharedScope,
        task_handle: TaskHandle,
        inbox: Receiver<Message>,
    ) -> Self {
        let capacity = program.config.initial_stack_capacity;
        Self {
            program,
            stack: ValueStack::new(capacity),
            scope,
            flow: FlowResult::Normal,
            task_handle,
            inbox,
        }
    }

    /// Swaps in a new current scope, returning the previous one so the
    /// caller can restore it on the way out.
    pub fn enter_scope(&mut self, scope: SharedScope) -> SharedScope {
        std::mem::replace(&mut self.scope, scope)
    }
}
