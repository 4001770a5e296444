//! Ordered operation sequences with an optional owned scope (§4.1).

use std::sync::Arc;

use crate::error::VmResult;
use crate::ids::TaskHandle;
use crate::operation::context::{Context, FlowResult};
use crate::operation::Operation;
use crate::scope::{ActivatedScope, ScopeDescription};

/// An owned, ordered sequence of operations plus an optional bound scope
/// description (§4.1).
pub struct Block {
    pub operations: Vec<Operation>,
    pub description: Option<Arc<ScopeDescription>>,
    /// Whether this block owns `description` and must destroy it when the
    /// block itself is destroyed (§3 invariant 4). Structurally this only
    /// matters for code paths that track ownership explicitly (e.g. a
    /// validator walking the tree); `Arc`'s reference count already
    /// guarantees the description is freed exactly once regardless.
    pub owns_description: bool,
}

impl Block {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            operations,
            description: None,
            owns_description: false,
        }
    }

    pub fn with_scope(operations: Vec<Operation>, description: Arc<ScopeDescription>) -> Self {
        Self {
            operations,
            description: Some(description),
            owns_description: true,
        }
    }

    /// Executes the block's operations in order against `ctx`.
    ///
    /// - `enter_scopes`: when true (the default call shape) and this block
    ///   owns a scope description, that scope is entered before the first
    ///   operation runs and exited after the loop ends. When false, the
    ///   caller has already entered the scope (e.g. a loop re-running its
    ///   body without re-entering, §4.1 `WhileLoop`).
    /// - `heap_frame`: enters the scope against heap storage instead of
    ///   the value stack (the global-init block, §4.5).
    /// - `skip`: number of leading operations to skip (parallel-for chunk
    ///   re-entry skips the counter-binding lead-in, §4.4).
    pub fn execute(
        &self,
        ctx: &mut Context,
        enter_scopes: bool,
        heap_frame: bool,
        skip: usize,
    ) -> VmResult<()> {
        let entered = if enter_scopes {
            self.description.clone().map(|description| {
                let scope = if heap_frame {
                    ActivatedScope::enter_heap_frame(description, TaskHandle::INVALID)
                } else {
                    ActivatedScope::enter(description, Some(ctx.scope.clone()), TaskHandle::INVALID, &mut ctx.stack)
                };
                ctx.enter_scope(scope)
            })
        } else {
            None
        };

        for op in self.operations.iter().skip(skip) {
            op.execute(ctx)?;
            if ctx.flow != FlowResult::Normal {
                break;
            }
        }

        if let Some(previous) = entered {
            let activated = std::mem::replace(&mut ctx.scope, previous);
            if !heap_frame {
                ActivatedScope::exit(&activated, &mut ctx.stack)?;
            }
        }
        Ok(())
    }
}
