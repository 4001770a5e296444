//! Functions: parameter/return scopes, body block, and the invocation
//! interface used by both in-tree `Invoke`/`InvokeIndirect` operations and
//! native marshalling (§4.1, §6).

use std::sync::Arc;

use crate::error::VmResult;
use crate::ids::{FunctionId, TaskHandle};
use crate::operation::{Block, Context, FlowResult};
use crate::scope::{ActivatedScope, ScopeDescription};
use crate::types::FunctionSignature;
use crate::value::{RValue, ValueKind};

/// A function definition: its parameter scope, its return-values scope,
/// and its body block (§4.1, §6).
pub struct Function {
    pub id: FunctionId,
    pub name: Arc<str>,
    pub params: Arc<ScopeDescription>,
    pub returns: Arc<ScopeDescription>,
    pub signature: FunctionSignature,
    pub body: Block,
}

impl Function {
    /// Invokes the function with already-evaluated arguments, in declared
    /// order (`Invoke`/`InvokeIndirect`, §4.1).
    pub fn invoke(&self, ctx: &mut Context, args: Vec<RValue>) -> VmResult<RValue> {
        self.invoke_inner(ctx, args, false)
    }

    /// Binds `args` to the parameter scope in reverse declared order so a
    /// caller-supplied memory region laid out in host-ABI argument order
    /// lines up (`invoke-with-external-params`, §6).
    pub fn invoke_with_external_params(&self, ctx: &mut Context, args: Vec<RValue>) -> VmResult<RValue> {
        self.invoke_inner(ctx, args, true)
    }

    fn invoke_inner(&self, ctx: &mut Context, args: Vec<RValue>, reverse: bool) -> VmResult<RValue> {
        let param_scope = ActivatedScope::enter(
            self.params.clone(),
            None,
            TaskHandle::INVALID,
            &mut ctx.stack,
        );
        ActivatedScope::bind_parameters(&param_scope, args, reverse)?;

        let return_scope = ActivatedScope::enter(
            self.returns.clone(),
            None,
            TaskHandle::INVALID,
            &mut ctx.stack,
        );

        let body_description = self
            .body
            .description
            .clone()
            .unwrap_or_else(|| Arc::new(ScopeDescription::new(None)));
        let body_scope = ActivatedScope::enter(
            body_description,
            Some(ctx.program.global_scope()),
            TaskHandle::INVALID,
            &mut ctx.stack,
        );
        ActivatedScope::ghost_into(&[param_scope.clone(), return_scope.clone()], &body_scope);

        let previous = ctx.enter_scope(body_scope);
        let outcome = self.body.execute(ctx, false, false, 0);
        let activated = std::mem::replace(&mut ctx.scope, previous);

        if ctx.flow == FlowResult::Return {
            ctx.flow = FlowResult::Normal;
        }
        ActivatedScope::pop_ghost(&activated);
        outcome?;
        ActivatedScope::exit(&activated, &mut ctx.stack)?;

        let result = ActivatedScope::effective_tuple(&return_scope, &ctx.program.types)?;
        ActivatedScope::exit(&return_scope, &mut ctx.stack)?;
        ActivatedScope::exit(&param_scope, &mut ctx.stack)?;
        Ok(result)
    }

    /// The function's first declared return type, used by `Map`/`Reduce`
    /// to label the array they build (§4.1). `None` for a void function.
    pub fn return_kind(&self) -> Option<ValueKind> {
        self.returns.members.first().map(|m| m.kind.clone())
    }
}
