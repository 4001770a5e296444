//! The operation tree and its dispatch (§4.1).
//!
//! `Operation` is a tagged-union sum type rather than a `dynamic_cast`
//! hierarchy of boxed trait objects, per the "replace manual ownership &
//! dynamic_cast with tagged variants" redesign note: composite operations
//! (an `If`'s branches, a `Map`'s function argument) hold their children
//! directly as fields instead of through a generic "nested operation"
//! pointer that callers have to downcast to special-case.
//!
//! The source models four responsibilities per node (execute-fast,
//! execute-and-store-rvalue, static return type, parameter count). This
//! crate implements the two execution responsibilities as a single
//! [`Operation::execute_rvalue`]: every node already knows how to produce
//! its [`RValue`], so "execute-fast" is just "run it and discard the
//! value" rather than a parallel code path that would have to be kept in
//! sync by hand.

pub mod block;
pub mod context;

pub use block::Block;
pub use context::{Context, FlowResult};

use std::sync::Arc;

use crate::concurrency::messaging::MessageCandidate;
use crate::error::{VmError, VmResult};
use crate::ids::{FunctionId, TypeId};
use crate::scope::ActivatedScope;
use crate::value::{RValue, ValueKind};

/// Binary operators shared by arithmetic, comparison, bitwise, logical,
/// and string-concatenate operations (§4.1). Modelling them as one
/// `Binary` variant parameterised by `BinOp`, instead of one `Operation`
/// variant per operator, keeps the match in `execute_rvalue` exhaustive
/// without twenty near-identical arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    LogicalAnd,
    LogicalOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

/// One node in the executable tree (§4.1).
pub enum Operation {
    Literal(RValue),
    ReadVariable(Arc<str>),
    Assign {
        target: Arc<str>,
        value: Box<Operation>,
    },
    MemberAccess {
        base: Box<Operation>,
        member: Arc<str>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Operation>,
        rhs: Box<Operation>,
    },
    Unary {
        op: UnOp,
        operand: Box<Operation>,
    },
    TupleLiteral {
        type_id: TypeId,
        members: Vec<(Arc<str>, Operation)>,
    },
    RecordLiteral {
        type_id: TypeId,
        members: Vec<(Arc<str>, Operation)>,
    },
    ArrayLiteral {
        element_type: ValueKind,
        elements: Vec<Operation>,
    },
    ArrayIndex {
        array: Box<Operation>,
        index: Box<Operation>,
    },
    ArrayLength(Box<Operation>),
    /// Interns `lhs`'s and `rhs`'s string content concatenated together
    /// (§4.1 string-concatenate). A dedicated node rather than a `Binary`
    /// arm because concatenation needs the string pool, which scalar
    /// arithmetic/comparison never touches.
    StringConcat {
        lhs: Box<Operation>,
        rhs: Box<Operation>,
    },
    /// Number of UTF-8 code points in an interned string (§8 Scenario B).
    StringLength(Box<Operation>),
    /// Invokes a unary function once per element, collecting results into
    /// a fresh array of the function's return type (§4.1).
    Map {
        function: FunctionId,
        array: Box<Operation>,
    },
    /// Folds a binary function left-to-right over the elements (§4.1). The
    /// function is not promised associative for non-commutative operators
    /// (§8 property 9).
    Reduce {
        function: FunctionId,
        array: Box<Operation>,
    },

    If {
        condition: Box<Operation>,
        then_block: Block,
        elseif_wrapper: Option<Box<ElseIfWrapper>>,
        else_block: Option<Block>,
    },
    /// A sequence of `ElseIf` arms; escaped early by `ExitIfChain` inside
    /// an arm's body (§4.1).
    ElseIfWrapperOp(Box<ElseIfWrapper>),
    ExitIfChain,
    /// Enters the body scope once and reruns the body without re-entering
    /// until it sets a non-`Normal` flow result. The body is expected to
    /// contain a [`Operation::WhileLoopConditional`].
    WhileLoop {
        body: Block,
    },
    /// Pops a boolean (evaluates `condition`) and sets `Break` if false.
    WhileLoopConditional(Box<Operation>),
    /// Enters the body scope once, then reruns it, evaluating `condition`
    /// against the body's scope after each iteration, until it is false.
    DoWhileLoop {
        body: Block,
        condition: Box<Operation>,
    },
    Break,
    Return,
    ExecuteBlock(Block),

    Invoke {
        function: FunctionId,
        args: Vec<Operation>,
    },
    InvokeIndirect {
        name: Arc<str>,
        args: Vec<Operation>,
    },

    Fork {
        block: Arc<Block>,
        name: Option<Arc<str>>,
    },
    ForkToPool {
        pool: Arc<str>,
        block: Arc<Block>,
    },
    ParallelFor {
        pool: Arc<str>,
        lower: Box<Operation>,
        upper: Box<Operation>,
        workers: usize,
        counter_name: Arc<str>,
        body: Arc<Block>,
    },
    ScheduleFuture {
        name: Arc<str>,
        operation: Arc<Operation>,
    },
    ScheduleFutureToPool {
        pool: Arc<str>,
        name: Arc<str>,
        operation: Arc<Operation>,
    },

    SendMessageByHandle {
        target: Box<Operation>,
        name: Arc<str>,
        payload: Vec<Operation>,
    },
    SendMessageByName {
        target_name: Box<Operation>,
        name: Arc<str>,
        payload: Vec<Operation>,
    },
    AcceptMessage {
        candidates: Vec<MessageCandidate>,
    },
    AcceptMessageFromResponseMap(Arc<str>),
    GetTaskCaller,
    GetMessageSender,

    WriteDebug(Box<Operation>),
    ReadLine,

    NoOp,
}

/// A sequence of `ElseIf` arms belonging to one [`Operation::If`] (§4.1).
pub struct ElseIfWrapper {
    pub arms: Vec<ElseIfArm>,
}

pub struct ElseIfArm {
    pub condition: Operation,
    pub body: Block,
}

impl ElseIfWrapper {
    /// Runs arms in order until one matches; returns whether any arm
    /// matched (an `If` uses this to decide whether to fall through to its
    /// `else` block). `ExitIfChain` inside a matched arm's body collapses
    /// to `Normal` once the chain reports it matched, per §4.1.
    fn run(&self, ctx: &mut Context) -> VmResult<bool> {
        for arm in &self.arms {
            if arm.condition.execute_rvalue(ctx)?.as_bool()? {
                arm.body.execute(ctx, true, false, 0)?;
                if ctx.flow == FlowResult::ExitElseIfWrapper {
                    ctx.flow = FlowResult::Normal;
                }
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl RValue {
    fn as_bool(&self) -> VmResult<bool> {
        match self {
            RValue::Boolean(value) => Ok(*value),
            other => Err(VmError::execution(format!(
                "expected Boolean, found {:?}",
                other.kind()
            ))),
        }
    }

    fn as_integer(&self) -> VmResult<i32> {
        match self {
            RValue::Integer(value) => Ok(*value),
            RValue::Integer16(value) => Ok(*value as i32),
            other => Err(VmError::execution(format!(
                "expected an integer type, found {:?}",
                other.kind()
            ))),
        }
    }
}

impl Operation {
    /// Runs this operation for its side effects only, discarding any
    /// produced value ("execute-fast", §4.1).
    pub fn execute(&self, ctx: &mut Context) -> VmResult<()> {
        self.execute_rvalue(ctx).map(|_| ())
    }

    /// Runs this operation and produces its [`RValue`] ("execute-and-
    /// store-rvalue", §4.1). Statement-only nodes (control flow, message
    /// send, debug I/O) run their side effect and answer `Null`.
    pub fn execute_rvalue(&self, ctx: &mut Context) -> VmResult<RValue> {
        use Operation::*;
        match self {
            Literal(value) => Ok(value.clone()),
            ReadVariable(name) => ActivatedScope::get_variable(&ctx.scope, name),
            Assign { target, value } => {
                let mut evaluated = value.execute_rvalue(ctx)?;
                evaluated = ctx.program.materialize_array(evaluated);
                ActivatedScope::set_variable(&ctx.scope, target, evaluated.clone())?;
                Ok(evaluated)
            }
            MemberAccess { base, member } => {
                let value = base.execute_rvalue(ctx)?;
                value
                    .member(member)
                    .cloned()
                    .ok_or_else(|| VmError::execution(format!("no member named '{member}'")))
            }
            Binary { op, lhs, rhs } => {
                let left = lhs.execute_rvalue(ctx)?;
                let right = rhs.execute_rvalue(ctx)?;
                eval_binary(*op, left, right)
            }
            Unary { op, operand } => {
                let value = operand.execute_rvalue(ctx)?;
                eval_unary(*op, value)
            }
            TupleLiteral { type_id, members } => build_composite(ctx, *type_id, members, false),
            RecordLiteral { type_id, members } => build_composite(ctx, *type_id, members, true),
            ArrayLiteral { element_type, elements } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(element.execute_rvalue(ctx)?);
                }
                Ok(RValue::Array {
                    element_type: element_type.clone(),
                    elements: values,
                    backing: None,
                })
            }
            ArrayIndex { array, index } => {
                let array_value = array.execute_rvalue(ctx)?;
                let index_value = index.execute_rvalue(ctx)?.as_integer()?;
                match array_value {
                    RValue::Array { elements, .. } => {
                        let idx = usize::try_from(index_value)
                            .map_err(|_| VmError::execution("negative array index"))?;
                        elements
                            .get(idx)
                            .cloned()
                            .ok_or_else(|| VmError::execution(format!("array index {idx} out of bounds")))
                    }
                    other => Err(VmError::execution(format!("cannot index {:?}", other.kind()))),
                }
            }
            ArrayLength(array) => match array.execute_rvalue(ctx)? {
                RValue::Array { elements, .. } => Ok(RValue::Integer(elements.len() as i32)),
                other => Err(VmError::execution(format!("cannot take length of {:?}", other.kind()))),
            },
            StringConcat { lhs, rhs } => {
                let left = match lhs.execute_rvalue(ctx)? {
                    RValue::String(handle) => ctx
                        .program
                        .strings
                        .get(handle)
                        .ok_or_else(|| VmError::execution("left operand handle is not interned"))?,
                    other => return Err(VmError::execution(format!("concat expects String, found {:?}", other.kind()))),
                };
                let right = match rhs.execute_rvalue(ctx)? {
                    RValue::String(handle) => ctx
                        .program
                        .strings
                        .get(handle)
                        .ok_or_else(|| VmError::execution("right operand handle is not interned"))?,
                    other => return Err(VmError::execution(format!("concat expects String, found {:?}", other.kind()))),
                };
                let joined = format!("{left}{right}");
                Ok(RValue::String(ctx.program.strings.intern(&joined)))
            }
            StringLength(operand) => match operand.execute_rvalue(ctx)? {
                RValue::String(handle) => {
                    let text = ctx
                        .program
                        .strings
                        .get(handle)
                        .ok_or_else(|| VmError::execution("string handle is not interned"))?;
                    Ok(RValue::Integer(text.chars().count() as i32))
                }
                other => Err(VmError::execution(format!("length expects String, found {:?}", other.kind()))),
            },
            Map { function, array } => eval_map(ctx, *function, array),
            Reduce { function, array } => eval_reduce(ctx, *function, array),

            If {
                condition,
                then_block,
                elseif_wrapper,
                else_block,
            } => {
                if condition.execute_rvalue(ctx)?.as_bool()? {
                    then_block.execute(ctx, true, false, 0)?;
                } else {
                    let matched = match elseif_wrapper {
                        Some(wrapper) => wrapper.run(ctx)?,
                        None => false,
                    };
                    if !matched {
                        if let Some(block) = else_block {
                            block.execute(ctx, true, false, 0)?;
                        }
                    }
                }
                Ok(RValue::Null)
            }
            ElseIfWrapperOp(wrapper) => {
                wrapper.run(ctx)?;
                Ok(RValue::Null)
            }
            ExitIfChain => {
                ctx.flow = FlowResult::ExitElseIfWrapper;
                Ok(RValue::Null)
            }
            WhileLoop { body } => {
                // Enters once; the body itself re-runs without re-entering
                // until WhileLoopConditional (or Return) breaks the loop.
                let scope = crate::scope::ActivatedScope::enter(
                    body.description.clone().ok_or_else(|| {
                        VmError::internal_failure("while loop body has no bound scope")
                    })?,
                    Some(ctx.scope.clone()),
                    crate::ids::TaskHandle::INVALID,
                    &mut ctx.stack,
                );
                let previous = ctx.enter_scope(scope);
                loop {
                    body.execute(ctx, false, false, 0)?;
                    match ctx.flow {
                        FlowResult::Normal => continue,
                        FlowResult::Break => {
                            ctx.flow = FlowResult::Normal;
                            break;
                        }
                        FlowResult::Return | FlowResult::ExitElseIfWrapper => break,
                    }
                }
                let activated = std::mem::replace(&mut ctx.scope, previous);
                crate::scope::ActivatedScope::exit(&activated, &mut ctx.stack)?;
                Ok(RValue::Null)
            }
            WhileLoopConditional(condition) => {
                if !condition.execute_rvalue(ctx)?.as_bool()? {
                    ctx.flow = FlowResult::Break;
                }
                Ok(RValue::Null)
            }
            DoWhileLoop { body, condition } => {
                let scope = crate::scope::ActivatedScope::enter(
                    body.description.clone().ok_or_else(|| {
                        VmError::internal_failure("do-while loop body has no bound scope")
                    })?,
                    Some(ctx.scope.clone()),
                    crate::ids::TaskHandle::INVALID,
                    &mut ctx.stack,
                );
                let previous = ctx.enter_scope(scope);
                loop {
                    body.execute(ctx, false, false, 0)?;
                    match ctx.flow {
                        FlowResult::Break => {
                            ctx.flow = FlowResult::Normal;
                            break;
                        }
                        FlowResult::Return | FlowResult::ExitElseIfWrapper => break,
                        FlowResult::Normal => {
                            if !condition.execute_rvalue(ctx)?.as_bool()? {
                                break;
                            }
                        }
                    }
                }
                let activated = std::mem::replace(&mut ctx.scope, previous);
                crate::scope::ActivatedScope::exit(&activated, &mut ctx.stack)?;
                Ok(RValue::Null)
            }
            Break => {
                ctx.flow = FlowResult::Break;
                Ok(RValue::Null)
            }
            Return => {
                ctx.flow = FlowResult::Return;
                Ok(RValue::Null)
            }
            ExecuteBlock(block) => {
                block.execute(ctx, true, false, 0)?;
                Ok(RValue::Null)
            }

            Invoke { function, args } => {
                let values = evaluate_args(ctx, args)?;
                let function = ctx.program.function(*function)?;
                function.invoke(ctx, values)
            }
            InvokeIndirect { name, args } => {
                let values = evaluate_args(ctx, args)?;
                let id = ActivatedScope::resolve_function(&ctx.scope, name)?;
                let function = ctx.program.function(id)?;
                function.invoke(ctx, values)
            }

            Fork { block, name } => {
                crate::concurrency::task::fork(ctx, block.clone(), name.clone())?;
                Ok(RValue::Null)
            }
            ForkToPool { pool, block } => {
                crate::concurrency::thread_pool::fork_to_pool(ctx, pool, block.clone())?;
                Ok(RValue::Null)
            }
            ParallelFor {
                pool,
                lower,
                upper,
                workers,
                counter_name,
                body,
            } => {
                let lower = lower.execute_rvalue(ctx)?.as_integer()?;
                let upper = upper.execute_rvalue(ctx)?.as_integer()?;
                crate::concurrency::parallel_for::run(ctx, pool, lower, upper, *workers, counter_name, body)?;
                Ok(RValue::Null)
            }
            ScheduleFuture { name, operation } => {
                crate::concurrency::future::schedule(ctx, name.clone(), operation.clone(), None);
                Ok(RValue::Null)
            }
            ScheduleFutureToPool { pool, name, operation } => {
                crate::concurrency::future::schedule(ctx, name.clone(), operation.clone(), Some(pool.clone()));
                Ok(RValue::Null)
            }

            SendMessageByHandle { target, name, payload } => {
                let handle = match target.execute_rvalue(ctx)? {
                    RValue::TaskHandle(handle) => handle,
                    other => return Err(VmError::execution(format!("expected TaskHandle, found {:?}", other.kind()))),
                };
                let values = evaluate_args(ctx, payload)?;
                crate::concurrency::task::send_by_handle(ctx, handle, name.clone(), values)?;
                Ok(RValue::Null)
            }
            SendMessageByName { target_name, name, payload } => {
                let target = match target_name.execute_rvalue(ctx)? {
                    RValue::String(handle) => ctx
                        .program
                        .strings
                        .get(handle)
                        .ok_or_else(|| VmError::execution("task name handle is not interned"))?,
                    other => return Err(VmError::execution(format!("expected String, found {:?}", other.kind()))),
                };
                let values = evaluate_args(ctx, payload)?;
                crate::concurrency::task::send_by_name(ctx, &target, name.clone(), values)?;
                Ok(RValue::Null)
            }
            AcceptMessage { candidates } => crate::concurrency::messaging::accept(ctx, candidates),
            AcceptMessageFromResponseMap(map_name) => {
                let map = ctx.program.response_map(map_name)?;
                crate::concurrency::messaging::accept(ctx, &map.candidates)
            }
            GetTaskCaller => Ok(RValue::TaskHandle(ActivatedScope::task_caller(&ctx.scope))),
            GetMessageSender => Ok(RValue::TaskHandle(ActivatedScope::message_sender(&ctx.scope))),

            WriteDebug(message) => {
                let value = message.execute_rvalue(ctx)?;
                let text = match &value {
                    RValue::String(handle) => ctx
                        .program
                        .strings
                        .get(*handle)
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                    other => format!("{other:?}"),
                };
                ctx.program.config.host.write_debug(&text);
                Ok(RValue::Null)
            }
            ReadLine => match ctx.program.config.host.read_line() {
                Some(line) => Ok(RValue::String(ctx.program.strings.intern(&line))),
                None => Ok(RValue::Null),
            },

            NoOp => Ok(RValue::Null),
        }
    }

    /// Best-effort static return type, used by the loader/validator (§4.1,
    /// not re-implemented by this crate beyond what execution itself
    /// needs); unresolvable cases answer `Null` rather than erroring,
    /// since this is advisory metadata, not something execution depends
    /// on.
    pub fn static_return_type(&self, description: &crate::scope::ScopeDescription) -> ValueKind {
        use Operation::*;
        match self {
            Literal(value) => value.kind(),
            ReadVariable(name) => description
                .member_index(name)
                .and_then(|i| description.member(i))
                .map(|m| m.kind.clone())
                .unwrap_or(ValueKind::Null),
            Binary { op, lhs, .. } => match op {
                BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
                | BinOp::LogicalAnd | BinOp::LogicalOr => ValueKind::Boolean,
                _ => lhs.static_return_type(description),
            },
            Unary { op, operand } => match op {
                UnOp::Not => ValueKind::Boolean,
                _ => operand.static_return_type(description),
            },
            ArrayLiteral { element_type, .. } => ValueKind::Array(Box::new(element_type.clone())),
            TupleLiteral { type_id, .. } => ValueKind::Tuple(*type_id),
            RecordLiteral { type_id, .. } => ValueKind::Record(*type_id),
            GetTaskCaller | GetMessageSender => ValueKind::TaskHandle,
            _ => ValueKind::Null,
        }
    }

    /// Number of stack-residing parameters this operation expects its
    /// scope to have pushed before it runs (§4.1). Only invocation nodes
    /// consume a fixed arity in this crate's design; every other operation
    /// evaluates its own operands inline as part of `execute_rvalue`.
    pub fn param_count(&self) -> usize {
        match self {
            Operation::Invoke { args, .. } | Operation::InvokeIndirect { args, .. } => args.len(),
            _ => 0,
        }
    }
}

fn evaluate_args(ctx: &mut Context, args: &[Operation]) -> VmResult<Vec<RValue>> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(arg.execute_rvalue(ctx)?);
    }
    Ok(values)
}

fn build_composite(
    ctx: &mut Context,
    type_id: TypeId,
    members: &[(Arc<str>, Operation)],
    is_record: bool,
) -> VmResult<RValue> {
    let mut seen = hashbrown::HashSet::new();
    let mut values = Vec::with_capacity(members.len());
    for (name, op) in members {
        if !seen.insert(name.clone()) {
            return Err(VmError::execution(format!(
                "duplicate member name '{name}' in tuple/record literal"
            )));
        }
        values.push((name.clone(), op.execute_rvalue(ctx)?));
    }
    if is_record {
        Ok(RValue::Record { type_id, members: values })
    } else {
        Ok(RValue::Tuple { type_id, members: values })
    }
}

fn eval_map(ctx: &mut Context, function: FunctionId, array_op: &Operation) -> VmResult<RValue> {
    let array_value = array_op.execute_rvalue(ctx)?;
    let (element_type, elements) = match array_value {
        RValue::Array { element_type, elements, .. } => (element_type, elements),
        other => return Err(VmError::execution(format!("map expects an array, found {:?}", other.kind()))),
    };
    let function = ctx.program.function(function)?;
    let return_kind = function.return_kind();
    let mut mapped = Vec::with_capacity(elements.len());
    for element in elements {
        mapped.push(function.invoke(ctx, vec![element])?);
    }
    Ok(RValue::Array {
        element_type: return_kind.unwrap_or(element_type),
        elements: mapped,
        backing: None,
    })
}

fn eval_reduce(ctx: &mut Context, function: FunctionId, array_op: &Operation) -> VmResult<RValue> {
    let array_value = array_op.execute_rvalue(ctx)?;
    let elements = match array_value {
        RValue::Array { elements, .. } => elements,
        other => return Err(VmError::execution(format!("reduce expects an array, found {:?}", other.kind()))),
    };
    let function = ctx.program.function(function)?;
    let mut iter = elements.into_iter();
    let mut accumulator = match iter.next() {
        Some(first) => first,
        None => return Ok(RValue::Null),
    };
    for element in iter {
        accumulator = function.invoke(ctx, vec![accumulator, element])?;
    }
    Ok(accumulator)
}

fn eval_unary(op: UnOp, value: RValue) -> VmResult<RValue> {
    match (op, value) {
        (UnOp::Neg, RValue::Integer(v)) => Ok(RValue::Integer(-v)),
        (UnOp::Neg, RValue::Integer16(v)) => Ok(RValue::Integer16(-v)),
        (UnOp::Neg, RValue::Real(v)) => Ok(RValue::Real(-v)),
        (UnOp::Not, RValue::Boolean(v)) => Ok(RValue::Boolean(!v)),
        (UnOp::BitNot, RValue::Integer(v)) => Ok(RValue::Integer(!v)),
        (UnOp::BitNot, RValue::Integer16(v)) => Ok(RValue::Integer16(!v)),
        (op, value) => Err(VmError::execution(format!(
            "unary operator {op:?} not defined for {:?}",
            value.kind()
        ))),
    }
}

/// Arithmetic/comparison/bitwise/logical/concat dispatch (§4.1). Variadic
/// compound operators accept two scalars, one array, or one scalar plus
/// one array in either order; this crate models that by broadcasting a
/// scalar against an array's elements rather than special-casing arity,
/// which keeps associativity obligations (§8 property 9) in one place.
fn eval_binary(op: BinOp, lhs: RValue, rhs: RValue) -> VmResult<RValue> {
    match (op, &lhs, &rhs) {
        (BinOp::Eq, ..) => Ok(RValue::Boolean(lhs == rhs)),
        (BinOp::Ne, ..) => Ok(RValue::Boolean(lhs != rhs)),
        _ => {}
    }
    match (&lhs, &rhs) {
        (RValue::Array { .. }, _) | (_, RValue::Array { .. }) => eval_binary_array(op, lhs, rhs),
        _ => eval_binary_scalar(op, lhs, rhs),
    }
}

fn eval_binary_array(op: BinOp, lhs: RValue, rhs: RValue) -> VmResult<RValue> {
    match (lhs, rhs) {
        (
            RValue::Array { element_type, elements: left, .. },
            RValue::Array { elements: right, .. },
        ) => {
            if left.len() != right.len() {
                return Err(VmError::execution("array operands have different lengths"));
            }
            let elements = left
                .into_iter()
                .zip(right)
                .map(|(l, r)| eval_binary_scalar(op, l, r))
                .collect::<VmResult<Vec<_>>>()?;
            Ok(RValue::Array { element_type, elements, backing: None })
        }
        (RValue::Array { element_type, elements, .. }, scalar) => {
            let elements = elements
                .into_iter()
                .map(|element| eval_binary_scalar(op, element, scalar.clone()))
                .collect::<VmResult<Vec<_>>>()?;
            Ok(RValue::Array { element_type, elements, backing: None })
        }
        (scalar, RValue::Array { element_type, elements, .. }) => {
            let elements = elements
                .into_iter()
                .map(|element| eval_binary_scalar(op, scalar.clone(), element))
                .collect::<VmResult<Vec<_>>>()?;
            Ok(RValue::Array { element_type, elements, backing: None })
        }
        _ => unreachable!("caller guarantees at least one operand is an array"),
    }
}

fn eval_binary_scalar(op: BinOp, lhs: RValue, rhs: RValue) -> VmResult<RValue> {
    use BinOp::*;
    match (op, lhs, rhs) {
        (Eq, l, r) => Ok(RValue::Boolean(l == r)),
        (Ne, l, r) => Ok(RValue::Boolean(l != r)),
        (LogicalAnd, RValue::Boolean(l), RValue::Boolean(r)) => Ok(RValue::Boolean(l && r)),
        (LogicalOr, RValue::Boolean(l), RValue::Boolean(r)) => Ok(RValue::Boolean(l || r)),
        (Add, RValue::Integer(l), RValue::Integer(r)) => Ok(RValue::Integer(l.wrapping_add(r))),
        (Sub, RValue::Integer(l), RValue::Integer(r)) => Ok(RValue::Integer(l.wrapping_sub(r))),
        (Mul, RValue::Integer(l), RValue::Integer(r)) => Ok(RValue::Integer(l.wrapping_mul(r))),
        (Div, RValue::Integer(l), RValue::Integer(r)) => {
            if r == 0 {
                return Err(VmError::execution("integer division by zero"));
            }
            Ok(RValue::Integer(l.wrapping_div(r)))
        }
        (Mod, RValue::Integer(l), RValue::Integer(r)) => {
            if r == 0 {
                return Err(VmError::execution("integer modulo by zero"));
            }
            Ok(RValue::Integer(l.wrapping_rem(r)))
        }
        (BitAnd, RValue::Integer(l), RValue::Integer(r)) => Ok(RValue::Integer(l & r)),
        (BitOr, RValue::Integer(l), RValue::Integer(r)) => Ok(RValue::Integer(l | r)),
        (BitXor, RValue::Integer(l), RValue::Integer(r)) => Ok(RValue::Integer(l ^ r)),
        (Shl, RValue::Integer(l), RValue::Integer(r)) => Ok(RValue::Integer(l.wrapping_shl(r as u32))),
        (Shr, RValue::Integer(l), RValue::Integer(r)) => Ok(RValue::Integer(l.wrapping_shr(r as u32))),
        (Lt, RValue::Integer(l), RValue::Integer(r)) => Ok(RValue::Boolean(l < r)),
        (Le, RValue::Integer(l), RValue::Integer(r)) => Ok(RValue::Boolean(l <= r)),
        (Gt, RValue::Integer(l), RValue::Integer(r)) => Ok(RValue::Boolean(l > r)),
        (Ge, RValue::Integer(l), RValue::Integer(r)) => Ok(RValue::Boolean(l >= r)),

        (Add, RValue::Integer16(l), RValue::Integer16(r)) => Ok(RValue::Integer16(l.wrapping_add(r))),
        (Sub, RValue::Integer16(l), RValue::Integer16(r)) => Ok(RValue::Integer16(l.wrapping_sub(r))),
        (Mul, RValue::Integer16(l), RValue::Integer16(r)) => Ok(RValue::Integer16(l.wrapping_mul(r))),
        (Lt, RValue::Integer16(l), RValue::Integer16(r)) => Ok(RValue::Boolean(l < r)),
        (Le, RValue::Integer16(l), RValue::Integer16(r)) => Ok(RValue::Boolean(l <= r)),
        (Gt, RValue::Integer16(l), RValue::Integer16(r)) => Ok(RValue::Boolean(l > r)),
        (Ge, RValue::Integer16(l), RValue::Integer16(r)) => Ok(RValue::Boolean(l >= r)),

        (Add, RValue::Real(l), RValue::Real(r)) => Ok(RValue::Real(l + r)),
        (Sub, RValue::Real(l), RValue::Real(r)) => Ok(RValue::Real(l - r)),
        (Mul, RValue::Real(l), RValue::Real(r)) => Ok(RValue::Real(l * r)),
        (Div, RValue::Real(l), RValue::Real(r)) => Ok(RValue::Real(l / r)),
        (Lt, RValue::Real(l), RValue::Real(r)) => Ok(RValue::Boolean(l < r)),
        (Le, RValue::Real(l), RValue::Real(r)) => Ok(RValue::Boolean(l <= r)),
        (Gt, RValue::Real(l), RValue::Real(r)) => Ok(RValue::Boolean(l > r)),
        (Ge, RValue::Real(l), RValue::Real(r)) => Ok(RValue::Boolean(l >= r)),

        (op, l, r) => Err(VmError::execution(format!(
            "operator {op:?} not defined for ({:?}, {:?})",
            l.kind(),
            r.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn eval(op: &Operation) -> RValue {
        let program = crate::program::Program::new_for_tests();
        let mut ctx = program.test_context();
        op.execute_rvalue(&mut ctx).expect("operation should succeed")
    }

    #[test]
    fn scenario_a_arithmetic_square() {
        // square(x) = x * x, called as a literal substitute for invocation
        // to exercise Binary/Mul directly (function dispatch is covered in
        // tests/scenarios.rs).
        let op = Operation::Binary {
            op: BinOp::Mul,
            lhs: Box::new(Operation::Literal(RValue::Integer(7))),
            rhs: Box::new(Operation::Literal(RValue::Integer(7))),
        };
        assert_eq!(eval(&op), RValue::Integer(49));
    }

    #[test]
    fn comparison_yields_boolean() {
        let op = Operation::Binary {
            op: BinOp::Lt,
            lhs: Box::new(Operation::Literal(RValue::Integer(1))),
            rhs: Box::new(Operation::Literal(RValue::Integer(2))),
        };
        assert_eq!(eval(&op), RValue::Boolean(true));
    }

    #[test]
    fn division_by_zero_is_an_execution_error() {
        let program = crate::program::Program::new_for_tests();
        let mut ctx = program.test_context();
        let op = Operation::Binary {
            op: BinOp::Div,
            lhs: Box::new(Operation::Literal(RValue::Integer(1))),
            rhs: Box::new(Operation::Literal(RValue::Integer(0))),
        };
        let err = op.execute_rvalue(&mut ctx).unwrap_err();
        assert!(matches!(err, VmError::Execution { .. }));
    }

    #[test]
    fn scalar_broadcasts_across_array_operand() {
        let op = Operation::Binary {
            op: BinOp::Add,
            lhs: Box::new(Operation::Literal(RValue::Array {
                element_type: ValueKind::Integer,
                elements: vec![RValue::Integer(1), RValue::Integer(2)],
                backing: None,
            })),
            rhs: Box::new(Operation::Literal(RValue::Integer(10))),
        };
        let result = eval(&op);
        match result {
            RValue::Array { elements, .. } => {
                assert_eq!(elements, vec![RValue::Integer(11), RValue::Integer(12)]);
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn array_length_and_index() {
        let array = Operation::Literal(RValue::Array {
            element_type: ValueKind::Integer,
            elements: vec![RValue::Integer(10), RValue::Integer(20)],
            backing: None,
        });
        let len_op = Operation::ArrayLength(Box::new(array));
        assert_eq!(eval(&len_op), RValue::Integer(2));
    }
}
