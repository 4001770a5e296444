//! Scenario-level integration tests: each test builds a small
//! `Operation`/`Block`/`Function` tree by hand and drives it through
//! `Program::execute` end to end, the way a loader-produced program would
//! run in production.

use std::sync::Arc;

use fugue_vm::concurrency::messaging::MessageCandidate;
use fugue_vm::operation::{BinOp, ElseIfArm, ElseIfWrapper};
use fugue_vm::types::{FunctionSignature, ParamDecl};
use fugue_vm::{
    Block, Function, FunctionId, Operation, Program, ProgramConfig, RValue, ScopeDescription,
    StringHandle, ValueKind,
};

fn empty_scope() -> Arc<ScopeDescription> {
    Arc::new(ScopeDescription::new(None))
}

/// Scenario A: arithmetic through a real function call. `entrypoint` calls
/// `square(7)` via `Invoke` and returns its result.
#[test]
fn scenario_a_square_seven_through_invoke() {
    let mut square_params = ScopeDescription::new(None);
    square_params.declare_variable("x", ValueKind::Integer).unwrap();
    let mut square_returns = ScopeDescription::new(None);
    square_returns.declare_variable("result", ValueKind::Integer).unwrap();
    let square_body = Block::with_scope(
        vec![
            Operation::Assign {
                target: Arc::from("result"),
                value: Box::new(Operation::Binary {
                    op: BinOp::Mul,
                    lhs: Box::new(Operation::ReadVariable(Arc::from("x"))),
                    rhs: Box::new(Operation::ReadVariable(Arc::from("x"))),
                }),
            },
            Operation::Return,
        ],
        empty_scope(),
    );
    let square = Function {
        id: FunctionId(1),
        name: Arc::from("square"),
        params: Arc::new(square_params),
        returns: Arc::new(square_returns),
        signature: FunctionSignature {
            params: vec![ParamDecl::value(ValueKind::Integer)],
            returns: vec![ValueKind::Integer],
        },
        body: square_body,
    };

    let mut entry_returns = ScopeDescription::new(None);
    entry_returns.declare_variable("result", ValueKind::Integer).unwrap();
    let entry_body = Block::with_scope(
        vec![
            Operation::Assign {
                target: Arc::from("result"),
                value: Box::new(Operation::Invoke {
                    function: FunctionId(1),
                    args: vec![Operation::Literal(RValue::Integer(7))],
                }),
            },
            Operation::Return,
        ],
        empty_scope(),
    );
    let entrypoint = Function {
        id: FunctionId(2),
        name: Arc::from("entrypoint"),
        params: empty_scope(),
        returns: Arc::new(entry_returns),
        signature: FunctionSignature::default(),
        body: entry_body,
    };

    let program = Program::new(
        ProgramConfig::default(),
        empty_scope(),
        vec![square, entrypoint],
        None,
        "entrypoint",
    );
    let result = program.execute().expect("entrypoint should run to completion");
    assert_eq!(result, RValue::Integer(49));
}

/// Scenario B: interned-string length. The literal's content is interned
/// right after construction, before execution begins, the way a loader
/// finishes its literal-string pass once the runtime's string pool exists.
#[test]
fn scenario_b_interned_string_length() {
    let mut returns = ScopeDescription::new(None);
    returns.declare_variable("result", ValueKind::Integer).unwrap();
    let body = Block::with_scope(
        vec![
            Operation::Assign {
                target: Arc::from("result"),
                value: Box::new(Operation::StringLength(Box::new(Operation::Literal(
                    RValue::String(StringHandle(1)),
                )))),
            },
            Operation::Return,
        ],
        empty_scope(),
    );
    let entrypoint = Function {
        id: FunctionId(1),
        name: Arc::from("entrypoint"),
        params: empty_scope(),
        returns: Arc::new(returns),
        signature: FunctionSignature::default(),
        body,
    };

    let program = Program::new(
        ProgramConfig::default(),
        empty_scope(),
        vec![entrypoint],
        None,
        "entrypoint",
    );
    let handle = program.strings.intern("hello world");
    assert_eq!(handle, StringHandle(1), "first intern call on a fresh program gets handle 1");

    let result = program.execute().expect("entrypoint should run to completion");
    assert_eq!(result, RValue::Integer(11));
}

/// Scenario C: if/elseif/else branch selection driven by a global variable
/// set during global-init. Three otherwise-identical programs differ only
/// in the value global-init assigns to `input`.
#[test]
fn scenario_c_if_elseif_else_branches_on_global_input() {
    fn run_with_input(input: i32) -> RValue {
        let mut global = ScopeDescription::new(None);
        global.declare_variable("input", ValueKind::Integer).unwrap();
        let global = Arc::new(global);

        let mut returns = ScopeDescription::new(None);
        returns.declare_variable("result", ValueKind::Integer).unwrap();
        let body = Block::with_scope(
            vec![
                Operation::If {
                    condition: Box::new(Operation::Binary {
                        op: BinOp::Lt,
                        lhs: Box::new(Operation::ReadVariable(Arc::from("input"))),
                        rhs: Box::new(Operation::Literal(RValue::Integer(0))),
                    }),
                    then_block: Block::new(vec![Operation::Assign {
                        target: Arc::from("result"),
                        value: Box::new(Operation::Literal(RValue::Integer(-1))),
                    }]),
                    elseif_wrapper: Some(Box::new(ElseIfWrapper {
                        arms: vec![ElseIfArm {
                            condition: Operation::Binary {
                                op: BinOp::Eq,
                                lhs: Box::new(Operation::ReadVariable(Arc::from("input"))),
                                rhs: Box::new(Operation::Literal(RValue::Integer(0))),
                            },
                            body: Block::new(vec![Operation::Assign {
                                target: Arc::from("result"),
                                value: Box::new(Operation::Literal(RValue::Integer(0))),
                            }]),
                        }],
                    })),
                    else_block: Some(Block::new(vec![Operation::Assign {
                        target: Arc::from("result"),
                        value: Box::new(Operation::Literal(RValue::Integer(1))),
                    }])),
                },
                Operation::Return,
            ],
            empty_scope(),
        );
        let entrypoint = Function {
            id: FunctionId(1),
            name: Arc::from("entrypoint"),
            params: empty_scope(),
            returns: Arc::new(returns),
            signature: FunctionSignature::default(),
            body,
        };

        let global_init = Block::new(vec![Operation::Assign {
            target: Arc::from("input"),
            value: Box::new(Operation::Literal(RValue::Integer(input))),
        }]);

        let program = Program::new(
            ProgramConfig::default(),
            global,
            vec![entrypoint],
            Some(global_init),
            "entrypoint",
        );
        program.execute().expect("entrypoint should run to completion")
    }

    assert_eq!(run_with_input(-5), RValue::Integer(-1));
    assert_eq!(run_with_input(0), RValue::Integer(0));
    assert_eq!(run_with_input(5), RValue::Integer(1));
}

/// Scenario D: a two-member return scope collapses into a registered tuple
/// type through `effective-tuple`.
#[test]
fn scenario_d_two_member_return_builds_a_tuple() {
    let mut returns = ScopeDescription::new(None);
    returns.declare_variable("quotient", ValueKind::Integer).unwrap();
    returns.declare_variable("remainder", ValueKind::Integer).unwrap();
    let body = Block::with_scope(
        vec![
            Operation::Assign {
                target: Arc::from("quotient"),
                value: Box::new(Operation::Binary {
                    op: BinOp::Div,
                    lhs: Box::new(Operation::Literal(RValue::Integer(17))),
                    rhs: Box::new(Operation::Literal(RValue::Integer(5))),
                }),
            },
            Operation::Assign {
                target: Arc::from("remainder"),
                value: Box::new(Operation::Binary {
                    op: BinOp::Mod,
                    lhs: Box::new(Operation::Literal(RValue::Integer(17))),
                    rhs: Box::new(Operation::Literal(RValue::Integer(5))),
                }),
            },
            Operation::Return,
        ],
        empty_scope(),
    );
    let entrypoint = Function {
        id: FunctionId(1),
        name: Arc::from("entrypoint"),
        params: empty_scope(),
        returns: Arc::new(returns),
        signature: FunctionSignature::default(),
        body,
    };

    let program = Program::new(
        ProgramConfig::default(),
        empty_scope(),
        vec![entrypoint],
        None,
        "entrypoint",
    );
    let type_id = program.types.register_tuple(vec![
        (Arc::from("quotient"), ValueKind::Integer),
        (Arc::from("remainder"), ValueKind::Integer),
    ]);

    let result = program.execute().expect("entrypoint should run to completion");
    match result {
        RValue::Tuple { type_id: returned_type, members } => {
            assert_eq!(returned_type, type_id);
            assert_eq!(members, vec![
                (Arc::from("quotient"), RValue::Integer(3)),
                (Arc::from("remainder"), RValue::Integer(2)),
            ]);
        }
        other => panic!("expected a tuple, got {other:?}"),
    }
}

/// Scenario E: a forked task replies to its caller by handle, resolved
/// through `GetMessageSender`; the caller waits on the reply with
/// `AcceptMessage`.
#[test]
fn scenario_e_ping_pong_message_round_trip() {
    let pong_candidate = MessageCandidate {
        name: Arc::from("ping"),
        payload_types: vec![ValueKind::Integer],
        body: Block::with_scope(
            vec![Operation::SendMessageByHandle {
                target: Box::new(Operation::GetMessageSender),
                name: Arc::from("pong"),
                payload: vec![Operation::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(Operation::ReadVariable(Arc::from("value"))),
                    rhs: Box::new(Operation::Literal(RValue::Integer(1))),
                }],
            }],
            {
                let mut d = ScopeDescription::new(None);
                d.declare_variable("value", ValueKind::Integer).unwrap();
                Arc::new(d)
            },
        ),
    };
    let pong_task_block = Arc::new(Block::new(vec![Operation::AcceptMessage {
        candidates: vec![pong_candidate],
    }]));

    let mut returns = ScopeDescription::new(None);
    returns.declare_variable("result", ValueKind::Integer).unwrap();
    let reply_candidate = MessageCandidate {
        name: Arc::from("pong"),
        payload_types: vec![ValueKind::Integer],
        body: Block::with_scope(
            vec![Operation::Assign {
                target: Arc::from("result"),
                value: Box::new(Operation::ReadVariable(Arc::from("reply"))),
            }],
            {
                let mut d = ScopeDescription::new(None);
                d.declare_variable("reply", ValueKind::Integer).unwrap();
                Arc::new(d)
            },
        ),
    };
    let body = Block::with_scope(
        vec![
            Operation::Fork {
                block: pong_task_block,
                name: Some(Arc::from("pong_task")),
            },
            Operation::SendMessageByName {
                target_name: Box::new(Operation::Literal(RValue::String(StringHandle(1)))),
                name: Arc::from("ping"),
                payload: vec![Operation::Literal(RValue::Integer(41))],
            },
            Operation::AcceptMessage {
                candidates: vec![reply_candidate],
            },
            Operation::Return,
        ],
        empty_scope(),
    );
    let entrypoint = Function {
        id: FunctionId(1),
        name: Arc::from("entrypoint"),
        params: empty_scope(),
        returns: Arc::new(returns),
        signature: FunctionSignature::default(),
        body,
    };

    let program = Program::new(
        ProgramConfig::default(),
        empty_scope(),
        vec![entrypoint],
        None,
        "entrypoint",
    );
    let handle = program.strings.intern("pong_task");
    assert_eq!(handle, StringHandle(1));

    let result = program.execute().expect("entrypoint should run to completion");
    assert_eq!(result, RValue::Integer(42));
}

/// Scenario F: `ParallelFor` fans a counted range out across a pool, each
/// chunk reporting its share to a forked reducer task that accumulates
/// until every contribution has arrived.
#[test]
fn scenario_f_parallel_for_sum_via_reducer_task() {
    const N: i32 = 5;

    let mut reducer_scope = ScopeDescription::new(None);
    reducer_scope.declare_variable("total", ValueKind::Integer).unwrap();
    reducer_scope.declare_variable("counter", ValueKind::Integer).unwrap();

    let add_candidate = MessageCandidate {
        name: Arc::from("add"),
        payload_types: vec![ValueKind::Integer],
        body: Block::with_scope(
            vec![
                Operation::Assign {
                    target: Arc::from("total"),
                    value: Box::new(Operation::Binary {
                        op: BinOp::Add,
                        lhs: Box::new(Operation::ReadVariable(Arc::from("total"))),
                        rhs: Box::new(Operation::ReadVariable(Arc::from("value"))),
                    }),
                },
                Operation::Assign {
                    target: Arc::from("counter"),
                    value: Box::new(Operation::Binary {
                        op: BinOp::Add,
                        lhs: Box::new(Operation::ReadVariable(Arc::from("counter"))),
                        rhs: Box::new(Operation::Literal(RValue::Integer(1))),
                    }),
                },
            ],
            {
                let mut d = ScopeDescription::new(None);
                d.declare_variable("value", ValueKind::Integer).unwrap();
                Arc::new(d)
            },
        ),
    };

    let while_body = Block::with_scope(
        vec![
            Operation::WhileLoopConditional(Box::new(Operation::Binary {
                op: BinOp::Lt,
                lhs: Box::new(Operation::ReadVariable(Arc::from("counter"))),
                rhs: Box::new(Operation::Literal(RValue::Integer(N))),
            })),
            Operation::AcceptMessage {
                candidates: vec![add_candidate],
            },
        ],
        empty_scope(),
    );

    let reducer_block = Arc::new(Block::with_scope(
        vec![
            Operation::Assign {
                target: Arc::from("total"),
                value: Box::new(Operation::Literal(RValue::Integer(0))),
            },
            Operation::Assign {
                target: Arc::from("counter"),
                value: Box::new(Operation::Literal(RValue::Integer(0))),
            },
            Operation::WhileLoop { body: while_body },
            Operation::SendMessageByHandle {
                target: Box::new(Operation::GetTaskCaller),
                name: Arc::from("sum_done"),
                payload: vec![Operation::ReadVariable(Arc::from("total"))],
            },
        ],
        Arc::new(reducer_scope),
    ));

    let parallel_body = {
        let mut d = ScopeDescription::new(None);
        d.declare_variable("i", ValueKind::Integer).unwrap();
        Arc::new(Block::with_scope(
            vec![Operation::SendMessageByName {
                target_name: Box::new(Operation::Literal(RValue::String(StringHandle(1)))),
                name: Arc::from("add"),
                payload: vec![Operation::ReadVariable(Arc::from("i"))],
            }],
            Arc::new(d),
        ))
    };

    let mut returns = ScopeDescription::new(None);
    returns.declare_variable("result", ValueKind::Integer).unwrap();
    let sum_done_candidate = MessageCandidate {
        name: Arc::from("sum_done"),
        payload_types: vec![ValueKind::Integer],
        body: Block::with_scope(
            vec![Operation::Assign {
                target: Arc::from("result"),
                value: Box::new(Operation::ReadVariable(Arc::from("sum"))),
            }],
            {
                let mut d = ScopeDescription::new(None);
                d.declare_variable("sum", ValueKind::Integer).unwrap();
                Arc::new(d)
            },
        ),
    };
    let body = Block::with_scope(
        vec![
            Operation::Fork {
                block: reducer_block,
                name: Some(Arc::from("reducer")),
            },
            Operation::ParallelFor {
                pool: Arc::from("scenario-f-pool"),
                lower: Box::new(Operation::Literal(RValue::Integer(0))),
                upper: Box::new(Operation::Literal(RValue::Integer(N))),
                workers: 2,
                counter_name: Arc::from("i"),
                body: parallel_body,
            },
            Operation::AcceptMessage {
                candidates: vec![sum_done_candidate],
            },
            Operation::Return,
        ],
        empty_scope(),
    );
    let entrypoint = Function {
        id: FunctionId(1),
        name: Arc::from("entrypoint"),
        params: empty_scope(),
        returns: Arc::new(returns),
        signature: FunctionSignature::default(),
        body,
    };

    let program = Program::new(
        ProgramConfig::default(),
        empty_scope(),
        vec![entrypoint],
        None,
        "entrypoint",
    );
    let handle = program.strings.intern("reducer");
    assert_eq!(handle, StringHandle(1));

    let result = program.execute().expect("entrypoint should run to completion");
    assert_eq!(result, RValue::Integer((0..N).sum()));
}

/// A function invocation leaves no unconsumed ghost set behind: calling
/// the same function twice in a row must not leak stack depth or ghosting
/// state between calls.
#[test]
fn repeated_invocation_does_not_accumulate_state() {
    let mut params = ScopeDescription::new(None);
    params.declare_variable("x", ValueKind::Integer).unwrap();
    let mut returns = ScopeDescription::new(None);
    returns.declare_variable("doubled", ValueKind::Integer).unwrap();
    let body = Block::with_scope(
        vec![
            Operation::Assign {
                target: Arc::from("doubled"),
                value: Box::new(Operation::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(Operation::ReadVariable(Arc::from("x"))),
                    rhs: Box::new(Operation::ReadVariable(Arc::from("x"))),
                }),
            },
            Operation::Return,
        ],
        empty_scope(),
    );
    let double = Function {
        id: FunctionId(1),
        name: Arc::from("double"),
        params: Arc::new(params),
        returns: Arc::new(returns),
        signature: FunctionSignature {
            params: vec![ParamDecl::value(ValueKind::Integer)],
            returns: vec![ValueKind::Integer],
        },
        body,
    };

    let program = Program::new(
        ProgramConfig::default(),
        empty_scope(),
        vec![double],
        None,
        "entrypoint",
    );
    let mut ctx = program.clone().test_context();
    let function = program.function(FunctionId(1)).unwrap();
    let before = ctx.stack.current_top();
    assert_eq!(function.invoke(&mut ctx, vec![RValue::Integer(3)]).unwrap(), RValue::Integer(6));
    assert_eq!(function.invoke(&mut ctx, vec![RValue::Integer(10)]).unwrap(), RValue::Integer(20));
    assert_eq!(ctx.stack.current_top(), before);
}
