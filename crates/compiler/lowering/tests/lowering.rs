use std::cell::Cell;
use std::rc::Rc;

use veld_ast::{FileId, Span};
use veld_compiler_lowering::bound::{
    BoundExpr, BoundStmt, SwitchKind, SwitchSection, SwitchValueKind,
};
use veld_compiler_lowering::container::{self, CompilationCaches};
use veld_compiler_lowering::dag::{Binding, DagNode, DagTempId, DagTest, Evaluation};
use veld_compiler_lowering::instrument::NoInstrument;
use veld_compiler_lowering::ir::{self, display_stmts, BinOp, Const};
use veld_compiler_lowering::symbols::{
    predef, EnclosingMethod, FieldId, LabelId, LocalId, LocalInfo, MemberResolver, MethodId,
    MethodKind, MethodRef, MethodSymbol, Modified, NamedType, TempKind, TypeId, TypeKind,
    TypeParam, Type, WellKnown,
};
use veld_compiler_lowering::{
    Error, LowerOptions, LoweredBody, Lowerer, OptimizationLevel, Reporter,
};

fn span() -> Span {
    Span::new(0, 0, FileId::default())
}

fn runtime_type() -> Rc<NamedType<'static>> {
    Rc::new(NamedType {
        id: TypeId::new("Runtime"),
        kind: TypeKind::Class,
        args: [].into(),
        containing: None,
    })
}

fn method_ref(name: &'static str) -> MethodRef<'static> {
    MethodRef::new(
        MethodId::new(TypeId::new("Runtime"), name),
        MethodKind::Ordinary,
        runtime_type(),
    )
}

struct Runtime;

impl MemberResolver<'static> for Runtime {
    fn resolve(&self, member: WellKnown) -> Option<MethodRef<'static>> {
        let name = match member {
            WellKnown::MonitorEnter => "monitor_enter",
            WellKnown::MonitorExit => "monitor_exit",
            WellKnown::ScopeEnter => "scope_enter",
            WellKnown::ScopeDispose => "scope_dispose",
            WellKnown::Dispose => "dispose",
            WellKnown::NullableHasValue => "has_value",
            WellKnown::NullableGetValueOrDefault => "get_value_or_default",
            WellKnown::DecimalCtor => "decimal",
            WellKnown::TupleCtor => "tuple",
            WellKnown::DelegateCtor => "delegate",
            WellKnown::RangeCtor => "range",
            WellKnown::RangeStartAt => "range_start_at",
            WellKnown::RangeEndAt => "range_end_at",
            WellKnown::RangeAll => "range_all",
            WellKnown::ListCtor => "list",
            WellKnown::ListAdd => "add",
            WellKnown::ObjectClone => "clone",
            WellKnown::StringEquals => "string_equals",
            WellKnown::StringHash => "string_hash",
        };
        Some(method_ref(name))
    }
}

fn method_symbol() -> MethodSymbol<'static> {
    MethodSymbol {
        id: MethodId::new(TypeId::new("Widget"), "run"),
        containing: Rc::new(NamedType {
            id: TypeId::new("Widget"),
            kind: TypeKind::Class,
            args: [].into(),
            containing: None,
        }),
        type_params: [].into(),
        enclosing: [].into(),
        kind: MethodKind::Ordinary,
    }
}

fn lower_body(
    caches: &'static CompilationCaches<'static>,
    reporter: &mut Reporter<Error<'static>>,
    options: LowerOptions,
    method: MethodSymbol<'static>,
    body: &BoundStmt<'static>,
) -> LoweredBody<'static> {
    // counters start past every id the trees below mention
    let local_counter = Cell::new(100);
    let label_counter = Cell::new(100);
    Lowerer::function()
        .body(body)
        .method(method)
        .resolver(&Runtime)
        .caches(caches)
        .reporter(reporter)
        .instrument(&mut NoInstrument)
        .local_counter(&local_counter)
        .label_counter(&label_counter)
        .options(options)
        .build()
}

fn lower(body: &BoundStmt<'static>) -> LoweredBody<'static> {
    lower_with_options(LowerOptions::default(), body)
}

fn lower_with_options(options: LowerOptions, body: &BoundStmt<'static>) -> LoweredBody<'static> {
    lower_with_method(options, method_symbol(), body)
}

fn lower_with_method(
    options: LowerOptions,
    method: MethodSymbol<'static>,
    body: &BoundStmt<'static>,
) -> LoweredBody<'static> {
    let caches = Box::leak(Box::new(CompilationCaches::new("test")));
    let mut reporter = Reporter::default();
    let body = lower_body(caches, &mut reporter, options, method, body);
    assert!(
        reporter.is_empty(),
        "unexpected diagnostics: {:?}",
        reporter.reported()
    );
    body
}

fn widget_ty() -> Type<'static> {
    Type::nullary(TypeId::new("Widget"), TypeKind::Class)
}

fn local(id: u32, ty: Type<'static>) -> BoundExpr<'static> {
    BoundExpr::Local(LocalId(id), ty, span())
}

fn call(name: &'static str, ty: Type<'static>) -> BoundExpr<'static> {
    BoundExpr::Call {
        method: method_ref(name),
        receiver: None,
        args: [].into(),
        ty,
        span: span(),
    }
}

fn call_stmt(name: &'static str) -> BoundStmt<'static> {
    BoundStmt::Expr(Box::new(call(name, Type::prim(predef::VOID))))
}

#[test]
fn while_loop_lowers_to_a_bottom_tested_label_graph() {
    let body = BoundStmt::While {
        condition: Box::new(local(0, Type::prim(predef::BOOL))),
        body: Box::new(call_stmt("tick")),
        break_label: LabelId(10),
        continue_label: LabelId(11),
        span: span(),
    };

    let lowered = lower(&body);
    insta::assert_snapshot!(display_stmts(&lowered.stmts), @r"
    goto L11
    label L100
    call Runtime::tick()
    label L11
    if t0 goto L100
    label L10
    ");
}

#[test]
fn do_while_enters_the_body_without_a_leading_jump() {
    let body = BoundStmt::DoWhile {
        condition: Box::new(local(0, Type::prim(predef::BOOL))),
        body: Box::new(call_stmt("tick")),
        break_label: LabelId(10),
        continue_label: LabelId(11),
        span: span(),
    };

    let lowered = lower(&body);
    insta::assert_snapshot!(display_stmts(&lowered.stmts), @r"
    label L100
    call Runtime::tick()
    label L11
    if t0 goto L100
    label L10
    ");
}

#[test]
fn monitor_lock_guards_the_exit_with_a_taken_flag() {
    let body = BoundStmt::Lock {
        resource: Box::new(local(0, widget_ty())),
        body: Box::new(call_stmt("tick")),
        span: span(),
    };

    let lowered = lower(&body);
    // the flag is cleared before the protected region starts
    let ir::Stmt::Expr(init) = &lowered.stmts[0] else {
        panic!("expected the taken flag initialization");
    };
    assert_eq!(init.to_string(), "t100 = false");

    let ir::Stmt::Try {
        body: try_body,
        catches,
        finally: Some(finally),
        ..
    } = &lowered.stmts[1]
    else {
        panic!("expected a try/finally region");
    };
    assert!(catches.is_empty());
    assert_eq!(
        display_stmts(try_body).to_string(),
        "call Runtime::monitor_enter(t0, t100)\n\
         call Runtime::tick()\n"
    );
    assert_eq!(
        display_stmts(finally).to_string(),
        "if not t100 goto L100\n\
         call Runtime::monitor_exit(t0)\n\
         label L100\n"
    );
}

#[test]
fn scoped_lock_enters_the_scope_and_disposes_it_in_a_finally() {
    let mutex_ty = Type::nullary(TypeId::new("Mutex"), TypeKind::ScopedLock);
    let body = BoundStmt::Lock {
        resource: Box::new(local(0, mutex_ty)),
        body: Box::new(call_stmt("tick")),
        span: span(),
    };

    let lowered = lower(&body);
    insta::assert_snapshot!(display_stmts(&lowered.stmts), @r"
    t100 = t0.call Runtime::scope_enter()
    try {
      call Runtime::tick()
    }
    finally {
      t100.call Runtime::scope_dispose()
    }
    ");
}

#[test]
fn using_disposes_reference_resources_only_when_non_null() {
    let body = BoundStmt::Using {
        local: None,
        resource: Box::new(call("get_widget", widget_ty())),
        body: Box::new(call_stmt("tick")),
        span: span(),
    };

    let lowered = lower(&body);
    insta::assert_snapshot!(display_stmts(&lowered.stmts), @r"
    t100 = call Runtime::get_widget()
    try {
      call Runtime::tick()
    }
    finally {
      if not (t100 != null) goto L100
      t100.call Runtime::dispose()
      label L100
    }
    ");
}

#[test]
fn deconstruction_evaluates_targets_then_source_then_stores() {
    let pair_ty = Type::nullary(TypeId::new("Pair"), TypeKind::Tuple);
    let body = BoundStmt::Expr(Box::new(BoundExpr::DeconstructAssign {
        targets: [
            BoundExpr::Field {
                receiver: Some(Box::new(call("get_widget", widget_ty()))),
                field: FieldId::new(TypeId::new("Widget"), "f"),
                ty: Type::prim(predef::INT32),
                span: span(),
            },
            local(0, Type::prim(predef::INT32)),
        ]
        .into(),
        source: Box::new(call("make", pair_ty.clone())),
        deconstruct: None,
        element_fields: [
            FieldId::new(TypeId::new("Pair"), "a"),
            FieldId::new(TypeId::new("Pair"), "b"),
        ]
        .into(),
        conversions: [None, None].into(),
        ty: pair_ty,
        span: span(),
    }));

    let lowered = lower(&body);
    let ir::Stmt::Expr(expr) = &lowered.stmts[0] else {
        panic!("expected an expression statement");
    };
    assert_eq!(
        expr.to_string(),
        "seq([t100, t101, t102, t103] \
         t100 = call Runtime::get_widget(); \
         t101 = call Runtime::make(); \
         t102 = t101.a; \
         t103 = t101.b; \
         t100.f = t102; \
         t0 = t103; \
         t101)"
    );
}

#[test]
fn coalesce_with_a_null_constant_folds_to_the_right_side() {
    let body = BoundStmt::Return(
        Some(Box::new(BoundExpr::Coalesce {
            lhs: Box::new(BoundExpr::Const(Const::Null, widget_ty(), span())),
            rhs: Box::new(local(0, widget_ty())),
            ty: widget_ty(),
            span: span(),
        })),
        span(),
    );

    let lowered = lower(&body);
    assert_eq!(display_stmts(&lowered.stmts).to_string(), "return t0\n");
}

#[test]
fn coalesce_with_a_non_null_constant_drops_the_right_side() {
    let body = BoundStmt::Return(
        Some(Box::new(BoundExpr::Coalesce {
            lhs: Box::new(BoundExpr::Const(
                Const::Str("fallback".into()),
                Type::prim(predef::STRING),
                span(),
            )),
            rhs: Box::new(call("expensive", Type::prim(predef::STRING))),
            ty: Type::prim(predef::STRING),
            span: span(),
        })),
        span(),
    );

    let lowered = lower(&body);
    assert_eq!(
        display_stmts(&lowered.stmts).to_string(),
        "return \"fallback\"\n"
    );
}

#[test]
fn coalesce_on_a_reference_evaluates_the_left_side_once() {
    let body = BoundStmt::Return(
        Some(Box::new(BoundExpr::Coalesce {
            lhs: Box::new(call("get_widget", widget_ty())),
            rhs: Box::new(local(0, widget_ty())),
            ty: widget_ty(),
            span: span(),
        })),
        span(),
    );

    let lowered = lower(&body);
    assert_eq!(
        display_stmts(&lowered.stmts).to_string(),
        "return seq([t100] t100 = call Runtime::get_widget(); ((t100 != null) ? t100 : t0))\n"
    );
}

#[test]
fn coalesce_on_a_nullable_value_unwraps_through_the_helpers() {
    let body = BoundStmt::Return(
        Some(Box::new(BoundExpr::Coalesce {
            lhs: Box::new(local(0, nullable_int())),
            rhs: Box::new(BoundExpr::Const(
                Const::I32(5),
                Type::prim(predef::INT32),
                span(),
            )),
            ty: Type::prim(predef::INT32),
            span: span(),
        })),
        span(),
    );

    let lowered = lower(&body);
    assert_eq!(
        display_stmts(&lowered.stmts).to_string(),
        "return (t0.call Runtime::has_value() ? t0.call Runtime::get_value_or_default() : 5)\n"
    );
}

#[test]
fn coalesce_assign_evaluates_the_target_receiver_once() {
    let body = BoundStmt::Return(
        Some(Box::new(BoundExpr::CoalesceAssign {
            place: Box::new(BoundExpr::Field {
                receiver: Some(Box::new(call("get_widget", widget_ty()))),
                field: FieldId::new(TypeId::new("Widget"), "f"),
                ty: widget_ty(),
                span: span(),
            }),
            value: Box::new(local(0, widget_ty())),
            ty: widget_ty(),
            span: span(),
        })),
        span(),
    );

    let lowered = lower(&body);
    let printed = display_stmts(&lowered.stmts).to_string();
    assert_eq!(
        printed,
        "return seq([t100] t100 = call Runtime::get_widget(); \
         ((t100.f != null) ? t100.f : t100.f = t0))\n"
    );
    assert_eq!(printed.matches("get_widget").count(), 1, "{printed}");
}

#[test]
fn decimal_constants_become_a_helper_constructor_call() {
    let body = BoundStmt::Return(
        Some(Box::new(BoundExpr::Const(
            Const::Decimal {
                mantissa: 5,
                scale: 2,
            },
            Type::prim(predef::DECIMAL),
            span(),
        ))),
        span(),
    );

    let lowered = lower(&body);
    assert_eq!(
        display_stmts(&lowered.stmts).to_string(),
        "return new Runtime(5u64, 0u64, 2u32)\n"
    );
}

fn empty_section(label: u32) -> SwitchSection<'static> {
    SwitchSection {
        label: LabelId(label),
        locals: [].into(),
        stmts: [].into(),
        span: span(),
    }
}

fn nullable_int() -> Type<'static> {
    Type::app(
        predef::NULLABLE,
        TypeKind::Nullable,
        [Modified::bare(Type::prim(predef::INT32))],
    )
}

fn pattern_var(id: u32, ty: Type<'static>) -> LocalInfo<'static> {
    LocalInfo::new(LocalId(id), Some("x"), ty, TempKind::UserDefined, None)
}

#[test]
fn diamond_dag_emits_the_shared_node_once() {
    let default_leaf = DagNode::leaf(LabelId(21), span());
    let dag = DagNode::test(
        DagTest::TypeTest {
            input: DagTempId::INPUT,
            target: widget_ty(),
        },
        DagNode::test(
            DagTest::NonNull(DagTempId::INPUT),
            DagNode::leaf(LabelId(20), span()),
            default_leaf.clone(),
            span(),
        ),
        default_leaf,
        span(),
    );

    let body = BoundStmt::Switch {
        scrutinee: Box::new(local(0, widget_ty())),
        kind: SwitchKind::Decision {
            dag,
            default_label: LabelId(21),
        },
        sections: [empty_section(20), empty_section(21)].into(),
        break_label: LabelId(22),
        span: span(),
    };

    let lowered = lower(&body);
    let printed = display_stmts(&lowered.stmts).to_string();
    // both failing tests jump to the same label, which is defined once and
    // forwards to the default arm exactly once
    assert_eq!(printed.matches("goto L100").count(), 2, "{printed}");
    assert_eq!(printed.matches("label L100").count(), 1, "{printed}");
    assert_eq!(printed.matches("goto L21").count(), 1, "{printed}");
}

#[test]
fn switch_on_a_nullable_scrutinee_branches_to_default_on_null() {
    let body = BoundStmt::Switch {
        scrutinee: Box::new(local(0, nullable_int())),
        kind: SwitchKind::Value {
            value_kind: SwitchValueKind::Int,
            cases: [(Const::I32(1), LabelId(20))].into(),
            default_label: LabelId(21),
        },
        sections: [empty_section(20), empty_section(21)].into(),
        break_label: LabelId(22),
        span: span(),
    };

    let lowered = lower(&body);
    insta::assert_snapshot!(display_stmts(&lowered.stmts), @r"
    if not t0.call Runtime::has_value() goto L21
    t100 = t0.call Runtime::get_value_or_default()
    switch t100 [
      1 => L20
    ] else L21
    label L20
    {
    }
    label L21
    {
    }
    label L22
    ");
}

#[test]
fn guarded_arm_bindings_live_inside_the_arm_section() {
    let dag = DagNode::when(
        [Binding {
            source: DagTempId::INPUT,
            target: pattern_var(5, widget_ty()),
        }],
        Some(BoundExpr::Const(
            Const::Bool(true),
            Type::prim(predef::BOOL),
            span(),
        )),
        DagNode::leaf(LabelId(20), span()),
        Some(DagNode::leaf(LabelId(21), span())),
        span(),
    );
    let body = BoundStmt::Switch {
        scrutinee: Box::new(local(0, widget_ty())),
        kind: SwitchKind::Decision {
            dag,
            default_label: LabelId(21),
        },
        sections: [empty_section(20), empty_section(21)].into(),
        break_label: LabelId(22),
        span: span(),
    };

    // the binding and the guard run inside the arm's section block, so the
    // pattern variable is scoped to the arm it belongs to
    let lowered = lower(&body);
    insta::assert_snapshot!(display_stmts(&lowered.stmts), @r"
    goto L100
    label L101
    goto L21
    { [t5]
      label L100
      t5 = t0
      if not true goto L101
      goto L20
      label L20
    }
    label L21
    {
    }
    label L22
    ");
}

#[test]
fn guard_free_dag_bindings_alias_the_pattern_variables() {
    let evaluation = || Evaluation::Field {
        input: DagTempId::INPUT,
        field: FieldId::new(TypeId::new("Widget"), "f"),
        ty: Type::prim(predef::INT32),
        output: DagTempId(1),
    };
    let switch = |dag| BoundStmt::Switch {
        scrutinee: Box::new(local(0, widget_ty())),
        kind: SwitchKind::Decision {
            dag,
            default_label: LabelId(21),
        },
        sections: [empty_section(20), empty_section(21)].into(),
        break_label: LabelId(22),
        span: span(),
    };
    let binding = || Binding {
        source: DagTempId(1),
        target: pattern_var(5, Type::prim(predef::INT32)),
    };

    // without a guard the evaluation writes the pattern variable directly
    let aliased = switch(DagNode::evaluate(
        evaluation(),
        DagNode::when([binding()], None, DagNode::leaf(LabelId(20), span()), None, span()),
        span(),
    ));
    let lowered = lower(&aliased);
    insta::assert_snapshot!(display_stmts(&lowered.stmts), @r"
    t5 = t0.f
    goto L20
    label L20
    {
    }
    label L21
    {
    }
    label L22
    ");

    // with a guard the value goes through a dag temp and is copied in the
    // arm's prologue, since a failed guard re-enters the dag
    let copied = switch(DagNode::evaluate(
        evaluation(),
        DagNode::when(
            [binding()],
            Some(BoundExpr::Const(
                Const::Bool(true),
                Type::prim(predef::BOOL),
                span(),
            )),
            DagNode::leaf(LabelId(20), span()),
            Some(DagNode::leaf(LabelId(21), span())),
            span(),
        ),
        span(),
    ));
    let lowered = lower(&copied);
    insta::assert_snapshot!(display_stmts(&lowered.stmts), @r"
    t100 = t0.f
    goto L100
    label L101
    goto L21
    { [t5]
      label L100
      t5 = t100
      if not true goto L101
      goto L20
      label L20
    }
    label L21
    {
    }
    label L22
    ");
}

#[test]
fn int_switch_lowers_to_a_switch_table() {
    let body = BoundStmt::Switch {
        scrutinee: Box::new(local(0, Type::prim(predef::INT32))),
        kind: SwitchKind::Value {
            value_kind: SwitchValueKind::Int,
            cases: [
                (Const::I32(1), LabelId(20)),
                (Const::I32(2), LabelId(21)),
            ]
            .into(),
            default_label: LabelId(22),
        },
        sections: [empty_section(20), empty_section(21), empty_section(22)].into(),
        break_label: LabelId(23),
        span: span(),
    };

    let lowered = lower(&body);
    let ir::Stmt::SwitchTable {
        cases, fallback, ..
    } = &lowered.stmts[0]
    else {
        panic!("expected a switch table");
    };
    assert_eq!(cases.len(), 2);
    assert_eq!(*fallback, LabelId(22));
}

#[test]
fn small_string_switch_is_an_equality_chain() {
    let body = BoundStmt::Switch {
        scrutinee: Box::new(local(0, Type::prim(predef::STRING))),
        kind: SwitchKind::Value {
            value_kind: SwitchValueKind::String,
            cases: [
                (Const::Str("on".into()), LabelId(20)),
                (Const::Str("off".into()), LabelId(21)),
            ]
            .into(),
            default_label: LabelId(22),
        },
        sections: [empty_section(20), empty_section(21), empty_section(22)].into(),
        break_label: LabelId(23),
        span: span(),
    };

    let lowered = lower(&body);
    let printed = display_stmts(&lowered.stmts).to_string();
    assert!(!printed.contains("string_hash"), "{printed}");
    assert!(
        printed.starts_with("if call Runtime::string_equals(t0, \"on\") goto L20\n"),
        "{printed}"
    );
}

#[test]
fn large_string_switch_buckets_by_hash_first() {
    let words = ["if", "else", "while", "for", "switch", "return", "break"];
    let cases: Box<[_]> = words
        .iter()
        .enumerate()
        .map(|(i, word)| (Const::Str((*word).into()), LabelId(20 + i as u32)))
        .collect();
    let sections: Box<[_]> = (0..=words.len() as u32).map(|i| empty_section(20 + i)).collect();

    let body = BoundStmt::Switch {
        scrutinee: Box::new(local(0, Type::prim(predef::STRING))),
        kind: SwitchKind::Value {
            value_kind: SwitchValueKind::String,
            cases,
            default_label: LabelId(20 + words.len() as u32),
        },
        sections,
        break_label: LabelId(40),
        span: span(),
    };

    let lowered = lower(&body);
    let table = lowered
        .stmts
        .iter()
        .find_map(|stmt| match stmt {
            ir::Stmt::SwitchTable { cases, .. } => Some(cases),
            _ => None,
        })
        .expect("expected a hash dispatch table");

    let mut hashes: Vec<_> = words.iter().map(|word| container::string_hash(word)).collect();
    hashes.sort_unstable();
    hashes.dedup();
    assert_eq!(table.len(), hashes.len());
    for (constant, _) in table.iter() {
        assert!(matches!(constant, Const::U32(hash) if hashes.contains(hash)));
    }

    let printed = display_stmts(&lowered.stmts).to_string();
    assert!(printed.contains("call Runtime::string_hash(t0)"), "{printed}");
    assert!(
        printed.contains("call Runtime::string_equals(t0, \"while\")"),
        "{printed}"
    );
}

#[test]
fn relational_switch_never_compares_linearly() {
    let cases: Box<[_]> = (0..32)
        .map(|i| veld_compiler_lowering::bound::RelationalCase {
            op: BinOp::Lt,
            bound: Const::I32(i * 10),
            label: LabelId(20 + i as u32),
        })
        .collect();
    let sections: Box<[_]> = (0..=32).map(|i| empty_section(20 + i)).collect();

    let body = BoundStmt::Switch {
        scrutinee: Box::new(local(0, Type::prim(predef::INT32))),
        kind: SwitchKind::Relational {
            cases,
            default_label: LabelId(52),
        },
        sections,
        break_label: LabelId(60),
        span: span(),
    };

    let lowered = lower(&body);
    let printed = display_stmts(&lowered.stmts).to_string();
    // one comparison per case, arranged as a tree: every case label is
    // reachable and every bound appears exactly once
    assert_eq!(printed.matches("if not (t0 <").count(), 32, "{printed}");
    for case in 0..32u32 {
        let target = format!("goto L{}", 20 + case);
        assert_eq!(printed.matches(target.as_str()).count(), 1, "{printed}");
    }
}

#[test]
fn linear_pattern_test_folds_into_a_conjunction() {
    let dag = DagNode::test(
        DagTest::NonNull(DagTempId::INPUT),
        DagNode::leaf(LabelId(20), span()),
        DagNode::leaf(LabelId(21), span()),
        span(),
    );
    let body = BoundStmt::Return(
        Some(Box::new(BoundExpr::PatternTest {
            scrutinee: Box::new(local(0, widget_ty())),
            dag,
            success: LabelId(20),
            failure: LabelId(21),
            ty: Type::prim(predef::BOOL),
            span: span(),
        })),
        span(),
    );

    let lowered = lower(&body);
    assert_eq!(
        display_stmts(&lowered.stmts).to_string(),
        "return (t0 != null)\n"
    );
}

#[test]
fn pattern_test_with_failure_on_the_true_side_negates_the_test() {
    // `x is not null`: the failure leaf hangs off the true branch, so the
    // surviving branch holds the negated test
    let dag = DagNode::test(
        DagTest::NonNull(DagTempId::INPUT),
        DagNode::leaf(LabelId(21), span()),
        DagNode::leaf(LabelId(20), span()),
        span(),
    );
    let body = BoundStmt::Return(
        Some(Box::new(BoundExpr::PatternTest {
            scrutinee: Box::new(local(0, widget_ty())),
            dag,
            success: LabelId(20),
            failure: LabelId(21),
            ty: Type::prim(predef::BOOL),
            span: span(),
        })),
        span(),
    );

    let lowered = lower(&body);
    assert_eq!(
        display_stmts(&lowered.stmts).to_string(),
        "return !(t0 != null)\n"
    );
}

#[test]
fn pattern_chain_sharing_the_failure_leaf_stays_linear() {
    // canonical dag construction reuses one failure leaf for every test
    let failure = DagNode::leaf(LabelId(21), span());
    let dag = DagNode::test(
        DagTest::TypeTest {
            input: DagTempId::INPUT,
            target: widget_ty(),
        },
        DagNode::test(
            DagTest::NonNull(DagTempId::INPUT),
            DagNode::leaf(LabelId(20), span()),
            failure.clone(),
            span(),
        ),
        failure,
        span(),
    );
    let body = BoundStmt::Return(
        Some(Box::new(BoundExpr::PatternTest {
            scrutinee: Box::new(local(0, widget_ty())),
            dag,
            success: LabelId(20),
            failure: LabelId(21),
            ty: Type::prim(predef::BOOL),
            span: span(),
        })),
        span(),
    );

    let lowered = lower(&body);
    assert_eq!(
        display_stmts(&lowered.stmts).to_string(),
        "return ((t0 is Widget) && (t0 != null))\n"
    );
}

#[test]
fn guarded_pattern_test_in_expression_position_is_rejected() {
    let failure = DagNode::leaf(LabelId(21), span());
    let dag = DagNode::when(
        [],
        Some(BoundExpr::Const(
            Const::Bool(true),
            Type::prim(predef::BOOL),
            span(),
        )),
        DagNode::leaf(LabelId(20), span()),
        Some(failure),
        span(),
    );
    let body = BoundStmt::Return(
        Some(Box::new(BoundExpr::PatternTest {
            scrutinee: Box::new(local(0, widget_ty())),
            dag,
            success: LabelId(20),
            failure: LabelId(21),
            ty: Type::prim(predef::BOOL),
            span: span(),
        })),
        span(),
    );

    let caches = Box::leak(Box::new(CompilationCaches::new("test")));
    let mut reporter = Reporter::default();
    let lowered = lower_body(
        caches,
        &mut reporter,
        LowerOptions::default(),
        method_symbol(),
        &body,
    );
    assert_eq!(reporter.reported().len(), 1);
    assert_eq!(reporter.reported()[0].code(), "NON_LINEAR_MATCH");
    assert!(matches!(lowered.stmts[0], ir::Stmt::Error(_)));
}

#[test]
fn deeply_nested_expressions_hit_the_recursion_limit() {
    let mut expr = local(0, Type::prim(predef::BOOL));
    for _ in 0..32 {
        expr = BoundExpr::Unary {
            op: ir::UnOp::Not,
            operand: Box::new(expr),
            ty: Type::prim(predef::BOOL),
            span: span(),
        };
    }
    let body = BoundStmt::Return(Some(Box::new(expr)), span());

    let caches = Box::leak(Box::new(CompilationCaches::new("test")));
    let mut reporter = Reporter::default();
    let options = LowerOptions {
        max_depth: 8,
        ..LowerOptions::default()
    };
    let lowered = lower_body(caches, &mut reporter, options, method_symbol(), &body);
    assert_eq!(reporter.reported().len(), 1);
    assert_eq!(reporter.reported()[0].code(), "RECURSION_LIMIT");
    assert!(matches!(lowered.stmts[0], ir::Stmt::Error(_)));
}

#[test]
fn release_builds_cache_receiverless_delegates() {
    let delegate_ty = Type::nullary(TypeId::new("Action"), TypeKind::Delegate);
    let body = BoundStmt::Return(
        Some(Box::new(BoundExpr::DelegateCreation {
            method: method_ref("tick"),
            receiver: None,
            ty: delegate_ty,
            span: span(),
        })),
        span(),
    );

    let debug = lower(&body);
    let printed = display_stmts(&debug.stmts).to_string();
    assert!(!printed.contains("cache_0"), "{printed}");

    let options = LowerOptions {
        optimize: OptimizationLevel::Release,
        cache_delegates: true,
        ..LowerOptions::default()
    };
    let release = lower_with_options(options, &body);
    let printed = display_stmts(&release.stmts).to_string();
    assert!(printed.contains("<ModuleCache>::cache_0"), "{printed}");
    assert!(printed.contains("new Runtime(null, &Runtime::tick)"), "{printed}");
}

fn caching_options() -> LowerOptions {
    LowerOptions {
        optimize: OptimizationLevel::Release,
        cache_delegates: true,
        ..LowerOptions::default()
    }
}

fn delegate_over(param: TypeParam<'static>) -> BoundStmt<'static> {
    BoundStmt::Return(
        Some(Box::new(BoundExpr::DelegateCreation {
            method: method_ref("tick"),
            receiver: None,
            ty: Type::app(
                TypeId::new("Func"),
                TypeKind::Delegate,
                [Modified::bare(Type::Param(param))],
            ),
            span: span(),
        })),
        span(),
    )
}

#[test]
fn local_function_delegates_cache_in_the_enclosing_generic_container() {
    let outer_param = TypeParam::new("Widget::outer", 0, "T");
    let method = MethodSymbol {
        id: MethodId::new(TypeId::new("Widget"), "inner"),
        containing: Rc::new(NamedType {
            id: TypeId::new("Widget"),
            kind: TypeKind::Class,
            args: [].into(),
            containing: None,
        }),
        type_params: [].into(),
        enclosing: [EnclosingMethod {
            id: MethodId::new(TypeId::new("Widget"), "outer"),
            type_params: [outer_param].into(),
        }]
        .into(),
        kind: MethodKind::LocalFunction {
            captures_type_params: true,
        },
    };

    // the container hangs off the nearest generic method, not the local
    // function itself
    let lowered = lower_with_method(caching_options(), method, &delegate_over(outer_param));
    let printed = display_stmts(&lowered.stmts).to_string();
    assert!(printed.contains("<Cache>outer@test::cache_0"), "{printed}");
}

#[test]
fn delegates_over_the_containing_types_parameters_stay_concrete() {
    // "U" belongs to the containing type, not to any enclosing method, so
    // one module-level slot serves every instantiation
    let type_param = TypeParam::new("Widget", 0, "U");
    let lowered = lower_with_options(caching_options(), &delegate_over(type_param));
    let printed = display_stmts(&lowered.stmts).to_string();
    assert!(printed.contains("<ModuleCache>::cache_0"), "{printed}");
}

#[test]
fn await_inside_a_handler_is_flagged_for_the_state_machine_pass() {
    let await_tick = BoundStmt::Expr(Box::new(BoundExpr::Await {
        operand: Box::new(call("tick", Type::prim(predef::VOID))),
        ty: Type::prim(predef::VOID),
        span: span(),
    }));
    let body = BoundStmt::Try {
        body: Box::new(call_stmt("tick")),
        catches: [].into(),
        finally: Some(Box::new(await_tick)),
        span: span(),
    };

    let lowered = lower(&body);
    assert!(lowered.saw_await_in_handler);

    let plain = BoundStmt::Expr(Box::new(BoundExpr::Await {
        operand: Box::new(call("tick", Type::prim(predef::VOID))),
        ty: Type::prim(predef::VOID),
        span: span(),
    }));
    let lowered = lower(&plain);
    assert!(!lowered.saw_await_in_handler);
}
