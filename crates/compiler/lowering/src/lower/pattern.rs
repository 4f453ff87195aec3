use std::rc::Rc;

use hashbrown::{HashMap, HashSet};
use veld_ast::Span;

use super::{Lowerer, PlaceholderEnv};
use crate::bound::BoundExpr;
use crate::dag::{
    self, DagNode, DagTempId, DagTest, Evaluation, IdentityState, NodeKey,
};
use crate::diagnostic::{Error, LowerResult};
use crate::ir::{self, BinOp, Const};
use crate::symbols::{predef, LabelId, LocalId, TempKind, Type};
use crate::IndexMap;

/// Binding and guard code owned by one switch arm. The dispatch stream
/// jumps to the entry label; the statements land inside the arm's section
/// block so the pattern variables are scoped to it.
#[derive(Debug, Default)]
pub(super) struct ArmPrologue<'ctx> {
    pub locals: Vec<LocalId>,
    pub stmts: Vec<ir::Stmt<'ctx>>,
}

/// Per-dag emission state. Shared nodes get a label on demand and are
/// emitted at most once; dag temporaries map to locals as they are first
/// written.
struct DagState<'ctx> {
    indegrees: HashMap<NodeKey, u32, IdentityState>,
    labels: HashMap<NodeKey, LabelId, IdentityState>,
    emitted: HashSet<NodeKey, IdentityState>,
    temps: HashMap<DagTempId, (LocalId, Type<'ctx>)>,
    arms: IndexMap<LabelId, ArmPrologue<'ctx>>,
}

impl<'ctx> DagState<'ctx> {
    fn new(root: &Rc<DagNode<'ctx>>, scrutinee: LocalId, ty: Type<'ctx>) -> Self {
        let mut temps = HashMap::new();
        temps.insert(DagTempId::INPUT, (scrutinee, ty));
        Self {
            indegrees: dag::indegrees(root),
            labels: HashMap::default(),
            emitted: HashSet::default(),
            temps,
            arms: IndexMap::default(),
        }
    }

    fn slot(&self, id: DagTempId) -> (LocalId, Type<'ctx>) {
        self.temps
            .get(&id)
            .cloned()
            .expect("dag slots are written before they are read")
    }
}

impl<'scope, 'ctx> Lowerer<'scope, 'ctx> {
    /// Emits a decision dag as label-and-goto statements. Every leaf jumps
    /// to its arm label, shared interior nodes are emitted once and reached
    /// by jumps afterwards. Binding and guard code is not emitted inline;
    /// it is returned keyed by arm label so the switch lowering can place
    /// it inside the owning section.
    pub(super) fn lower_decision_dag(
        &mut self,
        dag: &Rc<DagNode<'ctx>>,
        scrutinee: LocalId,
        ty: Type<'ctx>,
        _span: Span,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, IndexMap<LabelId, ArmPrologue<'ctx>>> {
        let mut state = DagState::new(dag, scrutinee, ty);
        // Without guards an arm is entered exactly once, so its pattern
        // variables can directly serve as the dag slots they bind.
        if !DagNode::has_guards(dag) {
            self.alias_bindings(dag, &mut state);
        }
        self.emit_node(dag, &mut state, out)?;
        Ok(state.arms)
    }

    fn alias_bindings(&mut self, root: &Rc<DagNode<'ctx>>, state: &mut DagState<'ctx>) {
        let mut stack = vec![root.clone()];
        let mut seen = HashSet::<NodeKey, IdentityState>::default();
        while let Some(node) = stack.pop() {
            if !seen.insert(dag::key(&node)) {
                continue;
            }
            match &*node {
                DagNode::Evaluate { next, .. } => stack.push(next.clone()),
                DagNode::Test {
                    when_true,
                    when_false,
                    ..
                } => {
                    stack.push(when_true.clone());
                    stack.push(when_false.clone());
                }
                DagNode::When {
                    bindings,
                    when_true,
                    when_false,
                    ..
                } => {
                    for binding in bindings {
                        if binding.source == DagTempId::INPUT
                            || state.temps.contains_key(&binding.source)
                        {
                            continue;
                        }
                        let id = self.register_local(&binding.target);
                        log::trace!("aliasing {} to {id}", binding.source);
                        state
                            .temps
                            .insert(binding.source, (id, binding.target.ty.clone()));
                    }
                    stack.push(when_true.clone());
                    if let Some(when_false) = when_false {
                        stack.push(when_false.clone());
                    }
                }
                DagNode::Leaf { .. } => {}
            }
        }
    }

    fn emit_node(
        &mut self,
        node: &Rc<DagNode<'ctx>>,
        state: &mut DagState<'ctx>,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, ()> {
        let key = dag::key(node);
        if state.emitted.contains(&key) {
            let label = state.labels[&key];
            log::trace!("rejoining shared dag node at {label}");
            out.push(ir::Stmt::Goto(label, node.span()));
            return Ok(());
        }
        state.emitted.insert(key);
        if state.indegrees.get(&key).copied().unwrap_or(0) > 1 || state.labels.contains_key(&key) {
            let label = self.dag_label(state, node);
            out.push(ir::Stmt::Label(label, node.span()));
        }

        match &**node {
            DagNode::Evaluate {
                evaluation,
                next,
                span,
            } => {
                let value = self.evaluation_expr(evaluation, state, *span);
                let ty = value.ty().clone();
                let (local, local_ty) = self.dag_slot(state, evaluation.output(), &ty, *span);
                out.push(
                    ir::Expr::assign(ir::Expr::local(local, local_ty, *span), value, *span).into(),
                );
                self.emit_node(next, state, out)
            }
            DagNode::Test {
                test,
                when_true,
                when_false,
                span,
            } => {
                let condition = self.test_expr(test, state, *span);
                let false_label = self.dag_label(state, when_false);
                out.push(ir::Stmt::cond_goto(condition, false_label, false, *span));
                self.emit_node(when_true, state, out)?;
                if !state.emitted.contains(&dag::key(when_false)) {
                    self.emit_node(when_false, state, out)?;
                }
                Ok(())
            }
            DagNode::When {
                bindings,
                guard,
                when_true,
                when_false,
                span,
            } => {
                let copies: Vec<_> = bindings
                    .iter()
                    .filter_map(|binding| {
                        let (source, source_ty) = state.slot(binding.source);
                        (source != binding.target.id).then_some((binding, source, source_ty))
                    })
                    .collect();
                // already aliased away and unguarded: enter the arm directly
                if guard.is_none() && copies.is_empty() {
                    return self.emit_node(when_true, state, out);
                }

                let DagNode::Leaf { label: arm, .. } = &**when_true else {
                    unreachable!("when nodes always enter an arm leaf");
                };
                let entry = self.new_label();
                out.push(ir::Stmt::Goto(entry, *span));

                let mut locals = Vec::new();
                let mut stmts = vec![ir::Stmt::Label(entry, *span)];
                for (binding, source, source_ty) in copies {
                    let target = self.register_local(&binding.target);
                    locals.push(target);
                    stmts.push(
                        ir::Expr::assign(
                            ir::Expr::local(target, binding.target.ty.clone(), *span),
                            ir::Expr::local(source, source_ty, *span),
                            *span,
                        )
                        .into(),
                    );
                }
                let fallback = match guard {
                    Some(guard) => {
                        let when_false = when_false
                            .as_ref()
                            .expect("guarded arms always have a fallback");
                        let guard = self.lower_root_expr(guard)?;
                        let false_label = self.dag_label(state, when_false);
                        stmts.push(ir::Stmt::cond_goto(guard, false_label, false, *span));
                        Some(when_false.clone())
                    }
                    None => None,
                };
                stmts.push(ir::Stmt::Goto(*arm, *span));

                let prologue = state.arms.entry(*arm).or_default();
                prologue.locals.extend(locals);
                prologue.stmts.extend(stmts);

                if let Some(when_false) = fallback {
                    if !state.emitted.contains(&dag::key(&when_false)) {
                        self.emit_node(&when_false, state, out)?;
                    }
                }
                Ok(())
            }
            DagNode::Leaf { label, span } => {
                out.push(ir::Stmt::Goto(*label, *span));
                Ok(())
            }
        }
    }

    fn dag_label(&mut self, state: &mut DagState<'ctx>, node: &Rc<DagNode<'ctx>>) -> LabelId {
        let key = dag::key(node);
        if let Some(label) = state.labels.get(&key) {
            return *label;
        }
        let label = self.new_label();
        state.labels.insert(key, label);
        label
    }

    fn dag_slot(
        &mut self,
        state: &mut DagState<'ctx>,
        id: DagTempId,
        ty: &Type<'ctx>,
        span: Span,
    ) -> (LocalId, Type<'ctx>) {
        if let Some(slot) = state.temps.get(&id) {
            return slot.clone();
        }
        let local = self.new_temp(ty.clone(), TempKind::Pattern, span);
        state.temps.insert(id, (local, ty.clone()));
        (local, ty.clone())
    }

    fn evaluation_expr(
        &mut self,
        evaluation: &Evaluation<'ctx>,
        state: &DagState<'ctx>,
        span: Span,
    ) -> ir::Expr<'ctx> {
        match evaluation {
            Evaluation::Field {
                input, field, ty, ..
            } => {
                let (input, input_ty) = state.slot(*input);
                ir::Expr::Field {
                    receiver: Some(Box::new(ir::Expr::local(input, input_ty, span))),
                    field: *field,
                    ty: ty.clone(),
                    span,
                }
            }
            Evaluation::Call {
                input, method, ty, ..
            } => {
                let (input, input_ty) = state.slot(*input);
                ir::Expr::Call {
                    method: method.clone(),
                    receiver: Some(Box::new(ir::Expr::local(input, input_ty, span))),
                    args: [].into(),
                    ty: ty.clone(),
                    span,
                }
            }
            Evaluation::Cast {
                input, kind, ty, ..
            } => {
                let (input, input_ty) = state.slot(*input);
                ir::Expr::Convert {
                    operand: ir::Expr::local(input, input_ty, span).into(),
                    kind: *kind,
                    ty: ty.clone(),
                    span,
                }
            }
        }
    }

    fn test_expr(
        &mut self,
        test: &DagTest<'ctx>,
        state: &DagState<'ctx>,
        span: Span,
    ) -> ir::Expr<'ctx> {
        let (input, input_ty) = state.slot(test.input());
        let input = ir::Expr::local(input, input_ty.clone(), span);
        match test {
            DagTest::NonNull(_) => {
                ir::Expr::binary(BinOp::Ne, input, ir::Expr::null(input_ty, span), span)
            }
            DagTest::TypeTest { target, .. } => ir::Expr::TypeTest {
                operand: input.into(),
                target: target.clone(),
                ty: Type::prim(predef::BOOL),
                span,
            },
            DagTest::ValueEq { value, .. } => ir::Expr::binary(
                BinOp::Eq,
                input,
                ir::Expr::Const(value.clone(), Type::prim(value.type_id()), span),
                span,
            ),
            DagTest::Relational { op, bound, .. } => ir::Expr::binary(
                *op,
                input,
                ir::Expr::Const(bound.clone(), Type::prim(bound.type_id()), span),
                span,
            ),
        }
    }

    /// Lowers a pattern test in expression position. Only linear dags fit
    /// here: a conjunction of tests with binding and evaluation effects
    /// threaded between them, where every test has the failure leaf on one
    /// side. Guards or shared interior nodes would need the statement-level
    /// emission, so they are rejected; a shared failure leaf is still
    /// linear.
    #[expect(clippy::too_many_arguments)]
    pub(super) fn lower_pattern_expr(
        &mut self,
        scrutinee: &BoundExpr<'ctx>,
        dag: &Rc<DagNode<'ctx>>,
        success: LabelId,
        failure: LabelId,
        ty: &Type<'ctx>,
        span: Span,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        if DagNode::has_guards(dag) || dag::has_shared_interior(dag) {
            return Err(Error::NonLinearMatch(span));
        }

        let scrutinee = self.lower_expr(scrutinee, env)?;
        let mut locals = Vec::new();
        let mut effects = Vec::new();
        let (input, input_ty, effect) = self.spill(scrutinee, TempKind::Pattern);
        if let Some(effect) = effect {
            locals.push(input);
            effects.push(effect);
        }

        let mut state = DagState::new(dag, input, input_ty);
        // effects accumulated since the previous test; they only run once
        // every test before them has passed
        let mut pending: Vec<ir::Expr<'ctx>> = Vec::new();
        let mut result: Option<ir::Expr<'ctx>> = None;
        let mut conjoin = |result: &mut Option<ir::Expr<'ctx>>,
                           pending: &mut Vec<ir::Expr<'ctx>>,
                           test: ir::Expr<'ctx>| {
            let test = ir::Expr::seq([], std::mem::take(pending), test, span);
            *result = Some(match result.take() {
                None => test,
                Some(prior) => ir::Expr::binary(BinOp::And, prior, test, span),
            });
        };

        let mut node = dag.clone();
        let matched = loop {
            node = match &*node.clone() {
                DagNode::Evaluate {
                    evaluation,
                    next,
                    span,
                } => {
                    let value = self.evaluation_expr(evaluation, &state, *span);
                    let value_ty = value.ty().clone();
                    let (local, local_ty) =
                        self.dag_slot(&mut state, evaluation.output(), &value_ty, *span);
                    locals.push(local);
                    pending.push(ir::Expr::assign(
                        ir::Expr::local(local, local_ty, *span),
                        value,
                        *span,
                    ));
                    next.clone()
                }
                DagNode::Test {
                    test,
                    when_true,
                    when_false,
                    span,
                } => {
                    let fails = |node: &Rc<DagNode<'ctx>>| {
                        matches!(&**node, DagNode::Leaf { label, .. } if *label == failure)
                    };
                    let test = self.test_expr(test, &state, *span);
                    if fails(when_false) {
                        conjoin(&mut result, &mut pending, test);
                        when_true.clone()
                    } else if fails(when_true) {
                        // failure on the true side: the negated test holds
                        // on the surviving branch
                        conjoin(&mut result, &mut pending, ir::Expr::not(test, *span));
                        when_false.clone()
                    } else {
                        return Err(Error::NonLinearMatch(*span));
                    }
                }
                DagNode::When {
                    bindings,
                    guard: None,
                    when_true,
                    span,
                    ..
                } => {
                    for binding in bindings {
                        let (source, source_ty) = state.slot(binding.source);
                        let target = self.register_local(&binding.target);
                        pending.push(ir::Expr::assign(
                            ir::Expr::local(target, binding.target.ty.clone(), *span),
                            ir::Expr::local(source, source_ty, *span),
                            *span,
                        ));
                    }
                    when_true.clone()
                }
                DagNode::When { span, .. } => return Err(Error::NonLinearMatch(*span)),
                DagNode::Leaf { label, .. } if *label == success => break true,
                DagNode::Leaf { label, .. } if *label == failure => break false,
                DagNode::Leaf { span, .. } => return Err(Error::NonLinearMatch(*span)),
            };
        };

        if matched && !pending.is_empty() {
            // trailing bindings still only apply when the tests passed
            let rest = ir::Expr::Const(Const::Bool(true), ty.clone(), span);
            conjoin(&mut result, &mut pending, rest);
        }
        let value = match (matched, result) {
            (true, Some(result)) => result,
            (true, None) => ir::Expr::Const(Const::Bool(true), ty.clone(), span),
            (false, Some(result)) => ir::Expr::binary(
                BinOp::And,
                result,
                ir::Expr::Const(Const::Bool(false), ty.clone(), span),
                span,
            ),
            (false, None) => ir::Expr::Const(Const::Bool(false), ty.clone(), span),
        };
        Ok(ir::Expr::seq(locals, effects, value, span))
    }
}
