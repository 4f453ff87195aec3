use veld_ast::Span;

use super::pattern::ArmPrologue;
use super::{Lowerer, PlaceholderEnv};
use crate::bound::{
    BoundCatch, BoundExpr, BoundStmt, RelationalCase, SwitchKind, SwitchSection, SwitchValueKind,
};
use crate::container;
use crate::diagnostic::{Error, LowerResult};
use crate::dispatch::ValueDispatch;
use crate::ir::{self, BinOp, Const};
use crate::symbols::{LabelId, LocalId, LocalInfo, TempKind, Type, TypeKind, WellKnown, predef};
use crate::IndexMap;

/// Below this many cases a string switch is a plain equality chain; at or
/// above it the cases are bucketed by hash first.
const STRING_SWITCH_HASH_THRESHOLD: usize = 7;

impl<'scope, 'ctx> Lowerer<'scope, 'ctx> {
    pub(super) fn lower_stmt(
        &mut self,
        stmt: &BoundStmt<'ctx>,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, ()> {
        self.guarded(stmt.span(), |this| {
            if let Some(point) = this.instrument.before_stmt(stmt) {
                out.push(point);
            }
            this.lower_stmt_inner(stmt, out)?;
            if let Some(point) = this.instrument.after_stmt(stmt) {
                out.push(point);
            }
            Ok(())
        })
    }

    /// Lowers a statement list, recovering at statement granularity: a
    /// failed statement is reported and replaced with an error marker, and
    /// lowering continues with the next one. Fatal errors abort the body.
    pub(super) fn lower_block(
        &mut self,
        stmts: &[BoundStmt<'ctx>],
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, ()> {
        for stmt in stmts {
            match self.lower_stmt(stmt, out) {
                Ok(()) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    let span = err.span();
                    self.reporter.report(err);
                    out.push(ir::Stmt::Error(span));
                }
            }
        }
        Ok(())
    }

    fn lower_stmt_inner(
        &mut self,
        stmt: &BoundStmt<'ctx>,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, ()> {
        match stmt {
            BoundStmt::Block {
                locals,
                stmts,
                span,
            } => {
                let locals = self.register_locals(locals);
                let mut body = Vec::new();
                self.lower_block(stmts, &mut body)?;
                out.push(ir::Stmt::Block {
                    locals,
                    stmts: body,
                    span: *span,
                });
            }
            BoundStmt::Expr(expr) => {
                let span = expr.span();
                let lowered = self.lower_root_expr(expr)?;
                if matches!(lowered, ir::Expr::Const(_, _, _)) {
                    // the value is discarded and has no effects
                    out.push(ir::Stmt::Nop(span));
                } else {
                    out.push(lowered.into());
                }
            }
            BoundStmt::If {
                condition,
                then,
                else_,
                span,
            } => self.lower_if(condition, then, else_.as_deref(), *span, out)?,
            BoundStmt::While {
                condition,
                body,
                break_label,
                continue_label,
                span,
            } => {
                self.lower_while(condition, body, *break_label, *continue_label, *span, out)?;
            }
            BoundStmt::DoWhile {
                condition,
                body,
                break_label,
                continue_label,
                span,
            } => {
                self.lower_do_while(condition, body, *break_label, *continue_label, *span, out)?;
            }
            BoundStmt::For {
                locals,
                init,
                condition,
                increment,
                body,
                break_label,
                continue_label,
                span,
            } => self.lower_for(
                locals,
                init,
                condition.as_deref(),
                increment,
                body,
                *break_label,
                *continue_label,
                *span,
                out,
            )?,
            BoundStmt::Switch {
                scrutinee,
                kind,
                sections,
                break_label,
                span,
            } => self.lower_switch(scrutinee, kind, sections, *break_label, *span, out)?,
            BoundStmt::Try {
                body,
                catches,
                finally,
                span,
            } => self.lower_try(body, catches, finally.as_deref(), *span, out)?,
            BoundStmt::Lock {
                resource,
                body,
                span,
            } => self.lower_lock(resource, body, *span, out)?,
            BoundStmt::Using {
                local,
                resource,
                body,
                span,
            } => self.lower_using(local.as_ref(), resource, body, *span, out)?,
            BoundStmt::Label(label, span) => out.push(ir::Stmt::Label(*label, *span)),
            BoundStmt::Goto(label, span)
            | BoundStmt::Break(label, span)
            | BoundStmt::Continue(label, span) => out.push(ir::Stmt::Goto(*label, *span)),
            BoundStmt::Return(expr, span) => {
                let expr = expr
                    .as_deref()
                    .map(|expr| self.lower_root_expr(expr))
                    .transpose()?;
                out.push(ir::Stmt::Return(expr.map(Box::new), *span));
            }
            BoundStmt::Throw(expr, span) => {
                let expr = expr
                    .as_deref()
                    .map(|expr| self.lower_root_expr(expr))
                    .transpose()?;
                out.push(ir::Stmt::Throw(expr.map(Box::new), *span));
            }
            BoundStmt::Yield(expr, span) => {
                let expr = expr
                    .as_deref()
                    .map(|expr| self.lower_root_expr(expr))
                    .transpose()?;
                out.push(ir::Stmt::Yield(expr.map(Box::new), *span));
            }
            BoundStmt::Error(span) => out.push(ir::Stmt::Error(*span)),
        }
        Ok(())
    }

    /// Lowers an expression that starts its own placeholder scope.
    pub(super) fn lower_root_expr(
        &mut self,
        expr: &BoundExpr<'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        let env = PlaceholderEnv::default();
        self.lower_expr(expr, &env)
    }

    fn lower_if(
        &mut self,
        condition: &BoundExpr<'ctx>,
        then: &BoundStmt<'ctx>,
        else_: Option<&BoundStmt<'ctx>>,
        span: Span,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, ()> {
        let condition = self.lower_root_expr(condition)?;
        match else_ {
            None => {
                let end = self.new_label();
                out.push(ir::Stmt::cond_goto(condition, end, false, span));
                self.lower_stmt(then, out)?;
                out.push(ir::Stmt::Label(end, span));
            }
            Some(else_) => {
                let alt = self.new_label();
                let end = self.new_label();
                out.push(ir::Stmt::cond_goto(condition, alt, false, span));
                self.lower_stmt(then, out)?;
                out.push(ir::Stmt::Goto(end, span));
                out.push(ir::Stmt::Label(alt, span));
                self.lower_stmt(else_, out)?;
                out.push(ir::Stmt::Label(end, span));
            }
        }
        Ok(())
    }

    /// ```text
    /// goto continue
    /// label start
    /// <body>
    /// label continue
    /// if <condition> goto start
    /// label break
    /// ```
    ///
    /// The condition is evaluated at the bottom so that each iteration
    /// takes a single conditional branch.
    fn lower_while(
        &mut self,
        condition: &BoundExpr<'ctx>,
        body: &BoundStmt<'ctx>,
        break_label: LabelId,
        continue_label: LabelId,
        span: Span,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, ()> {
        let start = self.new_label();
        out.push(ir::Stmt::Goto(continue_label, span));
        out.push(ir::Stmt::Label(start, span));
        self.lower_stmt(body, out)?;
        out.push(ir::Stmt::Label(continue_label, span));
        if let Some(point) = self.instrument.hidden_seq_point(condition.span()) {
            out.push(point);
        }
        let condition = self.lower_root_expr(condition)?;
        out.push(ir::Stmt::cond_goto(condition, start, true, span));
        out.push(ir::Stmt::Label(break_label, span));
        Ok(())
    }

    fn lower_do_while(
        &mut self,
        condition: &BoundExpr<'ctx>,
        body: &BoundStmt<'ctx>,
        break_label: LabelId,
        continue_label: LabelId,
        span: Span,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, ()> {
        let start = self.new_label();
        out.push(ir::Stmt::Label(start, span));
        self.lower_stmt(body, out)?;
        out.push(ir::Stmt::Label(continue_label, span));
        if let Some(point) = self.instrument.hidden_seq_point(condition.span()) {
            out.push(point);
        }
        let condition = self.lower_root_expr(condition)?;
        out.push(ir::Stmt::cond_goto(condition, start, true, span));
        out.push(ir::Stmt::Label(break_label, span));
        Ok(())
    }

    #[expect(clippy::too_many_arguments)]
    fn lower_for(
        &mut self,
        locals: &[LocalInfo<'ctx>],
        init: &[BoundExpr<'ctx>],
        condition: Option<&BoundExpr<'ctx>>,
        increment: &[BoundExpr<'ctx>],
        body: &BoundStmt<'ctx>,
        break_label: LabelId,
        continue_label: LabelId,
        span: Span,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, ()> {
        let local_ids = self.register_locals(locals);
        let mut stmts = Vec::new();
        for expr in init {
            let expr = self.lower_root_expr(expr)?;
            stmts.push(expr.into());
        }

        let start = self.new_label();
        let test = self.new_label();
        stmts.push(ir::Stmt::Goto(test, span));
        stmts.push(ir::Stmt::Label(start, span));
        self.lower_stmt(body, &mut stmts)?;
        stmts.push(ir::Stmt::Label(continue_label, span));
        for expr in increment {
            let expr = self.lower_root_expr(expr)?;
            stmts.push(expr.into());
        }
        stmts.push(ir::Stmt::Label(test, span));
        match condition {
            Some(condition) => {
                if let Some(point) = self.instrument.hidden_seq_point(condition.span()) {
                    stmts.push(point);
                }
                let condition = self.lower_root_expr(condition)?;
                stmts.push(ir::Stmt::cond_goto(condition, start, true, span));
            }
            None => stmts.push(ir::Stmt::Goto(start, span)),
        }
        stmts.push(ir::Stmt::Label(break_label, span));

        out.push(ir::Stmt::Block {
            locals: local_ids,
            stmts,
            span,
        });
        Ok(())
    }

    fn lower_switch(
        &mut self,
        scrutinee: &BoundExpr<'ctx>,
        kind: &SwitchKind<'ctx>,
        sections: &[SwitchSection<'ctx>],
        break_label: LabelId,
        span: Span,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, ()> {
        let scrutinee = self.lower_root_expr(scrutinee)?;
        let (mut value, mut ty, effect) = self.spill(scrutinee, TempKind::Spill);
        if let Some(effect) = effect {
            out.push(effect.into());
        }

        // a null wrapper never matches a case, so the dispatch below only
        // ever sees the unwrapped payload
        if let Some(payload) = ty.as_nullable().cloned() {
            let has_value = self.well_known(WellKnown::NullableHasValue, span)?;
            let get_value = self.well_known(WellKnown::NullableGetValueOrDefault, span)?;
            let test = ir::Expr::Call {
                method: has_value,
                receiver: Some(Box::new(ir::Expr::local(value, ty.clone(), span))),
                args: [].into(),
                ty: Type::prim(predef::BOOL),
                span,
            };
            out.push(ir::Stmt::cond_goto(test, switch_default(kind), false, span));
            let unwrapped = self.new_temp(payload.clone(), TempKind::Spill, span);
            out.push(
                ir::Expr::assign(
                    ir::Expr::local(unwrapped, payload.clone(), span),
                    ir::Expr::Call {
                        method: get_value,
                        receiver: Some(Box::new(ir::Expr::local(value, ty, span))),
                        args: [].into(),
                        ty: payload.clone(),
                        span,
                    },
                    span,
                )
                .into(),
            );
            value = unwrapped;
            ty = payload;
        }

        let mut prologues: IndexMap<LabelId, ArmPrologue<'ctx>> = IndexMap::default();
        match kind {
            SwitchKind::Decision { dag, .. } => {
                prologues = self.lower_decision_dag(dag, value, ty, span, out)?;
            }
            SwitchKind::Value {
                value_kind: SwitchValueKind::Int,
                cases,
                default_label,
            } => {
                out.push(ir::Stmt::SwitchTable {
                    value: Box::new(ir::Expr::local(value, ty, span)),
                    cases: cases.clone().into(),
                    fallback: *default_label,
                    span,
                });
            }
            SwitchKind::Value {
                value_kind: SwitchValueKind::String,
                cases,
                default_label,
            } => {
                self.lower_string_switch(value, ty, cases, *default_label, span, out)?;
            }
            SwitchKind::Relational {
                cases,
                default_label,
            } => {
                let tree = relational_tree(cases, *default_label);
                self.emit_dispatch(tree, value, &ty, span, out);
            }
        }

        for section in sections {
            let mut locals = self.register_locals(&section.locals).into_vec();
            let mut body = Vec::new();
            match prologues.swap_remove(&section.label) {
                Some(prologue) => {
                    // the dispatch stream enters through the prologue's
                    // entry label, so the arm label moves inside the block
                    locals.extend(prologue.locals);
                    body.extend(prologue.stmts);
                    body.push(ir::Stmt::Label(section.label, section.span));
                }
                None => out.push(ir::Stmt::Label(section.label, section.span)),
            }
            self.lower_block(&section.stmts, &mut body)?;
            out.push(ir::Stmt::Block {
                locals: locals.into(),
                stmts: body,
                span: section.span,
            });
        }
        out.push(ir::Stmt::Label(break_label, span));
        Ok(())
    }

    /// Dispatches a string switch. Small switches use a chain of equality
    /// tests; larger ones first switch over a hash of the value and only
    /// compare within the matching bucket.
    fn lower_string_switch(
        &mut self,
        value: LocalId,
        ty: Type<'ctx>,
        cases: &[(Const<'ctx>, LabelId)],
        default_label: LabelId,
        span: Span,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, ()> {
        let equals = self.well_known(WellKnown::StringEquals, span)?;
        let hasher = self.resolver.resolve(WellKnown::StringHash);

        let emit_chain = |cases: &[(Const<'ctx>, LabelId)], out: &mut Vec<ir::Stmt<'ctx>>| {
            for (constant, label) in cases {
                let test = ir::Expr::Call {
                    method: equals.clone(),
                    receiver: None,
                    args: [
                        ir::Expr::local(value, ty.clone(), span),
                        ir::Expr::Const(constant.clone(), Type::prim(predef::STRING), span),
                    ]
                    .into(),
                    ty: Type::prim(predef::BOOL),
                    span,
                };
                out.push(ir::Stmt::cond_goto(test, *label, true, span));
            }
            out.push(ir::Stmt::Goto(default_label, span));
        };

        let Some(hasher) = hasher.filter(|_| cases.len() >= STRING_SWITCH_HASH_THRESHOLD) else {
            emit_chain(cases, out);
            return Ok(());
        };

        // bucket in first-appearance order so that the output is stable
        let mut buckets: IndexMap<u32, Vec<(Const<'ctx>, LabelId)>> = IndexMap::default();
        for (constant, label) in cases {
            let Const::Str(text) = constant else {
                unreachable!("string switches only carry string cases");
            };
            buckets
                .entry(container::string_hash(text))
                .or_default()
                .push((constant.clone(), *label));
        }

        let hash_ty = Type::prim(predef::UINT32);
        let hashed = ir::Expr::Call {
            method: hasher,
            receiver: None,
            args: [ir::Expr::local(value, ty.clone(), span)].into(),
            ty: hash_ty.clone(),
            span,
        };
        let (hash_value, _, effect) = self.spill(hashed, TempKind::Spill);
        if let Some(effect) = effect {
            out.push(effect.into());
        }

        let table: Vec<_> = buckets
            .keys()
            .map(|&hash| (Const::U32(hash), self.new_label()))
            .collect();
        out.push(ir::Stmt::SwitchTable {
            value: Box::new(ir::Expr::local(hash_value, hash_ty, span)),
            cases: table.clone().into(),
            fallback: default_label,
            span,
        });
        for ((_, bucket), (_, bucket_label)) in buckets.into_iter().zip(table) {
            out.push(ir::Stmt::Label(bucket_label, span));
            emit_chain(&bucket, out);
        }
        Ok(())
    }

    fn emit_dispatch(
        &mut self,
        tree: ValueDispatch<'ctx>,
        value: LocalId,
        ty: &Type<'ctx>,
        span: Span,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) {
        match tree {
            ValueDispatch::Leaf(label) => out.push(ir::Stmt::Goto(label, span)),
            ValueDispatch::Relational(node) => {
                let hi_label = self.new_label();
                let bound_ty = Type::prim(node.bound.type_id());
                let condition = ir::Expr::binary(
                    node.op,
                    ir::Expr::local(value, ty.clone(), span),
                    ir::Expr::Const(node.bound, bound_ty, span),
                    span,
                );
                out.push(ir::Stmt::cond_goto(condition, hi_label, false, span));
                self.emit_dispatch(node.lo, value, ty, span, out);
                out.push(ir::Stmt::Label(hi_label, span));
                self.emit_dispatch(node.hi, value, ty, span, out);
            }
        }
    }

    fn lower_try(
        &mut self,
        body: &BoundStmt<'ctx>,
        catches: &[BoundCatch<'ctx>],
        finally: Option<&BoundStmt<'ctx>>,
        span: Span,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, ()> {
        let mut try_body = Vec::new();
        self.lower_stmt(body, &mut try_body)?;

        let was_in_handler = std::mem::replace(&mut self.in_handler, true);
        let mut lowered_catches = Vec::with_capacity(catches.len());
        for catch in catches {
            let local = catch.local.as_ref().map(|local| self.register_local(local));
            let mut catch_body = Vec::new();
            self.lower_stmt(&catch.body, &mut catch_body)?;
            lowered_catches.push(ir::Catch {
                exception_type: catch.exception_type.clone(),
                local,
                body: catch_body,
                span: catch.span,
            });
        }
        let finally = finally
            .map(|finally| {
                let mut stmts = Vec::new();
                self.lower_stmt(finally, &mut stmts)?;
                Ok(stmts)
            })
            .transpose()?;
        self.in_handler = was_in_handler;

        out.push(ir::Stmt::Try {
            body: try_body,
            catches: lowered_catches.into(),
            finally,
            span,
        });
        Ok(())
    }

    /// Scoped-lock resources enter their scope before the protected region;
    /// everything else goes through the monitor protocol with a taken flag
    /// so that the exit call only runs when the monitor was acquired:
    ///
    /// ```text
    /// taken = false
    /// try {
    ///     MonitorEnter(obj, taken)
    ///     <body>
    /// } finally {
    ///     if not taken goto skip
    ///     MonitorExit(obj)
    ///     label skip
    /// }
    /// ```
    fn lower_lock(
        &mut self,
        resource: &BoundExpr<'ctx>,
        body: &BoundStmt<'ctx>,
        span: Span,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, ()> {
        let resource = self.lower_root_expr(resource)?;
        let scoped = matches!(
            resource.ty().as_named().map(|named| &named.kind),
            Some(TypeKind::ScopedLock)
        );
        if !scoped && !resource.ty().is_reference_type() {
            return Err(Error::InvalidLockType(
                Box::new(resource.ty().clone()),
                span,
            ));
        }

        let (obj, obj_ty, effect) = self.spill(resource, TempKind::Lock);
        if let Some(effect) = effect {
            out.push(effect.into());
        }

        if scoped {
            let enter = self.well_known(WellKnown::ScopeEnter, span)?;
            let dispose = self.well_known(WellKnown::ScopeDispose, span)?;
            let scope = self.new_temp(obj_ty.clone(), TempKind::Lock, span);
            out.push(
                ir::Expr::assign(
                    ir::Expr::local(scope, obj_ty.clone(), span),
                    ir::Expr::Call {
                        method: enter,
                        receiver: Some(Box::new(ir::Expr::local(obj, obj_ty.clone(), span))),
                        args: [].into(),
                        ty: obj_ty.clone(),
                        span,
                    },
                    span,
                )
                .into(),
            );

            let mut try_body = Vec::new();
            self.lower_stmt(body, &mut try_body)?;
            let finally = vec![
                ir::Expr::Call {
                    method: dispose,
                    receiver: Some(Box::new(ir::Expr::local(scope, obj_ty, span))),
                    args: [].into(),
                    ty: Type::prim(predef::VOID),
                    span,
                }
                .into(),
            ];
            out.push(ir::Stmt::Try {
                body: try_body,
                catches: [].into(),
                finally: Some(finally),
                span,
            });
            return Ok(());
        }

        let enter = self.well_known(WellKnown::MonitorEnter, span)?;
        let exit = self.well_known(WellKnown::MonitorExit, span)?;
        let bool_ty = Type::prim(predef::BOOL);
        let taken = self.new_temp(bool_ty.clone(), TempKind::LockTaken, span);
        out.push(
            ir::Expr::assign(
                ir::Expr::local(taken, bool_ty.clone(), span),
                ir::Expr::bool_(false, span),
                span,
            )
            .into(),
        );

        let mut try_body = vec![
            ir::Expr::Call {
                method: enter,
                receiver: None,
                args: [
                    ir::Expr::local(obj, obj_ty.clone(), span),
                    ir::Expr::local(taken, bool_ty.clone(), span),
                ]
                .into(),
                ty: Type::prim(predef::VOID),
                span,
            }
            .into(),
        ];
        self.lower_stmt(body, &mut try_body)?;

        let skip = self.new_label();
        let finally = vec![
            ir::Stmt::cond_goto(ir::Expr::local(taken, bool_ty, span), skip, false, span),
            ir::Expr::Call {
                method: exit,
                receiver: None,
                args: [ir::Expr::local(obj, obj_ty, span)].into(),
                ty: Type::prim(predef::VOID),
                span,
            }
            .into(),
            ir::Stmt::Label(skip, span),
        ];
        out.push(ir::Stmt::Try {
            body: try_body,
            catches: [].into(),
            finally: Some(finally),
            span,
        });
        Ok(())
    }

    fn lower_using(
        &mut self,
        local: Option<&LocalInfo<'ctx>>,
        resource: &BoundExpr<'ctx>,
        body: &BoundStmt<'ctx>,
        span: Span,
        out: &mut Vec<ir::Stmt<'ctx>>,
    ) -> LowerResult<'ctx, ()> {
        let dispose = self.well_known(WellKnown::Dispose, span)?;
        let resource = self.lower_root_expr(resource)?;

        let (holder, holder_ty) = match local {
            Some(local) => {
                let id = self.register_local(local);
                let ty = local.ty.clone();
                out.push(
                    ir::Expr::assign(ir::Expr::local(id, ty.clone(), span), resource, span).into(),
                );
                (id, ty)
            }
            None => {
                let (id, ty, effect) = self.spill(resource, TempKind::Using);
                if let Some(effect) = effect {
                    out.push(effect.into());
                }
                (id, ty)
            }
        };

        let mut try_body = Vec::new();
        self.lower_stmt(body, &mut try_body)?;

        let mut finally = Vec::new();
        let skip = holder_ty.is_reference_type().then(|| {
            let skip = self.new_label();
            let non_null = ir::Expr::binary(
                BinOp::Ne,
                ir::Expr::local(holder, holder_ty.clone(), span),
                ir::Expr::null(holder_ty.clone(), span),
                span,
            );
            finally.push(ir::Stmt::cond_goto(non_null, skip, false, span));
            skip
        });
        finally.push(
            ir::Expr::Call {
                method: dispose,
                receiver: Some(Box::new(ir::Expr::local(holder, holder_ty, span))),
                args: [].into(),
                ty: Type::prim(predef::VOID),
                span,
            }
            .into(),
        );
        if let Some(skip) = skip {
            finally.push(ir::Stmt::Label(skip, span));
        }

        out.push(ir::Stmt::Try {
            body: try_body,
            catches: [].into(),
            finally: Some(finally),
            span,
        });
        Ok(())
    }
}

fn switch_default(kind: &SwitchKind<'_>) -> LabelId {
    match kind {
        SwitchKind::Decision { default_label, .. }
        | SwitchKind::Value { default_label, .. }
        | SwitchKind::Relational { default_label, .. } => *default_label,
    }
}

fn relational_tree<'ctx>(
    cases: &[RelationalCase<'ctx>],
    default_label: LabelId,
) -> ValueDispatch<'ctx> {
    cases
        .iter()
        .rev()
        .fold(ValueDispatch::Leaf(default_label), |acc, case| {
            ValueDispatch::create_balanced(
                case.op,
                case.bound.clone(),
                ValueDispatch::Leaf(case.label),
                acc,
            )
        })
}
