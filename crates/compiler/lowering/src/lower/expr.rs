use itertools::izip;
use veld_ast::Span;

use super::{Lowerer, PlaceholderEnv};
use crate::bound::{BoundExpr, PlaceholderId, TypeRelation};
use crate::capture;
use crate::diagnostic::{Error, LowerResult};
use crate::ir::{self, BinOp, Const, ConversionKind};
use crate::symbols::{FieldId, LocalId, MethodRef, TempKind, Type, WellKnown, predef};

impl<'scope, 'ctx> Lowerer<'scope, 'ctx> {
    pub(super) fn lower_expr(
        &mut self,
        expr: &BoundExpr<'ctx>,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        self.guarded(expr.span(), |this| this.lower_expr_inner(expr, env))
    }

    fn lower_expr_inner(
        &mut self,
        expr: &BoundExpr<'ctx>,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        match expr {
            BoundExpr::Const(Const::Decimal { mantissa, scale }, ty, span) => {
                self.lower_decimal(*mantissa, *scale, ty, *span)
            }
            BoundExpr::Const(constant, ty, span) => {
                Ok(ir::Expr::Const(constant.clone(), ty.clone(), *span))
            }
            BoundExpr::Local(id, ty, span) => Ok(ir::Expr::local(*id, ty.clone(), *span)),
            BoundExpr::Field {
                receiver,
                field,
                ty,
                span,
            } => {
                let receiver = self.lower_opt(receiver.as_deref(), env)?;
                Ok(ir::Expr::Field {
                    receiver: receiver.map(Box::new),
                    field: *field,
                    ty: ty.clone(),
                    span: *span,
                })
            }
            BoundExpr::Property {
                getter,
                receiver,
                ty,
                span,
            } => {
                let receiver = self.lower_opt(receiver.as_deref(), env)?;
                Ok(ir::Expr::Call {
                    method: getter.clone(),
                    receiver: receiver.map(Box::new),
                    args: [].into(),
                    ty: ty.clone(),
                    span: *span,
                })
            }
            BoundExpr::Call {
                method,
                receiver,
                args,
                ty,
                span,
            } => {
                let receiver = self.lower_opt(receiver.as_deref(), env)?;
                let args = self.lower_all(args, env)?;
                Ok(ir::Expr::Call {
                    method: method.clone(),
                    receiver: receiver.map(Box::new),
                    args,
                    ty: ty.clone(),
                    span: *span,
                })
            }
            BoundExpr::New {
                ctor, args, ty, span, ..
            }
            | BoundExpr::AnonymousObject {
                ctor, args, ty, span,
            } => {
                let args = self.lower_all(args, env)?;
                Ok(ir::Expr::New {
                    ctor: ctor.clone(),
                    args,
                    ty: ty.clone(),
                    span: *span,
                })
            }
            BoundExpr::TupleLiteral {
                ctor,
                elements,
                ty,
                span,
            } => {
                let args = self.lower_all(elements, env)?;
                Ok(ir::Expr::New {
                    ctor: ctor.clone(),
                    args,
                    ty: ty.clone(),
                    span: *span,
                })
            }
            BoundExpr::DelegateCreation {
                method,
                receiver,
                ty,
                span,
            } => self.lower_delegate(method, receiver.as_deref(), ty, *span, env),
            BoundExpr::Closure { body, ty, span } => {
                let mut stmts = Vec::new();
                self.lower_stmt(body, &mut stmts)?;
                self.saw_closures = true;
                Ok(ir::Expr::Closure {
                    body: stmts,
                    ty: ty.clone(),
                    span: *span,
                })
            }
            BoundExpr::Conditional {
                condition,
                then,
                else_,
                ty,
                span,
            } => Ok(ir::Expr::Conditional {
                condition: self.lower_expr(condition, env)?.into(),
                then: self.lower_expr(then, env)?.into(),
                else_: self.lower_expr(else_, env)?.into(),
                ty: ty.clone(),
                span: *span,
            }),
            BoundExpr::Binary {
                op,
                lhs,
                rhs,
                ty,
                span,
            } => Ok(ir::Expr::Binary {
                op: *op,
                lhs: self.lower_expr(lhs, env)?.into(),
                rhs: self.lower_expr(rhs, env)?.into(),
                ty: ty.clone(),
                span: *span,
            }),
            BoundExpr::Unary {
                op,
                operand,
                ty,
                span,
            } => Ok(ir::Expr::Unary {
                op: *op,
                operand: self.lower_expr(operand, env)?.into(),
                ty: ty.clone(),
                span: *span,
            }),
            BoundExpr::Assign {
                place,
                value,
                ty,
                span,
            } => Ok(ir::Expr::Assign {
                place: self.lower_expr(place, env)?.into(),
                value: self.lower_expr(value, env)?.into(),
                ty: ty.clone(),
                span: *span,
            }),
            BoundExpr::Coalesce {
                lhs,
                rhs,
                ty,
                span,
            } => self.lower_coalesce(lhs, rhs, ty, *span, env),
            BoundExpr::CoalesceAssign {
                place,
                value,
                ty,
                span,
            } => self.lower_coalesce_assign(place, value, ty, *span, env),
            BoundExpr::ConditionalAccess {
                receiver,
                access,
                placeholder,
                ty,
                span,
            } => self.lower_conditional_access(receiver, access, *placeholder, ty, *span, env),
            BoundExpr::Is {
                operand,
                target,
                relation,
                ty,
                span,
            } => self.lower_is(operand, target, *relation, ty, *span, env),
            BoundExpr::As {
                operand,
                kind,
                ty,
                span,
            } => Ok(ir::Expr::Convert {
                operand: self.lower_expr(operand, env)?.into(),
                kind: *kind,
                ty: ty.clone(),
                span: *span,
            }),
            BoundExpr::PatternTest {
                scrutinee,
                dag,
                success,
                failure,
                ty,
                span,
            } => self.lower_pattern_expr(scrutinee, dag, *success, *failure, ty, *span, env),
            BoundExpr::DeconstructAssign {
                targets,
                source,
                deconstruct,
                element_fields,
                conversions,
                ty,
                span,
            } => self.lower_deconstruct(
                targets,
                source,
                deconstruct.as_ref(),
                element_fields,
                conversions,
                ty,
                *span,
                env,
            ),
            BoundExpr::RangeLiteral {
                start,
                end,
                ty,
                span,
            } => self.lower_range(start.as_deref(), end.as_deref(), ty, *span, env),
            BoundExpr::StackAlloc {
                element,
                count,
                element_size,
                ty,
                span,
            } => self.lower_stackalloc(element, count, *element_size, ty, *span, env),
            BoundExpr::CollectionLiteral { elements, ty, span } => {
                self.lower_collection(elements, ty, *span, env)
            }
            BoundExpr::Await { operand, ty, span } => {
                let operand = self.lower_expr(operand, env)?;
                if self.in_handler {
                    self.saw_await_in_handler = true;
                }
                Ok(ir::Expr::Await {
                    operand: operand.into(),
                    ty: ty.clone(),
                    span: *span,
                })
            }
            BoundExpr::With {
                receiver,
                assignments,
                placeholder,
                ty,
                span,
            } => self.lower_with(receiver, assignments, *placeholder, ty, *span, env),
            BoundExpr::Placeholder(id, _, span) => {
                let (local, ty) = env
                    .get(id)
                    .expect("placeholder should be bound before use");
                Ok(ir::Expr::local(*local, ty.clone(), *span))
            }
            BoundExpr::Error(ty, span) => Ok(ir::Expr::Error(ty.clone(), *span)),
        }
    }

    fn lower_opt(
        &mut self,
        expr: Option<&BoundExpr<'ctx>>,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, Option<ir::Expr<'ctx>>> {
        expr.map(|expr| self.lower_expr(expr, env)).transpose()
    }

    fn lower_all(
        &mut self,
        exprs: &[BoundExpr<'ctx>],
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, Box<[ir::Expr<'ctx>]>> {
        exprs
            .iter()
            .map(|expr| self.lower_expr(expr, env))
            .collect()
    }

    /// Spills `expr` into the given scratch lists unless it already is a
    /// local.
    fn spill_into(
        &mut self,
        expr: ir::Expr<'ctx>,
        kind: TempKind,
        locals: &mut Vec<LocalId>,
        effects: &mut Vec<ir::Expr<'ctx>>,
    ) -> (LocalId, Type<'ctx>) {
        let (id, ty, effect) = self.spill(expr, kind);
        if let Some(effect) = effect {
            locals.push(id);
            effects.push(effect);
        }
        (id, ty)
    }

    /// Decimal constants have no primitive representation; they become a
    /// helper constructor call carrying the 96-bit mantissa and scale.
    fn lower_decimal(
        &mut self,
        mantissa: i128,
        scale: u8,
        ty: &Type<'ctx>,
        span: Span,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        let ctor = self.well_known(WellKnown::DecimalCtor, span)?;
        let lo = mantissa as u64;
        let hi = (mantissa >> 64) as u64;
        Ok(ir::Expr::New {
            ctor,
            args: [
                ir::Expr::Const(Const::U64(lo), Type::prim(predef::UINT64), span),
                ir::Expr::Const(Const::U64(hi), Type::prim(predef::UINT64), span),
                ir::Expr::Const(Const::U32(scale.into()), Type::prim(predef::UINT32), span),
            ]
            .into(),
            ty: ty.clone(),
            span,
        })
    }

    fn lower_delegate(
        &mut self,
        method: &MethodRef<'ctx>,
        receiver: Option<&BoundExpr<'ctx>>,
        ty: &Type<'ctx>,
        span: Span,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        let ctor = self.well_known(WellKnown::DelegateCtor, span)?;
        let receiver_arg = match receiver {
            Some(receiver) => Some(self.lower_expr(receiver, env)?),
            None => None,
        };
        let cacheable = receiver_arg.is_none();
        let fresh = ir::Expr::New {
            ctor,
            args: [
                receiver_arg
                    .unwrap_or_else(|| ir::Expr::null(Type::prim(predef::OBJECT), span)),
                ir::Expr::FunctionRef {
                    method: method.clone(),
                    ty: ty.clone(),
                    span,
                },
            ]
            .into(),
            ty: ty.clone(),
            span,
        };

        if !cacheable || !self.cache_delegates() {
            return Ok(fresh);
        }

        let params = self.visible_type_params();
        let scope = capture::delegate_container_scope(method, ty, &params);
        let slot = self
            .caches
            .delegate_field(scope, self.generic_owner(), method.id, ty)
            .map_err(|_| Error::SynthesisCycle(self.method.containing.id, span))?;
        log::trace!("caching delegate to {} in {}", method.id, slot.field);

        let cache_field = || ir::Expr::Field {
            receiver: None,
            field: slot.field,
            ty: slot.ty.clone(),
            span,
        };
        let temp = self.new_temp(ty.clone(), TempKind::Ordinary, span);
        let read = ir::Expr::assign(
            ir::Expr::local(temp, ty.clone(), span),
            cache_field(),
            span,
        );
        let hit = ir::Expr::binary(
            BinOp::Ne,
            ir::Expr::local(temp, ty.clone(), span),
            ir::Expr::null(ty.clone(), span),
            span,
        );
        let fill = ir::Expr::Assign {
            place: cache_field().into(),
            value: fresh.into(),
            ty: ty.clone(),
            span,
        };
        Ok(ir::Expr::seq(
            [temp],
            [read],
            ir::Expr::Conditional {
                condition: hit.into(),
                then: ir::Expr::local(temp, ty.clone(), span).into(),
                else_: fill.into(),
                ty: ty.clone(),
                span,
            },
            span,
        ))
    }

    /// `a ?? b`, folding away the test when the left side is a constant:
    /// a null constant yields `b` outright, any other constant wins without
    /// evaluating `b`.
    fn lower_coalesce(
        &mut self,
        lhs: &BoundExpr<'ctx>,
        rhs: &BoundExpr<'ctx>,
        ty: &Type<'ctx>,
        span: Span,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        let lhs = match self.lower_expr(lhs, env)? {
            ir::Expr::Const(Const::Null, _, _) => return self.lower_expr(rhs, env),
            lhs @ ir::Expr::Const(_, _, _) => return Ok(lhs),
            ir::Expr::Sequence {
                locals,
                effects,
                value,
                span: seq_span,
            } => match *value {
                ir::Expr::Const(Const::Null, _, _) => {
                    let rhs = self.lower_expr(rhs, env)?;
                    return Ok(ir::Expr::seq(locals, effects, rhs, seq_span));
                }
                value @ ir::Expr::Const(_, _, _) => {
                    return Ok(ir::Expr::seq(locals, effects, value, seq_span));
                }
                value => ir::Expr::Sequence {
                    locals,
                    effects,
                    value: value.into(),
                    span: seq_span,
                },
            },
            lhs => lhs,
        };

        let rhs = self.lower_expr(rhs, env)?;
        let payload = lhs.ty().as_nullable().cloned();
        let mut locals = Vec::new();
        let mut effects = Vec::new();
        let (temp, temp_ty) = self.spill_into(lhs, TempKind::Ordinary, &mut locals, &mut effects);

        let value = match payload {
            Some(payload) => {
                let has_value = self.well_known(WellKnown::NullableHasValue, span)?;
                let get_value = self.well_known(WellKnown::NullableGetValueOrDefault, span)?;
                let condition = ir::Expr::Call {
                    method: has_value,
                    receiver: Some(Box::new(ir::Expr::local(temp, temp_ty.clone(), span))),
                    args: [].into(),
                    ty: Type::prim(predef::BOOL),
                    span,
                };
                let then = ir::Expr::Call {
                    method: get_value,
                    receiver: Some(Box::new(ir::Expr::local(temp, temp_ty, span))),
                    args: [].into(),
                    ty: payload,
                    span,
                };
                ir::Expr::Conditional {
                    condition: condition.into(),
                    then: then.into(),
                    else_: rhs.into(),
                    ty: ty.clone(),
                    span,
                }
            }
            None => {
                let condition = ir::Expr::binary(
                    BinOp::Ne,
                    ir::Expr::local(temp, temp_ty.clone(), span),
                    ir::Expr::null(temp_ty.clone(), span),
                    span,
                );
                ir::Expr::Conditional {
                    condition: condition.into(),
                    then: ir::Expr::local(temp, temp_ty, span).into(),
                    else_: rhs.into(),
                    ty: ty.clone(),
                    span,
                }
            }
        };
        Ok(ir::Expr::seq(locals, effects, value, span))
    }

    /// `a ??= b`. The place is decomposed once so that its receiver is
    /// evaluated a single time for both the read and the write.
    fn lower_coalesce_assign(
        &mut self,
        place: &BoundExpr<'ctx>,
        value: &BoundExpr<'ctx>,
        ty: &Type<'ctx>,
        span: Span,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        let mut locals = Vec::new();
        let mut effects = Vec::new();
        let place = self.lower_place(place, env, &mut locals, &mut effects)?;
        let value = self.lower_expr(value, env)?;

        let place_ty = place.ty().clone();
        let condition = match place_ty.as_nullable() {
            Some(_) => {
                let has_value = self.well_known(WellKnown::NullableHasValue, span)?;
                ir::Expr::Call {
                    method: has_value,
                    receiver: Some(Box::new(place.read(span))),
                    args: [].into(),
                    ty: Type::prim(predef::BOOL),
                    span,
                }
            }
            None => ir::Expr::binary(
                BinOp::Ne,
                place.read(span),
                ir::Expr::null(place_ty.clone(), span),
                span,
            ),
        };

        Ok(ir::Expr::seq(
            locals,
            effects,
            ir::Expr::Conditional {
                condition: condition.into(),
                then: place.read(span).into(),
                else_: place.write(value, span).into(),
                ty: ty.clone(),
                span,
            },
            span,
        ))
    }

    /// `a?.b`: the receiver is captured once and the access refers back to
    /// it through its placeholder, so chained accesses fuse into a single
    /// null test per receiver.
    fn lower_conditional_access(
        &mut self,
        receiver: &BoundExpr<'ctx>,
        access: &BoundExpr<'ctx>,
        placeholder: PlaceholderId,
        ty: &Type<'ctx>,
        span: Span,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        let receiver = self.lower_expr(receiver, env)?;
        let mut locals = Vec::new();
        let mut effects = Vec::new();
        let (temp, temp_ty) = self.spill_into(receiver, TempKind::Spill, &mut locals, &mut effects);

        let mut child = env.introduce_scope();
        child.insert(placeholder, (temp, temp_ty.clone()));
        let access = self.lower_expr(access, &child)?;

        let condition = ir::Expr::binary(
            BinOp::Ne,
            ir::Expr::local(temp, temp_ty.clone(), span),
            ir::Expr::null(temp_ty, span),
            span,
        );
        Ok(ir::Expr::seq(
            locals,
            effects,
            ir::Expr::Conditional {
                condition: condition.into(),
                then: access.into(),
                else_: ir::Expr::null(ty.clone(), span).into(),
                ty: ty.clone(),
                span,
            },
            span,
        ))
    }

    /// `a is T` with a statically decided relation keeps the operand's
    /// side effects but skips the runtime test.
    fn lower_is(
        &mut self,
        operand: &BoundExpr<'ctx>,
        target: &Type<'ctx>,
        relation: TypeRelation,
        ty: &Type<'ctx>,
        span: Span,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        let operand = self.lower_expr(operand, env)?;
        match relation {
            TypeRelation::Runtime => Ok(ir::Expr::TypeTest {
                operand: operand.into(),
                target: target.clone(),
                ty: ty.clone(),
                span,
            }),
            TypeRelation::Always if operand.ty().is_reference_type() => {
                let operand_ty = operand.ty().clone();
                Ok(ir::Expr::binary(
                    BinOp::Ne,
                    operand,
                    ir::Expr::null(operand_ty, span),
                    span,
                ))
            }
            TypeRelation::Always => Ok(ir::Expr::seq(
                [],
                [operand],
                ir::Expr::bool_(true, span),
                span,
            )),
            TypeRelation::Never => Ok(ir::Expr::seq(
                [],
                [operand],
                ir::Expr::bool_(false, span),
                span,
            )),
        }
    }

    /// `(a, b.F) = source`, evaluated in four phases: target places left to
    /// right, then the source, then element reads and conversions into
    /// fresh temporaries, then the stores left to right.
    #[expect(clippy::too_many_arguments)]
    fn lower_deconstruct(
        &mut self,
        targets: &[BoundExpr<'ctx>],
        source: &BoundExpr<'ctx>,
        deconstruct: Option<&MethodRef<'ctx>>,
        element_fields: &[FieldId<'ctx>],
        conversions: &[Option<ConversionKind>],
        ty: &Type<'ctx>,
        span: Span,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        if element_fields.len() != targets.len() || conversions.len() != targets.len() {
            return Err(Error::InvalidDeconstruction(
                Box::new(source.ty().clone()),
                targets.len(),
                span,
            ));
        }

        let mut locals = Vec::new();
        let mut effects = Vec::new();

        // phase 1: target places, capturing their receivers
        let places = targets
            .iter()
            .map(|target| self.lower_place(target, env, &mut locals, &mut effects))
            .collect::<LowerResult<'ctx, Vec<_>>>()?;

        // phase 2: the source value
        let source = self.lower_expr(source, env)?;
        let (source, source_ty) =
            self.spill_into(source, TempKind::Deconstruction, &mut locals, &mut effects);
        let (tuple, tuple_ty) = match deconstruct {
            Some(method) => {
                let call = ir::Expr::Call {
                    method: method.clone(),
                    receiver: Some(Box::new(ir::Expr::local(
                        source,
                        source_ty.clone(),
                        span,
                    ))),
                    args: [].into(),
                    ty: ty.clone(),
                    span,
                };
                self.spill_into(call, TempKind::Deconstruction, &mut locals, &mut effects)
            }
            None => (source, source_ty),
        };

        // phase 3: element reads and conversions
        let mut element_temps = Vec::with_capacity(targets.len());
        for (place, field, conversion) in izip!(&places, element_fields, conversions) {
            let element_ty = place.ty().clone();
            let mut read = ir::Expr::Field {
                receiver: Some(Box::new(ir::Expr::local(tuple, tuple_ty.clone(), span))),
                field: *field,
                ty: element_ty.clone(),
                span,
            };
            if let Some(kind) = conversion {
                read = ir::Expr::Convert {
                    operand: read.into(),
                    kind: *kind,
                    ty: element_ty.clone(),
                    span,
                };
            }
            let temp = self.new_temp(element_ty.clone(), TempKind::Deconstruction, span);
            locals.push(temp);
            effects.push(ir::Expr::assign(
                ir::Expr::local(temp, element_ty.clone(), span),
                read,
                span,
            ));
            element_temps.push((temp, element_ty));
        }

        // phase 4: the stores
        for (place, (temp, temp_ty)) in places.iter().zip(element_temps) {
            effects.push(place.write(ir::Expr::local(temp, temp_ty, span), span));
        }

        Ok(ir::Expr::seq(
            locals,
            effects,
            ir::Expr::local(tuple, ty.clone(), span),
            span,
        ))
    }

    fn lower_range(
        &mut self,
        start: Option<&BoundExpr<'ctx>>,
        end: Option<&BoundExpr<'ctx>>,
        ty: &Type<'ctx>,
        span: Span,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        let start = self.lower_opt(start, env)?;
        let end = self.lower_opt(end, env)?;
        match (start, end) {
            (Some(start), Some(end)) => Ok(ir::Expr::New {
                ctor: self.well_known(WellKnown::RangeCtor, span)?,
                args: [start, end].into(),
                ty: ty.clone(),
                span,
            }),
            (Some(start), None) => Ok(ir::Expr::Call {
                method: self.well_known(WellKnown::RangeStartAt, span)?,
                receiver: None,
                args: [start].into(),
                ty: ty.clone(),
                span,
            }),
            (None, Some(end)) => Ok(ir::Expr::Call {
                method: self.well_known(WellKnown::RangeEndAt, span)?,
                receiver: None,
                args: [end].into(),
                ty: ty.clone(),
                span,
            }),
            (None, None) => Ok(ir::Expr::Call {
                method: self.well_known(WellKnown::RangeAll, span)?,
                receiver: None,
                args: [].into(),
                ty: ty.clone(),
                span,
            }),
        }
    }

    /// The element count is spilled before the allocation so that the
    /// allocation itself is the last effect of the expression; the byte
    /// size multiplication traps on overflow.
    fn lower_stackalloc(
        &mut self,
        element: &Type<'ctx>,
        count: &BoundExpr<'ctx>,
        element_size: u32,
        ty: &Type<'ctx>,
        span: Span,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        let count = self.lower_expr(count, env)?;
        let mut locals = Vec::new();
        let mut effects = Vec::new();
        let (count, count_ty) =
            self.spill_into(count, TempKind::StackAlloc, &mut locals, &mut effects);

        let bytes = ir::Expr::Binary {
            op: BinOp::MulChecked,
            lhs: ir::Expr::local(count, count_ty, span).into(),
            rhs: ir::Expr::Const(
                Const::U32(element_size),
                Type::prim(predef::UINT32),
                span,
            )
            .into(),
            ty: Type::prim(predef::UINT32),
            span,
        };
        Ok(ir::Expr::seq(
            locals,
            effects,
            ir::Expr::StackAlloc {
                bytes: bytes.into(),
                element: element.clone(),
                ty: ty.clone(),
                span,
            },
            span,
        ))
    }

    fn lower_collection(
        &mut self,
        elements: &[BoundExpr<'ctx>],
        ty: &Type<'ctx>,
        span: Span,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        let ctor = self.well_known(WellKnown::ListCtor, span)?;
        let add = self.well_known(WellKnown::ListAdd, span)?;

        let temp = self.new_temp(ty.clone(), TempKind::Ordinary, span);
        let mut effects = vec![ir::Expr::assign(
            ir::Expr::local(temp, ty.clone(), span),
            ir::Expr::New {
                ctor,
                args: [].into(),
                ty: ty.clone(),
                span,
            },
            span,
        )];
        for element in elements {
            let element = self.lower_expr(element, env)?;
            effects.push(ir::Expr::Call {
                method: add.clone(),
                receiver: Some(Box::new(ir::Expr::local(temp, ty.clone(), span))),
                args: [element].into(),
                ty: Type::prim(predef::VOID),
                span,
            });
        }
        Ok(ir::Expr::seq(
            [temp],
            effects,
            ir::Expr::local(temp, ty.clone(), span),
            span,
        ))
    }

    /// `receiver with { F = v, .. }`: reference receivers are cloned, value
    /// receivers copied, and the member assignments then run against the
    /// fresh copy through its placeholder.
    fn lower_with(
        &mut self,
        receiver: &BoundExpr<'ctx>,
        assignments: &[(FieldId<'ctx>, BoundExpr<'ctx>)],
        placeholder: PlaceholderId,
        ty: &Type<'ctx>,
        span: Span,
        env: &PlaceholderEnv<'_, 'ctx>,
    ) -> LowerResult<'ctx, ir::Expr<'ctx>> {
        let receiver = self.lower_expr(receiver, env)?;
        let copy = if ty.is_reference_type() {
            let clone = self.well_known(WellKnown::ObjectClone, span)?;
            ir::Expr::Call {
                method: clone,
                receiver: Some(Box::new(receiver)),
                args: [].into(),
                ty: ty.clone(),
                span,
            }
        } else {
            receiver
        };

        let temp = self.new_temp(ty.clone(), TempKind::Ordinary, span);
        let mut effects = vec![ir::Expr::assign(
            ir::Expr::local(temp, ty.clone(), span),
            copy,
            span,
        )];

        let mut child = env.introduce_scope();
        child.insert(placeholder, (temp, ty.clone()));
        for (field, value) in assignments {
            let value = self.lower_expr(value, &child)?;
            let field_ty = value.ty().clone();
            effects.push(ir::Expr::Assign {
                place: ir::Expr::Field {
                    receiver: Some(Box::new(ir::Expr::local(temp, ty.clone(), span))),
                    field: *field,
                    ty: field_ty.clone(),
                    span,
                }
                .into(),
                value: value.into(),
                ty: field_ty,
                span,
            });
        }

        Ok(ir::Expr::seq(
            [temp],
            effects,
            ir::Expr::local(temp, ty.clone(), span),
            span,
        ))
    }

    /// Decomposes an assignable expression, spilling its receiver so that
    /// the place can be read and written without re-evaluating it.
    fn lower_place(
        &mut self,
        expr: &BoundExpr<'ctx>,
        env: &PlaceholderEnv<'_, 'ctx>,
        locals: &mut Vec<LocalId>,
        effects: &mut Vec<ir::Expr<'ctx>>,
    ) -> LowerResult<'ctx, Place<'ctx>> {
        match expr {
            BoundExpr::Local(id, ty, _) => Ok(Place::Local(*id, ty.clone())),
            BoundExpr::Placeholder(id, _, _) => {
                let (local, ty) = env
                    .get(id)
                    .expect("placeholder should be bound before use");
                Ok(Place::Local(*local, ty.clone()))
            }
            BoundExpr::Field {
                receiver,
                field,
                ty,
                ..
            } => {
                let receiver = match receiver.as_deref() {
                    Some(receiver) => {
                        let receiver = self.lower_expr(receiver, env)?;
                        Some(self.spill_into(receiver, TempKind::Spill, locals, effects))
                    }
                    None => None,
                };
                Ok(Place::Field {
                    receiver,
                    field: *field,
                    ty: ty.clone(),
                })
            }
            _ => unreachable!("the binder only produces locals and fields as places"),
        }
    }
}

/// An assignable location with its receiver already captured, cheap to
/// materialize as either a read or a write.
#[derive(Debug)]
enum Place<'ctx> {
    Local(LocalId, Type<'ctx>),
    Field {
        receiver: Option<(LocalId, Type<'ctx>)>,
        field: FieldId<'ctx>,
        ty: Type<'ctx>,
    },
}

impl<'ctx> Place<'ctx> {
    fn ty(&self) -> &Type<'ctx> {
        match self {
            Self::Local(_, ty) | Self::Field { ty, .. } => ty,
        }
    }

    fn read(&self, span: Span) -> ir::Expr<'ctx> {
        match self {
            Self::Local(id, ty) => ir::Expr::local(*id, ty.clone(), span),
            Self::Field {
                receiver,
                field,
                ty,
            } => ir::Expr::Field {
                receiver: receiver
                    .as_ref()
                    .map(|(id, ty)| Box::new(ir::Expr::local(*id, ty.clone(), span))),
                field: *field,
                ty: ty.clone(),
                span,
            },
        }
    }

    fn write(&self, value: ir::Expr<'ctx>, span: Span) -> ir::Expr<'ctx> {
        let ty = self.ty().clone();
        ir::Expr::Assign {
            place: self.read(span).into(),
            value: value.into(),
            ty,
            span,
        }
    }
}
