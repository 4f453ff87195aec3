use veld_ast::Span;

use crate::ir;
use crate::symbols::{LabelId, LocalId};
use crate::IndexMap;

/// A read-only traversal of lowered statements and expressions. Override
/// the callbacks of interest; the defaults just walk the children.
pub trait Visitor<'ctx> {
    fn visit_label(&mut self, _label: LabelId, _span: Span) {}

    fn visit_goto(&mut self, _target: LabelId, _span: Span) {}

    fn visit_local(&mut self, _local: LocalId, _span: Span) {}

    fn visit_const(&mut self, _constant: &ir::Const<'ctx>, _span: Span) {}

    fn visit_stmt(&mut self, stmt: &ir::Stmt<'ctx>) {
        match stmt {
            ir::Stmt::Expr(expr) => self.visit_expr(expr),
            ir::Stmt::Block { stmts, .. } => {
                stmts.iter().for_each(|stmt| self.visit_stmt(stmt));
            }
            ir::Stmt::Label(label, span) => self.visit_label(*label, *span),
            ir::Stmt::Goto(target, span) => self.visit_goto(*target, *span),
            ir::Stmt::CondGoto {
                condition,
                target,
                span,
                ..
            } => {
                self.visit_expr(condition);
                self.visit_goto(*target, *span);
            }
            ir::Stmt::SwitchTable {
                value,
                cases,
                fallback,
                span,
            } => {
                self.visit_expr(value);
                cases
                    .iter()
                    .for_each(|(_, target)| self.visit_goto(*target, *span));
                self.visit_goto(*fallback, *span);
            }
            ir::Stmt::Try {
                body,
                catches,
                finally,
                ..
            } => {
                body.iter().for_each(|stmt| self.visit_stmt(stmt));
                for catch in catches {
                    catch.body.iter().for_each(|stmt| self.visit_stmt(stmt));
                }
                if let Some(finally) = finally {
                    finally.iter().for_each(|stmt| self.visit_stmt(stmt));
                }
            }
            ir::Stmt::Return(expr, _) | ir::Stmt::Throw(expr, _) | ir::Stmt::Yield(expr, _) => {
                if let Some(expr) = expr {
                    self.visit_expr(expr);
                }
            }
            ir::Stmt::SeqPoint(stmt, _) => {
                if let Some(stmt) = stmt {
                    self.visit_stmt(stmt);
                }
            }
            ir::Stmt::HiddenSeqPoint(_) | ir::Stmt::Nop(_) | ir::Stmt::Error(_) => {}
        }
    }

    fn visit_expr(&mut self, expr: &ir::Expr<'ctx>) {
        match expr {
            ir::Expr::Const(constant, _, span) => self.visit_const(constant, *span),
            ir::Expr::Local(local, _, span) => self.visit_local(*local, *span),
            ir::Expr::Field { receiver, .. } => {
                if let Some(receiver) = receiver {
                    self.visit_expr(receiver);
                }
            }
            ir::Expr::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    self.visit_expr(receiver);
                }
                args.iter().for_each(|arg| self.visit_expr(arg));
            }
            ir::Expr::New { args, .. } => {
                args.iter().for_each(|arg| self.visit_expr(arg));
            }
            ir::Expr::FunctionRef { .. } => {}
            ir::Expr::Conditional {
                condition,
                then,
                else_,
                ..
            } => {
                self.visit_expr(condition);
                self.visit_expr(then);
                self.visit_expr(else_);
            }
            ir::Expr::Binary { lhs, rhs, .. } => {
                self.visit_expr(lhs);
                self.visit_expr(rhs);
            }
            ir::Expr::Unary { operand, .. } => self.visit_expr(operand),
            ir::Expr::Assign { place, value, .. } => {
                self.visit_expr(place);
                self.visit_expr(value);
            }
            ir::Expr::Sequence { effects, value, .. } => {
                effects.iter().for_each(|effect| self.visit_expr(effect));
                self.visit_expr(value);
            }
            ir::Expr::Convert { operand, .. }
            | ir::Expr::TypeTest { operand, .. }
            | ir::Expr::Await { operand, .. } => self.visit_expr(operand),
            ir::Expr::StackAlloc { bytes, .. } => self.visit_expr(bytes),
            ir::Expr::Closure { body, .. } => {
                body.iter().for_each(|stmt| self.visit_stmt(stmt));
            }
            ir::Expr::Error(_, _) => {}
        }
    }
}

/// Verifies the label discipline of a lowered body: every jump target is
/// defined exactly once. Run on debug builds after lowering.
#[derive(Debug, Default)]
pub struct LabelValidator {
    defined: IndexMap<LabelId, u32>,
    referenced: Vec<LabelId>,
}

impl LabelValidator {
    pub fn check(stmts: &[ir::Stmt<'_>]) -> Result<(), LabelProblem> {
        let mut validator = Self::default();
        stmts.iter().for_each(|stmt| validator.visit_stmt(stmt));

        for (&label, &count) in &validator.defined {
            if count > 1 {
                return Err(LabelProblem::DefinedTwice(label));
            }
        }
        for &label in &validator.referenced {
            if !validator.defined.contains_key(&label) {
                return Err(LabelProblem::Undefined(label));
            }
        }
        Ok(())
    }
}

impl Visitor<'_> for LabelValidator {
    fn visit_label(&mut self, label: LabelId, _span: Span) {
        *self.defined.entry(label).or_insert(0) += 1;
    }

    fn visit_goto(&mut self, target: LabelId, _span: Span) {
        self.referenced.push(target);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LabelProblem {
    #[error("label {0} is referenced but never defined")]
    Undefined(LabelId),
    #[error("label {0} is defined more than once")]
    DefinedTwice(LabelId),
}
