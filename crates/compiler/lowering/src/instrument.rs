use veld_ast::Span;

use crate::bound::BoundStmt;
use crate::ir;

/// Hooks invoked around every lowered statement. The debug build of a
/// module threads [`DebugInstrumenter`] through here; release builds use
/// the no-op defaults.
pub trait Instrument<'ctx> {
    /// Called before the lowered form of `stmt` is emitted; anything
    /// returned is emitted first.
    fn before_stmt(&mut self, stmt: &BoundStmt<'ctx>) -> Option<ir::Stmt<'ctx>> {
        let _ = stmt;
        None
    }

    /// Called after the lowered form of `stmt` has been emitted.
    fn after_stmt(&mut self, stmt: &BoundStmt<'ctx>) -> Option<ir::Stmt<'ctx>> {
        let _ = stmt;
        None
    }

    /// A point the debugger can stop at that corresponds to no source
    /// text, such as the implicit branch closing a loop.
    fn hidden_seq_point(&mut self, span: Span) -> Option<ir::Stmt<'ctx>> {
        let _ = span;
        None
    }
}

/// Instrumentation used when compiling for debugging: marks each statement
/// with a sequence point and materializes hidden points for synthesized
/// control flow.
#[derive(Debug, Default)]
pub struct DebugInstrumenter;

impl<'ctx> Instrument<'ctx> for DebugInstrumenter {
    fn before_stmt(&mut self, stmt: &BoundStmt<'ctx>) -> Option<ir::Stmt<'ctx>> {
        match stmt {
            // blocks and labels produce no code of their own
            BoundStmt::Block { .. } | BoundStmt::Label(_, _) | BoundStmt::Error(_) => None,
            _ => Some(ir::Stmt::SeqPoint(None, stmt.span())),
        }
    }

    fn hidden_seq_point(&mut self, span: Span) -> Option<ir::Stmt<'ctx>> {
        Some(ir::Stmt::HiddenSeqPoint(span))
    }
}

/// The no-op instrumentation used outside of debug builds.
#[derive(Debug, Default)]
pub struct NoInstrument;

impl<'ctx> Instrument<'ctx> for NoInstrument {}
