use thiserror::Error;
use veld_ast::Span;

use crate::symbols::{Type, TypeId, WellKnown};

pub type LowerResult<'ctx, A, E = Error<'ctx>> = Result<A, E>;

#[derive(Debug, Clone, Error)]
pub enum Error<'ctx> {
    #[error("this expression is nested too deeply")]
    RecursionLimit(Span),
    #[error("this pattern cannot be used in expression position because it requires backtracking")]
    NonLinearMatch(Span),
    #[error("the required runtime member `{0}` could not be resolved")]
    MissingWellKnown(WellKnown, Span),
    #[error("`{0}` does not support deconstruction into {1} elements")]
    InvalidDeconstruction(Box<Type<'ctx>>, usize, Span),
    #[error("`{0}` is a value type and cannot be used in a lock statement")]
    InvalidLockType(Box<Type<'ctx>>, Span),
    #[error("a synthesized member of `{0}` depends on its own initialization")]
    SynthesisCycle(TypeId<'ctx>, Span),
}

impl Error<'_> {
    pub fn span(&self) -> Span {
        match self {
            Self::RecursionLimit(span)
            | Self::NonLinearMatch(span)
            | Self::MissingWellKnown(_, span)
            | Self::InvalidDeconstruction(_, _, span)
            | Self::InvalidLockType(_, span)
            | Self::SynthesisCycle(_, span) => *span,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::RecursionLimit(_) => "RECURSION_LIMIT",
            Self::NonLinearMatch(_) => "NON_LINEAR_MATCH",
            Self::MissingWellKnown(_, _) => "MISSING_WELL_KNOWN",
            Self::InvalidDeconstruction(_, _, _) => "INVALID_DECONSTRUCTION",
            Self::InvalidLockType(_, _) => "INVALID_LOCK_TYPE",
            Self::SynthesisCycle(_, _) => "SYNTHESIS_CYCLE",
        }
    }

    /// Fatal errors abort the enclosing function body instead of being
    /// recovered at the next statement boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RecursionLimit(_))
    }
}

/// An append-only collector of diagnostics. Lowering never aborts on the
/// first error; rules push into the reporter and substitute error nodes so
/// that later statements still get checked.
#[derive(Debug)]
pub struct Reporter<A> {
    reported: Vec<A>,
}

impl<A> Reporter<A> {
    pub fn unwrap_err<A1, E1>(&mut self, res: Result<A1, E1>) -> Option<A1>
    where
        E1: Into<A>,
    {
        match res {
            Ok(res) => Some(res),
            Err(err) => {
                self.report(err.into());
                None
            }
        }
    }

    #[inline]
    pub fn report(&mut self, error: impl Into<A>) {
        self.reported.push(error.into());
    }

    pub fn report_many(&mut self, errors: impl IntoIterator<Item = impl Into<A>>) {
        self.reported.extend(errors.into_iter().map(Into::into));
    }

    #[inline]
    pub fn reported(&self) -> &[A] {
        &self.reported
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reported.is_empty()
    }

    #[inline]
    pub fn into_reported(self) -> Vec<A> {
        self.reported
    }
}

impl<E> Default for Reporter<E> {
    fn default() -> Self {
        Self {
            reported: Vec::new(),
        }
    }
}
