mod span;

pub use span::{FileId, Span};

/// A value paired with its source span.
pub type Spanned<A> = (A, Span);
