//! Lowering of bound function bodies to primitive statements. The input
//! trees come out of the binder fully typed; the output vocabulary is
//! labels, gotos, conditional gotos, switch tables and try regions, ready
//! for the code generator and the later rewriting passes.

pub mod bound;
pub mod capture;
pub mod container;
pub mod dag;
mod diagnostic;
pub mod dispatch;
pub mod instrument;
pub mod ir;
mod lower;
pub mod symbols;
pub mod utils;
pub mod visitor;

pub use diagnostic::{Error, LowerResult, Reporter};
pub use lower::{LowerOptions, LoweredBody, Lowerer, OptimizationLevel};
pub use utils::ScopedMap;

pub type IndexMap<K, V, S = hashbrown::DefaultHashBuilder> = indexmap::IndexMap<K, V, S>;
