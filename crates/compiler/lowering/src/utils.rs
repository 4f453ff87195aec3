pub mod fmt;
mod lazy;
mod scoped_map;

pub use lazy::CycleError;
pub(crate) use lazy::Lazy;
pub use scoped_map::ScopedMap;
