use std::cell::RefCell;
use std::fmt;

/// A lazily initialized slot that detects re-entrant initialization.
/// Used for per-module synthesized members that must be created at most
/// once no matter how many call sites request them.
pub struct Lazy<A, F> {
    get: F,
    value: RefCell<Option<A>>,
}

impl<A, F> Lazy<A, F> {
    #[inline]
    pub fn new(get: F) -> Self {
        Self {
            get,
            value: RefCell::new(None),
        }
    }

    pub fn get<E>(&self, env: &E) -> Result<A, CycleError>
    where
        A: Clone,
        F: Fn(&E) -> A,
    {
        // the borrow is held across the init call, so a re-entrant request
        // fails instead of recursing
        let mut slot = self.value.try_borrow_mut().map_err(|_| CycleError)?;
        if let Some(var) = &*slot {
            return Ok(var.clone());
        }
        let var = (self.get)(env);
        *slot = Some(var.clone());
        Ok(var)
    }
}

impl<A: fmt::Debug, F> fmt::Debug for Lazy<A, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("value", &self.value.try_borrow())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("a lazily created member depends on its own initialization")]
pub struct CycleError;
