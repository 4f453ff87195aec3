use core::fmt;
use std::cell::RefCell;

#[derive(Debug, Clone)]
pub struct DisplayFn<F>(F);

impl<F> DisplayFn<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> fmt::Display for DisplayFn<F>
where
    F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
{
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0(f)
    }
}

pub fn sep_by<T, I>(iter: I, sep: &str) -> impl fmt::Display + use<'_, T, I>
where
    I: IntoIterator<Item = T>,
    I::Item: fmt::Display,
{
    let iter = RefCell::new(iter.into_iter());
    DisplayFn::new(move |f: &mut fmt::Formatter<'_>| {
        if let Some(first) = iter.borrow_mut().next() {
            write!(f, "{first}")?;
        }
        iter.borrow_mut()
            .try_for_each(|item| write!(f, "{sep}{item}"))?;
        Ok(())
    })
}

pub fn indented(depth: usize) -> impl fmt::Display {
    DisplayFn::new(move |f: &mut fmt::Formatter<'_>| {
        (0..depth).try_for_each(|_| f.write_str("  "))
    })
}
