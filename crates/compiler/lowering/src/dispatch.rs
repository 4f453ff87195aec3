use crate::ir::{BinOp, Const};
use crate::symbols::LabelId;

/// A dispatch tree over relational tests against a single value. Interior
/// nodes compare the value against a constant bound; values for which the
/// comparison holds continue in `lo`, the rest in `hi`.
///
/// Trees built through [`ValueDispatch::create_balanced`] satisfy the AVL
/// invariant, so a switch with `N` relational cases never compares more
/// than `1.4405 * log2(N + 2)` times.
#[derive(Debug, PartialEq)]
pub enum ValueDispatch<'ctx> {
    Leaf(LabelId),
    Relational(Box<Relational<'ctx>>),
}

#[derive(Debug, PartialEq)]
pub struct Relational<'ctx> {
    pub op: BinOp,
    pub bound: Const<'ctx>,
    pub lo: ValueDispatch<'ctx>,
    pub hi: ValueDispatch<'ctx>,
    height: u16,
}

impl<'ctx> ValueDispatch<'ctx> {
    pub fn height(&self) -> u16 {
        match self {
            Self::Leaf(_) => 0,
            Self::Relational(node) => node.height,
        }
    }

    /// Joins two dispatch trees under a relational test, restoring the AVL
    /// invariant with rotations where the heights differ by more than one.
    ///
    /// The operator is normalized to `<` or `<=`; for `>` and `>=` the
    /// branches are swapped instead.
    pub fn create_balanced(
        op: BinOp,
        bound: Const<'ctx>,
        when_true: Self,
        when_false: Self,
    ) -> Self {
        let (op, lo, hi) = match op {
            BinOp::Lt | BinOp::Le => (op, when_true, when_false),
            BinOp::Gt => (BinOp::Le, when_false, when_true),
            BinOp::Ge => (BinOp::Lt, when_false, when_true),
            _ => unreachable!("dispatch trees are built from comparison operators only"),
        };
        Self::balanced(op, bound, lo, hi)
    }

    fn balanced(op: BinOp, bound: Const<'ctx>, lo: Self, hi: Self) -> Self {
        if lo.height() > hi.height() + 1 {
            let Self::Relational(l) = lo else {
                unreachable!("a tree of height > 1 must have an interior root");
            };
            let l = *l;
            if l.lo.height() >= l.hi.height() {
                // single rotation: l becomes the root
                let hi = Self::balanced(op, bound, l.hi, hi);
                Self::node(l.op, l.bound, l.lo, hi)
            } else {
                // double rotation through l's taller right child
                let Self::Relational(pivot) = l.hi else {
                    unreachable!("the taller child must be an interior node");
                };
                let pivot = *pivot;
                let new_lo = Self::node(l.op, l.bound, l.lo, pivot.lo);
                let new_hi = Self::balanced(op, bound, pivot.hi, hi);
                Self::node(pivot.op, pivot.bound, new_lo, new_hi)
            }
        } else if hi.height() > lo.height() + 1 {
            let Self::Relational(r) = hi else {
                unreachable!("a tree of height > 1 must have an interior root");
            };
            let r = *r;
            if r.hi.height() >= r.lo.height() {
                let lo = Self::balanced(op, bound, lo, r.lo);
                Self::node(r.op, r.bound, lo, r.hi)
            } else {
                let Self::Relational(pivot) = r.lo else {
                    unreachable!("the taller child must be an interior node");
                };
                let pivot = *pivot;
                let new_lo = Self::balanced(op, bound, lo, pivot.lo);
                let new_hi = Self::node(r.op, r.bound, pivot.hi, r.hi);
                Self::node(pivot.op, pivot.bound, new_lo, new_hi)
            }
        } else {
            Self::node(op, bound, lo, hi)
        }
    }

    fn node(op: BinOp, bound: Const<'ctx>, lo: Self, hi: Self) -> Self {
        let height = lo.height().max(hi.height()) + 1;
        Self::Relational(Box::new(Relational {
            op,
            bound,
            lo,
            hi,
            height,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(bounds: impl IntoIterator<Item = i32>) -> (ValueDispatch<'static>, usize) {
        let bounds: Vec<_> = bounds.into_iter().collect();
        let count = bounds.len();
        let mut next_label = count as u32;
        let tree = bounds.into_iter().enumerate().rev().fold(
            ValueDispatch::Leaf(LabelId(next_label)),
            |acc, (i, bound)| {
                next_label += 1;
                ValueDispatch::create_balanced(
                    BinOp::Lt,
                    Const::I32(bound),
                    ValueDispatch::Leaf(LabelId(i as u32)),
                    acc,
                )
            },
        );
        (tree, count)
    }

    fn in_order(tree: &ValueDispatch<'_>, out: &mut Vec<i32>) {
        if let ValueDispatch::Relational(node) = tree {
            in_order(&node.lo, out);
            match node.bound {
                Const::I32(v) => out.push(v),
                ref other => panic!("unexpected bound {other:?}"),
            }
            in_order(&node.hi, out);
        }
    }

    fn assert_avl(tree: &ValueDispatch<'_>) {
        if let ValueDispatch::Relational(node) = tree {
            let (lo, hi) = (node.lo.height(), node.hi.height());
            assert!(lo.abs_diff(hi) <= 1, "unbalanced node: {lo} vs {hi}");
            assert_eq!(tree.height(), lo.max(hi) + 1);
            assert_avl(&node.lo);
            assert_avl(&node.hi);
        }
    }

    #[test]
    fn chains_stay_within_the_avl_height_bound() {
        for n in 1..=128 {
            let (tree, count) = chain(0..n);
            assert_avl(&tree);
            let bound = (1.4405 * ((count as f64) + 2.0).log2()).ceil() as u16;
            assert!(
                tree.height() <= bound,
                "height {} exceeds bound {bound} for {count} cases",
                tree.height(),
            );
        }
    }

    #[test]
    fn rotations_preserve_the_comparison_order() {
        let (tree, _) = chain(0..100);
        let mut bounds = Vec::new();
        in_order(&tree, &mut bounds);
        assert_eq!(bounds, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn greater_than_swaps_the_branches() {
        let gt = ValueDispatch::create_balanced(
            BinOp::Gt,
            Const::I32(5),
            ValueDispatch::Leaf(LabelId(0)),
            ValueDispatch::Leaf(LabelId(1)),
        );
        let le = ValueDispatch::create_balanced(
            BinOp::Le,
            Const::I32(5),
            ValueDispatch::Leaf(LabelId(1)),
            ValueDispatch::Leaf(LabelId(0)),
        );
        assert_eq!(gt, le);
    }

    #[test]
    fn single_case_is_one_comparison() {
        let (tree, _) = chain([10]);
        assert_eq!(tree.height(), 1);
    }
}
