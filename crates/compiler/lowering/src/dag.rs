use std::fmt;
use std::rc::Rc;

use hashbrown::{HashMap, HashSet};
use identity_hash::BuildIdentityHasher;
use veld_ast::Span;

use crate::bound::BoundExpr;
use crate::ir::{BinOp, Const, ConversionKind};
use crate::symbols::{FieldId, LabelId, LocalInfo, MethodRef, Type};

/// A temporary slot inside a decision dag. Slot 0 always holds the
/// scrutinee; evaluations write derived values into higher slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DagTempId(pub u32);

impl DagTempId {
    pub const INPUT: DagTempId = DagTempId(0);
}

impl fmt::Display for DagTempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// One node of a decision dag. Nodes are shared through [`Rc`]; a node
/// reachable through more than one edge must be emitted exactly once, with
/// later arrivals turned into jumps.
#[derive(Debug)]
pub enum DagNode<'ctx> {
    Evaluate {
        evaluation: Evaluation<'ctx>,
        next: Rc<DagNode<'ctx>>,
        span: Span,
    },
    Test {
        test: DagTest<'ctx>,
        when_true: Rc<DagNode<'ctx>>,
        when_false: Rc<DagNode<'ctx>>,
        span: Span,
    },
    /// Entry into an arm: bind the pattern variables, then either run the
    /// guard or jump straight to the arm body.
    When {
        bindings: Box<[Binding<'ctx>]>,
        guard: Option<Box<BoundExpr<'ctx>>>,
        when_true: Rc<DagNode<'ctx>>,
        when_false: Option<Rc<DagNode<'ctx>>>,
        span: Span,
    },
    Leaf {
        label: LabelId,
        span: Span,
    },
}

impl<'ctx> DagNode<'ctx> {
    pub fn leaf(label: LabelId, span: Span) -> Rc<Self> {
        Rc::new(Self::Leaf { label, span })
    }

    pub fn test(
        test: DagTest<'ctx>,
        when_true: Rc<Self>,
        when_false: Rc<Self>,
        span: Span,
    ) -> Rc<Self> {
        Rc::new(Self::Test {
            test,
            when_true,
            when_false,
            span,
        })
    }

    pub fn evaluate(evaluation: Evaluation<'ctx>, next: Rc<Self>, span: Span) -> Rc<Self> {
        Rc::new(Self::Evaluate {
            evaluation,
            next,
            span,
        })
    }

    pub fn when(
        bindings: impl Into<Box<[Binding<'ctx>]>>,
        guard: Option<BoundExpr<'ctx>>,
        when_true: Rc<Self>,
        when_false: Option<Rc<Self>>,
        span: Span,
    ) -> Rc<Self> {
        Rc::new(Self::When {
            bindings: bindings.into(),
            guard: guard.map(Box::new),
            when_true,
            when_false,
            span,
        })
    }

    pub fn span(&self) -> Span {
        match self {
            Self::Evaluate { span, .. }
            | Self::Test { span, .. }
            | Self::When { span, .. }
            | Self::Leaf { span, .. } => *span,
        }
    }

    /// True if any [`DagNode::When`] in the dag carries a guard. Guards can
    /// fall back into the dag, so pattern variables must not alias the dag
    /// temporaries in that case.
    pub fn has_guards(root: &Rc<Self>) -> bool {
        fn walk<'ctx>(node: &Rc<DagNode<'ctx>>, seen: &mut HashSet<NodeKey, IdentityState>) -> bool {
            if !seen.insert(key(node)) {
                return false;
            }
            match &**node {
                DagNode::Evaluate { next, .. } => walk(next, seen),
                DagNode::Test {
                    when_true,
                    when_false,
                    ..
                } => walk(when_true, seen) || walk(when_false, seen),
                DagNode::When {
                    guard,
                    when_true,
                    when_false,
                    ..
                } => {
                    guard.is_some()
                        || walk(when_true, seen)
                        || when_false.as_ref().is_some_and(|node| walk(node, seen))
                }
                DagNode::Leaf { .. } => false,
            }
        }
        walk(root, &mut HashSet::default())
    }
}

/// The pointer identity of a shared dag node.
pub type NodeKey = usize;

pub type IdentityState = BuildIdentityHasher<usize>;

#[inline]
pub fn key(node: &Rc<DagNode<'_>>) -> NodeKey {
    Rc::as_ptr(node).cast::<()>() as usize
}

/// Counts how many edges reach each node. Nodes with more than one
/// incoming edge get a label and are emitted at most once.
pub fn indegrees(root: &Rc<DagNode<'_>>) -> HashMap<NodeKey, u32, IdentityState> {
    fn visit<'ctx>(node: &Rc<DagNode<'ctx>>, counts: &mut HashMap<NodeKey, u32, IdentityState>) {
        let count = counts.entry(key(node)).or_insert(0);
        *count += 1;
        if *count > 1 {
            return;
        }
        match &**node {
            DagNode::Evaluate { next, .. } => visit(next, counts),
            DagNode::Test {
                when_true,
                when_false,
                ..
            } => {
                visit(when_true, counts);
                visit(when_false, counts);
            }
            DagNode::When {
                when_true,
                when_false,
                ..
            } => {
                visit(when_true, counts);
                if let Some(when_false) = when_false {
                    visit(when_false, counts);
                }
            }
            DagNode::Leaf { .. } => {}
        }
    }

    let mut counts = HashMap::default();
    visit(root, &mut counts);
    counts
}

/// True if a node other than a leaf is reachable through more than one
/// edge. Shared leaves are plain jump targets; only interior sharing makes
/// a dag branch back into itself.
pub fn has_shared_interior(root: &Rc<DagNode<'_>>) -> bool {
    fn walk<'ctx>(node: &Rc<DagNode<'ctx>>, seen: &mut HashSet<NodeKey, IdentityState>) -> bool {
        if matches!(&**node, DagNode::Leaf { .. }) {
            return false;
        }
        if !seen.insert(key(node)) {
            return true;
        }
        match &**node {
            DagNode::Evaluate { next, .. } => walk(next, seen),
            DagNode::Test {
                when_true,
                when_false,
                ..
            } => walk(when_true, seen) || walk(when_false, seen),
            DagNode::When {
                when_true,
                when_false,
                ..
            } => {
                walk(when_true, seen)
                    || when_false.as_ref().is_some_and(|node| walk(node, seen))
            }
            DagNode::Leaf { .. } => false,
        }
    }
    walk(root, &mut HashSet::default())
}

#[derive(Debug)]
pub struct Binding<'ctx> {
    pub source: DagTempId,
    pub target: LocalInfo<'ctx>,
}

/// A side-effect-free derivation of one dag temporary from another.
#[derive(Debug)]
pub enum Evaluation<'ctx> {
    Field {
        input: DagTempId,
        field: FieldId<'ctx>,
        ty: Type<'ctx>,
        output: DagTempId,
    },
    /// A unary method call such as a property getter or a
    /// deconstruct-into-tuple helper.
    Call {
        input: DagTempId,
        method: MethodRef<'ctx>,
        ty: Type<'ctx>,
        output: DagTempId,
    },
    Cast {
        input: DagTempId,
        kind: ConversionKind,
        ty: Type<'ctx>,
        output: DagTempId,
    },
}

impl Evaluation<'_> {
    pub fn output(&self) -> DagTempId {
        match self {
            Self::Field { output, .. } | Self::Call { output, .. } | Self::Cast { output, .. } => {
                *output
            }
        }
    }
}

#[derive(Debug)]
pub enum DagTest<'ctx> {
    NonNull(DagTempId),
    TypeTest {
        input: DagTempId,
        target: Type<'ctx>,
    },
    ValueEq {
        input: DagTempId,
        value: Const<'ctx>,
    },
    Relational {
        input: DagTempId,
        op: BinOp,
        bound: Const<'ctx>,
    },
}

impl DagTest<'_> {
    pub fn input(&self) -> DagTempId {
        match self {
            Self::NonNull(input)
            | Self::TypeTest { input, .. }
            | Self::ValueEq { input, .. }
            | Self::Relational { input, .. } => *input,
        }
    }
}

#[cfg(test)]
mod tests {
    use veld_ast::Span;

    use super::*;
    use crate::symbols::predef;

    fn span() -> Span {
        Span::new(0, 0, veld_ast::FileId::default())
    }

    #[test]
    fn diamond_shared_node_has_indegree_two() {
        let shared = DagNode::leaf(LabelId(0), span());
        let left = DagNode::test(
            DagTest::NonNull(DagTempId::INPUT),
            shared.clone(),
            DagNode::leaf(LabelId(1), span()),
            span(),
        );
        let root = DagNode::test(
            DagTest::TypeTest {
                input: DagTempId::INPUT,
                target: Type::prim(predef::OBJECT),
            },
            left,
            shared.clone(),
            span(),
        );

        let counts = indegrees(&root);
        assert_eq!(counts.get(&key(&shared)), Some(&2));
        assert_eq!(counts.get(&key(&root)), Some(&1));
    }

    #[test]
    fn shared_leaves_do_not_count_as_interior_sharing() {
        let failure = DagNode::leaf(LabelId(1), span());
        let chain = DagNode::test(
            DagTest::TypeTest {
                input: DagTempId::INPUT,
                target: Type::prim(predef::OBJECT),
            },
            DagNode::test(
                DagTest::NonNull(DagTempId::INPUT),
                DagNode::leaf(LabelId(0), span()),
                failure.clone(),
                span(),
            ),
            failure,
            span(),
        );
        assert!(!has_shared_interior(&chain));

        let shared_test = DagNode::test(
            DagTest::NonNull(DagTempId::INPUT),
            DagNode::leaf(LabelId(0), span()),
            DagNode::leaf(LabelId(1), span()),
            span(),
        );
        let diamond = DagNode::test(
            DagTest::TypeTest {
                input: DagTempId::INPUT,
                target: Type::prim(predef::OBJECT),
            },
            shared_test.clone(),
            shared_test,
            span(),
        );
        assert!(has_shared_interior(&diamond));
    }

    #[test]
    fn guard_detection_sees_through_sharing() {
        let leaf = DagNode::leaf(LabelId(0), span());
        let unguarded = DagNode::when([], None, leaf.clone(), None, span());
        assert!(!DagNode::has_guards(&unguarded));

        let guarded = DagNode::when(
            [],
            Some(BoundExpr::Const(
                Const::Bool(true),
                Type::prim(predef::BOOL),
                span(),
            )),
            leaf.clone(),
            Some(leaf),
            span(),
        );
        assert!(DagNode::has_guards(&guarded));
    }
}
