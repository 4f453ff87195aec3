use std::fmt;
use std::rc::Rc;

use enum_as_inner::EnumAsInner;
use veld_ast::Span;

use crate::dag::DagNode;
use crate::ir::{BinOp, Const, ConversionKind, UnOp};
use crate::symbols::{FieldId, LabelId, LocalId, LocalInfo, MethodRef, Type};

/// A statement as produced by the binder: fully typed and name-resolved,
/// with break and continue already attached to fresh labels, but still
/// carrying structured control flow.
#[derive(Debug, EnumAsInner)]
pub enum BoundStmt<'ctx> {
    Block {
        locals: Box<[LocalInfo<'ctx>]>,
        stmts: Box<[BoundStmt<'ctx>]>,
        span: Span,
    },
    Expr(Box<BoundExpr<'ctx>>),
    If {
        condition: Box<BoundExpr<'ctx>>,
        then: Box<BoundStmt<'ctx>>,
        else_: Option<Box<BoundStmt<'ctx>>>,
        span: Span,
    },
    While {
        condition: Box<BoundExpr<'ctx>>,
        body: Box<BoundStmt<'ctx>>,
        break_label: LabelId,
        continue_label: LabelId,
        span: Span,
    },
    DoWhile {
        condition: Box<BoundExpr<'ctx>>,
        body: Box<BoundStmt<'ctx>>,
        break_label: LabelId,
        continue_label: LabelId,
        span: Span,
    },
    For {
        locals: Box<[LocalInfo<'ctx>]>,
        init: Box<[BoundExpr<'ctx>]>,
        condition: Option<Box<BoundExpr<'ctx>>>,
        increment: Box<[BoundExpr<'ctx>]>,
        body: Box<BoundStmt<'ctx>>,
        break_label: LabelId,
        continue_label: LabelId,
        span: Span,
    },
    Switch {
        scrutinee: Box<BoundExpr<'ctx>>,
        kind: SwitchKind<'ctx>,
        sections: Box<[SwitchSection<'ctx>]>,
        break_label: LabelId,
        span: Span,
    },
    Try {
        body: Box<BoundStmt<'ctx>>,
        catches: Box<[BoundCatch<'ctx>]>,
        finally: Option<Box<BoundStmt<'ctx>>>,
        span: Span,
    },
    Lock {
        resource: Box<BoundExpr<'ctx>>,
        body: Box<BoundStmt<'ctx>>,
        span: Span,
    },
    Using {
        local: Option<LocalInfo<'ctx>>,
        resource: Box<BoundExpr<'ctx>>,
        body: Box<BoundStmt<'ctx>>,
        span: Span,
    },
    Label(LabelId, Span),
    Goto(LabelId, Span),
    Break(LabelId, Span),
    Continue(LabelId, Span),
    Return(Option<Box<BoundExpr<'ctx>>>, Span),
    Throw(Option<Box<BoundExpr<'ctx>>>, Span),
    Yield(Option<Box<BoundExpr<'ctx>>>, Span),
    Error(Span),
}

impl BoundStmt<'_> {
    pub fn span(&self) -> Span {
        match self {
            Self::Expr(expr) => expr.span(),
            Self::Block { span, .. }
            | Self::If { span, .. }
            | Self::While { span, .. }
            | Self::DoWhile { span, .. }
            | Self::For { span, .. }
            | Self::Switch { span, .. }
            | Self::Try { span, .. }
            | Self::Lock { span, .. }
            | Self::Using { span, .. }
            | Self::Label(_, span)
            | Self::Goto(_, span)
            | Self::Break(_, span)
            | Self::Continue(_, span)
            | Self::Return(_, span)
            | Self::Throw(_, span)
            | Self::Yield(_, span)
            | Self::Error(span) => *span,
        }
    }
}

impl<'ctx> From<BoundExpr<'ctx>> for BoundStmt<'ctx> {
    #[inline]
    fn from(expr: BoundExpr<'ctx>) -> Self {
        Self::Expr(Box::new(expr))
    }
}

/// One arm body of a switch. The binder has already assigned each section
/// a label; the dispatch structure in [`SwitchKind`] jumps to them.
#[derive(Debug)]
pub struct SwitchSection<'ctx> {
    pub label: LabelId,
    pub locals: Box<[LocalInfo<'ctx>]>,
    pub stmts: Box<[BoundStmt<'ctx>]>,
    pub span: Span,
}

#[derive(Debug)]
pub enum SwitchKind<'ctx> {
    /// Pattern switch dispatched through a shared decision dag.
    Decision {
        dag: Rc<DagNode<'ctx>>,
        default_label: LabelId,
    },
    /// Constant switch over integer or string case values.
    Value {
        value_kind: SwitchValueKind,
        cases: Box<[(Const<'ctx>, LabelId)]>,
        default_label: LabelId,
    },
    /// Relational patterns over a single numeric value, dispatched through
    /// a balanced comparison tree.
    Relational {
        cases: Box<[RelationalCase<'ctx>]>,
        default_label: LabelId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchValueKind {
    Int,
    String,
}

#[derive(Debug)]
pub struct RelationalCase<'ctx> {
    pub op: BinOp,
    pub bound: Const<'ctx>,
    pub label: LabelId,
}

#[derive(Debug)]
pub struct BoundCatch<'ctx> {
    pub exception_type: Type<'ctx>,
    pub local: Option<LocalInfo<'ctx>>,
    pub body: Box<BoundStmt<'ctx>>,
    pub span: Span,
}

/// Identifies a hole left by the binder inside a rewritten subtree, to be
/// substituted with a capture temporary during lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaceholderId(pub u32);

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(Debug, EnumAsInner)]
pub enum BoundExpr<'ctx> {
    Const(Const<'ctx>, Type<'ctx>, Span),
    Local(LocalId, Type<'ctx>, Span),
    Field {
        receiver: Option<Box<BoundExpr<'ctx>>>,
        field: FieldId<'ctx>,
        ty: Type<'ctx>,
        span: Span,
    },
    /// Property read; lowered into a getter call.
    Property {
        getter: MethodRef<'ctx>,
        receiver: Option<Box<BoundExpr<'ctx>>>,
        ty: Type<'ctx>,
        span: Span,
    },
    Call {
        method: MethodRef<'ctx>,
        receiver: Option<Box<BoundExpr<'ctx>>>,
        args: Box<[BoundExpr<'ctx>]>,
        ty: Type<'ctx>,
        span: Span,
    },
    New {
        ctor: MethodRef<'ctx>,
        args: Box<[BoundExpr<'ctx>]>,
        ty: Type<'ctx>,
        span: Span,
    },
    /// Instance of a synthesized anonymous record type.
    AnonymousObject {
        ctor: MethodRef<'ctx>,
        args: Box<[BoundExpr<'ctx>]>,
        ty: Type<'ctx>,
        span: Span,
    },
    TupleLiteral {
        ctor: MethodRef<'ctx>,
        elements: Box<[BoundExpr<'ctx>]>,
        ty: Type<'ctx>,
        span: Span,
    },
    DelegateCreation {
        method: MethodRef<'ctx>,
        receiver: Option<Box<BoundExpr<'ctx>>>,
        ty: Type<'ctx>,
        span: Span,
    },
    Closure {
        body: Box<BoundStmt<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    Conditional {
        condition: Box<BoundExpr<'ctx>>,
        then: Box<BoundExpr<'ctx>>,
        else_: Box<BoundExpr<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<BoundExpr<'ctx>>,
        rhs: Box<BoundExpr<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    Unary {
        op: UnOp,
        operand: Box<BoundExpr<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    Assign {
        place: Box<BoundExpr<'ctx>>,
        value: Box<BoundExpr<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    /// `a ?? b`
    Coalesce {
        lhs: Box<BoundExpr<'ctx>>,
        rhs: Box<BoundExpr<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    /// `a ??= b`
    CoalesceAssign {
        place: Box<BoundExpr<'ctx>>,
        value: Box<BoundExpr<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    /// `a?.b`, with `access` referring to the captured receiver through
    /// `placeholder`.
    ConditionalAccess {
        receiver: Box<BoundExpr<'ctx>>,
        access: Box<BoundExpr<'ctx>>,
        placeholder: PlaceholderId,
        ty: Type<'ctx>,
        span: Span,
    },
    /// `a is T`, with the relation between the operand type and the target
    /// type already decided by the binder.
    Is {
        operand: Box<BoundExpr<'ctx>>,
        target: Type<'ctx>,
        relation: TypeRelation,
        ty: Type<'ctx>,
        span: Span,
    },
    /// `a as T`
    As {
        operand: Box<BoundExpr<'ctx>>,
        kind: ConversionKind,
        ty: Type<'ctx>,
        span: Span,
    },
    /// `a is P` for a full pattern `P` in expression position, dispatched
    /// through a decision dag whose leaves are success and failure.
    PatternTest {
        scrutinee: Box<BoundExpr<'ctx>>,
        dag: Rc<DagNode<'ctx>>,
        success: LabelId,
        failure: LabelId,
        ty: Type<'ctx>,
        span: Span,
    },
    /// `(a, b.F) = source`
    DeconstructAssign {
        targets: Box<[BoundExpr<'ctx>]>,
        source: Box<BoundExpr<'ctx>>,
        /// A `Deconstruct`-style method producing the element values, or
        /// `None` for tuple sources read member-wise.
        deconstruct: Option<MethodRef<'ctx>>,
        element_fields: Box<[FieldId<'ctx>]>,
        conversions: Box<[Option<ConversionKind>]>,
        ty: Type<'ctx>,
        span: Span,
    },
    RangeLiteral {
        start: Option<Box<BoundExpr<'ctx>>>,
        end: Option<Box<BoundExpr<'ctx>>>,
        ty: Type<'ctx>,
        span: Span,
    },
    StackAlloc {
        element: Type<'ctx>,
        count: Box<BoundExpr<'ctx>>,
        element_size: u32,
        ty: Type<'ctx>,
        span: Span,
    },
    CollectionLiteral {
        elements: Box<[BoundExpr<'ctx>]>,
        ty: Type<'ctx>,
        span: Span,
    },
    Await {
        operand: Box<BoundExpr<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    /// `receiver with { F = v, .. }`, with assignment values referring to
    /// the fresh clone through `placeholder`.
    With {
        receiver: Box<BoundExpr<'ctx>>,
        assignments: Box<[(FieldId<'ctx>, BoundExpr<'ctx>)]>,
        placeholder: PlaceholderId,
        ty: Type<'ctx>,
        span: Span,
    },
    Placeholder(PlaceholderId, Type<'ctx>, Span),
    Error(Type<'ctx>, Span),
}

impl<'ctx> BoundExpr<'ctx> {
    pub fn span(&self) -> Span {
        match self {
            Self::Const(_, _, span)
            | Self::Local(_, _, span)
            | Self::Field { span, .. }
            | Self::Property { span, .. }
            | Self::Call { span, .. }
            | Self::New { span, .. }
            | Self::AnonymousObject { span, .. }
            | Self::TupleLiteral { span, .. }
            | Self::DelegateCreation { span, .. }
            | Self::Closure { span, .. }
            | Self::Conditional { span, .. }
            | Self::Binary { span, .. }
            | Self::Unary { span, .. }
            | Self::Assign { span, .. }
            | Self::Coalesce { span, .. }
            | Self::CoalesceAssign { span, .. }
            | Self::ConditionalAccess { span, .. }
            | Self::Is { span, .. }
            | Self::As { span, .. }
            | Self::PatternTest { span, .. }
            | Self::DeconstructAssign { span, .. }
            | Self::RangeLiteral { span, .. }
            | Self::StackAlloc { span, .. }
            | Self::CollectionLiteral { span, .. }
            | Self::Await { span, .. }
            | Self::With { span, .. }
            | Self::Placeholder(_, _, span)
            | Self::Error(_, span) => *span,
        }
    }

    pub fn ty(&self) -> &Type<'ctx> {
        match self {
            Self::Const(_, ty, _)
            | Self::Local(_, ty, _)
            | Self::Field { ty, .. }
            | Self::Property { ty, .. }
            | Self::Call { ty, .. }
            | Self::New { ty, .. }
            | Self::AnonymousObject { ty, .. }
            | Self::TupleLiteral { ty, .. }
            | Self::DelegateCreation { ty, .. }
            | Self::Closure { ty, .. }
            | Self::Conditional { ty, .. }
            | Self::Binary { ty, .. }
            | Self::Unary { ty, .. }
            | Self::Assign { ty, .. }
            | Self::Coalesce { ty, .. }
            | Self::CoalesceAssign { ty, .. }
            | Self::ConditionalAccess { ty, .. }
            | Self::Is { ty, .. }
            | Self::As { ty, .. }
            | Self::PatternTest { ty, .. }
            | Self::DeconstructAssign { ty, .. }
            | Self::RangeLiteral { ty, .. }
            | Self::StackAlloc { ty, .. }
            | Self::CollectionLiteral { ty, .. }
            | Self::Await { ty, .. }
            | Self::With { ty, .. }
            | Self::Placeholder(_, ty, _)
            | Self::Error(ty, _) => ty,
        }
    }
}

/// The statically known relationship between the operand and target types
/// of an `is` test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRelation {
    /// The test always succeeds; only a null check remains at runtime.
    Always,
    /// The test can never succeed.
    Never,
    /// The test must be performed at runtime.
    Runtime,
}
