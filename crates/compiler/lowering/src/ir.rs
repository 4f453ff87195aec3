use std::borrow::Cow;
use std::fmt;

use enum_as_inner::EnumAsInner;
use veld_ast::Span;

use crate::symbols::{predef, FieldId, LabelId, LocalId, MethodRef, Type, TypeId};
use crate::utils::fmt::{indented, sep_by, DisplayFn};

/// The primitive statement vocabulary handed to the code generator:
/// blocks, labels, gotos, conditional gotos, switch tables, try regions
/// and little else. Everything higher-level is gone after lowering.
#[derive(Debug, EnumAsInner)]
pub enum Stmt<'ctx> {
    Expr(Box<Expr<'ctx>>),
    Block {
        locals: Box<[LocalId]>,
        stmts: Vec<Stmt<'ctx>>,
        span: Span,
    },
    Label(LabelId, Span),
    Goto(LabelId, Span),
    CondGoto {
        condition: Box<Expr<'ctx>>,
        target: LabelId,
        jump_if: bool,
        span: Span,
    },
    SwitchTable {
        value: Box<Expr<'ctx>>,
        cases: Box<[(Const<'ctx>, LabelId)]>,
        fallback: LabelId,
        span: Span,
    },
    Try {
        body: Vec<Stmt<'ctx>>,
        catches: Box<[Catch<'ctx>]>,
        finally: Option<Vec<Stmt<'ctx>>>,
        span: Span,
    },
    Return(Option<Box<Expr<'ctx>>>, Span),
    Throw(Option<Box<Expr<'ctx>>>, Span),
    /// Survives lowering; consumed by the state-machine rewriting pass.
    Yield(Option<Box<Expr<'ctx>>>, Span),
    SeqPoint(Option<Box<Stmt<'ctx>>>, Span),
    HiddenSeqPoint(Span),
    Nop(Span),
    Error(Span),
}

impl<'ctx> Stmt<'ctx> {
    pub fn span(&self) -> Span {
        match self {
            Self::Expr(expr) => expr.span(),
            Self::Block { span, .. }
            | Self::Label(_, span)
            | Self::Goto(_, span)
            | Self::CondGoto { span, .. }
            | Self::SwitchTable { span, .. }
            | Self::Try { span, .. }
            | Self::Return(_, span)
            | Self::Throw(_, span)
            | Self::Yield(_, span)
            | Self::SeqPoint(_, span)
            | Self::HiddenSeqPoint(span)
            | Self::Nop(span)
            | Self::Error(span) => *span,
        }
    }

    pub fn cond_goto(condition: Expr<'ctx>, target: LabelId, jump_if: bool, span: Span) -> Self {
        Self::CondGoto {
            condition: condition.into(),
            target,
            jump_if,
            span,
        }
    }
}

impl<'ctx> From<Expr<'ctx>> for Stmt<'ctx> {
    #[inline]
    fn from(expr: Expr<'ctx>) -> Self {
        Self::Expr(Box::new(expr))
    }
}

#[derive(Debug)]
pub struct Catch<'ctx> {
    pub exception_type: Type<'ctx>,
    pub local: Option<LocalId>,
    pub body: Vec<Stmt<'ctx>>,
    pub span: Span,
}

#[derive(Debug, EnumAsInner)]
pub enum Expr<'ctx> {
    Const(Const<'ctx>, Type<'ctx>, Span),
    Local(LocalId, Type<'ctx>, Span),
    Field {
        receiver: Option<Box<Expr<'ctx>>>,
        field: FieldId<'ctx>,
        ty: Type<'ctx>,
        span: Span,
    },
    Call {
        method: MethodRef<'ctx>,
        receiver: Option<Box<Expr<'ctx>>>,
        args: Box<[Expr<'ctx>]>,
        ty: Type<'ctx>,
        span: Span,
    },
    New {
        ctor: MethodRef<'ctx>,
        args: Box<[Expr<'ctx>]>,
        ty: Type<'ctx>,
        span: Span,
    },
    FunctionRef {
        method: MethodRef<'ctx>,
        ty: Type<'ctx>,
        span: Span,
    },
    Conditional {
        condition: Box<Expr<'ctx>>,
        then: Box<Expr<'ctx>>,
        else_: Box<Expr<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr<'ctx>>,
        rhs: Box<Expr<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    Assign {
        place: Box<Expr<'ctx>>,
        value: Box<Expr<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    /// Scratch locals, ordered side effects, then a value. The locals are
    /// scoped to this expression alone.
    Sequence {
        locals: Box<[LocalId]>,
        effects: Box<[Expr<'ctx>]>,
        value: Box<Expr<'ctx>>,
        span: Span,
    },
    Convert {
        operand: Box<Expr<'ctx>>,
        kind: ConversionKind,
        ty: Type<'ctx>,
        span: Span,
    },
    /// Runtime type test that could not be decided statically.
    TypeTest {
        operand: Box<Expr<'ctx>>,
        target: Type<'ctx>,
        ty: Type<'ctx>,
        span: Span,
    },
    /// Stack allocation of `bytes` bytes; never re-spilled into shared
    /// storage, and always the last side effect of its enclosing sequence.
    StackAlloc {
        bytes: Box<Expr<'ctx>>,
        element: Type<'ctx>,
        ty: Type<'ctx>,
        span: Span,
    },
    /// Survives lowering; consumed by the state-machine rewriting pass.
    Await {
        operand: Box<Expr<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    /// Survives lowering; consumed by the closure-conversion pass.
    Closure {
        body: Vec<Stmt<'ctx>>,
        ty: Type<'ctx>,
        span: Span,
    },
    Error(Type<'ctx>, Span),
}

impl<'ctx> Expr<'ctx> {
    pub fn span(&self) -> Span {
        match self {
            Self::Const(_, _, span)
            | Self::Local(_, _, span)
            | Self::Field { span, .. }
            | Self::Call { span, .. }
            | Self::New { span, .. }
            | Self::FunctionRef { span, .. }
            | Self::Conditional { span, .. }
            | Self::Binary { span, .. }
            | Self::Unary { span, .. }
            | Self::Assign { span, .. }
            | Self::Sequence { span, .. }
            | Self::Convert { span, .. }
            | Self::TypeTest { span, .. }
            | Self::StackAlloc { span, .. }
            | Self::Await { span, .. }
            | Self::Closure { span, .. }
            | Self::Error(_, span) => *span,
        }
    }

    pub fn ty(&self) -> &Type<'ctx> {
        match self {
            Self::Const(_, ty, _)
            | Self::Local(_, ty, _)
            | Self::Field { ty, .. }
            | Self::Call { ty, .. }
            | Self::New { ty, .. }
            | Self::FunctionRef { ty, .. }
            | Self::Conditional { ty, .. }
            | Self::Binary { ty, .. }
            | Self::Unary { ty, .. }
            | Self::Assign { ty, .. }
            | Self::Convert { ty, .. }
            | Self::TypeTest { ty, .. }
            | Self::StackAlloc { ty, .. }
            | Self::Await { ty, .. }
            | Self::Closure { ty, .. }
            | Self::Error(ty, _) => ty,
            Self::Sequence { value, .. } => value.ty(),
        }
    }

    pub fn bool_(value: bool, span: Span) -> Self {
        Self::Const(Const::Bool(value), Type::prim(predef::BOOL), span)
    }

    pub fn i32(value: i32, span: Span) -> Self {
        Self::Const(Const::I32(value), Type::prim(predef::INT32), span)
    }

    pub fn null(ty: Type<'ctx>, span: Span) -> Self {
        Self::Const(Const::Null, ty, span)
    }

    pub fn local(id: LocalId, ty: Type<'ctx>, span: Span) -> Self {
        Self::Local(id, ty, span)
    }

    pub fn assign(place: Expr<'ctx>, value: Expr<'ctx>, span: Span) -> Self {
        let ty = place.ty().clone();
        Self::Assign {
            place: place.into(),
            value: value.into(),
            ty,
            span,
        }
    }

    pub fn binary(op: BinOp, lhs: Expr<'ctx>, rhs: Expr<'ctx>, span: Span) -> Self {
        Self::Binary {
            op,
            lhs: lhs.into(),
            rhs: rhs.into(),
            ty: Type::prim(predef::BOOL),
            span,
        }
    }

    pub fn not(operand: Expr<'ctx>, span: Span) -> Self {
        Self::Unary {
            op: UnOp::Not,
            operand: operand.into(),
            ty: Type::prim(predef::BOOL),
            span,
        }
    }

    /// Wraps `value` with side effects and scratch locals, collapsing the
    /// wrapper when there is nothing to sequence.
    pub fn seq(
        locals: impl Into<Box<[LocalId]>>,
        effects: impl Into<Box<[Expr<'ctx>]>>,
        value: Expr<'ctx>,
        span: Span,
    ) -> Self {
        let locals = locals.into();
        let effects = effects.into();
        if locals.is_empty() && effects.is_empty() {
            return value;
        }
        Self::Sequence {
            locals,
            effects,
            value: value.into(),
            span,
        }
    }

    pub fn is_null_const(&self) -> bool {
        matches!(self, Self::Const(Const::Null, _, _))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Const<'ctx> {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F64(f64),
    Str(Cow<'ctx, str>),
    Null,
    Unit,
    /// Only ever appears in *bound* trees; the constant rule lowers it into
    /// a helper constructor call.
    Decimal { mantissa: i128, scale: u8 },
}

impl<'ctx> Const<'ctx> {
    pub fn type_id(&self) -> TypeId<'ctx> {
        match self {
            Self::Bool(_) => predef::BOOL,
            Self::I32(_) => predef::INT32,
            Self::I64(_) => predef::INT64,
            Self::U32(_) => predef::UINT32,
            Self::U64(_) => predef::UINT64,
            Self::F64(_) => predef::FLOAT64,
            Self::Str(_) => predef::STRING,
            Self::Null => predef::OBJECT,
            Self::Unit => predef::VOID,
            Self::Decimal { .. } => predef::DECIMAL,
        }
    }
}

impl fmt::Display for Const<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}i64"),
            Self::U32(v) => write!(f, "{v}u32"),
            Self::U64(v) => write!(f, "{v}u64"),
            Self::F64(v) => write!(f, "{v}f64"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Null => f.write_str("null"),
            Self::Unit => f.write_str("unit"),
            Self::Decimal { mantissa, scale } => write!(f, "{mantissa}e-{scale}m"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    /// Unsigned multiply with overflow trap, used for stackalloc sizing.
    MulChecked,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let str = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::MulChecked => "*ovf",
        };
        f.write_str(str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Not => "!",
            Self::Neg => "-",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    Identity,
    Numeric,
    Boxing,
    Unboxing,
    /// Runtime cast yielding null on failure.
    TryCast,
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Identity => "id",
            Self::Numeric => "num",
            Self::Boxing => "box",
            Self::Unboxing => "unbox",
            Self::TryCast => "try",
        })
    }
}

/// Renders a statement list in a stable textual form used by tests and
/// snapshot assertions.
pub fn display_stmts<'a, 'ctx>(stmts: &'a [Stmt<'ctx>]) -> impl fmt::Display + use<'a, 'ctx> {
    DisplayFn::new(move |f: &mut fmt::Formatter<'_>| {
        stmts.iter().try_for_each(|stmt| fmt_stmt(f, stmt, 0))
    })
}

fn fmt_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt<'_>, depth: usize) -> fmt::Result {
    let pad = indented(depth);
    match stmt {
        Stmt::Expr(expr) => writeln!(f, "{pad}{expr}"),
        Stmt::Block { locals, stmts, .. } => {
            if locals.is_empty() {
                writeln!(f, "{pad}{{")?;
            } else {
                writeln!(f, "{pad}{{ [{}]", sep_by(locals.iter(), ", "))?;
            }
            stmts
                .iter()
                .try_for_each(|stmt| fmt_stmt(f, stmt, depth + 1))?;
            writeln!(f, "{pad}}}")
        }
        Stmt::Label(label, _) => writeln!(f, "{pad}label {label}"),
        Stmt::Goto(label, _) => writeln!(f, "{pad}goto {label}"),
        Stmt::CondGoto {
            condition,
            target,
            jump_if,
            ..
        } => {
            if *jump_if {
                writeln!(f, "{pad}if {condition} goto {target}")
            } else {
                writeln!(f, "{pad}if not {condition} goto {target}")
            }
        }
        Stmt::SwitchTable {
            value,
            cases,
            fallback,
            ..
        } => {
            writeln!(f, "{pad}switch {value} [")?;
            for (const_, label) in cases {
                writeln!(f, "{pad}  {const_} => {label}")?;
            }
            writeln!(f, "{pad}] else {fallback}")
        }
        Stmt::Try {
            body,
            catches,
            finally,
            ..
        } => {
            writeln!(f, "{pad}try {{")?;
            body.iter()
                .try_for_each(|stmt| fmt_stmt(f, stmt, depth + 1))?;
            writeln!(f, "{pad}}}")?;
            for catch in catches {
                writeln!(f, "{pad}catch {} {{", catch.exception_type)?;
                catch
                    .body
                    .iter()
                    .try_for_each(|stmt| fmt_stmt(f, stmt, depth + 1))?;
                writeln!(f, "{pad}}}")?;
            }
            if let Some(finally) = finally {
                writeln!(f, "{pad}finally {{")?;
                finally
                    .iter()
                    .try_for_each(|stmt| fmt_stmt(f, stmt, depth + 1))?;
                writeln!(f, "{pad}}}")?;
            }
            Ok(())
        }
        Stmt::Return(None, _) => writeln!(f, "{pad}return"),
        Stmt::Return(Some(expr), _) => writeln!(f, "{pad}return {expr}"),
        Stmt::Throw(None, _) => writeln!(f, "{pad}rethrow"),
        Stmt::Throw(Some(expr), _) => writeln!(f, "{pad}throw {expr}"),
        Stmt::Yield(None, _) => writeln!(f, "{pad}yield break"),
        Stmt::Yield(Some(expr), _) => writeln!(f, "{pad}yield {expr}"),
        Stmt::SeqPoint(None, _) => writeln!(f, "{pad}seqpoint"),
        Stmt::SeqPoint(Some(stmt), _) => {
            writeln!(f, "{pad}seqpoint")?;
            fmt_stmt(f, stmt, depth)
        }
        Stmt::HiddenSeqPoint(_) => writeln!(f, "{pad}seqpoint hidden"),
        Stmt::Nop(_) => writeln!(f, "{pad}nop"),
        Stmt::Error(_) => writeln!(f, "{pad}<error>"),
    }
}

impl fmt::Display for Expr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(const_, _, _) => write!(f, "{const_}"),
            Self::Local(local, _, _) => write!(f, "{local}"),
            Self::Field {
                receiver, field, ..
            } => match receiver {
                Some(receiver) => write!(f, "{receiver}.{}", field.name),
                None => write!(f, "{field}"),
            },
            Self::Call {
                method,
                receiver,
                args,
                ..
            } => {
                if let Some(receiver) = receiver {
                    write!(f, "{receiver}.")?;
                }
                write!(f, "call {method}({})", sep_by(args.iter(), ", "))
            }
            Self::New { ctor, args, .. } => {
                write!(f, "new {}({})", ctor.id.parent, sep_by(args.iter(), ", "))
            }
            Self::FunctionRef { method, .. } => write!(f, "&{method}"),
            Self::Conditional {
                condition,
                then,
                else_,
                ..
            } => write!(f, "({condition} ? {then} : {else_})"),
            Self::Binary { op, lhs, rhs, .. } => write!(f, "({lhs} {op} {rhs})"),
            Self::Unary { op, operand, .. } => write!(f, "{op}{operand}"),
            Self::Assign { place, value, .. } => write!(f, "{place} = {value}"),
            Self::Sequence {
                locals,
                effects,
                value,
                ..
            } => {
                f.write_str("seq(")?;
                if !locals.is_empty() {
                    write!(f, "[{}] ", sep_by(locals.iter(), ", "))?;
                }
                for effect in effects {
                    write!(f, "{effect}; ")?;
                }
                write!(f, "{value})")
            }
            Self::Convert { operand, kind, ty, .. } => {
                write!(f, "conv.{kind}<{ty}>({operand})")
            }
            Self::TypeTest {
                operand, target, ..
            } => write!(f, "({operand} is {target})"),
            Self::StackAlloc { bytes, .. } => write!(f, "stackalloc({bytes})"),
            Self::Await { operand, .. } => write!(f, "await {operand}"),
            Self::Closure { .. } => f.write_str("closure"),
            Self::Error(_, _) => f.write_str("<error>"),
        }
    }
}
