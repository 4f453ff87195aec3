use std::fmt;
use std::rc::Rc;

use veld_ast::Span;

use crate::utils::fmt::sep_by;

/// An interned type name, resolved upstream. Lowering never creates new
/// user-visible type ids, only refers to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId<'ctx>(&'ctx str);

impl<'ctx> TypeId<'ctx> {
    #[inline]
    pub const fn new(name: &'ctx str) -> Self {
        Self(name)
    }

    #[inline]
    pub fn as_str(&self) -> &'ctx str {
        self.0
    }
}

impl fmt::Display for TypeId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

pub mod predef {
    use super::TypeId;

    pub const VOID: TypeId<'static> = TypeId::new("Void");
    pub const BOOL: TypeId<'static> = TypeId::new("Bool");
    pub const INT32: TypeId<'static> = TypeId::new("Int32");
    pub const INT64: TypeId<'static> = TypeId::new("Int64");
    pub const UINT32: TypeId<'static> = TypeId::new("UInt32");
    pub const UINT64: TypeId<'static> = TypeId::new("UInt64");
    pub const FLOAT64: TypeId<'static> = TypeId::new("Float64");
    pub const STRING: TypeId<'static> = TypeId::new("String");
    pub const OBJECT: TypeId<'static> = TypeId::new("Object");
    pub const DECIMAL: TypeId<'static> = TypeId::new("Decimal");
    pub const NULLABLE: TypeId<'static> = TypeId::new("Nullable");
    pub const RANGE: TypeId<'static> = TypeId::new("Range");
    pub const SPAN: TypeId<'static> = TypeId::new("Span");
    pub const LIST: TypeId<'static> = TypeId::new("List");
}

/// A generic type parameter, identified by its declaring symbol and ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeParam<'ctx> {
    pub owner: &'ctx str,
    pub index: u16,
    pub name: &'ctx str,
}

impl<'ctx> TypeParam<'ctx> {
    pub fn new(owner: &'ctx str, index: u16, name: &'ctx str) -> Self {
        Self { owner, index, name }
    }
}

impl fmt::Display for TypeParam<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// The type shape universe visible to this pass. Types arrive fully
/// constructed from the binder; lowering only inspects them.
#[derive(Debug, Clone)]
pub enum Type<'ctx> {
    Param(TypeParam<'ctx>),
    Array(Rc<Modified<'ctx>>),
    Pointer(Rc<Modified<'ctx>>),
    Named(Rc<NamedType<'ctx>>),
    Error,
}

impl<'ctx> Type<'ctx> {
    pub fn nullary(id: TypeId<'ctx>, kind: TypeKind<'ctx>) -> Self {
        Self::Named(Rc::new(NamedType {
            id,
            kind,
            args: [].into(),
            containing: None,
        }))
    }

    pub fn app(
        id: TypeId<'ctx>,
        kind: TypeKind<'ctx>,
        args: impl IntoIterator<Item = Modified<'ctx>>,
    ) -> Self {
        Self::Named(Rc::new(NamedType {
            id,
            kind,
            args: args.into_iter().collect(),
            containing: None,
        }))
    }

    pub fn prim(id: TypeId<'ctx>) -> Self {
        Self::nullary(id, TypeKind::Primitive)
    }

    pub fn array(element: Type<'ctx>) -> Self {
        Self::Array(Rc::new(Modified::bare(element)))
    }

    pub fn id(&self) -> Option<TypeId<'ctx>> {
        match self {
            Self::Named(named) => Some(named.id),
            _ => None,
        }
    }

    pub fn as_named(&self) -> Option<&Rc<NamedType<'ctx>>> {
        match self {
            Self::Named(named) => Some(named),
            _ => None,
        }
    }

    /// The payload type of a nullable value wrapper, if this is one.
    pub fn as_nullable(&self) -> Option<&Type<'ctx>> {
        match self {
            Self::Named(named) if matches!(named.kind, TypeKind::Nullable) => {
                named.args.first().map(|arg| &arg.ty)
            }
            _ => None,
        }
    }

    pub fn is_reference_type(&self) -> bool {
        match self {
            Self::Named(named) => match named.kind {
                TypeKind::Class
                | TypeKind::Interface
                | TypeKind::Delegate
                | TypeKind::Anonymous { .. } => true,
                TypeKind::Primitive => named.id == predef::STRING || named.id == predef::OBJECT,
                TypeKind::Struct
                | TypeKind::Enum
                | TypeKind::Tuple
                | TypeKind::Nullable
                | TypeKind::ScopedLock => false,
            },
            Self::Array(_) => true,
            Self::Param(_) | Self::Pointer(_) | Self::Error => false,
        }
    }
}

impl fmt::Display for Type<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Param(param) => write!(f, "{param}"),
            Self::Array(element) => write!(f, "[{}]", element.ty),
            Self::Pointer(pointee) => write!(f, "*{}", pointee.ty),
            Self::Named(named) => write!(f, "{named}"),
            Self::Error => f.write_str("{error}"),
        }
    }
}

/// A type together with its custom modifiers, which capture checking must
/// look through.
#[derive(Debug, Clone)]
pub struct Modified<'ctx> {
    pub ty: Type<'ctx>,
    pub modifiers: Box<[Type<'ctx>]>,
}

impl<'ctx> Modified<'ctx> {
    pub fn bare(ty: Type<'ctx>) -> Self {
        Self {
            ty,
            modifiers: [].into(),
        }
    }

    pub fn new(ty: Type<'ctx>, modifiers: impl IntoIterator<Item = Type<'ctx>>) -> Self {
        Self {
            ty,
            modifiers: modifiers.into_iter().collect(),
        }
    }
}

#[derive(Debug)]
pub struct NamedType<'ctx> {
    pub id: TypeId<'ctx>,
    pub kind: TypeKind<'ctx>,
    pub args: Box<[Modified<'ctx>]>,
    pub containing: Option<Rc<NamedType<'ctx>>>,
}

impl fmt::Display for NamedType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(containing) = &self.containing {
            write!(f, "{containing}.")?;
        }
        write!(f, "{}", self.id)?;
        if !self.args.is_empty() {
            write!(f, "<{}>", sep_by(self.args.iter().map(|arg| &arg.ty), ", "))?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum TypeKind<'ctx> {
    Class,
    Struct,
    Interface,
    Delegate,
    Enum,
    Tuple,
    Anonymous { member_types: Box<[Type<'ctx>]> },
    Nullable,
    /// Exposes the scope-enter/scope-dispose locking protocol.
    ScopedLock,
    Primitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId<'ctx> {
    pub parent: TypeId<'ctx>,
    pub name: &'ctx str,
}

impl<'ctx> MethodId<'ctx> {
    pub fn new(parent: TypeId<'ctx>, name: &'ctx str) -> Self {
        Self { parent, name }
    }
}

impl fmt::Display for MethodId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.parent, self.name)
    }
}

/// A fully constructed method reference: the resolved method plus the type
/// arguments it is instantiated with and the constructed type containing it.
#[derive(Debug, Clone)]
pub struct MethodRef<'ctx> {
    pub id: MethodId<'ctx>,
    pub kind: MethodKind,
    pub type_args: Rc<[Modified<'ctx>]>,
    pub containing: Rc<NamedType<'ctx>>,
}

impl<'ctx> MethodRef<'ctx> {
    pub fn new(id: MethodId<'ctx>, kind: MethodKind, containing: Rc<NamedType<'ctx>>) -> Self {
        Self {
            id,
            kind,
            type_args: [].into(),
            containing,
        }
    }

    pub fn with_type_args(
        mut self,
        type_args: impl IntoIterator<Item = Modified<'ctx>>,
    ) -> Self {
        self.type_args = type_args.into_iter().collect();
        self
    }
}

impl fmt::Display for MethodRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if !self.type_args.is_empty() {
            write!(
                f,
                "<{}>",
                sep_by(self.type_args.iter().map(|arg| &arg.ty), ", ")
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Ordinary,
    Constructor,
    PropertyGetter,
    /// A nested local function; `captures_type_params` is true when it can
    /// transitively reference type parameters of an enclosing method.
    LocalFunction { captures_type_params: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId<'ctx> {
    pub parent: TypeId<'ctx>,
    pub name: &'ctx str,
}

impl<'ctx> FieldId<'ctx> {
    pub fn new(parent: TypeId<'ctx>, name: &'ctx str) -> Self {
        Self { parent, name }
    }
}

impl fmt::Display for FieldId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.parent, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalId(pub u32);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// The kind tag of a synthesized or user local, used for debug info and
/// for the temp pool bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempKind {
    UserDefined,
    Ordinary,
    Spill,
    Lock,
    LockTaken,
    Using,
    Pattern,
    Deconstruction,
    StackAlloc,
}

#[derive(Debug, Clone)]
pub struct LocalInfo<'ctx> {
    pub id: LocalId,
    pub name: Option<&'ctx str>,
    pub ty: Type<'ctx>,
    pub kind: TempKind,
    pub span: Option<Span>,
}

impl<'ctx> LocalInfo<'ctx> {
    #[inline]
    pub fn new(
        id: LocalId,
        name: Option<&'ctx str>,
        ty: Type<'ctx>,
        kind: TempKind,
        span: Option<Span>,
    ) -> Self {
        Self {
            id,
            name,
            ty,
            kind,
            span,
        }
    }
}

/// The method whose body is being lowered. `enclosing` lists the lexical
/// method nesting for local functions, innermost first.
#[derive(Debug, Clone)]
pub struct MethodSymbol<'ctx> {
    pub id: MethodId<'ctx>,
    pub containing: Rc<NamedType<'ctx>>,
    pub type_params: Box<[TypeParam<'ctx>]>,
    pub enclosing: Box<[EnclosingMethod<'ctx>]>,
    pub kind: MethodKind,
}

/// One frame of the lexical method nesting around a local function.
#[derive(Debug, Clone)]
pub struct EnclosingMethod<'ctx> {
    pub id: MethodId<'ctx>,
    pub type_params: Box<[TypeParam<'ctx>]>,
}

/// Well-known runtime members this pass may need to call into. Resolution
/// happens through an upstream lookup service; a missing member degrades
/// the lowering locally rather than aborting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum WellKnown {
    MonitorEnter,
    MonitorExit,
    ScopeEnter,
    ScopeDispose,
    Dispose,
    NullableHasValue,
    NullableGetValueOrDefault,
    DecimalCtor,
    TupleCtor,
    DelegateCtor,
    RangeCtor,
    RangeStartAt,
    RangeEndAt,
    RangeAll,
    ListCtor,
    ListAdd,
    ObjectClone,
    StringEquals,
    StringHash,
}

pub trait MemberResolver<'ctx> {
    fn resolve(&self, member: WellKnown) -> Option<MethodRef<'ctx>>;
}
