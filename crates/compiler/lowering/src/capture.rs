use hashbrown::HashSet;

use crate::symbols::{MethodKind, MethodRef, Modified, NamedType, Type, TypeKind, TypeParam};

/// Where a synthesized member must be placed. Anything that mentions a
/// type parameter of an enclosing generic method cannot live in a
/// module-level concrete container, because that container is instantiated
/// once for the whole program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerScope {
    /// Module-level container shared by all instantiations.
    Concrete,
    /// Container parameterized over the enclosing generic context.
    Generic,
}

/// Decides the container scope for a cached delegate targeting `method`
/// with the constructed delegate type `delegate_ty`.
///
/// `params` holds the type parameters declared by the enclosing method
/// chain. Only those force the generic scope; a delegate that depends
/// solely on the containing type's parameters shares one container slot
/// per instantiation of that type and stays concrete.
///
/// A local function that can transitively reference type parameters of an
/// enclosing generic method forces the generic scope even when every
/// visible type is fully constructed, because its lowered form will be
/// re-instantiated per enclosing instantiation.
pub fn delegate_container_scope<'ctx>(
    method: &MethodRef<'ctx>,
    delegate_ty: &Type<'ctx>,
    params: &HashSet<TypeParam<'ctx>>,
) -> ContainerScope {
    let captures = matches!(
        method.kind,
        MethodKind::LocalFunction {
            captures_type_params: true
        }
    ) && !params.is_empty();
    if captures
        || method_captures_params(method, params)
        || type_captures_params(delegate_ty, params)
    {
        ContainerScope::Generic
    } else {
        ContainerScope::Concrete
    }
}

/// True if the type mentions any parameter in `params`, looking through
/// arrays, pointers, custom modifiers, type arguments, containing types
/// and anonymous member types.
pub fn type_captures_params<'ctx>(ty: &Type<'ctx>, params: &HashSet<TypeParam<'ctx>>) -> bool {
    match ty {
        Type::Param(param) => params.contains(param),
        Type::Array(inner) | Type::Pointer(inner) => modified_captures_params(inner, params),
        Type::Named(named) => named_captures_params(named, params),
        Type::Error => false,
    }
}

pub fn method_captures_params<'ctx>(
    method: &MethodRef<'ctx>,
    params: &HashSet<TypeParam<'ctx>>,
) -> bool {
    method
        .type_args
        .iter()
        .any(|arg| modified_captures_params(arg, params))
        || named_captures_params(&method.containing, params)
}

fn modified_captures_params<'ctx>(
    modified: &Modified<'ctx>,
    params: &HashSet<TypeParam<'ctx>>,
) -> bool {
    type_captures_params(&modified.ty, params)
        || modified
            .modifiers
            .iter()
            .any(|ty| type_captures_params(ty, params))
}

fn named_captures_params<'ctx>(
    named: &NamedType<'ctx>,
    params: &HashSet<TypeParam<'ctx>>,
) -> bool {
    if let TypeKind::Anonymous { member_types } = &named.kind
        && member_types
            .iter()
            .any(|ty| type_captures_params(ty, params))
    {
        return true;
    }
    named
        .args
        .iter()
        .any(|arg| modified_captures_params(arg, params))
        || named
            .containing
            .as_ref()
            .is_some_and(|containing| named_captures_params(containing, params))
}
