use std::cell::RefCell;
use std::rc::Rc;

use elsa::FrozenIndexSet;
use elsa::FrozenMap;

use crate::capture::ContainerScope;
use crate::symbols::{FieldId, MethodId, Type, TypeId};
use crate::utils::Lazy;
use crate::IndexMap;

pub use crate::utils::CycleError;

const CONCRETE_CONTAINER: &str = "<ModuleCache>";

/// Computes the bucket hash used by synthesized string-switch dispatch.
/// The value is part of the output contract, so it must stay stable across
/// compilations.
#[inline]
pub fn string_hash(value: &str) -> u32 {
    crc32fast::hash(value.as_bytes())
}

#[derive(Debug, Clone)]
pub struct ModuleEnv<'ctx> {
    pub module: &'ctx str,
}

fn concrete_container<'ctx>(_env: &ModuleEnv<'ctx>) -> Rc<Container<'ctx>> {
    Rc::new(Container::new(TypeId::new(CONCRETE_CONTAINER)))
}

type ConcreteInit<'ctx> = fn(&ModuleEnv<'ctx>) -> Rc<Container<'ctx>>;

/// Owns every container type synthesized while lowering a module. Interns
/// the generated names so that the rest of the pass can keep passing
/// plain borrowed identifiers around.
///
/// Append-only: lowering different function bodies may request slots in
/// any order, but a (scope, key) pair always resolves to the same field.
pub struct CompilationCaches<'ctx> {
    env: ModuleEnv<'ctx>,
    names: FrozenIndexSet<String>,
    concrete: Lazy<Rc<Container<'ctx>>, ConcreteInit<'ctx>>,
    generic: FrozenMap<MethodId<'ctx>, Rc<Container<'ctx>>>,
}

impl<'ctx> CompilationCaches<'ctx> {
    pub fn new(module: &'ctx str) -> Self {
        Self {
            env: ModuleEnv { module },
            names: FrozenIndexSet::new(),
            concrete: Lazy::new(concrete_container),
            generic: FrozenMap::new(),
        }
    }

    /// Returns the cache field holding the delegate for `target`, creating
    /// the container and the slot on first request.
    pub fn delegate_field(
        &'ctx self,
        scope: ContainerScope,
        enclosing: MethodId<'ctx>,
        target: MethodId<'ctx>,
        delegate: &Type<'ctx>,
    ) -> Result<CachedSlot<'ctx>, CycleError> {
        let concrete;
        let container = match scope {
            ContainerScope::Concrete => {
                concrete = self.concrete.get(&self.env)?;
                &*concrete
            }
            ContainerScope::Generic => self.generic_container(enclosing),
        };
        Ok(container.delegate_slot(self, target, delegate))
    }

    fn generic_container(&'ctx self, method: MethodId<'ctx>) -> &'ctx Container<'ctx> {
        if let Some(container) = self.generic.get(&method) {
            return container;
        }
        let name = self.intern(format!("<Cache>{}@{}", method.name, self.env.module));
        self.generic
            .insert(method, Rc::new(Container::new(TypeId::new(name))))
    }

    fn intern(&'ctx self, name: String) -> &'ctx str {
        self.names.insert(name)
    }
}

impl std::fmt::Debug for CompilationCaches<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilationCaches")
            .field("module", &self.env.module)
            .finish_non_exhaustive()
    }
}

/// A synthesized static container type and its cache slots.
#[derive(Debug)]
pub struct Container<'ctx> {
    id: TypeId<'ctx>,
    slots: RefCell<IndexMap<SlotKey<'ctx>, CachedSlot<'ctx>>>,
}

impl<'ctx> Container<'ctx> {
    fn new(id: TypeId<'ctx>) -> Self {
        Self {
            id,
            slots: RefCell::default(),
        }
    }

    fn delegate_slot(
        &self,
        caches: &'ctx CompilationCaches<'ctx>,
        target: MethodId<'ctx>,
        delegate: &Type<'ctx>,
    ) -> CachedSlot<'ctx> {
        let key = SlotKey::Delegate {
            target,
            delegate: delegate.id(),
        };
        let mut slots = self.slots.borrow_mut();
        if let Some(slot) = slots.get(&key) {
            return slot.clone();
        }
        // slot names are ordinal, so creation order is the output order
        let name = caches.intern(format!("cache_{}", slots.len()));
        let slot = CachedSlot {
            field: FieldId::new(self.id, name),
            ty: delegate.clone(),
        };
        slots.insert(key, slot.clone());
        slot
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SlotKey<'ctx> {
    Delegate {
        target: MethodId<'ctx>,
        delegate: Option<TypeId<'ctx>>,
    },
}

#[derive(Debug, Clone)]
pub struct CachedSlot<'ctx> {
    pub field: FieldId<'ctx>,
    pub ty: Type<'ctx>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::TypeKind;

    fn delegate() -> Type<'static> {
        Type::nullary(TypeId::new("Action"), TypeKind::Delegate)
    }

    #[test]
    fn same_target_resolves_to_the_same_slot() {
        let caches = CompilationCaches::new("app");
        let enclosing = MethodId::new(TypeId::new("Widget"), "run");
        let target = MethodId::new(TypeId::new("Widget"), "callback");

        let first = caches
            .delegate_field(ContainerScope::Concrete, enclosing, target, &delegate())
            .unwrap();
        let second = caches
            .delegate_field(ContainerScope::Concrete, enclosing, target, &delegate())
            .unwrap();
        assert_eq!(first.field, second.field);
        assert_eq!(first.field.name, "cache_0");
    }

    #[test]
    fn slots_are_named_in_creation_order() {
        let caches = CompilationCaches::new("app");
        let enclosing = MethodId::new(TypeId::new("Widget"), "run");
        let a = MethodId::new(TypeId::new("Widget"), "a");
        let b = MethodId::new(TypeId::new("Widget"), "b");

        let first = caches
            .delegate_field(ContainerScope::Concrete, enclosing, a, &delegate())
            .unwrap();
        let second = caches
            .delegate_field(ContainerScope::Concrete, enclosing, b, &delegate())
            .unwrap();
        assert_eq!(first.field.name, "cache_0");
        assert_eq!(second.field.name, "cache_1");
    }

    #[test]
    fn generic_scope_gets_a_container_per_method() {
        let caches = CompilationCaches::new("app");
        let run = MethodId::new(TypeId::new("Widget"), "run");
        let tick = MethodId::new(TypeId::new("Widget"), "tick");
        let target = MethodId::new(TypeId::new("Widget"), "callback");

        let in_run = caches
            .delegate_field(ContainerScope::Generic, run, target, &delegate())
            .unwrap();
        let in_tick = caches
            .delegate_field(ContainerScope::Generic, tick, target, &delegate())
            .unwrap();
        assert_ne!(in_run.field.parent, in_tick.field.parent);

        let concrete = caches
            .delegate_field(ContainerScope::Concrete, run, target, &delegate())
            .unwrap();
        assert_eq!(concrete.field.parent.as_str(), "<ModuleCache>");
    }

    #[test]
    fn string_hash_is_stable() {
        assert_eq!(string_hash("while"), string_hash("while"));
        assert_ne!(string_hash("while"), string_hash("until"));
        // pinned: dispatch tables bake this value into the output
        assert_eq!(string_hash(""), 0);
    }
}
