use std::cell::Cell;

use bon::bon;
use hashbrown::HashSet;
use veld_ast::Span;

use crate::bound::{BoundStmt, PlaceholderId};
use crate::container::CompilationCaches;
use crate::diagnostic::{Error, LowerResult, Reporter};
use crate::instrument::Instrument;
use crate::ir;
use crate::symbols::{
    LabelId, LocalId, LocalInfo, MemberResolver, MethodId, MethodRef, MethodSymbol, TempKind, Type,
    TypeParam, WellKnown,
};
use crate::utils::ScopedMap;
use crate::visitor::LabelValidator;

mod expr;
mod pattern;
mod stmt;

/// Substitution of binder placeholders with the capture temporaries they
/// stand for. Scopes nest with the rewrites that introduce them.
pub(crate) type PlaceholderEnv<'a, 'ctx> = ScopedMap<'a, PlaceholderId, (LocalId, Type<'ctx>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationLevel {
    Debug,
    Release,
}

#[derive(Debug, Clone)]
pub struct LowerOptions {
    pub optimize: OptimizationLevel,
    /// Cache receiverless delegate creations in synthesized containers.
    /// Only takes effect on release builds.
    pub cache_delegates: bool,
    pub max_depth: u32,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            optimize: OptimizationLevel::Debug,
            cache_delegates: false,
            max_depth: 512,
        }
    }
}

/// The lowered form of one function body, ready for the code generator.
#[derive(Debug)]
pub struct LoweredBody<'ctx> {
    pub stmts: Vec<ir::Stmt<'ctx>>,
    /// Every local this body uses, user-defined and synthesized alike.
    pub locals: Vec<LocalInfo<'ctx>>,
    /// Set when the body contains closures that still need conversion.
    pub saw_closures: bool,
    /// Set when an await appears inside a catch or finally region, which
    /// the state-machine pass has to treat specially.
    pub saw_await_in_handler: bool,
}

/// Lowers one bound function body to primitive statements. Holds the
/// per-body allocation state; module-wide state lives in
/// [`CompilationCaches`].
pub struct Lowerer<'scope, 'ctx> {
    resolver: &'scope dyn MemberResolver<'ctx>,
    caches: &'ctx CompilationCaches<'ctx>,
    reporter: &'scope mut Reporter<Error<'ctx>>,
    instrument: &'scope mut dyn Instrument<'ctx>,
    options: LowerOptions,
    method: MethodSymbol<'ctx>,
    local_counter: &'scope Cell<u32>,
    label_counter: &'scope Cell<u32>,
    locals: Vec<LocalInfo<'ctx>>,
    depth: u32,
    in_handler: bool,
    saw_closures: bool,
    saw_await_in_handler: bool,
}

#[bon]
impl<'scope, 'ctx> Lowerer<'scope, 'ctx> {
    /// Lowers `body`. The label and local counters are shared with the
    /// binder and must already be past every id the bound tree mentions.
    #[builder(finish_fn = build)]
    pub fn function(
        body: &BoundStmt<'ctx>,
        method: MethodSymbol<'ctx>,
        resolver: &'scope dyn MemberResolver<'ctx>,
        caches: &'ctx CompilationCaches<'ctx>,
        reporter: &'scope mut Reporter<Error<'ctx>>,
        instrument: &'scope mut dyn Instrument<'ctx>,
        local_counter: &'scope Cell<u32>,
        label_counter: &'scope Cell<u32>,
        #[builder(default)] options: LowerOptions,
    ) -> LoweredBody<'ctx> {
        log::debug!("lowering {}", method.id);

        let mut lower = Lowerer {
            resolver,
            caches,
            reporter,
            instrument,
            options,
            method,
            local_counter,
            label_counter,
            locals: Vec::new(),
            depth: 0,
            in_handler: false,
            saw_closures: false,
            saw_await_in_handler: false,
        };

        let mut stmts = Vec::new();
        if let Err(err) = lower.lower_stmt(body, &mut stmts) {
            let span = err.span();
            lower.reporter.report(err);
            stmts = vec![ir::Stmt::Error(span)];
        }

        if let Err(problem) = LabelValidator::check(&stmts) {
            log::error!("bad label discipline in {}: {problem}", lower.method.id);
            debug_assert!(false, "bad label discipline: {problem}");
        }

        LoweredBody {
            stmts,
            locals: lower.locals,
            saw_closures: lower.saw_closures,
            saw_await_in_handler: lower.saw_await_in_handler,
        }
    }
}

impl<'scope, 'ctx> Lowerer<'scope, 'ctx> {
    /// Runs `f` one recursion level deeper, failing once the configured
    /// depth limit is reached. Deeply nested inputs are rejected instead
    /// of overflowing the stack.
    fn guarded<R>(
        &mut self,
        span: Span,
        f: impl FnOnce(&mut Self) -> LowerResult<'ctx, R>,
    ) -> LowerResult<'ctx, R> {
        if self.depth >= self.options.max_depth {
            return Err(Error::RecursionLimit(span));
        }
        self.depth += 1;
        let res = f(self);
        self.depth -= 1;
        res
    }

    fn new_label(&mut self) -> LabelId {
        let label = LabelId(self.label_counter.get());
        self.label_counter.set(label.0 + 1);
        log::trace!("allocated {label}");
        label
    }

    fn new_temp(&mut self, ty: Type<'ctx>, kind: TempKind, span: Span) -> LocalId {
        let id = LocalId(self.local_counter.get());
        self.local_counter.set(id.0 + 1);
        log::trace!("allocated {id} ({kind:?})");
        self.locals.push(LocalInfo::new(id, None, ty, kind, Some(span)));
        id
    }

    /// Records binder-declared locals and returns their ids for the
    /// enclosing block.
    fn register_locals(&mut self, locals: &[LocalInfo<'ctx>]) -> Box<[LocalId]> {
        self.locals.extend(locals.iter().cloned());
        locals.iter().map(|local| local.id).collect()
    }

    fn register_local(&mut self, local: &LocalInfo<'ctx>) -> LocalId {
        self.locals.push(local.clone());
        local.id
    }

    fn well_known(&self, member: WellKnown, span: Span) -> LowerResult<'ctx, MethodRef<'ctx>> {
        self.resolver
            .resolve(member)
            .ok_or(Error::MissingWellKnown(member, span))
    }

    fn cache_delegates(&self) -> bool {
        self.options.cache_delegates && self.options.optimize == OptimizationLevel::Release
    }

    /// Type parameters of this method and of every method lexically
    /// enclosing it; only these make a synthesized member generic.
    fn visible_type_params(&self) -> HashSet<TypeParam<'ctx>> {
        self.method
            .type_params
            .iter()
            .chain(
                self.method
                    .enclosing
                    .iter()
                    .flat_map(|frame| frame.type_params.iter()),
            )
            .copied()
            .collect()
    }

    /// The nearest method in the lexical nesting with its own type
    /// parameters. Generic containers hang off that method, so a local
    /// function nested in a generic method shares its container.
    fn generic_owner(&self) -> MethodId<'ctx> {
        if !self.method.type_params.is_empty() {
            return self.method.id;
        }
        self.method
            .enclosing
            .iter()
            .find(|frame| !frame.type_params.is_empty())
            .map_or(self.method.id, |frame| frame.id)
    }

    /// Ensures `expr` is available as a local, reusing it when it already
    /// is one. The returned effect, if any, must be emitted before any use
    /// of the local.
    fn spill(
        &mut self,
        expr: ir::Expr<'ctx>,
        kind: TempKind,
    ) -> (LocalId, Type<'ctx>, Option<ir::Expr<'ctx>>) {
        if let ir::Expr::Local(id, ty, _) = expr {
            return (id, ty, None);
        }
        let ty = expr.ty().clone();
        let span = expr.span();
        let temp = self.new_temp(ty.clone(), kind, span);
        let effect = ir::Expr::assign(ir::Expr::local(temp, ty.clone(), span), expr, span);
        (temp, ty, Some(effect))
    }
}
