use std::collections::HashSet;

use swc_core::{
    common::{SourceMapper, Span},
    ecma::{
        ast::*,
        visit::{Visit, VisitWith},
    },
};

use crate::{
    config::InstrumentConfig,
    error::Error,
    exclusion::ExclusionFilter,
    names::{fragment, source_text, Blake3Hasher, NameResolver, TextHasher},
    synth::{is_valid_identifier, CodeSynthesizer, IdentGen},
    tracker::{IdentityTracker, NodeId},
};

// -----------------------------------------------------------------------------
// Per-traversal state
// -----------------------------------------------------------------------------

/// Mutable state threaded through one traversal (or shared across several
/// traversals of the same unit, to make re-runs idempotent for calls).
#[derive(Debug, Default)]
pub struct InstrumentContext {
    pub tracker: IdentityTracker,
    pub idents: IdentGen,
}

impl InstrumentContext {
    /// Context whose identifier generator avoids every name already in `program`.
    pub fn for_program(program: &Program) -> Self {
        let mut collector = IdentCollector::default();
        program.visit_with(&mut collector);
        Self {
            tracker: IdentityTracker::default(),
            idents: IdentGen::new(collector.names),
        }
    }
}

#[derive(Default)]
struct IdentCollector {
    names: HashSet<String>,
}

impl Visit for IdentCollector {
    fn visit_ident(&mut self, i: &Ident) {
        self.names.insert(i.sym.to_string());
    }
}

/// `await` / `yield` reachable from a call without crossing a function boundary.
#[derive(Default)]
struct SuspensionFinder {
    has_await: bool,
    has_yield: bool,
}

impl Visit for SuspensionFinder {
    fn visit_await_expr(&mut self, n: &AwaitExpr) {
        self.has_await = true;
        n.visit_children_with(self);
    }
    fn visit_yield_expr(&mut self, n: &YieldExpr) {
        self.has_yield = true;
        n.visit_children_with(self);
    }
    fn visit_for_of_stmt(&mut self, n: &ForOfStmt) {
        if n.is_await {
            self.has_await = true;
        }
        n.visit_children_with(self);
    }
    // Nested functions are their own suspension context.
    fn visit_function(&mut self, _: &Function) {}
    fn visit_arrow_expr(&mut self, _: &ArrowExpr) {}
    fn visit_getter_prop(&mut self, _: &GetterProp) {}
    fn visit_setter_prop(&mut self, _: &SetterProp) {}
    fn visit_class(&mut self, _: &Class) {}
}

// -----------------------------------------------------------------------------
// Engine
// -----------------------------------------------------------------------------

/// Which loop form a statement is; `while`/`do..while` have no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Counted,
    ForEach,
    Enumerating,
}

impl LoopKind {
    pub fn of(stmt: &Stmt) -> Option<Self> {
        match stmt {
            Stmt::For(_) => Some(Self::Counted),
            Stmt::ForOf(_) => Some(Self::ForEach),
            Stmt::ForIn(_) => Some(Self::Enumerating),
            _ => None,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Counted => "for",
            Self::ForEach => "forOf",
            Self::Enumerating => "forIn",
        }
    }
}

pub struct CallProbe<'a> {
    config: InstrumentConfig,
    exclusions: ExclusionFilter,
    hasher: Box<dyn TextHasher>,
    source_map: Option<&'a dyn SourceMapper>,
}

impl<'a> CallProbe<'a> {
    pub fn new(config: InstrumentConfig, source_map: Option<&'a dyn SourceMapper>) -> Self {
        let hasher = Box::new(Blake3Hasher::new(config.hash_length));
        Self::with_hasher(config, source_map, hasher)
    }

    pub fn with_hasher(
        config: InstrumentConfig,
        source_map: Option<&'a dyn SourceMapper>,
        hasher: Box<dyn TextHasher>,
    ) -> Self {
        let exclusions = ExclusionFilter::from_config(&config);
        Self {
            config,
            exclusions,
            hasher,
            source_map,
        }
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub fn exclusions_mut(&mut self) -> &mut ExclusionFilter {
        &mut self.exclusions
    }

    pub fn resolver(&self) -> NameResolver<'_> {
        NameResolver::new(&*self.hasher, self.source_map)
    }

    pub(crate) fn synthesizer(&self) -> CodeSynthesizer<'_> {
        CodeSynthesizer::new(&self.config.runtime_ident)
    }

    /// Rewrite one call expression. `Ok(None)` leaves the node as it is.
    pub fn instrument_call(
        &self,
        call: &CallExpr,
        cx: &mut InstrumentContext,
    ) -> Result<Option<Expr>, Error> {
        self.instrument_expr(&Expr::Call(call.clone()), cx)
    }

    /// Rewrite a call site: a plain call or an optional call chain. The whole
    /// chain is wrapped so its short-circuit stays inside the evaluation.
    pub fn instrument_expr(
        &self,
        expr: &Expr,
        cx: &mut InstrumentContext,
    ) -> Result<Option<Expr>, Error> {
        let Some((name, span)) = self.resolve_site(expr) else {
            return Ok(None);
        };
        if !self.exclusions.should_instrument(&name) {
            tracing::debug!(%name, "excluded call");
            return Ok(None);
        }
        let node = NodeId::of(span);
        if cx.tracker.already_instrumented(&name, node) {
            tracing::debug!(%name, "call already instrumented");
            return Ok(None);
        }

        let mut finder = SuspensionFinder::default();
        expr.visit_with(&mut finder);
        if finder.has_yield {
            tracing::debug!(%name, "call contains yield, left as is");
            return Ok(None);
        }

        let names = cx.idents.site_names(&fragment(&name))?;
        cx.tracker.mark_instrumented(&name, node);
        tracing::debug!(%name, result = %names.result, "wrapping call");
        Ok(Some(self.synthesizer().wrap_call(
            expr.clone(),
            &name,
            &names,
            finder.has_await,
        )))
    }

    /// Record the call a wrapper from an earlier pass already evaluates, so
    /// it is not wrapped a second time.
    pub fn adopt_wrapper(&self, wrapper: &CallExpr, cx: &mut InstrumentContext) {
        let Some(original) = self.synthesizer().wrapped_original(wrapper) else {
            return;
        };
        if let Some((name, span)) = self.resolve_site(original) {
            cx.tracker.mark_instrumented(&name, NodeId::of(span));
        }
    }

    fn resolve_site(&self, expr: &Expr) -> Option<(String, Span)> {
        match expr {
            Expr::Call(call) => Some((self.resolver().resolve(call)?, call.span)),
            Expr::OptChain(chain) => Some((self.resolver().resolve_optional(chain)?, chain.span)),
            _ => None,
        }
    }

    /// The runtime ident must be a valid identifier, and nothing in the unit
    /// may bind it except an init sequence from an earlier pass.
    pub fn check_runtime_ident(&self, program: &Program) -> Result<(), Error> {
        let runtime = &self.config.runtime_ident;
        if !is_valid_identifier(runtime) {
            return Err(Error::InvalidIdentifier(runtime.clone()));
        }
        let mut finder = RuntimeBindingFinder {
            synth: self.synthesizer(),
            runtime,
            found: false,
        };
        program.visit_with(&mut finder);
        if finder.found {
            return Err(Error::IdentifierCollision(runtime.clone()));
        }
        Ok(())
    }

    /// `<kind>_<hash of the loop's text>`
    pub fn loop_id(&self, kind: LoopKind, stmt: &Stmt) -> String {
        let text = source_text(self.source_map, stmt);
        format!("{}_{}", kind.prefix(), self.hasher.short_hash(&text))
    }

    /// Rebuild a `for`, `for..of` or `for..in` with its body wrapped in
    /// iteration bookkeeping. Other statements pass through.
    pub fn instrument_loop(&self, stmt: &Stmt) -> Option<Stmt> {
        let kind = LoopKind::of(stmt)?;
        let id = self.loop_id(kind, stmt);
        let synth = self.synthesizer();
        tracing::debug!(loop_id = %id, "wrapping loop body");
        let rebuilt = match stmt {
            Stmt::For(n) => Stmt::For(ForStmt {
                body: Box::new(synth.wrap_loop_body((*n.body).clone(), &id)),
                ..n.clone()
            }),
            Stmt::ForOf(n) => Stmt::ForOf(ForOfStmt {
                body: Box::new(synth.wrap_loop_body((*n.body).clone(), &id)),
                ..n.clone()
            }),
            Stmt::ForIn(n) => Stmt::ForIn(ForInStmt {
                body: Box::new(synth.wrap_loop_body((*n.body).clone(), &id)),
                ..n.clone()
            }),
            _ => return None,
        };
        Some(rebuilt)
    }

    /// Prepend the init sequence to a module, after any directive prologue.
    pub fn initialize_module(&self, m: &mut Module) {
        if m
            .body
            .iter()
            .any(|item| matches!(item, ModuleItem::Stmt(s) if self.declares_runtime(s)))
        {
            return;
        }
        let synth = self.synthesizer();
        let mut items = vec![];
        if let Some(module) = &self.config.runtime_module {
            items.push(synth.runtime_import(module));
        }
        items.push(ModuleItem::Stmt(synth.init_stmt()));
        let at = m
            .body
            .iter()
            .take_while(|item| matches!(item, ModuleItem::Stmt(s) if is_directive(s)))
            .count();
        m.body.splice(at..at, items);
    }

    /// Prepend the init sequence to a script, after any directive prologue.
    pub fn initialize_script(&self, s: &mut Script) {
        if s.body.iter().any(|stmt| self.declares_runtime(stmt)) {
            return;
        }
        let at = s.body.iter().take_while(|stmt| is_directive(stmt)).count();
        s.body.insert(at, self.synthesizer().init_stmt());
    }
}

impl CallProbe<'_> {
    /// Top-level init sequence left by an earlier pass.
    fn declares_runtime(&self, stmt: &Stmt) -> bool {
        let Stmt::Decl(Decl::Var(var)) = stmt else {
            return false;
        };
        let synth = self.synthesizer();
        var.decls.iter().any(|d| synth.is_init_declarator(d))
    }
}

/// Any binding of the runtime ident other than a prior init declarator.
struct RuntimeBindingFinder<'s> {
    synth: CodeSynthesizer<'s>,
    runtime: &'s str,
    found: bool,
}

impl RuntimeBindingFinder<'_> {
    fn check(&mut self, id: &Ident) {
        if id.sym.as_ref() == self.runtime {
            self.found = true;
        }
    }
}

impl Visit for RuntimeBindingFinder<'_> {
    fn visit_var_declarator(&mut self, d: &VarDeclarator) {
        if self.synth.is_init_declarator(d) {
            return;
        }
        d.visit_children_with(self);
    }
    fn visit_binding_ident(&mut self, b: &BindingIdent) {
        self.check(&b.id);
    }
    fn visit_fn_decl(&mut self, n: &FnDecl) {
        self.check(&n.ident);
        n.visit_children_with(self);
    }
    fn visit_fn_expr(&mut self, n: &FnExpr) {
        if let Some(id) = &n.ident {
            self.check(id);
        }
        n.visit_children_with(self);
    }
    fn visit_class_decl(&mut self, n: &ClassDecl) {
        self.check(&n.ident);
        n.visit_children_with(self);
    }
    fn visit_class_expr(&mut self, n: &ClassExpr) {
        if let Some(id) = &n.ident {
            self.check(id);
        }
        n.visit_children_with(self);
    }
    fn visit_import_named_specifier(&mut self, n: &ImportNamedSpecifier) {
        self.check(&n.local);
    }
    fn visit_import_default_specifier(&mut self, n: &ImportDefaultSpecifier) {
        self.check(&n.local);
    }
    fn visit_import_star_as_specifier(&mut self, n: &ImportStarAsSpecifier) {
        self.check(&n.local);
    }
}

fn is_directive(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Expr(ExprStmt { expr, .. }) if matches!(&**expr, Expr::Lit(Lit::Str(_))))
}
