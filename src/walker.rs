use swc_core::ecma::{
    ast::*,
    visit::{VisitMut, VisitMutWith},
};

use crate::{
    error::Error,
    instrument::{CallProbe, InstrumentContext},
};

/// Top-down traversal that splices instrumenter output back into the tree and
/// keeps descending into the replacement.
pub struct TreeWalker<'e, 'a, 'c> {
    engine: &'e CallProbe<'a>,
    cx: &'c mut InstrumentContext,
    error: Option<Error>,
}

impl<'e, 'a, 'c> TreeWalker<'e, 'a, 'c> {
    pub fn new(engine: &'e CallProbe<'a>, cx: &'c mut InstrumentContext) -> Self {
        Self {
            engine,
            cx,
            error: None,
        }
    }

    pub fn finish(self) -> Result<(), Error> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn failed(&self) -> bool {
        self.error.is_some()
    }

    fn visit_mut_chain_link(&mut self, e: &mut Expr) {
        match e {
            Expr::OptChain(link) => link.base.visit_mut_with(self),
            other => other.visit_mut_with(self),
        }
    }

    fn is_call_site(e: &Expr) -> bool {
        match e {
            Expr::Call(_) => true,
            Expr::OptChain(chain) => matches!(&*chain.base, OptChainBase::Call(_)),
            _ => false,
        }
    }
}

impl VisitMut for TreeWalker<'_, '_, '_> {
    fn visit_mut_module(&mut self, m: &mut Module) {
        m.visit_mut_children_with(self);
        if !self.failed() && self.engine.config().inject_runtime {
            self.engine.initialize_module(m);
        }
    }

    fn visit_mut_script(&mut self, s: &mut Script) {
        s.visit_mut_children_with(self);
        if !self.failed() && self.engine.config().inject_runtime {
            self.engine.initialize_script(s);
        }
    }

    fn visit_mut_expr(&mut self, e: &mut Expr) {
        if self.failed() {
            return;
        }
        if self.engine.config().instrument_calls && Self::is_call_site(e) {
            // Wrappers from an earlier pass: only their contents are of interest,
            // and the call they evaluate counts as handled.
            let earlier = match &*e {
                Expr::Call(call) if self.engine.synthesizer().is_wrapper(call) => {
                    self.engine.adopt_wrapper(call, self.cx);
                    true
                }
                _ => false,
            };
            if !earlier {
                match self.engine.instrument_expr(e, self.cx) {
                    Ok(Some(replacement)) => *e = replacement,
                    Ok(None) => {}
                    Err(err) => {
                        self.error = Some(err);
                        return;
                    }
                }
            }
        }
        e.visit_mut_children_with(self);
    }

    // Inner links of an optional chain are never wrapped on their own: that
    // would cut the chain and break its short-circuit. Only the outermost link
    // is a call site.
    fn visit_mut_opt_chain_base(&mut self, base: &mut OptChainBase) {
        match base {
            OptChainBase::Member(m) => {
                self.visit_mut_chain_link(&mut m.obj);
                m.prop.visit_mut_with(self);
            }
            OptChainBase::Call(c) => {
                self.visit_mut_chain_link(&mut c.callee);
                c.args.visit_mut_with(self);
            }
        }
    }

    fn visit_mut_stmt(&mut self, s: &mut Stmt) {
        if self.failed() {
            return;
        }
        if self.engine.config().instrument_loops {
            if let Some(replacement) = self.engine.instrument_loop(s) {
                *s = replacement;
            }
        }
        s.visit_mut_children_with(self);
    }

    fn visit_mut_var_declarator(&mut self, d: &mut VarDeclarator) {
        // Init sequence of an earlier pass.
        if self.engine.synthesizer().is_init_declarator(d) {
            return;
        }
        d.visit_mut_children_with(self);
    }
}

/// Instrument every call site and loop of `program`, then inject the unit's
/// init sequence. Fails up front when the unit binds the runtime ident. On error the program may be partially rewritten; callers that
/// need all-or-nothing should keep a copy.
pub fn instrument_program(
    program: &mut Program,
    engine: &CallProbe<'_>,
    cx: &mut InstrumentContext,
) -> Result<(), Error> {
    engine.check_runtime_ident(program)?;
    let mut walker = TreeWalker::new(engine, cx);
    program.visit_mut_with(&mut walker);
    walker.finish()
}
