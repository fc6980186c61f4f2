use std::collections::HashSet;

use swc_core::{
    common::{SyntaxContext, DUMMY_SP},
    ecma::ast::*,
};

use crate::error::Error;

const BOOTSTRAP_JS: &str = include_str!("bootstrap.js");
const BOOTSTRAP_KEY: &str = "__CALLPROBE_KEY__";

/// ECMAScript `IdentifierName` that is not a reserved word.
pub fn is_valid_identifier(name: &str) -> bool {
    Ident::verify_symbol(name).is_ok()
}

// -----------------------------------------------------------------------------
// Identifier generation
// -----------------------------------------------------------------------------

/// Bindings one instrumented call site introduces inside its wrapper.
#[derive(Debug, Clone)]
pub struct SiteNames {
    pub start: String,
    pub result: String,
    /// Key handed to `timeStart`.
    pub timer: String,
}

/// Hands out identifiers that are not bound anywhere else in the unit.
#[derive(Debug, Default)]
pub struct IdentGen {
    taken: HashSet<String>,
    next: u64,
}

impl IdentGen {
    pub fn new(taken: HashSet<String>) -> Self {
        Self { taken, next: 0 }
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    /// Claim `name` for synthesized code. Claiming a bound name is fatal.
    pub fn claim(&mut self, name: String) -> Result<String, Error> {
        if !is_valid_identifier(&name) {
            return Err(Error::InvalidIdentifier(name));
        }
        if !self.taken.insert(name.clone()) {
            return Err(Error::IdentifierCollision(name));
        }
        Ok(name)
    }

    pub fn site_names(&mut self, fragment: &str) -> Result<SiteNames, Error> {
        loop {
            let n = self.next;
            self.next += 1;
            let start = format!("__start_{fragment}_{n}");
            let result = format!("__result_{fragment}_{n}");
            if self.is_taken(&start) || self.is_taken(&result) {
                continue;
            }
            return Ok(SiteNames {
                start: self.claim(start)?,
                result: self.claim(result)?,
                timer: format!("{fragment}_{n}"),
            });
        }
    }
}

// -----------------------------------------------------------------------------
// AST builders
// -----------------------------------------------------------------------------

fn ident(sym: &str) -> Ident {
    Ident::new(sym.into(), DUMMY_SP, SyntaxContext::empty())
}

fn ident_expr(sym: &str) -> Box<Expr> {
    Box::new(Expr::Ident(ident(sym)))
}

fn str_lit(value: &str) -> Box<Expr> {
    Box::new(Expr::Lit(Lit::Str(Str {
        span: DUMMY_SP,
        value: value.into(),
        raw: None,
    })))
}

fn member(obj: Box<Expr>, prop: &str) -> Box<Expr> {
    Box::new(Expr::Member(MemberExpr {
        span: DUMMY_SP,
        obj,
        prop: MemberProp::Ident(IdentName::new(prop.into(), DUMMY_SP)),
    }))
}

fn call(callee: Box<Expr>, args: Vec<Box<Expr>>) -> Expr {
    Expr::Call(CallExpr {
        span: DUMMY_SP,
        callee: Callee::Expr(callee),
        args: args
            .into_iter()
            .map(|expr| ExprOrSpread { spread: None, expr })
            .collect(),
        type_args: None,
        ctxt: SyntaxContext::empty(),
    })
}

fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::Expr(ExprStmt {
        span: DUMMY_SP,
        expr: Box::new(expr),
    })
}

fn var_decl(kind: VarDeclKind, name: &str, init: Box<Expr>) -> Stmt {
    Stmt::Decl(Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        kind,
        declare: false,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Ident(BindingIdent {
                id: ident(name),
                type_ann: None,
            }),
            init: Some(init),
            definite: false,
        }],
        ctxt: SyntaxContext::empty(),
    })))
}

fn num_lit(value: f64) -> Box<Expr> {
    Box::new(Expr::Lit(Lit::Num(Number {
        span: DUMMY_SP,
        value,
        raw: None,
    })))
}

fn paren(expr: Expr) -> Box<Expr> {
    Box::new(Expr::Paren(ParenExpr {
        span: DUMMY_SP,
        expr: Box::new(expr),
    }))
}

fn block(stmts: Vec<Stmt>) -> BlockStmt {
    BlockStmt {
        span: DUMMY_SP,
        stmts,
        ctxt: SyntaxContext::empty(),
    }
}

// -----------------------------------------------------------------------------
// Fragments
// -----------------------------------------------------------------------------

pub struct CodeSynthesizer<'a> {
    runtime: &'a str,
}

impl<'a> CodeSynthesizer<'a> {
    pub fn new(runtime: &'a str) -> Self {
        Self { runtime }
    }

    /// `<runtime>.<method>(args...)`
    fn sink_call(&self, method: &str, args: Vec<Box<Expr>>) -> Expr {
        call(member(ident_expr(self.runtime), method), args)
    }

    /// Replace `original` with an immediately-invoked arrow that reports around
    /// a single evaluation of the call and yields its value.
    ///
    /// With `is_async` the arrow is async and its invocation is awaited. The
    /// value travels boxed in a one-element array so that awaiting the wrapper
    /// never unwraps a promise the call itself returned:
    /// `(await (async () => { ...; return [result]; })())[0]`.
    pub fn wrap_call(&self, original: Expr, name: &str, names: &SiteNames, is_async: bool) -> Expr {
        let returned = if is_async {
            Box::new(Expr::Array(ArrayLit {
                span: DUMMY_SP,
                elems: vec![Some(ExprOrSpread {
                    spread: None,
                    expr: ident_expr(&names.result),
                })],
            }))
        } else {
            ident_expr(&names.result)
        };
        let stmts = vec![
            expr_stmt(self.sink_call("trace", vec![str_lit(&format!("begin call {name}"))])),
            expr_stmt(self.sink_call("registerCall", vec![str_lit(name)])),
            expr_stmt(self.sink_call("count", vec![str_lit(name)])),
            var_decl(
                VarDeclKind::Const,
                &names.start,
                Box::new(self.sink_call("timeStart", vec![str_lit(&names.timer)])),
            ),
            var_decl(VarDeclKind::Const, &names.result, Box::new(original)),
            expr_stmt(self.sink_call("timeEnd", vec![str_lit(name), ident_expr(&names.start)])),
            expr_stmt(self.sink_call("trace", vec![str_lit(&format!("end call {name}"))])),
            Stmt::Return(ReturnStmt {
                span: DUMMY_SP,
                arg: Some(returned),
            }),
        ];

        let arrow = Expr::Arrow(ArrowExpr {
            span: DUMMY_SP,
            ctxt: SyntaxContext::empty(),
            params: vec![],
            body: Box::new(BlockStmtOrExpr::BlockStmt(block(stmts))),
            is_async,
            is_generator: false,
            type_params: None,
            return_type: None,
        });
        let invoked = call(paren(arrow), vec![]);
        if !is_async {
            return invoked;
        }
        let awaited = Expr::Await(AwaitExpr {
            span: DUMMY_SP,
            arg: Box::new(invoked),
        });
        Expr::Member(MemberExpr {
            span: DUMMY_SP,
            obj: paren(awaited),
            prop: MemberProp::Computed(ComputedPropName {
                span: DUMMY_SP,
                expr: num_lit(0.0),
            }),
        })
    }

    /// `{ <runtime>.registerLoop(id); <runtime>.iterate(id); <body> }`
    pub fn wrap_loop_body(&self, body: Stmt, loop_id: &str) -> Stmt {
        Stmt::Block(block(vec![
            expr_stmt(self.sink_call("registerLoop", vec![str_lit(loop_id)])),
            expr_stmt(self.sink_call("iterate", vec![str_lit(loop_id)])),
            body,
        ]))
    }

    /// `var <runtime> = globalThis.<runtime> || new Function("<bootstrap>")();`
    pub fn init_stmt(&self) -> Stmt {
        let key = serde_json::to_string(self.runtime).unwrap_or_else(|_| "\"__callprobe\"".into());
        let js = BOOTSTRAP_JS.replace(BOOTSTRAP_KEY, &key);
        let bootstrap = call(
            Box::new(Expr::New(NewExpr {
                span: DUMMY_SP,
                callee: ident_expr("Function"),
                args: Some(vec![ExprOrSpread {
                    spread: None,
                    expr: str_lit(&js),
                }]),
                type_args: None,
                ctxt: SyntaxContext::empty(),
            })),
            vec![],
        );
        let existing = member(ident_expr("globalThis"), self.runtime);
        var_decl(
            VarDeclKind::Var,
            self.runtime,
            Box::new(Expr::Bin(BinExpr {
                span: DUMMY_SP,
                op: BinaryOp::LogicalOr,
                left: existing,
                right: Box::new(bootstrap),
            })),
        )
    }

    /// `import "<module>";`
    pub fn runtime_import(&self, module: &str) -> ModuleItem {
        ModuleItem::ModuleDecl(ModuleDecl::Import(ImportDecl {
            span: DUMMY_SP,
            specifiers: vec![],
            src: Box::new(Str {
                span: DUMMY_SP,
                value: module.into(),
                raw: None,
            }),
            type_only: false,
            with: None,
            phase: ImportPhase::Evaluation,
        }))
    }

    /// Whether `call` is an invocation produced by [`Self::wrap_call`].
    pub fn is_wrapper(&self, call: &CallExpr) -> bool {
        self.wrapper_body(call).map_or(false, |body| {
            matches!(body.stmts.first(), Some(Stmt::Expr(ExprStmt { expr, .. })) if self.is_sink_call(expr))
        })
    }

    fn wrapper_body<'w>(&self, call: &'w CallExpr) -> Option<&'w BlockStmt> {
        let Callee::Expr(callee) = &call.callee else {
            return None;
        };
        let Expr::Paren(ParenExpr { expr, .. }) = &**callee else {
            return None;
        };
        let Expr::Arrow(arrow) = &**expr else {
            return None;
        };
        if !arrow.params.is_empty() || !call.args.is_empty() {
            return None;
        }
        match &*arrow.body {
            BlockStmtOrExpr::BlockStmt(body) => Some(body),
            BlockStmtOrExpr::Expr(_) => None,
        }
    }

    /// The original call a wrapper evaluates: the initializer of the binding
    /// its `return` hands back, bare or boxed in `[..]`.
    pub fn wrapped_original<'w>(&self, call: &'w CallExpr) -> Option<&'w Expr> {
        if !self.is_wrapper(call) {
            return None;
        }
        let body = self.wrapper_body(call)?;
        let returned = body.stmts.iter().find_map(|stmt| match stmt {
            Stmt::Return(ReturnStmt { arg: Some(arg), .. }) => Some(&**arg),
            _ => None,
        })?;
        let result = match returned {
            Expr::Ident(id) => &id.sym,
            Expr::Array(ArrayLit { elems, .. }) => match elems.as_slice() {
                [Some(ExprOrSpread { spread: None, expr })] => match &**expr {
                    Expr::Ident(id) => &id.sym,
                    _ => return None,
                },
                _ => return None,
            },
            _ => return None,
        };
        body.stmts.iter().find_map(|stmt| {
            let Stmt::Decl(Decl::Var(var)) = stmt else {
                return None;
            };
            var.decls.iter().find_map(|d| match (&d.name, &d.init) {
                (Pat::Ident(b), Some(init)) if &b.id.sym == result => Some(&**init),
                _ => None,
            })
        })
    }

    /// Whether `d` is the declarator [`Self::init_stmt`] produces:
    /// `<runtime> = globalThis.<runtime> || new Function(..)()`.
    pub fn is_init_declarator(&self, d: &VarDeclarator) -> bool {
        let Pat::Ident(binding) = &d.name else {
            return false;
        };
        if binding.id.sym.as_ref() != self.runtime {
            return false;
        }
        let Some(Expr::Bin(BinExpr {
            op: BinaryOp::LogicalOr,
            left,
            right,
            ..
        })) = d.init.as_deref()
        else {
            return false;
        };
        let reads_global = matches!(
            &**left,
            Expr::Member(MemberExpr { obj, prop: MemberProp::Ident(prop), .. })
                if matches!(&**obj, Expr::Ident(g) if g.sym.as_ref() == "globalThis")
                    && prop.sym.as_ref() == self.runtime
        );
        let bootstraps = matches!(
            &**right,
            Expr::Call(CallExpr { callee: Callee::Expr(callee), .. })
                if matches!(&**callee, Expr::New(NewExpr { callee: ctor, .. })
                    if matches!(&**ctor, Expr::Ident(f) if f.sym.as_ref() == "Function"))
        );
        reads_global && bootstraps
    }

    fn is_sink_call(&self, expr: &Expr) -> bool {
        let Expr::Call(CallExpr {
            callee: Callee::Expr(callee),
            ..
        }) = expr
        else {
            return false;
        };
        matches!(
            &**callee,
            Expr::Member(MemberExpr { obj, .. })
                if matches!(&**obj, Expr::Ident(id) if id.sym.as_ref() == self.runtime)
        )
    }
}
