use std::fmt::Debug;

use swc_core::{
    common::{SourceMapper, Span, Spanned},
    ecma::ast::*,
};

/// Short, deterministic digest of a piece of source text.
pub trait TextHasher {
    fn short_hash(&self, text: &str) -> String;
}

/// Lowercase hex prefix of a BLAKE3 digest.
#[derive(Debug, Clone)]
pub struct Blake3Hasher {
    len: usize,
}

impl Blake3Hasher {
    pub fn new(len: usize) -> Self {
        Self { len: len.clamp(4, 64) }
    }
}

impl TextHasher for Blake3Hasher {
    fn short_hash(&self, text: &str) -> String {
        let hex = blake3::hash(text.as_bytes()).to_hex();
        hex.as_str()[..self.len].to_string()
    }
}

/// Exact source text of a node, or its structural rendering when the host has
/// no text for it (synthesized nodes, no source map).
pub fn source_text<N: Spanned + Debug>(source_map: Option<&dyn SourceMapper>, node: &N) -> String {
    let span: Span = node.span();
    if !span.is_dummy() {
        if let Some(text) = source_map.and_then(|cm| cm.span_to_snippet(span).ok()) {
            return text;
        }
    }
    format!("{:?}", node)
}

/// `a.b.c` -> `a_b_c`, `this.#m` -> `this__m`, for use inside generated
/// identifiers.
pub fn fragment(name: &str) -> String {
    name.chars()
        .map(|c| if c == '.' || c == '#' { '_' } else { c })
        .collect()
}

pub struct NameResolver<'a> {
    hasher: &'a dyn TextHasher,
    source_map: Option<&'a dyn SourceMapper>,
}

impl<'a> NameResolver<'a> {
    pub fn new(hasher: &'a dyn TextHasher, source_map: Option<&'a dyn SourceMapper>) -> Self {
        Self { hasher, source_map }
    }

    /// Dotted name of the call target. `None` for `super(..)` and `import(..)`,
    /// which have no expression callee.
    pub fn resolve(&self, call: &CallExpr) -> Option<String> {
        match &call.callee {
            Callee::Expr(callee) => Some(self.resolve_callee(callee, call)),
            Callee::Super(_) | Callee::Import(_) => None,
        }
    }

    /// Dotted name of an optional call (`a?.b()`, `f?.()`). `None` when the
    /// chain ends in a member access rather than a call.
    pub fn resolve_optional(&self, chain: &OptChainExpr) -> Option<String> {
        match &*chain.base {
            OptChainBase::Call(OptCall { callee, .. }) => Some(self.resolve_callee(callee, chain)),
            OptChainBase::Member(_) => None,
        }
    }

    // Property chains recurse on their object as though it were a callee too.
    // Every other shape is named after the whole call's text.
    fn resolve_callee<N: Spanned + Debug>(&self, callee: &Expr, site: &N) -> String {
        match callee {
            Expr::Ident(id) => id.sym.to_string(),
            Expr::Member(m) => self.resolve_member(m, site),
            Expr::OptChain(OptChainExpr { base, .. }) => match &**base {
                OptChainBase::Member(m) => self.resolve_member(m, site),
                OptChainBase::Call(_) => self.anonymous(site),
            },
            _ => self.anonymous(site),
        }
    }

    fn resolve_member<N: Spanned + Debug>(&self, m: &MemberExpr, site: &N) -> String {
        let prop = match &m.prop {
            MemberProp::Ident(prop) => prop.sym.to_string(),
            MemberProp::PrivateName(prop) => format!("#{}", prop.name),
            MemberProp::Computed(_) => return self.anonymous(site),
        };
        match &*m.obj {
            Expr::This(_) => format!("this.{prop}"),
            other => format!("{}.{prop}", self.resolve_callee(other, site)),
        }
    }

    fn anonymous<N: Spanned + Debug>(&self, site: &N) -> String {
        let text = source_text(self.source_map, site);
        format!("anonymous_{}", self.hasher.short_hash(&text))
    }
}
