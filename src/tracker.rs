use std::collections::{HashMap, HashSet};

use swc_core::common::{BytePos, Span};

/// Identity of a node in the parsed tree, keyed by its source span.
/// Synthesized nodes (dummy span) have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    lo: BytePos,
    hi: BytePos,
}

impl NodeId {
    pub fn of(span: Span) -> Option<Self> {
        if span.is_dummy() {
            return None;
        }
        Some(Self {
            lo: span.lo(),
            hi: span.hi(),
        })
    }
}

/// Which calls have been wrapped. Grows monotonically for the life of the context.
#[derive(Debug, Default)]
pub struct IdentityTracker {
    names: HashMap<String, bool>,
    nodes: HashSet<NodeId>,
}

impl IdentityTracker {
    /// Handled only when the name flag AND this node's own marker are both set.
    /// A different node sharing an instrumented name still gets wrapped.
    pub fn already_instrumented(&self, name: &str, node: Option<NodeId>) -> bool {
        let name_seen = self.names.get(name).copied().unwrap_or(false);
        let node_seen = node.map_or(false, |id| self.nodes.contains(&id));
        name_seen && node_seen
    }

    pub fn mark_instrumented(&mut self, name: &str, node: Option<NodeId>) {
        self.names.insert(name.to_string(), true);
        if let Some(id) = node {
            self.nodes.insert(id);
        }
    }

    pub fn name_seen(&self, name: &str) -> bool {
        self.names.get(name).copied().unwrap_or(false)
    }
}
