//! Create-or-get node resolution keyed by (kind, identifier, namespace).
//!
//! Every builder obtains nodes through [`IdentityRegistry::resolve`]; direct
//! construction is not possible outside this crate. Registering a node in
//! its namespace's identifier index and kind collection happens in the same
//! call that creates it, so a node is never reachable half-registered.

use tracing::debug;

use crate::error::{ModelError, Result};
use crate::model::{Namespace, NamespaceId, Node, NodeGraph, NodeKind, NodeRef};

#[derive(Debug, Default)]
pub struct IdentityRegistry {
    graph: NodeGraph,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue building on top of an existing graph, e.g. one that already
    /// holds the dependencies of the namespaces about to be imported.
    pub fn from_graph(graph: NodeGraph) -> Self {
        Self { graph }
    }

    /// Returns the node for (kind, identifier) in `namespace_uri`, creating
    /// a stub (and the namespace) on first reference. The flag is true when
    /// the node was created by this call.
    pub fn resolve(
        &mut self,
        kind: NodeKind,
        identifier: &str,
        namespace_uri: &str,
    ) -> Result<(NodeRef, bool)> {
        let ns_id = self.namespace_for_uri(namespace_uri);
        let ns = self.namespace_mut(ns_id)?;

        if let Some(existing) = ns.by_identifier(identifier) {
            let existing_kind = existing.kind();
            if existing_kind != kind {
                return Err(ModelError::TypeConflict {
                    namespace: ns.uri.clone(),
                    node: identifier.to_string(),
                    existing: existing_kind,
                    requested: kind,
                });
            }
            return Ok((existing.handle, false));
        }

        Ok((ns.register(identifier, kind), true))
    }

    /// Namespace handle for `uri`, created on first reference.
    pub fn namespace_for_uri(&mut self, uri: &str) -> NamespaceId {
        let (id, created) = self.graph.ensure_namespace(uri);
        if created {
            debug!(namespace = uri, "registered namespace");
        }
        id
    }

    pub fn lookup(&self, namespace_uri: &str, identifier: &str) -> Option<NodeRef> {
        self.graph.lookup(namespace_uri, identifier)
    }

    /// Removes a node from its namespace. Edges pointing at it are the
    /// caller's responsibility.
    pub fn discard(&mut self, r: NodeRef) -> Option<Node> {
        self.graph
            .namespace_mut(r.namespace)
            .and_then(|ns| ns.discard(r.slot))
    }

    pub fn node(&self, r: NodeRef) -> Option<&Node> {
        self.graph.get(r)
    }

    pub fn node_mut(&mut self, r: NodeRef) -> Option<&mut Node> {
        self.graph.get_mut(r)
    }

    /// Like [`Self::node_mut`] for handles the caller just obtained from
    /// this registry; a miss means a discarded slot was reused by mistake.
    pub(crate) fn expect_node(&mut self, r: NodeRef) -> Result<&mut Node> {
        let qualified = self.graph.qualified(r);
        self.graph.get_mut(r).ok_or_else(|| {
            ModelError::InvalidDocument(format!("node {} was discarded", qualified))
        })
    }

    pub fn namespace(&self, id: NamespaceId) -> Option<&Namespace> {
        self.graph.namespace(id)
    }

    pub fn namespace_mut(&mut self, id: NamespaceId) -> Result<&mut Namespace> {
        self.graph
            .namespace_mut(id)
            .ok_or_else(|| ModelError::InvalidDocument(format!("unknown namespace {:?}", id)))
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    /// Finishes construction: required-namespace entries are linked to the
    /// namespaces loaded alongside them.
    pub fn into_graph(mut self) -> NodeGraph {
        self.graph.link_required();
        self.graph
    }
}
