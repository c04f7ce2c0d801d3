use std::collections::{HashMap, HashSet};
use std::ops::Index;

use super::{Namespace, NamespaceId, Node, NodeRef};

/// A set of namespaces and the nodes they own.
///
/// Built only through [`crate::registry::IdentityRegistry`]; read-only
/// access is public so projectors and callers can walk it.
#[derive(Debug, Clone, Default)]
pub struct NodeGraph {
    namespaces: Vec<Namespace>,
    by_uri: HashMap<String, NamespaceId>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn ensure_namespace(&mut self, uri: &str) -> (NamespaceId, bool) {
        if let Some(id) = self.by_uri.get(uri) {
            return (*id, false);
        }
        let id = NamespaceId(self.namespaces.len() as u32);
        self.namespaces.push(Namespace::new(id, uri));
        self.by_uri.insert(uri.to_string(), id);
        (id, true)
    }

    pub fn namespace_id(&self, uri: &str) -> Option<NamespaceId> {
        self.by_uri.get(uri).copied()
    }

    pub fn namespace(&self, id: NamespaceId) -> Option<&Namespace> {
        self.namespaces.get(id.0 as usize)
    }

    pub(crate) fn namespace_mut(&mut self, id: NamespaceId) -> Option<&mut Namespace> {
        self.namespaces.get_mut(id.0 as usize)
    }

    pub fn namespace_by_uri(&self, uri: &str) -> Option<&Namespace> {
        self.namespace_id(uri).and_then(|id| self.namespace(id))
    }

    /// Namespaces in creation order.
    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.iter()
    }

    pub fn get(&self, r: NodeRef) -> Option<&Node> {
        self.namespace(r.namespace).and_then(|ns| ns.node(r.slot))
    }

    pub(crate) fn get_mut(&mut self, r: NodeRef) -> Option<&mut Node> {
        self.namespace_mut(r.namespace)
            .and_then(|ns| ns.node_mut(r.slot))
    }

    pub fn lookup(&self, uri: &str, identifier: &str) -> Option<NodeRef> {
        self.namespace_by_uri(uri).and_then(|ns| ns.find(identifier))
    }

    pub fn uri_of(&self, r: NodeRef) -> &str {
        self.namespace(r.namespace)
            .map(|ns| ns.uri.as_str())
            .unwrap_or("")
    }

    /// `nsu=<uri>;<id>` rendering of a handle, for diagnostics.
    pub fn qualified(&self, r: NodeRef) -> String {
        match self.get(r) {
            Some(node) => format!("nsu={};{}", self.uri_of(r), node.identifier),
            None => format!("nsu={};<discarded {}>", self.uri_of(r), r.slot),
        }
    }

    /// Super types of `r`, nearest first. Stops on a cycle.
    pub fn super_chain(&self, r: NodeRef) -> Vec<NodeRef> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([r]);
        let mut current = self.get(r).and_then(|n| n.super_type());
        while let Some(next) = current {
            if !seen.insert(next) {
                break;
            }
            chain.push(next);
            current = self.get(next).and_then(|n| n.super_type());
        }
        chain
    }

    pub fn is_subtype_of(&self, r: NodeRef, ancestor: NodeRef) -> bool {
        r == ancestor || self.super_chain(r).contains(&ancestor)
    }

    /// Every type whose attributes `r` inherits: the super-type chain plus
    /// interfaces implemented anywhere along it (and their own chains).
    pub fn contributors(&self, r: NodeRef) -> Vec<NodeRef> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([r]);
        let mut queue = vec![r];
        while let Some(current) = queue.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            let mut next: Vec<NodeRef> = node.children.interfaces.clone();
            if let Some(sup) = node.super_type() {
                next.insert(0, sup);
            }
            for n in next {
                if seen.insert(n) {
                    out.push(n);
                    queue.push(n);
                }
            }
        }
        out
    }

    /// Links each required-namespace entry to its loaded namespace, if any.
    pub(crate) fn link_required(&mut self) {
        let by_uri = self.by_uri.clone();
        for ns in &mut self.namespaces {
            for req in &mut ns.required {
                req.namespace = by_uri.get(&req.uri).copied();
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.namespaces.iter().map(|ns| ns.len()).sum()
    }
}

impl Index<NodeRef> for NodeGraph {
    type Output = Node;

    /// Panics on a handle into a discarded slot; handles held by live nodes
    /// never point at one.
    fn index(&self, r: NodeRef) -> &Node {
        match self.get(r) {
            Some(node) => node,
            None => panic!("dangling node handle {:?}", r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;

    fn type_node(graph: &mut NodeGraph, uri: &str, id: &str) -> NodeRef {
        let (ns, _) = graph.ensure_namespace(uri);
        graph
            .namespace_mut(ns)
            .unwrap()
            .register(id, NodeKind::ObjectType)
    }

    #[test]
    fn ensure_namespace_is_create_or_get() {
        let mut graph = NodeGraph::new();
        let (a, created) = graph.ensure_namespace("urn:a");
        assert!(created);
        let (again, created) = graph.ensure_namespace("urn:a");
        assert!(!created);
        assert_eq!(a, again);
    }

    #[test]
    fn super_chain_stops_on_cycle() {
        let mut graph = NodeGraph::new();
        let a = type_node(&mut graph, "urn:a", "i=1");
        let b = type_node(&mut graph, "urn:a", "i=2");
        graph.get_mut(a).unwrap().type_data_mut().unwrap().super_type = Some(b);
        graph.get_mut(b).unwrap().type_data_mut().unwrap().super_type = Some(a);
        assert_eq!(graph.super_chain(a), vec![b]);
        assert!(graph.is_subtype_of(a, b));
    }

    #[test]
    fn contributors_include_interfaces() {
        let mut graph = NodeGraph::new();
        let base = type_node(&mut graph, "urn:a", "i=1");
        let iface = type_node(&mut graph, "urn:a", "i=2");
        let derived = type_node(&mut graph, "urn:a", "i=3");
        let node = graph.get_mut(derived).unwrap();
        node.type_data_mut().unwrap().super_type = Some(base);
        node.children.interfaces.push(iface);
        assert_eq!(graph.contributors(derived), vec![base, iface]);
    }

    #[test]
    fn qualified_names_uri_and_identifier() {
        let mut graph = NodeGraph::new();
        let r = type_node(&mut graph, "urn:a", "i=9");
        assert_eq!(graph.qualified(r), "nsu=urn:a;i=9");
    }
}
