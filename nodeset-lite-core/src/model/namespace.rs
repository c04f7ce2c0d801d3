use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use super::{NamespaceId, Node, NodeKind, NodeRef};
use crate::wire::well_known::UA_NAMESPACE_URI;

/// Weak link to another namespace, resolved by URI inside the owning graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredNamespace {
    pub uri: String,
    pub version: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
    /// Set once the namespace is loaded into the same graph.
    pub namespace: Option<NamespaceId>,
}

impl RequiredNamespace {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            version: None,
            publication_date: None,
            namespace: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.namespace.is_some()
    }
}

/// All nodes declared under one model URI.
///
/// Slots are never reused: a discarded node leaves a hole so that handles
/// to other slots stay valid.
#[derive(Debug, Clone)]
pub struct Namespace {
    pub id: NamespaceId,
    pub uri: String,
    pub version: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub required: Vec<RequiredNamespace>,
    pub context: Option<serde_json::Value>,
    slots: Vec<Option<Node>>,
    index: HashMap<String, u32>,
    by_kind: BTreeMap<NodeKind, Vec<u32>>,
}

impl Namespace {
    pub fn new(id: NamespaceId, uri: impl Into<String>) -> Self {
        Self {
            id,
            uri: uri.into(),
            version: None,
            publication_date: None,
            last_modified: None,
            required: Vec::new(),
            context: None,
            slots: Vec::new(),
            index: HashMap::new(),
            by_kind: BTreeMap::new(),
        }
    }

    pub fn is_base(&self) -> bool {
        self.uri == UA_NAMESPACE_URI
    }

    /// Whether nodes of this namespace may reference nodes in `uri`.
    /// The base namespace is always implicitly required.
    pub fn requires(&self, uri: &str) -> bool {
        uri == self.uri || uri == UA_NAMESPACE_URI || self.required.iter().any(|r| r.uri == uri)
    }

    pub fn add_required(&mut self, required: RequiredNamespace) {
        if self.required.iter().all(|r| r.uri != required.uri) {
            self.required.push(required);
        }
    }

    /// Creates a stub and indexes it in the same step. Callers go through
    /// the identity registry, which checks for an existing entry first.
    pub(crate) fn register(&mut self, identifier: &str, kind: NodeKind) -> NodeRef {
        let slot = self.slots.len() as u32;
        let handle = NodeRef {
            namespace: self.id,
            slot,
        };
        self.slots.push(Some(Node::stub(handle, identifier, kind)));
        self.index.insert(identifier.to_string(), slot);
        self.by_kind.entry(kind).or_default().push(slot);
        handle
    }

    pub(crate) fn discard(&mut self, slot: u32) -> Option<Node> {
        let node = self.slots.get_mut(slot as usize)?.take()?;
        self.index.remove(&node.identifier);
        if let Some(slots) = self.by_kind.get_mut(&node.kind()) {
            slots.retain(|s| *s != slot);
        }
        Some(node)
    }

    pub fn find(&self, identifier: &str) -> Option<NodeRef> {
        self.index.get(identifier).map(|slot| NodeRef {
            namespace: self.id,
            slot: *slot,
        })
    }

    pub fn node(&self, slot: u32) -> Option<&Node> {
        self.slots.get(slot as usize).and_then(|n| n.as_ref())
    }

    pub fn node_mut(&mut self, slot: u32) -> Option<&mut Node> {
        self.slots.get_mut(slot as usize).and_then(|n| n.as_mut())
    }

    pub fn by_identifier(&self, identifier: &str) -> Option<&Node> {
        self.index.get(identifier).and_then(|slot| self.node(*slot))
    }

    /// Live nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.slots.iter().filter_map(|n| n.as_ref())
    }

    pub fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &Node> + '_ {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .filter_map(move |slot| self.node(*slot))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Highest numeric (`i=`) identifier in use, 0 if none.
    pub fn max_numeric_id(&self) -> u32 {
        self.index
            .keys()
            .filter_map(|id| id.strip_prefix("i="))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_indexes_by_identifier_and_kind() {
        let mut ns = Namespace::new(NamespaceId(1), "urn:a");
        let r = ns.register("i=1001", NodeKind::ObjectType);
        assert_eq!(ns.find("i=1001"), Some(r));
        assert_eq!(ns.nodes_of(NodeKind::ObjectType).count(), 1);
        assert_eq!(ns.nodes_of(NodeKind::Object).count(), 0);
    }

    #[test]
    fn discard_leaves_other_handles_valid() {
        let mut ns = Namespace::new(NamespaceId(1), "urn:a");
        let a = ns.register("i=1", NodeKind::Property);
        let b = ns.register("i=2", NodeKind::Property);
        assert!(ns.discard(a.slot).is_some());
        assert!(ns.find("i=1").is_none());
        assert_eq!(ns.node(b.slot).map(|n| n.identifier.as_str()), Some("i=2"));
        assert_eq!(ns.len(), 1);
        assert!(ns.discard(a.slot).is_none());
    }

    #[test]
    fn base_namespace_is_implicitly_required() {
        let mut ns = Namespace::new(NamespaceId(1), "urn:a");
        assert!(ns.requires(UA_NAMESPACE_URI));
        assert!(!ns.requires("urn:b"));
        ns.add_required(RequiredNamespace::new("urn:b"));
        ns.add_required(RequiredNamespace::new("urn:b"));
        assert!(ns.requires("urn:b"));
        assert_eq!(ns.required.len(), 1);
    }

    #[test]
    fn max_numeric_id_ignores_string_ids() {
        let mut ns = Namespace::new(NamespaceId(1), "urn:a");
        ns.register("i=7", NodeKind::Object);
        ns.register("s=Pump", NodeKind::Object);
        ns.register("i=3005", NodeKind::Object);
        assert_eq!(ns.max_numeric_id(), 3005);
    }
}
