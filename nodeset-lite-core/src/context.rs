//! State threaded through every builder call.

use serde_json::Value;

use crate::error::Diagnostics;
use crate::model::Node;
use crate::registry::IdentityRegistry;

/// Supplies the opaque per-node context slot. Called once for every node a
/// builder completes, after its scalar fields are populated.
pub trait NodeAnnotator {
    fn annotate(&mut self, node: &Node) -> Option<Value>;
}

/// Leaves every context slot empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAnnotation;

impl NodeAnnotator for NoAnnotation {
    fn annotate(&mut self, _node: &Node) -> Option<Value> {
        None
    }
}

impl<F> NodeAnnotator for F
where
    F: FnMut(&Node) -> Option<Value>,
{
    fn annotate(&mut self, node: &Node) -> Option<Value> {
        self(node)
    }
}

pub struct BuildContext<'a> {
    pub registry: &'a mut IdentityRegistry,
    pub diagnostics: &'a mut Diagnostics,
    pub annotator: &'a mut dyn NodeAnnotator,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        registry: &'a mut IdentityRegistry,
        diagnostics: &'a mut Diagnostics,
        annotator: &'a mut dyn NodeAnnotator,
    ) -> Self {
        Self {
            registry,
            diagnostics,
            annotator,
        }
    }

    /// Runs the annotator over a finished node and stores its result.
    pub(crate) fn annotate(&mut self, r: crate::model::NodeRef) {
        let Some(node) = self.registry.node(r) else {
            return;
        };
        let value = self.annotator.annotate(node);
        if let Some(node) = self.registry.node_mut(r) {
            node.context = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;

    #[test]
    fn closure_annotator_fills_context() {
        let mut registry = IdentityRegistry::new();
        let mut diagnostics = Diagnostics::new();
        let mut annotator =
            |node: &Node| Some(serde_json::json!({ "id": node.identifier.clone() }));
        let (r, _) = registry
            .resolve(NodeKind::Object, "i=7", "urn:a")
            .unwrap();
        let mut ctx = BuildContext::new(&mut registry, &mut diagnostics, &mut annotator);
        ctx.annotate(r);
        assert_eq!(
            registry.node(r).unwrap().context,
            Some(serde_json::json!({ "id": "i=7" }))
        );
    }

    #[test]
    fn no_annotation_leaves_slot_empty() {
        let mut registry = IdentityRegistry::new();
        let mut diagnostics = Diagnostics::new();
        let mut annotator = NoAnnotation;
        let (r, _) = registry
            .resolve(NodeKind::Object, "i=7", "urn:a")
            .unwrap();
        BuildContext::new(&mut registry, &mut diagnostics, &mut annotator).annotate(r);
        assert!(registry.node(r).unwrap().context.is_none());
    }
}
