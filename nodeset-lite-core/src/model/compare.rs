//! Structural comparison of two node graphs.
//!
//! Nodes are matched by (namespace URI, identifier) and every handle is
//! rendered as its qualified id, so graphs built from documents with
//! different namespace-index tables compare equal.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{DataTypeDefinition, Namespace, Node, NodeGraph, NodePayload, NodeRef, VariableData};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub key: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphDiff {
    pub added: Vec<DiffEntry>,
    pub removed: Vec<DiffEntry>,
    pub modified: Vec<DiffEntry>,
}

impl GraphDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

impl std::fmt::Display for GraphDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for e in &self.added {
            writeln!(f, "+ {} ({})", e.key, e.detail)?;
        }
        for e in &self.removed {
            writeln!(f, "- {} ({})", e.key, e.detail)?;
        }
        for e in &self.modified {
            writeln!(f, "~ {}: {}", e.key, e.detail)?;
        }
        Ok(())
    }
}

/// Compare `base` against `target` over the namespaces named in `uris`.
pub fn diff_graphs(base: &NodeGraph, target: &NodeGraph, uris: &[&str]) -> GraphDiff {
    let mut diff = GraphDiff::default();

    for uri in uris {
        let (b, t) = (base.namespace_by_uri(uri), target.namespace_by_uri(uri));
        match (b, t) {
            (None, None) => {}
            (None, Some(_)) => diff.added.push(DiffEntry {
                key: uri.to_string(),
                detail: "namespace".to_string(),
            }),
            (Some(_), None) => diff.removed.push(DiffEntry {
                key: uri.to_string(),
                detail: "namespace".to_string(),
            }),
            (Some(b), Some(t)) => diff_namespace(base, b, target, t, &mut diff),
        }
    }
    diff
}

fn diff_namespace(
    base: &NodeGraph,
    b: &Namespace,
    target: &NodeGraph,
    t: &Namespace,
    diff: &mut GraphDiff,
) {
    let header = |ns: &Namespace| {
        let mut required: Vec<&str> = ns.required.iter().map(|r| r.uri.as_str()).collect();
        required.sort_unstable();
        format!(
            "version={:?} published={:?} required={:?}",
            ns.version, ns.publication_date, required
        )
    };
    let (bh, th) = (header(b), header(t));
    if bh != th {
        diff.modified.push(DiffEntry {
            key: b.uri.clone(),
            detail: format!("{} → {}", bh, th),
        });
    }

    let base_map: BTreeMap<&str, &Node> = b.nodes().map(|n| (n.identifier.as_str(), n)).collect();
    let target_map: BTreeMap<&str, &Node> =
        t.nodes().map(|n| (n.identifier.as_str(), n)).collect();

    for (id, tn) in &target_map {
        let key = format!("nsu={};{}", t.uri, id);
        match base_map.get(id) {
            None => diff.added.push(DiffEntry {
                key,
                detail: tn.kind().to_string(),
            }),
            Some(bn) => {
                let bs = signature(base, bn);
                let ts = signature(target, tn);
                for ((field, bv), (_, tv)) in bs.iter().zip(ts.iter()) {
                    if bv != tv {
                        diff.modified.push(DiffEntry {
                            key: key.clone(),
                            detail: format!("{}: {} → {}", field, bv, tv),
                        });
                    }
                }
            }
        }
    }

    for (id, bn) in &base_map {
        if !target_map.contains_key(id) {
            diff.removed.push(DiffEntry {
                key: format!("nsu={};{}", b.uri, id),
                detail: bn.kind().to_string(),
            });
        }
    }
}

/// Field-by-field rendering of a node with every handle qualified.
fn signature(graph: &NodeGraph, node: &Node) -> Vec<(&'static str, String)> {
    let q = |r: NodeRef| graph.qualified(r);
    let qo = |r: Option<NodeRef>| r.map(q).unwrap_or_default();
    let edges = |list: &[super::OtherEdge]| {
        let mut rendered: Vec<String> = list
            .iter()
            .map(|e| format!("{}>{}", q(e.reference_type), q(e.peer)))
            .collect();
        rendered.sort();
        rendered.join(",")
    };

    let mut sig = vec![
        ("kind", node.kind().to_string()),
        ("browse_name", format!("{:?}", node.browse_name)),
        ("display_name", node.display_name.clone()),
        ("description", format!("{:?}", node.description)),
        ("documentation", format!("{:?}", node.documentation)),
        ("categories", node.categories.join(",")),
        ("symbolic_name", format!("{:?}", node.symbolic_name)),
        (
            "children",
            node.children
                .iter()
                .map(|(role, r)| format!("{}:{}", role.as_str(), q(r)))
                .collect::<Vec<_>>()
                .join(","),
        ),
        ("referenced", edges(&node.referenced)),
        ("referencing", edges(&node.referencing)),
    ];

    let (instance, ty) = (node.instance(), node.type_data());
    sig.push((
        "type_definition",
        qo(instance.and_then(|i| i.type_definition)),
    ));
    sig.push(("parent", qo(instance.and_then(|i| i.parent))));
    sig.push((
        "modeling_rule",
        format!("{:?}", instance.and_then(|i| i.modeling_rule)),
    ));
    sig.push(("super_type", qo(ty.and_then(|t| t.super_type))));
    sig.push(("is_abstract", node.is_abstract().to_string()));
    sig.push((
        "sub_types",
        ty.map(|t| {
            let mut subs: Vec<String> = t.sub_types.iter().map(|r| q(*r)).collect();
            subs.sort();
            subs.join(",")
        })
        .unwrap_or_default(),
    ));
    sig.push((
        "variable",
        node.variable().map(|v| variable(graph, v)).unwrap_or_default(),
    ));

    let extra = match &node.payload {
        NodePayload::Object { event_notifier, .. } => format!("{:?}", event_notifier),
        NodePayload::Method {
            method_declaration, ..
        } => format!("{:?}", method_declaration),
        NodePayload::DataType { definition, .. } => match definition {
            Some(DataTypeDefinition::Structure(fields)) => fields
                .iter()
                .map(|f| {
                    format!(
                        "{}:{}:{:?}:{:?}:{}:{:?}",
                        f.name,
                        q(f.data_type),
                        f.value_rank,
                        f.array_dimensions,
                        f.is_optional,
                        f.description
                    )
                })
                .collect::<Vec<_>>()
                .join(","),
            Some(DataTypeDefinition::Enumeration(fields)) => fields
                .iter()
                .map(|f| format!("{}={}:{:?}", f.name, f.value, f.description))
                .collect::<Vec<_>>()
                .join(","),
            None => String::new(),
        },
        NodePayload::ReferenceType {
            symmetric,
            inverse_name,
            ..
        } => format!("{}:{:?}", symmetric, inverse_name),
        _ => String::new(),
    };
    sig.push(("payload", extra));
    sig
}

fn variable(graph: &NodeGraph, v: &VariableData) -> String {
    format!(
        "{}|{:?}|{:?}|{:?}|{:?}|{:?}|{}|{:?}|{:?}|{:?}",
        v.data_type.map(|r| graph.qualified(r)).unwrap_or_default(),
        v.value_rank,
        v.array_dimensions,
        v.value,
        v.access_level,
        v.user_access_level,
        v.historizing,
        v.engineering_units,
        v.eu_range,
        v.instrument_range
    )
}
