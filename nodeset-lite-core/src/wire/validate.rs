//! Document-level checks run before a nodeset reaches the builder.

use std::collections::{HashMap, HashSet};

use super::{NodeSetDocument, WireNode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub rule: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

/// Validate a parsed document. Returns all errors found.
pub fn validate_document(doc: &NodeSetDocument) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let table = doc.namespace_table();

    // N1: At least one model, each declared in NamespaceUris
    if doc.models.is_empty() {
        errors.push(ValidationError {
            rule: "N1".to_string(),
            message: "Document declares no model".to_string(),
        });
    }
    for model in &doc.models {
        if table.index_of(&model.model_uri).is_none() {
            errors.push(ValidationError {
                rule: "N1".to_string(),
                message: format!("Model {} is not listed in NamespaceUris", model.model_uri),
            });
        }
    }

    // N2: Node ids parse and are unique (after namespace resolution)
    let mut ids: HashMap<String, &WireNode> = HashMap::new();
    for node in &doc.nodes {
        match table.resolve(&node.node_id, &doc.aliases) {
            Ok(id) => {
                if ids.insert(id.to_string(), node).is_some() {
                    errors.push(ValidationError {
                        rule: "N2".to_string(),
                        message: format!("Duplicate node id: {}", node.node_id),
                    });
                }
            }
            Err(e) => errors.push(ValidationError {
                rule: "N2".to_string(),
                message: format!("Invalid node id {}: {}", node.node_id, e),
            }),
        }
    }

    // N3: Browse names are non-empty and use declared indices
    for node in &doc.nodes {
        let ok = table
            .resolve_qualified_name(&node.browse_name)
            .map(|(_, name)| !name.is_empty())
            .unwrap_or(false);
        if !ok {
            errors.push(ValidationError {
                rule: "N3".to_string(),
                message: format!("Invalid browse name on {}: '{}'", node.node_id, node.browse_name),
            });
        }
    }

    // N4: Reference types and targets resolve to well-formed ids
    for node in &doc.nodes {
        for r in &node.references {
            if let Err(e) = table.resolve(&r.reference_type, &doc.aliases) {
                errors.push(ValidationError {
                    rule: "N4".to_string(),
                    message: format!("{}: bad reference type '{}': {}", node.node_id, r.reference_type, e),
                });
            }
            if let Err(e) = table.resolve(&r.target, &doc.aliases) {
                errors.push(ValidationError {
                    rule: "N4".to_string(),
                    message: format!("{}: bad reference target '{}': {}", node.node_id, r.target, e),
                });
            }
        }
    }

    // N5: ParentNodeId inside a document namespace must be declared
    let own: HashSet<&str> = doc.models.iter().map(|m| m.model_uri.as_str()).collect();
    for node in &doc.nodes {
        let Some(parent) = &node.parent_node_id else {
            continue;
        };
        if let Ok(pid) = table.resolve(parent, &doc.aliases) {
            if own.contains(pid.namespace_uri.as_str()) && !ids.contains_key(&pid.to_string()) {
                errors.push(ValidationError {
                    rule: "N5".to_string(),
                    message: format!("{}: parent {} is not declared", node.node_id, parent),
                });
            }
        }
    }

    // N6: Definition field names unique; enumeration values unique
    for node in &doc.nodes {
        let Some(def) = &node.definition else {
            continue;
        };
        let mut names = HashSet::new();
        let mut values = HashSet::new();
        for f in &def.fields {
            if !names.insert(f.name.as_str()) {
                errors.push(ValidationError {
                    rule: "N6".to_string(),
                    message: format!("{}: duplicate field '{}'", node.node_id, f.name),
                });
            }
            if let Some(v) = f.value {
                if !values.insert(v) {
                    errors.push(ValidationError {
                        rule: "N6".to_string(),
                        message: format!("{}: duplicate enum value {}", node.node_id, v),
                    });
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ModelEntry, NodeClass, WireDefinition, WireField, WireReference};

    fn doc(nodes: Vec<WireNode>) -> NodeSetDocument {
        NodeSetDocument {
            namespace_uris: vec!["urn:a".into()],
            models: vec![ModelEntry {
                model_uri: "urn:a".into(),
                ..Default::default()
            }],
            nodes,
            ..Default::default()
        }
    }

    fn rules(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.rule.as_str()).collect()
    }

    #[test]
    fn valid_document_passes() {
        let mut n = WireNode::new(NodeClass::ObjectType, "ns=1;i=1", "1:A");
        n.references.push(WireReference {
            reference_type: "i=45".into(),
            is_forward: false,
            target: "i=58".into(),
        });
        assert!(validate_document(&doc(vec![n])).is_empty());
    }

    #[test]
    fn duplicate_ids_across_spellings_are_caught() {
        let a = WireNode::new(NodeClass::Object, "ns=1;i=1", "1:A");
        let b = WireNode::new(NodeClass::Object, "nsu=urn:a;i=1", "1:B");
        assert_eq!(rules(&validate_document(&doc(vec![a, b]))), vec!["N2"]);
    }

    #[test]
    fn undeclared_parent_and_bad_target_are_caught() {
        let mut n = WireNode::new(NodeClass::Variable, "ns=1;i=2", "1:V");
        n.parent_node_id = Some("ns=1;i=99".into());
        n.references.push(WireReference {
            reference_type: "HasComponent".into(),
            is_forward: false,
            target: "ns=4;i=1".into(),
        });
        let errs = validate_document(&doc(vec![n]));
        assert_eq!(rules(&errs), vec!["N4", "N4", "N5"]);
    }

    #[test]
    fn duplicate_enum_values_are_caught() {
        let mut n = WireNode::new(NodeClass::DataType, "ns=1;i=3", "1:E");
        n.definition = Some(WireDefinition {
            name: "1:E".into(),
            fields: vec![
                WireField {
                    name: "A".into(),
                    value: Some(1),
                    ..Default::default()
                },
                WireField {
                    name: "B".into(),
                    value: Some(1),
                    ..Default::default()
                },
            ],
        });
        assert_eq!(rules(&validate_document(&doc(vec![n]))), vec!["N6"]);
    }

    #[test]
    fn missing_model_is_reported() {
        let mut d = doc(vec![]);
        d.models.clear();
        assert_eq!(rules(&validate_document(&d)), vec!["N1"]);
    }
}
