//! Graph → nodeset document.
//!
//! Produces one document per namespace. Namespace index 1 is the exported
//! namespace, followed by its required namespaces in declaration order and
//! then any other namespace a node points into, sorted by URI.
//!
//! References are re-derived from node fields: type definitions, modelling
//! rules and super types are written on the node that holds them, child
//! and other edges forward on their source. Edges whose source lives in
//! another namespace are written inverse on the local node. Folded
//! side-info is written back as property children under the identifiers
//! it was folded from.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::error::{ModelError, Result};
use crate::model::{
    ChildRole, DataTypeDefinition, EncodedValue, Namespace, NamespaceId, Node, NodeGraph,
    NodeKind, NodePayload, NodeRef, SideInfoKind,
};
use crate::wire::well_known::{self, UA_NAMESPACE_URI};
use crate::wire::{
    GlobalNodeId, ModelEntry, NamespaceTable, NodeClass, NodeSetDocument, RequiredModel,
    WireDefinition, WireField, WireNode, WireReference, WireValue,
};

pub struct WireProjector<'g> {
    graph: &'g NodeGraph,
}

impl<'g> WireProjector<'g> {
    pub fn new(graph: &'g NodeGraph) -> Self {
        Self { graph }
    }

    pub fn project(&self, namespace: NamespaceId) -> Result<NodeSetDocument> {
        let ns = self.graph.namespace(namespace).ok_or_else(|| {
            ModelError::InvalidDocument(format!("unknown namespace {:?}", namespace))
        })?;

        let uris = self.namespace_uris(ns);
        let mut emit = Emitter {
            graph: self.graph,
            ns,
            table: NamespaceTable::new(&uris),
            aliases: BTreeMap::new(),
        };

        let mut nodes = Vec::with_capacity(ns.len());
        for node in ns.nodes() {
            nodes.push(emit.node(node)?);
            nodes.extend(emit.side_info_nodes(node)?);
        }

        info!(namespace = %ns.uri, nodes = nodes.len(), "projected namespace to nodeset");
        Ok(NodeSetDocument {
            namespace_uris: uris,
            models: vec![ModelEntry {
                model_uri: ns.uri.clone(),
                version: ns.version.clone(),
                publication_date: ns.publication_date,
                required: ns
                    .required
                    .iter()
                    .map(|r| RequiredModel {
                        model_uri: r.uri.clone(),
                        version: r.version.clone(),
                        publication_date: r.publication_date,
                    })
                    .collect(),
            }],
            aliases: emit.aliases,
            nodes,
            last_modified: ns.last_modified,
        })
    }

    fn namespace_uris(&self, ns: &Namespace) -> Vec<String> {
        let mut uris = vec![ns.uri.clone()];
        for req in &ns.required {
            if req.uri != UA_NAMESPACE_URI && !uris.contains(&req.uri) {
                uris.push(req.uri.clone());
            }
        }

        let mut extra: BTreeSet<&str> = BTreeSet::new();
        for node in ns.nodes() {
            extra.insert(&node.browse_name.namespace_uri);
            for r in linked(node) {
                extra.insert(self.graph.uri_of(r));
            }
        }
        for uri in extra {
            if !uri.is_empty() && uri != UA_NAMESPACE_URI && !uris.iter().any(|u| u == uri) {
                uris.push(uri.to_string());
            }
        }
        uris
    }
}

/// Every handle a node's element will mention.
fn linked(node: &Node) -> Vec<NodeRef> {
    let mut out: Vec<NodeRef> = node.children.iter().map(|(_, r)| r).collect();
    out.extend(node.super_type());
    if let Some(inst) = node.instance() {
        out.extend(inst.type_definition);
        out.extend(inst.parent);
    }
    if let Some(v) = node.variable() {
        out.extend(v.data_type);
    }
    for e in node.referenced.iter().chain(node.referencing.iter()) {
        out.push(e.reference_type);
        out.push(e.peer);
    }
    if let Some(DataTypeDefinition::Structure(fields)) = node.data_type_definition() {
        out.extend(fields.iter().map(|f| f.data_type));
    }
    out
}

fn role_reference(role: ChildRole) -> &'static str {
    match role {
        ChildRole::Object | ChildRole::DataVariable | ChildRole::Method => {
            well_known::HAS_COMPONENT
        }
        ChildRole::Property => well_known::HAS_PROPERTY,
        ChildRole::Interface => well_known::HAS_INTERFACE,
        ChildRole::Event => well_known::GENERATES_EVENT,
    }
}

fn wire_value(value: &EncodedValue) -> WireValue {
    match value {
        EncodedValue::Null => WireValue::Null,
        EncodedValue::Xml(xml) => WireValue::Xml(xml.clone()),
    }
}

struct Emitter<'g> {
    graph: &'g NodeGraph,
    ns: &'g Namespace,
    table: NamespaceTable,
    aliases: BTreeMap<String, String>,
}

impl Emitter<'_> {
    fn render(&self, r: NodeRef) -> Result<String> {
        let node = self.graph.get(r).ok_or_else(|| {
            ModelError::InvalidDocument(format!("node {} was discarded", self.graph.qualified(r)))
        })?;
        self.table
            .render(&GlobalNodeId::new(self.graph.uri_of(r), &node.identifier))
    }

    fn browse_name(&self, node: &Node) -> Result<String> {
        if node.browse_name.namespace_uri.is_empty() {
            return Ok(node.name().to_string());
        }
        self.table
            .render_qualified_name(&node.browse_name.namespace_uri, &node.browse_name.name)
    }

    /// Alias for a well-known base reference type, registering it.
    fn well_known_type(&mut self, identifier: &str) -> String {
        match well_known::alias_for(identifier) {
            Some(alias) => {
                self.aliases
                    .insert(alias.to_string(), identifier.to_string());
                alias.to_string()
            }
            None => identifier.to_string(),
        }
    }

    fn reference_type(&mut self, r: NodeRef) -> Result<String> {
        if self.graph.uri_of(r) == UA_NAMESPACE_URI {
            if let Some(node) = self.graph.get(r) {
                return Ok(self.well_known_type(&node.identifier));
            }
        }
        self.render(r)
    }

    fn base_node(&self, identifier: &str) -> Option<String> {
        self.graph
            .lookup(UA_NAMESPACE_URI, identifier)
            .map(|_| identifier.to_string())
    }

    fn node(&mut self, n: &Node) -> Result<WireNode> {
        let class = match n.kind() {
            NodeKind::Object => NodeClass::Object,
            NodeKind::ObjectType | NodeKind::Interface => NodeClass::ObjectType,
            NodeKind::DataVariable | NodeKind::Property => NodeClass::Variable,
            NodeKind::VariableType => NodeClass::VariableType,
            NodeKind::DataType => NodeClass::DataType,
            NodeKind::Method => NodeClass::Method,
            NodeKind::ReferenceType => NodeClass::ReferenceType,
        };
        let mut w = WireNode::new(class, self.render(n.handle)?, self.browse_name(n)?);
        w.display_name = Some(n.display_name.clone());
        w.description = n.description.clone();
        w.documentation = n.documentation.clone();
        w.categories = n.categories.clone();
        w.symbolic_name = n.symbolic_name.clone();
        w.is_abstract = n.is_abstract();

        match &n.payload {
            NodePayload::Object { event_notifier, .. } => w.event_notifier = *event_notifier,
            NodePayload::Method {
                method_declaration, ..
            } => w.method_declaration_id = method_declaration.clone(),
            NodePayload::ReferenceType {
                symmetric,
                inverse_name,
                ..
            } => {
                w.symmetric = *symmetric;
                w.inverse_name = inverse_name.clone();
            }
            NodePayload::DataType {
                definition: Some(def),
                ..
            } => w.definition = Some(self.definition(n, def)?),
            _ => {}
        }

        if let Some(v) = n.variable() {
            w.data_type = v.data_type.map(|dt| self.render(dt)).transpose()?;
            w.value_rank = v.value_rank;
            w.array_dimensions = v.array_dimensions.clone();
            w.access_level = v.access_level;
            w.user_access_level = v.user_access_level;
            w.historizing = v.historizing;
            w.value = v.value.as_ref().map(wire_value);
        }

        let mut refs = Vec::new();
        if let Some(inst) = n.instance() {
            if let Some(td) = inst.type_definition {
                refs.push(self.forward(well_known::HAS_TYPE_DEFINITION, self.render(td)?));
            }
            if let Some(rule) = inst.modeling_rule {
                let target = well_known::modeling_rule_id(rule).to_string();
                refs.push(self.forward(well_known::HAS_MODELLING_RULE, target));
            }
            if let Some(p) = inst.parent {
                w.parent_node_id = Some(self.render(p)?);
            }
        }
        if let Some(sup) = n.super_type() {
            refs.push(self.inverse(well_known::HAS_SUBTYPE, self.render(sup)?));
        }
        for (role, child) in n.children.iter() {
            refs.push(self.forward(role_reference(role), self.render(child)?));
        }
        if let Some(v) = n.variable() {
            for kind in SideInfoKind::ALL {
                if let Some(info) = v.side_info(kind) {
                    let target = self
                        .table
                        .render(&GlobalNodeId::new(self.ns.uri.clone(), &info.identifier))?;
                    refs.push(self.forward(well_known::HAS_PROPERTY, target));
                }
            }
        }

        // Owned by a parent that is written in another document.
        if let (Some(p), Some(role)) = (n.parent(), ChildRole::for_child_kind(n.kind())) {
            if p.namespace != n.namespace()
                && self
                    .graph
                    .get(p)
                    .is_some_and(|parent| parent.children.get(role).contains(&n.handle))
            {
                refs.push(self.inverse(role_reference(role), self.render(p)?));
            }
        }

        for e in &n.referenced {
            let rt = self.reference_type(e.reference_type)?;
            refs.push(WireReference {
                reference_type: rt,
                is_forward: true,
                target: self.render(e.peer)?,
            });
        }
        for e in n
            .referencing
            .iter()
            .filter(|e| e.peer.namespace != n.namespace())
        {
            let rt = self.reference_type(e.reference_type)?;
            refs.push(WireReference {
                reference_type: rt,
                is_forward: false,
                target: self.render(e.peer)?,
            });
        }

        w.references = refs;
        Ok(w)
    }

    fn forward(&mut self, reference_type: &str, target: String) -> WireReference {
        WireReference {
            reference_type: self.well_known_type(reference_type),
            is_forward: true,
            target,
        }
    }

    fn inverse(&mut self, reference_type: &str, target: String) -> WireReference {
        WireReference {
            reference_type: self.well_known_type(reference_type),
            is_forward: false,
            target,
        }
    }

    fn definition(&self, n: &Node, def: &DataTypeDefinition) -> Result<WireDefinition> {
        let fields = match def {
            DataTypeDefinition::Structure(fields) => fields
                .iter()
                .map(|f| {
                    Ok(WireField {
                        name: f.name.clone(),
                        data_type: Some(self.render(f.data_type)?),
                        value_rank: f.value_rank,
                        array_dimensions: f.array_dimensions.clone(),
                        is_optional: f.is_optional,
                        description: f.description.clone(),
                        ..Default::default()
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            DataTypeDefinition::Enumeration(fields) => fields
                .iter()
                .map(|f| WireField {
                    name: f.name.clone(),
                    value: Some(f.value),
                    display_name: f.display_name.clone(),
                    description: f.description.clone(),
                    ..Default::default()
                })
                .collect(),
        };
        Ok(WireDefinition {
            name: self.browse_name(n)?,
            fields,
        })
    }

    /// Property elements for folded side-info.
    fn side_info_nodes(&mut self, n: &Node) -> Result<Vec<WireNode>> {
        let Some(v) = n.variable() else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for kind in SideInfoKind::ALL {
            let Some(info) = v.side_info(kind) else {
                continue;
            };
            let id = self
                .table
                .render(&GlobalNodeId::new(self.ns.uri.clone(), &info.identifier))?;
            let mut w = WireNode::new(NodeClass::Variable, id, kind.browse_name());
            w.display_name = Some(kind.browse_name().to_string());
            w.parent_node_id = Some(self.render(n.handle)?);
            let data_type = match kind {
                SideInfoKind::EngineeringUnits => well_known::EU_INFORMATION,
                SideInfoKind::EuRange | SideInfoKind::InstrumentRange => well_known::RANGE,
            };
            w.data_type = self.base_node(data_type);
            w.value = info.value.as_ref().map(wire_value);

            let mut refs = Vec::new();
            if let Some(td) = self.base_node(well_known::PROPERTY_TYPE) {
                refs.push(self.forward(well_known::HAS_TYPE_DEFINITION, td));
            }
            if let Some(rule) = info.modeling_rule {
                let target = well_known::modeling_rule_id(rule).to_string();
                refs.push(self.forward(well_known::HAS_MODELLING_RULE, target));
            }
            w.references = refs;
            out.push(w);
        }
        Ok(out)
    }
}
