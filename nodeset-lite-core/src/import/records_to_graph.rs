//! Relational records → node graph.
//!
//! [`RecordGraphBuilder::gather`] loads every record of a namespace and,
//! transitively, every record those reference, until the set is closed.
//! [`RecordGraphBuilder::build`] then constructs the graph without touching
//! the store again. Records of other namespaces that are already in the
//! registry's graph are reused; the rest are built from their records.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use crate::context::BuildContext;
use crate::error::{ModelError, Result};
use crate::model::{
    BrowseName, ChildRole, DataTypeDefinition, EnumField, NamespaceId, NodeKind, NodePayload,
    NodeRef, OtherEdge, RequiredNamespace, StructureField, VariableData,
};
use crate::records::store::RecordStore;
use crate::records::{
    AttributeKind, AttributeRecord, CompositionRecord, CompositionRole, DefinitionKind,
    ModelRecord, RecordId, TypeDefinitionRecord, VariableInfo,
};

/// Closed set of records needed to build one namespace.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    pub namespace: String,
    pub model: Option<ModelRecord>,
    pub types: BTreeMap<RecordId, TypeDefinitionRecord>,
    own: Vec<RecordId>,
    compositions: HashMap<RecordId, Vec<CompositionRecord>>,
    attributes: HashMap<RecordId, Vec<AttributeRecord>>,
}

impl RecordSet {
    /// Records of the namespace itself, in id order.
    pub fn own(&self) -> &[RecordId] {
        &self.own
    }
}

pub struct RecordGraphBuilder<'s> {
    store: &'s dyn RecordStore,
}

fn record_refs(rec: &TypeDefinitionRecord) -> Vec<(RecordId, &'static str)> {
    let mut out = Vec::new();
    out.extend(rec.super_type_id.map(|id| (id, "super type")));
    out.extend(rec.parent_id.map(|id| (id, "parent")));
    out.extend(rec.type_definition_id.map(|id| (id, "type definition")));
    out.extend(rec.interface_ids.iter().map(|&id| (id, "interface")));
    out.extend(
        rec.variable
            .as_ref()
            .and_then(|v| v.data_type_id)
            .map(|id| (id, "data type")),
    );
    out
}

fn composition_refs(comp: &CompositionRecord) -> Vec<(RecordId, &'static str)> {
    let mut out = Vec::new();
    out.extend(comp.related_type_id.map(|id| (id, "related type")));
    out.extend(comp.child_record_id.map(|id| (id, "child")));
    out.extend(comp.reference_type_id.map(|id| (id, "reference type")));
    out
}

fn attribute_refs(attr: &AttributeRecord) -> Vec<(RecordId, &'static str)> {
    let mut out = Vec::new();
    out.extend(attr.type_definition_id.map(|id| (id, "type definition")));
    out.extend(attr.child_record_id.map(|id| (id, "child")));
    out.extend(attr.data_type_id.map(|id| (id, "field data type")));
    out.extend(
        attr.variable
            .as_ref()
            .and_then(|v| v.data_type_id)
            .map(|id| (id, "data type")),
    );
    out
}

impl<'s> RecordGraphBuilder<'s> {
    pub fn new(store: &'s dyn RecordStore) -> Self {
        Self { store }
    }

    pub async fn gather(&self, namespace: &str) -> Result<RecordSet> {
        let uri = namespace.to_string();
        let in_namespace = move |r: &TypeDefinitionRecord| r.namespace == uri;
        let found = self.store.find(&in_namespace).await?;

        let mut set = RecordSet {
            namespace: namespace.to_string(),
            model: self.store.load_model(namespace).await?,
            ..Default::default()
        };
        // (target, referencing record, role)
        let mut queue: Vec<(RecordId, String, &'static str)> = Vec::new();

        for rec in found {
            let id = rec
                .id
                .ok_or_else(|| ModelError::Store("persisted record has no id".into()))?;
            set.own.push(id);
            set.types.insert(id, rec);
        }
        set.own.sort_unstable();

        for &id in &set.own {
            let label = set.types[&id].label();
            let comps = self.store.compositions_of(id).await?;
            let attrs = self.store.attributes_of(id).await?;
            for (target, role) in comps.iter().flat_map(composition_refs) {
                queue.push((target, label.clone(), role));
            }
            for (target, role) in attrs.iter().flat_map(attribute_refs) {
                queue.push((target, label.clone(), role));
            }
            set.compositions.insert(id, comps);
            set.attributes.insert(id, attrs);
        }
        for rec in set.types.values() {
            for (target, role) in record_refs(rec) {
                queue.push((target, rec.label(), role));
            }
        }

        while let Some((id, from, role)) = queue.pop() {
            if set.types.contains_key(&id) {
                continue;
            }
            let Some(rec) = self.store.get_by_id(id).await? else {
                return Err(ModelError::DanglingReference {
                    namespace: namespace.to_string(),
                    record: from,
                    target: format!("#{}", id),
                    role,
                });
            };
            for (target, role) in record_refs(&rec) {
                queue.push((target, rec.label(), role));
            }
            set.types.insert(id, rec);
        }

        debug!(
            namespace,
            own = set.own.len(),
            total = set.types.len(),
            "gathered records"
        );
        Ok(set)
    }

    /// Builds the gathered namespace into the registry's graph.
    pub fn build(&self, set: &RecordSet, ctx: &mut BuildContext<'_>) -> Result<NamespaceId> {
        let ns_id = ctx.registry.namespace_for_uri(&set.namespace);
        if let Some(model) = &set.model {
            let ns = ctx.registry.namespace_mut(ns_id)?;
            ns.version = model.version.clone();
            ns.publication_date = model.publication_date;
            for req in &model.required {
                ns.add_required(RequiredNamespace {
                    uri: req.namespace.clone(),
                    version: req.version.clone(),
                    publication_date: req.publication_date,
                    namespace: None,
                });
            }
        }

        let mut asm = Assembly {
            set,
            ctx,
            nodes: HashMap::new(),
            counters: HashMap::new(),
            built: Vec::new(),
            other_edges: Vec::new(),
        };
        for &id in &set.own {
            asm.node_for(id, "#root", "record")?;
        }
        for &id in &set.own {
            let owner = asm.node_for(id, "#root", "record")?;
            for comp in set.compositions.get(&id).into_iter().flatten() {
                asm.composition(owner, &set.types[&id], comp)?;
            }
            for attr in set.attributes.get(&id).into_iter().flatten() {
                asm.attribute(owner, &set.types[&id], attr)?;
            }
        }
        asm.attach_other_edges()?;
        asm.link_sub_types();
        for r in asm.built.clone() {
            asm.ctx.annotate(r);
        }

        info!(
            namespace = %set.namespace,
            nodes = asm.built.len(),
            "built namespace from records"
        );
        Ok(ns_id)
    }

    /// `gather` followed by `build`.
    pub async fn load(&self, namespace: &str, ctx: &mut BuildContext<'_>) -> Result<NamespaceId> {
        let set = self.gather(namespace).await?;
        self.build(&set, ctx)
    }
}

struct Assembly<'r, 'c, 'a> {
    set: &'r RecordSet,
    ctx: &'c mut BuildContext<'a>,
    nodes: HashMap<RecordId, NodeRef>,
    /// Next synthetic numeric id per namespace.
    counters: HashMap<String, u32>,
    built: Vec<NodeRef>,
    other_edges: Vec<(NodeRef, &'r TypeDefinitionRecord, &'r CompositionRecord)>,
}

fn numeric(wire_id: Option<&str>) -> Option<u32> {
    wire_id?.strip_prefix("i=")?.parse().ok()
}

impl<'r> Assembly<'r, '_, '_> {
    fn dangling(&self, record: &str, id: RecordId, role: &'static str) -> ModelError {
        ModelError::DanglingReference {
            namespace: self.set.namespace.clone(),
            record: record.to_string(),
            target: format!("#{}", id),
            role,
        }
    }

    /// Next unused `i=` identifier in `namespace`, above everything the
    /// graph and the record set already use there.
    fn synthetic_id(&mut self, namespace: &str) -> String {
        let set = self.set;
        let graph_max = self
            .ctx
            .registry
            .graph()
            .namespace_by_uri(namespace)
            .map(|ns| ns.max_numeric_id())
            .unwrap_or(0);
        let start = *self.counters.entry(namespace.to_string()).or_insert_with(|| {
            let mut max = graph_max;
            for rec in set.types.values().filter(|r| r.namespace == namespace) {
                max = max.max(numeric(rec.wire_id.as_deref()).unwrap_or(0));
            }
            if namespace == set.namespace {
                for comp in set.compositions.values().flatten() {
                    max = max.max(numeric(comp.wire_id.as_deref()).unwrap_or(0));
                }
                for attr in set.attributes.values().flatten() {
                    max = max.max(numeric(attr.wire_id.as_deref()).unwrap_or(0));
                }
            }
            max
        });
        let next = start.max(graph_max) + 1;
        self.counters.insert(namespace.to_string(), next);
        format!("i={}", next)
    }

    fn node_for(&mut self, id: RecordId, from: &str, role: &'static str) -> Result<NodeRef> {
        if let Some(r) = self.nodes.get(&id) {
            return Ok(*r);
        }
        let set = self.set;
        let rec = set.types.get(&id).ok_or_else(|| self.dangling(from, id, role))?;

        if rec.namespace != set.namespace {
            if let Some(r) = rec
                .wire_id
                .as_deref()
                .and_then(|w| self.ctx.registry.lookup(&rec.namespace, w))
            {
                self.nodes.insert(id, r);
                return Ok(r);
            }
        }

        let wire = match &rec.wire_id {
            Some(w) => w.clone(),
            None => self.synthetic_id(&rec.namespace),
        };
        let (r, _) = self.ctx.registry.resolve(rec.kind, &wire, &rec.namespace)?;
        // Registered before the links are followed so cycles end here.
        self.nodes.insert(id, r);
        self.built.push(r);
        self.fill(r, rec)?;
        Ok(r)
    }

    fn fill(&mut self, r: NodeRef, rec: &'r TypeDefinitionRecord) -> Result<()> {
        let label = rec.label();
        let super_type = rec
            .super_type_id
            .map(|id| self.node_for(id, &label, "super type"))
            .transpose()?;
        let type_definition = rec
            .type_definition_id
            .map(|id| self.node_for(id, &label, "type definition"))
            .transpose()?;
        let parent = rec
            .parent_id
            .map(|id| self.node_for(id, &label, "parent"))
            .transpose()?;
        let interfaces = rec
            .interface_ids
            .iter()
            .map(|&id| self.node_for(id, &label, "interface"))
            .collect::<Result<Vec<_>>>()?;
        let data_type = rec
            .variable
            .as_ref()
            .and_then(|v| v.data_type_id)
            .map(|id| self.node_for(id, &label, "data type"))
            .transpose()?;

        let node = self.ctx.registry.expect_node(r)?;
        node.browse_name = BrowseName::new(
            rec.browse_namespace
                .clone()
                .unwrap_or_else(|| rec.namespace.clone()),
            rec.browse_name.clone(),
        );
        node.display_name = rec.display_name.clone();
        node.description = rec.description.clone();
        node.documentation = rec.documentation.clone();
        node.categories = rec.categories.clone();
        node.symbolic_name = rec.symbolic_name.clone();

        if let Some(ty) = node.type_data_mut() {
            ty.is_abstract = rec.is_abstract;
            ty.super_type = super_type;
        }
        if let Some(inst) = node.instance_mut() {
            inst.type_definition = type_definition;
            inst.parent = parent;
            inst.modeling_rule = rec.modeling_rule;
        }
        for iface in interfaces {
            node.children.add(ChildRole::Interface, iface);
        }
        if let (Some(v), Some(info)) = (node.variable_mut(), &rec.variable) {
            apply_variable(v, info, data_type);
        }
        match &mut node.payload {
            NodePayload::Object { event_notifier, .. } => *event_notifier = rec.event_notifier,
            NodePayload::Method {
                method_declaration, ..
            } => *method_declaration = rec.method_declaration.clone(),
            NodePayload::ReferenceType {
                symmetric,
                inverse_name,
                ..
            } => {
                if let Some(info) = &rec.reference_type {
                    *symmetric = info.symmetric;
                    *inverse_name = info.inverse_name.clone();
                }
            }
            NodePayload::DataType { definition, .. } => {
                *definition = rec.definition_kind.map(|k| match k {
                    DefinitionKind::Structure => DataTypeDefinition::Structure(Vec::new()),
                    DefinitionKind::Enumeration => DataTypeDefinition::Enumeration(Vec::new()),
                });
            }
            _ => {}
        }

        // A parent in another namespace has no composition row to carry the edge.
        if let (Some(p), Some(role)) = (parent, ChildRole::for_child_kind(rec.kind)) {
            if p.namespace != r.namespace {
                if let Some(parent_node) = self.ctx.registry.node_mut(p) {
                    parent_node.children.add(role, r);
                }
            }
        }
        Ok(())
    }

    fn adopt(&mut self, owner: NodeRef, child: NodeRef, role: ChildRole) -> Result<()> {
        if role.owns_target() {
            if let Some(inst) = self.ctx.registry.expect_node(child)?.instance_mut() {
                if inst.parent.is_none() {
                    inst.parent = Some(owner);
                }
            }
        }
        self.ctx.registry.expect_node(owner)?.children.add(role, child);
        Ok(())
    }

    fn composition(
        &mut self,
        owner: NodeRef,
        owner_rec: &'r TypeDefinitionRecord,
        comp: &'r CompositionRecord,
    ) -> Result<()> {
        let label = owner_rec.label();
        match comp.role {
            CompositionRole::Object | CompositionRole::Method => {
                let (kind, role) = if comp.role == CompositionRole::Object {
                    (NodeKind::Object, ChildRole::Object)
                } else {
                    (NodeKind::Method, ChildRole::Method)
                };
                let child = match comp.child_record_id {
                    Some(id) => self.node_for(id, &label, "child")?,
                    None => {
                        let ns = comp
                            .target_namespace
                            .clone()
                            .unwrap_or_else(|| self.set.namespace.clone());
                        let wire = match &comp.wire_id {
                            Some(w) => w.clone(),
                            None => self.synthetic_id(&ns),
                        };
                        let (child, _) = self.ctx.registry.resolve(kind, &wire, &ns)?;
                        let type_definition = comp
                            .related_type_id
                            .map(|id| self.node_for(id, &label, "type definition"))
                            .transpose()?;
                        let node = self.ctx.registry.expect_node(child)?;
                        node.browse_name = BrowseName::new(
                            comp.browse_namespace.clone().unwrap_or(ns),
                            comp.name.clone(),
                        );
                        node.display_name = comp.display_name.clone().unwrap_or_else(|| comp.name.clone());
                        node.description = comp.description.clone();
                        if let Some(inst) = node.instance_mut() {
                            inst.type_definition = type_definition;
                            inst.modeling_rule = comp.modeling_rule;
                        }
                        self.built.push(child);
                        child
                    }
                };
                self.adopt(owner, child, role)
            }
            CompositionRole::Event => {
                let id = comp
                    .related_type_id
                    .ok_or_else(|| ModelError::DanglingReference {
                        namespace: self.set.namespace.clone(),
                        record: label.clone(),
                        target: comp.name.clone(),
                        role: "event type",
                    })?;
                let event = self.node_for(id, &label, "event type")?;
                self.adopt(owner, event, ChildRole::Event)
            }
            CompositionRole::Other => {
                self.other_edges.push((owner, owner_rec, comp));
                Ok(())
            }
        }
    }

    fn attribute(
        &mut self,
        owner: NodeRef,
        owner_rec: &'r TypeDefinitionRecord,
        attr: &'r AttributeRecord,
    ) -> Result<()> {
        let label = owner_rec.label();
        match attr.kind {
            AttributeKind::Property | AttributeKind::DataVariable => {
                let (kind, role) = if attr.kind == AttributeKind::Property {
                    (NodeKind::Property, ChildRole::Property)
                } else {
                    (NodeKind::DataVariable, ChildRole::DataVariable)
                };
                let child = match attr.child_record_id {
                    Some(id) => self.node_for(id, &label, "child")?,
                    None => {
                        let ns = attr
                            .target_namespace
                            .clone()
                            .unwrap_or_else(|| self.set.namespace.clone());
                        let wire = match &attr.wire_id {
                            Some(w) => w.clone(),
                            None => self.synthetic_id(&ns),
                        };
                        let (child, _) = self.ctx.registry.resolve(kind, &wire, &ns)?;
                        let type_definition = attr
                            .type_definition_id
                            .map(|id| self.node_for(id, &label, "type definition"))
                            .transpose()?;
                        let data_type = attr
                            .variable
                            .as_ref()
                            .and_then(|v| v.data_type_id)
                            .map(|id| self.node_for(id, &label, "data type"))
                            .transpose()?;
                        let node = self.ctx.registry.expect_node(child)?;
                        node.browse_name = BrowseName::new(
                            attr.browse_namespace.clone().unwrap_or(ns),
                            attr.name.clone(),
                        );
                        node.display_name = attr.display_name.clone().unwrap_or_else(|| attr.name.clone());
                        node.description = attr.description.clone();
                        node.documentation = attr.documentation.clone();
                        node.symbolic_name = attr.symbolic_name.clone();
                        node.categories = attr.categories.clone();
                        if let Some(inst) = node.instance_mut() {
                            inst.type_definition = type_definition;
                            inst.modeling_rule = attr.modeling_rule;
                        }
                        if let (Some(v), Some(info)) = (node.variable_mut(), &attr.variable) {
                            apply_variable(v, info, data_type);
                        }
                        self.built.push(child);
                        child
                    }
                };
                self.adopt(owner, child, role)
            }
            AttributeKind::StructureField => {
                let id = attr.data_type_id.ok_or_else(|| ModelError::DanglingReference {
                    namespace: self.set.namespace.clone(),
                    record: label.clone(),
                    target: attr.name.clone(),
                    role: "field data type",
                })?;
                let data_type = self.node_for(id, &label, "field data type")?;
                let field = StructureField {
                    name: attr.name.clone(),
                    data_type,
                    value_rank: attr.value_rank,
                    array_dimensions: attr.array_dimensions.clone(),
                    is_optional: attr.is_optional,
                    description: attr.description.clone(),
                };
                if let NodePayload::DataType { definition, .. } =
                    &mut self.ctx.registry.expect_node(owner)?.payload
                {
                    match definition.get_or_insert_with(|| DataTypeDefinition::Structure(Vec::new())) {
                        DataTypeDefinition::Structure(fields) => fields.push(field),
                        DataTypeDefinition::Enumeration(_) => {
                            return Err(ModelError::InvalidDocument(format!(
                                "record {} mixes structure and enumeration fields",
                                label
                            )))
                        }
                    }
                }
                Ok(())
            }
            AttributeKind::EnumField => {
                let field = EnumField {
                    name: attr.name.clone(),
                    value: attr.enum_value.unwrap_or(i64::from(attr.ordinal)),
                    display_name: attr.display_name.clone(),
                    description: attr.description.clone(),
                };
                if let NodePayload::DataType { definition, .. } =
                    &mut self.ctx.registry.expect_node(owner)?.payload
                {
                    match definition.get_or_insert_with(|| DataTypeDefinition::Enumeration(Vec::new())) {
                        DataTypeDefinition::Enumeration(fields) => fields.push(field),
                        DataTypeDefinition::Structure(_) => {
                            return Err(ModelError::InvalidDocument(format!(
                                "record {} mixes structure and enumeration fields",
                                label
                            )))
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Other edges last: a peer without a record of its own only exists
    /// once its owner's attributes are built.
    fn attach_other_edges(&mut self) -> Result<()> {
        for (owner, owner_rec, comp) in std::mem::take(&mut self.other_edges) {
            let label = owner_rec.label();
            let rt_id = comp
                .reference_type_id
                .ok_or_else(|| ModelError::DanglingReference {
                    namespace: self.set.namespace.clone(),
                    record: label.clone(),
                    target: comp.name.clone(),
                    role: "reference type",
                })?;
            let reference_type = self.node_for(rt_id, &label, "reference type")?;

            let set = self.set;
            let peer = match comp.related_type_id {
                Some(id) => self.node_for(id, &label, "reference target")?,
                None => {
                    let ns = comp
                        .target_namespace
                        .as_deref()
                        .unwrap_or(&set.namespace);
                    let wire = comp.wire_id.as_deref().unwrap_or_default();
                    self.ctx.registry.lookup(ns, wire).ok_or_else(|| {
                        ModelError::DanglingReference {
                            namespace: set.namespace.clone(),
                            record: label.clone(),
                            target: format!("nsu={};{}", ns, wire),
                            role: "reference target",
                        }
                    })?
                }
            };

            let (source, target) = if comp.is_inverse {
                (peer, owner)
            } else {
                (owner, peer)
            };
            let forward = OtherEdge {
                reference_type,
                peer: target,
            };
            let inverse = OtherEdge {
                reference_type,
                peer: source,
            };
            let node = self.ctx.registry.expect_node(source)?;
            if !node.referenced.contains(&forward) {
                node.referenced.push(forward);
            }
            let node = self.ctx.registry.expect_node(target)?;
            if !node.referencing.contains(&inverse) {
                node.referencing.push(inverse);
            }
        }
        Ok(())
    }

    fn link_sub_types(&mut self) {
        for r in self.built.clone() {
            let Some(sup) = self.ctx.registry.node(r).and_then(|n| n.super_type()) else {
                continue;
            };
            if let Some(ty) = self
                .ctx
                .registry
                .node_mut(sup)
                .and_then(|n| n.type_data_mut())
            {
                ty.sub_types.insert(r);
            }
        }
    }
}

fn apply_variable(v: &mut VariableData, info: &VariableInfo, data_type: Option<NodeRef>) {
    v.data_type = data_type;
    v.value_rank = info.value_rank;
    v.array_dimensions = info.array_dimensions.clone();
    v.value = info.value.clone();
    v.access_level = info.access_level;
    v.user_access_level = info.user_access_level;
    v.historizing = info.historizing;
    v.engineering_units = info.engineering_units.clone();
    v.eu_range = info.eu_range.clone();
    v.instrument_range = info.instrument_range.clone();
}
