//! Nodeset documents → node graph.
//!
//! Construction runs in numbered phases over all supplied documents at
//! once. Traversal order everywhere is: documents in the order supplied
//! (dependency order), elements in document order, references in document
//! order. That order decides which parent wins when an instance is claimed
//! twice.
//!
//! 1. index: key every element, collect super-type links, classify kinds
//! 2. structural: resolve every element through the registry, copy scalars
//! 3. forward edges: type definitions, super types, data types, modelling
//!    rules, child edges, other edges
//! 4. back edges: parents, sub-type sets, inverse other edges
//! 5. fold: EngineeringUnits / EURange / InstrumentRange into side-info
//! 6. strip: drop attributes a type inherits from its ancestors

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::context::BuildContext;
use crate::error::{BatchWarning, ModelError, Result};
use crate::model::{
    BrowseName, ChildRole, DataTypeDefinition, EncodedValue, EnumField, NamespaceId, NodeKind,
    NodePayload, NodeRef, OtherEdge, RequiredNamespace, SideInfo, SideInfoKind, StructureField,
};
use crate::wire::well_known::{self, WellKnownReference};
use crate::wire::{
    GlobalNodeId, NamespaceTable, NodeClass, NodeSetDocument, WireDefinition, WireNode,
    WireReference, WireValue,
};

#[derive(Debug, Default)]
pub struct WireGraphBuilder<'d> {
    documents: Vec<&'d NodeSetDocument>,
}

struct Entry<'d> {
    doc: usize,
    wire: &'d WireNode,
    id: GlobalNodeId,
    kind: NodeKind,
}

impl<'d> WireGraphBuilder<'d> {
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
        }
    }

    /// Documents must be added in dependency order.
    pub fn add_document(&mut self, doc: &'d NodeSetDocument) -> &mut Self {
        self.documents.push(doc);
        self
    }

    pub fn with_documents(docs: impl IntoIterator<Item = &'d NodeSetDocument>) -> Self {
        Self {
            documents: docs.into_iter().collect(),
        }
    }

    /// Builds every supplied document into the registry's graph. Returns the
    /// namespaces declared by the documents' model entries, in order.
    pub fn build(&self, ctx: &mut BuildContext<'_>) -> Result<Vec<NamespaceId>> {
        let mut run = Run {
            ctx,
            docs: &self.documents,
            tables: self.documents.iter().map(|d| d.namespace_table()).collect(),
            entries: Vec::new(),
            index: HashMap::new(),
            refs: Vec::new(),
            supers: HashMap::new(),
            property_targets: HashSet::new(),
            owned: Vec::new(),
            parent_hints: Vec::new(),
            inverse_other: Vec::new(),
            dropped: HashSet::new(),
            models: Vec::new(),
        };
        run.index()?;
        run.structural()?;
        run.forward_edges()?;
        run.back_edges();
        run.fold()?;
        run.strip()?;
        run.scrub();
        run.annotate();

        for id in &run.models {
            if let Some(ns) = run.ctx.registry.namespace(*id) {
                info!(namespace = %ns.uri, nodes = ns.len(), "built namespace from nodeset");
            }
        }
        Ok(run.models)
    }
}

struct Run<'d, 'c, 'a> {
    ctx: &'c mut BuildContext<'a>,
    docs: &'c [&'d NodeSetDocument],
    tables: Vec<NamespaceTable>,
    entries: Vec<Entry<'d>>,
    index: HashMap<GlobalNodeId, usize>,
    refs: Vec<NodeRef>,
    supers: HashMap<GlobalNodeId, GlobalNodeId>,
    property_targets: HashSet<GlobalNodeId>,
    /// (parent, child) in traversal order.
    owned: Vec<(NodeRef, NodeRef)>,
    /// (child, parent) from `ParentNodeId` attributes.
    parent_hints: Vec<(NodeRef, NodeRef)>,
    /// (peer, edge seen from the peer) for other edges.
    inverse_other: Vec<(NodeRef, OtherEdge)>,
    /// Nodes removed by the fold and strip phases.
    dropped: HashSet<NodeRef>,
    models: Vec<NamespaceId>,
}

impl<'d> Run<'d, '_, '_> {
    fn resolve_id(&self, doc: usize, raw: &str) -> Result<GlobalNodeId> {
        self.tables[doc].resolve(raw, &self.docs[doc].aliases)
    }

    // ── Phase 1: index ──

    fn index(&mut self) -> Result<()> {
        let docs = self.docs;
        for (d, &doc) in docs.iter().enumerate() {
            for model in &doc.models {
                let id = self.ctx.registry.namespace_for_uri(&model.model_uri);
                let ns = self.ctx.registry.namespace_mut(id)?;
                ns.version = model.version.clone();
                ns.publication_date = model.publication_date;
                ns.last_modified = doc.last_modified;
                for req in &model.required {
                    ns.add_required(RequiredNamespace {
                        uri: req.model_uri.clone(),
                        version: req.version.clone(),
                        publication_date: req.publication_date,
                        namespace: None,
                    });
                }
                if !self.models.contains(&id) {
                    self.models.push(id);
                }
            }

            for wire in &doc.nodes {
                let id = self.resolve_id(d, &wire.node_id)?;
                if wire.class == NodeClass::View {
                    self.ctx.diagnostics.warn(BatchWarning::UnsupportedNode {
                        namespace: id.namespace_uri.clone(),
                        node: id.identifier.clone(),
                        element: wire.class.element_name().to_string(),
                    });
                    continue;
                }
                if self.index.contains_key(&id) {
                    self.ctx.diagnostics.warn(BatchWarning::DuplicateNode {
                        namespace: id.namespace_uri.clone(),
                        node: id.identifier.clone(),
                    });
                    continue;
                }

                for r in &wire.references {
                    let rt = self.resolve_id(d, &r.reference_type)?;
                    if !rt.is_base() {
                        continue;
                    }
                    let target = self.resolve_id(d, &r.target)?;
                    match WellKnownReference::classify(&rt.identifier) {
                        Some(WellKnownReference::Subtype) => {
                            if r.is_forward {
                                self.supers.insert(target, id.clone());
                            } else {
                                self.supers.insert(id.clone(), target);
                            }
                        }
                        Some(WellKnownReference::Property) => {
                            if r.is_forward {
                                self.property_targets.insert(target);
                            } else {
                                self.property_targets.insert(id.clone());
                            }
                        }
                        _ => {}
                    }
                }

                self.index.insert(id.clone(), self.entries.len());
                self.entries.push(Entry {
                    doc: d,
                    wire,
                    id,
                    kind: NodeKind::Object,
                });
            }
        }

        for i in 0..self.entries.len() {
            let kind = self.classify(&self.entries[i])?;
            self.entries[i].kind = kind;
        }
        debug!(elements = self.entries.len(), "indexed nodeset elements");
        Ok(())
    }

    fn classify(&self, entry: &Entry<'d>) -> Result<NodeKind> {
        Ok(match entry.wire.class {
            NodeClass::Object => NodeKind::Object,
            NodeClass::ObjectType => {
                let root = GlobalNodeId::base(well_known::BASE_INTERFACE_TYPE);
                if entry.wire.is_abstract && self.descends_from(&entry.id, &root) {
                    NodeKind::Interface
                } else {
                    NodeKind::ObjectType
                }
            }
            NodeClass::Variable => {
                let mut type_def = None;
                for r in &entry.wire.references {
                    let rt = self.resolve_id(entry.doc, &r.reference_type)?;
                    if r.is_forward && rt.is_base_node(well_known::HAS_TYPE_DEFINITION) {
                        type_def = Some(self.resolve_id(entry.doc, &r.target)?);
                    }
                }
                match type_def {
                    Some(t) if t.is_base_node(well_known::PROPERTY_TYPE) => NodeKind::Property,
                    None if self.property_targets.contains(&entry.id) => NodeKind::Property,
                    _ => NodeKind::DataVariable,
                }
            }
            NodeClass::VariableType => NodeKind::VariableType,
            NodeClass::DataType => NodeKind::DataType,
            NodeClass::Method => NodeKind::Method,
            NodeClass::ReferenceType => NodeKind::ReferenceType,
            NodeClass::View => NodeKind::Object,
        })
    }

    /// Is `id` the type `root` or a subtype of it? Looks at links collected
    /// from the documents first, then at namespaces already in the graph.
    fn descends_from(&self, id: &GlobalNodeId, root: &GlobalNodeId) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(id.clone());
        while let Some(c) = current {
            if &c == root {
                return true;
            }
            if !seen.insert(c.clone()) {
                return false;
            }
            current = match self.supers.get(&c) {
                Some(s) => Some(s.clone()),
                None => {
                    let graph = self.ctx.registry.graph();
                    let Some(r) = graph.lookup(&c.namespace_uri, &c.identifier) else {
                        return false;
                    };
                    return graph.super_chain(r).into_iter().any(|s| {
                        graph
                            .get(s)
                            .map(|n| {
                                graph.uri_of(s) == root.namespace_uri
                                    && n.identifier == root.identifier
                            })
                            .unwrap_or(false)
                    });
                }
            };
        }
        false
    }

    // ── Phase 2: structural ──

    fn structural(&mut self) -> Result<()> {
        for i in 0..self.entries.len() {
            let entry = &self.entries[i];
            let (r, _) = self.ctx.registry.resolve(
                entry.kind,
                &entry.id.identifier,
                &entry.id.namespace_uri,
            )?;
            self.refs.push(r);

            let wire = entry.wire;
            let (bn_uri, bn_name) = self.tables[entry.doc].resolve_qualified_name(&wire.browse_name)?;
            let node = self.ctx.registry.expect_node(r)?;
            node.browse_name = BrowseName::new(bn_uri, bn_name);
            node.display_name = wire
                .display_name
                .clone()
                .unwrap_or_else(|| node.browse_name.name.clone());
            node.description = wire.description.clone();
            node.documentation = wire.documentation.clone();
            node.categories = wire.categories.clone();
            node.symbolic_name = wire.symbolic_name.clone();

            if let Some(ty) = node.type_data_mut() {
                ty.is_abstract = wire.is_abstract;
            }
            if let Some(v) = node.variable_mut() {
                v.value_rank = wire.value_rank;
                v.array_dimensions = wire.array_dimensions.clone();
                v.value = wire.value.as_ref().map(encoded);
                v.access_level = wire.access_level;
                v.user_access_level = wire.user_access_level;
                v.historizing = wire.historizing;
            }
            match &mut node.payload {
                NodePayload::Object { event_notifier, .. } => *event_notifier = wire.event_notifier,
                NodePayload::Method {
                    method_declaration, ..
                } => *method_declaration = wire.method_declaration_id.clone(),
                NodePayload::ReferenceType {
                    symmetric,
                    inverse_name,
                    ..
                } => {
                    *symmetric = wire.symmetric;
                    *inverse_name = wire.inverse_name.clone();
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ── Phase 3: forward edges ──

    /// Handle for `target` as seen from `source`, enforcing that the target's
    /// namespace is one the source namespace declares as required.
    fn target(&self, source: usize, target: &GlobalNodeId, role: &'static str) -> Result<NodeRef> {
        let src = &self.entries[source].id;
        if target.namespace_uri != src.namespace_uri {
            let allowed = self
                .ctx
                .registry
                .graph()
                .namespace_by_uri(&src.namespace_uri)
                .map(|ns| ns.requires(&target.namespace_uri))
                .unwrap_or_else(|| target.is_base());
            if !allowed {
                return Err(ModelError::MissingDependency {
                    namespace: src.namespace_uri.clone(),
                    missing: vec![target.namespace_uri.clone()],
                });
            }
        }
        if let Some(i) = self.index.get(target) {
            return Ok(self.refs[*i]);
        }
        self.ctx
            .registry
            .lookup(&target.namespace_uri, &target.identifier)
            .ok_or_else(|| ModelError::UnresolvedReference {
                namespace: src.namespace_uri.clone(),
                node: src.identifier.clone(),
                target: target.to_string(),
                role,
            })
    }

    fn kind_of(&self, r: NodeRef) -> Option<NodeKind> {
        self.ctx.registry.node(r).map(|n| n.kind())
    }

    fn forward_edges(&mut self) -> Result<()> {
        for i in 0..self.entries.len() {
            let (doc, wire, r) = (self.entries[i].doc, self.entries[i].wire, self.refs[i]);

            if let Some(dt) = &wire.data_type {
                if matches!(
                    self.entries[i].kind,
                    NodeKind::DataVariable | NodeKind::Property | NodeKind::VariableType
                ) {
                    let gid = self.resolve_id(doc, dt)?;
                    let target = self.target(i, &gid, "data type")?;
                    if let Some(v) = self.ctx.registry.expect_node(r)?.variable_mut() {
                        v.data_type = Some(target);
                    }
                }
            }

            if let Some(def) = &wire.definition {
                if self.entries[i].kind == NodeKind::DataType {
                    let definition = self.definition(i, def)?;
                    if let NodePayload::DataType { definition: slot, .. } =
                        &mut self.ctx.registry.expect_node(r)?.payload
                    {
                        *slot = Some(definition);
                    }
                }
            }

            for reference in &wire.references {
                self.reference(i, reference)?;
            }

            if let Some(parent) = &wire.parent_node_id {
                let gid = self.resolve_id(doc, parent)?;
                match self.target(i, &gid, "parent") {
                    Ok(p) => self.parent_hints.push((r, p)),
                    Err(e) => {
                        debug!(error = %e, "ParentNodeId not resolved");
                        let id = &self.entries[i].id;
                        let warning = BatchWarning::UnresolvedParent {
                            namespace: id.namespace_uri.clone(),
                            node: id.identifier.clone(),
                            parent: gid.to_string(),
                        };
                        self.ctx.diagnostics.warn(warning);
                    }
                }
            }
        }
        Ok(())
    }

    fn reference(&mut self, i: usize, reference: &WireReference) -> Result<()> {
        let doc = self.entries[i].doc;
        let me = self.refs[i];
        let rt = self.resolve_id(doc, &reference.reference_type)?;
        let target_id = self.resolve_id(doc, &reference.target)?;
        let well_known = if rt.is_base() {
            WellKnownReference::classify(&rt.identifier)
        } else {
            None
        };

        match well_known {
            Some(WellKnownReference::TypeDefinition) if reference.is_forward => {
                let target = self.target(i, &target_id, "type definition")?;
                if let Some(inst) = self.ctx.registry.expect_node(me)?.instance_mut() {
                    inst.type_definition = Some(target);
                }
                return Ok(());
            }
            Some(WellKnownReference::Subtype) => {
                let other = self.target(i, &target_id, "super type")?;
                let (sub, sup) = if reference.is_forward {
                    (other, me)
                } else {
                    (me, other)
                };
                if let Some(ty) = self.ctx.registry.expect_node(sub)?.type_data_mut() {
                    ty.super_type = Some(sup);
                }
                return Ok(());
            }
            Some(WellKnownReference::ModellingRule) if reference.is_forward => {
                if let Some(rule) = target_id
                    .is_base()
                    .then(|| well_known::modeling_rule_for(&target_id.identifier))
                    .flatten()
                {
                    if let Some(inst) = self.ctx.registry.expect_node(me)?.instance_mut() {
                        inst.modeling_rule = Some(rule);
                        return Ok(());
                    }
                }
            }
            Some(
                kind @ (WellKnownReference::Component
                | WellKnownReference::Property
                | WellKnownReference::Interface
                | WellKnownReference::GeneratesEvent),
            ) => {
                let other = self.target(i, &target_id, "child")?;
                let (parent, child) = if reference.is_forward {
                    (me, other)
                } else {
                    (other, me)
                };
                if let Some(role) = self.kind_of(child).and_then(|k| child_role(kind, k)) {
                    let added = self
                        .ctx
                        .registry
                        .expect_node(parent)?
                        .children
                        .add(role, child);
                    if added && role.owns_target() {
                        self.owned.push((parent, child));
                    }
                    return Ok(());
                }
            }
            _ => {}
        }

        // Anything else is an "other" edge tagged with its reference type.
        let reference_type = self.target(i, &rt, "reference type")?;
        let other = self.target(i, &target_id, "reference target")?;
        let (source, peer) = if reference.is_forward {
            (me, other)
        } else {
            (other, me)
        };
        let edge = OtherEdge {
            reference_type,
            peer,
        };
        let node = self.ctx.registry.expect_node(source)?;
        if !node.referenced.contains(&edge) {
            node.referenced.push(edge);
            self.inverse_other.push((
                peer,
                OtherEdge {
                    reference_type,
                    peer: source,
                },
            ));
        }
        Ok(())
    }

    fn definition(&self, i: usize, def: &WireDefinition) -> Result<DataTypeDefinition> {
        let doc = self.entries[i].doc;
        let enumeration = def.is_enumeration()
            || self.descends_from(
                &self.entries[i].id,
                &GlobalNodeId::base(well_known::ENUMERATION),
            );
        if enumeration {
            let fields = def
                .fields
                .iter()
                .enumerate()
                .map(|(pos, f)| EnumField {
                    name: f.name.clone(),
                    value: f.value.unwrap_or(pos as i64),
                    display_name: f.display_name.clone(),
                    description: f.description.clone(),
                })
                .collect();
            return Ok(DataTypeDefinition::Enumeration(fields));
        }

        let mut fields = Vec::with_capacity(def.fields.len());
        for f in &def.fields {
            let dt = f.data_type.as_deref().unwrap_or(well_known::BASE_DATA_TYPE);
            let gid = self.resolve_id(doc, dt)?;
            fields.push(StructureField {
                name: f.name.clone(),
                data_type: self.target(i, &gid, "data type")?,
                value_rank: f.value_rank,
                array_dimensions: f.array_dimensions.clone(),
                is_optional: f.is_optional,
                description: f.description.clone(),
            });
        }
        Ok(DataTypeDefinition::Structure(fields))
    }

    // ── Phase 4: back edges ──

    fn back_edges(&mut self) {
        for (parent, child) in std::mem::take(&mut self.owned) {
            let conflict = match self
                .ctx
                .registry
                .node_mut(child)
                .and_then(|n| n.instance_mut())
            {
                Some(inst) => match inst.parent {
                    None => {
                        inst.parent = Some(parent);
                        None
                    }
                    Some(kept) if kept != parent => Some(kept),
                    Some(_) => None,
                },
                None => None,
            };
            if let Some(kept) = conflict {
                let graph = self.ctx.registry.graph();
                let warning = BatchWarning::ParentConflict {
                    namespace: graph.uri_of(child).to_string(),
                    node: graph[child].identifier.clone(),
                    kept: graph.qualified(kept),
                    rejected: graph.qualified(parent),
                };
                self.ctx.diagnostics.warn(warning);
            }
        }

        // ParentNodeId only fills in a parent no reference supplied.
        for (child, parent) in std::mem::take(&mut self.parent_hints) {
            if let Some(inst) = self
                .ctx
                .registry
                .node_mut(child)
                .and_then(|n| n.instance_mut())
            {
                if inst.parent.is_none() {
                    inst.parent = Some(parent);
                }
            }
        }

        for (peer, edge) in std::mem::take(&mut self.inverse_other) {
            if let Some(node) = self.ctx.registry.node_mut(peer) {
                if !node.referencing.contains(&edge) {
                    node.referencing.push(edge);
                }
            }
        }

        for r in self.refs.clone() {
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

    // ── Phase 5: fold ──

    fn fold(&mut self) -> Result<()> {
        let before = self.dropped.len();
        for r in self.refs.clone() {
            let Some(node) = self.ctx.registry.node(r) else {
                continue;
            };
            if !node.kind().is_variable() {
                continue;
            }
            let candidates: Vec<NodeRef> = node
                .children
                .properties
                .iter()
                .chain(node.children.data_variables.iter())
                .copied()
                .collect();

            for child in candidates {
                let graph = self.ctx.registry.graph();
                let Some(c) = graph.get(child) else {
                    continue;
                };
                let Some(kind) = SideInfoKind::from_browse_name(&c.browse_name.name) else {
                    continue;
                };
                if !c.children.is_empty() || !c.referenced.is_empty() || !c.referencing.is_empty()
                {
                    continue;
                }
                let info = SideInfo {
                    identifier: c.identifier.clone(),
                    value: c.variable().and_then(|v| v.value.clone()),
                    modeling_rule: c.instance().and_then(|i| i.modeling_rule),
                };

                let parent = self.ctx.registry.expect_node(r)?;
                parent.children.remove(child);
                if let Some(v) = parent.variable_mut() {
                    *v.side_info_mut(kind) = Some(info);
                }
                self.ctx.registry.discard(child);
                self.dropped.insert(child);
            }
        }
        if self.dropped.len() > before {
            debug!(count = self.dropped.len() - before, "folded side-info children");
        }
        Ok(())
    }

    // ── Phase 6: strip ──

    fn strip(&mut self) -> Result<()> {
        let order = self.type_order();
        let before = self.dropped.len();

        for t in order {
            let graph = self.ctx.registry.graph();
            let contributors = graph.contributors(t);
            if contributors.is_empty() {
                continue;
            }
            let mut inherited: HashSet<String> = HashSet::new();
            let mut inherited_fields: HashSet<String> = HashSet::new();
            for c in &contributors {
                let Some(cn) = graph.get(*c) else { continue };
                for child in cn
                    .children
                    .properties
                    .iter()
                    .chain(cn.children.data_variables.iter())
                {
                    if let Some(n) = graph.get(*child) {
                        inherited.insert(n.browse_name.name.clone());
                    }
                }
                if let Some(def) = cn.data_type_definition() {
                    inherited_fields.extend(def.field_names().into_iter().map(String::from));
                }
            }

            let Some(node) = graph.get(t) else { continue };
            let strip: Vec<NodeRef> = node
                .children
                .properties
                .iter()
                .chain(node.children.data_variables.iter())
                .copied()
                .filter(|c| {
                    graph
                        .get(*c)
                        .map(|n| inherited.contains(&n.browse_name.name))
                        .unwrap_or(false)
                })
                .collect();

            let node = self.ctx.registry.expect_node(t)?;
            for c in &strip {
                node.children.remove(*c);
            }
            if let NodePayload::DataType {
                definition: Some(DataTypeDefinition::Structure(fields)),
                ..
            } = &mut node.payload
            {
                fields.retain(|f| !inherited_fields.contains(&f.name));
            }
            for c in strip {
                self.discard_subtree(c);
            }
        }

        if self.dropped.len() > before {
            debug!(count = self.dropped.len() - before, "stripped inherited attributes");
        }
        Ok(())
    }

    /// Built type nodes, every super type before its sub types.
    fn type_order(&self) -> Vec<NodeRef> {
        let graph = self.ctx.registry.graph();
        let mut types: Vec<(usize, NodeRef)> = self
            .refs
            .iter()
            .filter(|r| graph.get(**r).map(|n| n.kind().is_type()).unwrap_or(false))
            .map(|r| (graph.super_chain(*r).len(), *r))
            .collect();
        types.sort_by_key(|(depth, _)| *depth);
        types.into_iter().map(|(_, r)| r).collect()
    }

    fn discard_subtree(&mut self, r: NodeRef) {
        if !self.dropped.insert(r) {
            return;
        }
        let Some(node) = self.ctx.registry.discard(r) else {
            return;
        };
        for (_, child) in node.children.owned() {
            let owned_here = self
                .ctx
                .registry
                .node(child)
                .and_then(|c| c.parent())
                .map(|p| p == r)
                .unwrap_or(false);
            if owned_here {
                self.discard_subtree(child);
            }
        }
    }

    /// Removes every edge that points at a discarded node.
    fn scrub(&mut self) {
        if self.dropped.is_empty() {
            return;
        }
        let dropped = std::mem::take(&mut self.dropped);
        for r in self.refs.clone() {
            let Some(node) = self.ctx.registry.node_mut(r) else {
                continue;
            };
            for d in &dropped {
                node.children.remove(*d);
            }
            node.referenced.retain(|e| !dropped.contains(&e.peer));
            node.referencing.retain(|e| !dropped.contains(&e.peer));
            if let Some(inst) = node.instance_mut() {
                if inst.parent.is_some_and(|p| dropped.contains(&p)) {
                    inst.parent = None;
                }
            }
        }
    }

    fn annotate(&mut self) {
        for r in self.refs.clone() {
            self.ctx.annotate(r);
        }
    }
}

fn child_role(reference: WellKnownReference, child: NodeKind) -> Option<ChildRole> {
    match reference {
        WellKnownReference::Component => ChildRole::for_child_kind(child),
        WellKnownReference::Property if child.is_variable() => Some(ChildRole::Property),
        WellKnownReference::Interface
            if matches!(child, NodeKind::Interface | NodeKind::ObjectType) =>
        {
            Some(ChildRole::Interface)
        }
        WellKnownReference::GeneratesEvent if child == NodeKind::ObjectType => {
            Some(ChildRole::Event)
        }
        _ => None,
    }
}

fn encoded(value: &WireValue) -> EncodedValue {
    match value {
        WireValue::Null => EncodedValue::Null,
        WireValue::Xml(xml) => EncodedValue::Xml(xml.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoAnnotation;
    use crate::error::Diagnostics;
    use crate::model::{ModelingRule, NodeGraph};
    use crate::registry::IdentityRegistry;
    use crate::testing::{build, BASE, PUMPS};
    use crate::wire::parse_nodeset;

    fn node<'g>(graph: &'g NodeGraph, id: &str) -> &'g crate::model::Node {
        let r = graph.lookup("urn:pumps", id).unwrap();
        &graph[r]
    }

    #[test]
    fn classifies_properties_and_interfaces() {
        let (graph, _) = build(&[BASE, PUMPS]);
        assert_eq!(node(&graph, "i=1002").kind(), NodeKind::Property);
        assert_eq!(node(&graph, "i=1003").kind(), NodeKind::DataVariable);
        assert_eq!(node(&graph, "i=1020").kind(), NodeKind::Interface);
    }

    #[test]
    fn installs_child_edges_and_parents() {
        let (graph, _) = build(&[BASE, PUMPS]);
        let ty = node(&graph, "i=1001");
        assert_eq!(ty.children.properties.len(), 1);
        assert_eq!(ty.children.data_variables.len(), 1);
        let serial = node(&graph, "i=1002");
        assert_eq!(serial.parent(), Some(ty.handle));
        assert_eq!(
            serial.instance().unwrap().modeling_rule,
            Some(ModelingRule::Mandatory)
        );
        let base = graph.lookup(well_known::UA_NAMESPACE_URI, "i=58").unwrap();
        assert_eq!(ty.super_type(), Some(base));
        assert!(graph[base].type_data().unwrap().sub_types.contains(&ty.handle));
    }

    #[test]
    fn folds_range_into_side_info() {
        let (graph, _) = build(&[BASE, PUMPS]);
        let speed = node(&graph, "i=1003");
        let info = speed.variable().unwrap().eu_range.as_ref().unwrap();
        assert_eq!(info.identifier, "i=1004");
        assert!(speed.children.properties.is_empty());
        assert!(graph.lookup("urn:pumps", "i=1004").is_none());
    }

    #[test]
    fn strips_attribute_declared_by_ancestor() {
        let (graph, _) = build(&[BASE, PUMPS]);
        let big = node(&graph, "i=1010");
        let names: Vec<&str> = big
            .children
            .properties
            .iter()
            .map(|r| graph[*r].browse_name.name.as_str())
            .collect();
        assert_eq!(names, vec!["Capacity"]);
        assert!(graph.lookup("urn:pumps", "i=1011").is_none());
    }

    #[test]
    fn views_are_skipped_with_warning() {
        let (graph, diags) = build(&[BASE, PUMPS]);
        assert!(graph.lookup("urn:pumps", "i=5000").is_none());
        assert!(diags
            .warnings()
            .iter()
            .any(|w| matches!(w, BatchWarning::UnsupportedNode { .. })));
    }

    #[test]
    fn unresolved_type_definition_is_fatal() {
        let docs = [parse_nodeset(PUMPS).unwrap()];
        let mut registry = IdentityRegistry::new();
        let mut diagnostics = Diagnostics::new();
        let mut annotator = NoAnnotation;
        let mut ctx = BuildContext::new(&mut registry, &mut diagnostics, &mut annotator);
        let err = WireGraphBuilder::with_documents(docs.iter())
            .build(&mut ctx)
            .unwrap_err();
        assert!(matches!(err, ModelError::UnresolvedReference { .. }), "{err}");
    }

    #[test]
    fn reference_into_undeclared_namespace_is_missing_dependency() {
        let other = r#"<UANodeSet>
  <NamespaceUris><Uri>urn:b</Uri><Uri>urn:a</Uri></NamespaceUris>
  <Models><Model ModelUri="urn:b" /></Models>
  <UAObject NodeId="ns=1;i=1" BrowseName="1:X">
    <References><Reference ReferenceType="i=40">ns=2;i=7</Reference></References>
  </UAObject>
</UANodeSet>"#;
        let docs = [parse_nodeset(BASE).unwrap(), parse_nodeset(other).unwrap()];
        let mut registry = IdentityRegistry::new();
        let mut diagnostics = Diagnostics::new();
        let mut annotator = NoAnnotation;
        let mut ctx = BuildContext::new(&mut registry, &mut diagnostics, &mut annotator);
        let err = WireGraphBuilder::with_documents(docs.iter())
            .build(&mut ctx)
            .unwrap_err();
        match err {
            ModelError::MissingDependency { namespace, missing } => {
                assert_eq!(namespace, "urn:b");
                assert_eq!(missing, vec!["urn:a".to_string()]);
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn second_parent_warns_and_first_wins() {
        let doc = r#"<UANodeSet>
  <NamespaceUris><Uri>urn:c</Uri></NamespaceUris>
  <Models><Model ModelUri="urn:c" /></Models>
  <UAObject NodeId="ns=1;i=1" BrowseName="1:A">
    <References><Reference ReferenceType="i=47">ns=1;i=3</Reference><Reference ReferenceType="i=40">i=58</Reference></References>
  </UAObject>
  <UAObject NodeId="ns=1;i=2" BrowseName="1:B">
    <References><Reference ReferenceType="i=47">ns=1;i=3</Reference><Reference ReferenceType="i=40">i=58</Reference></References>
  </UAObject>
  <UAObject NodeId="ns=1;i=3" BrowseName="1:C">
    <References><Reference ReferenceType="i=40">i=58</Reference></References>
  </UAObject>
</UANodeSet>"#;
        let (graph, diags) = build(&[BASE, doc]);
        let a = graph.lookup("urn:c", "i=1").unwrap();
        let c = graph.lookup("urn:c", "i=3").unwrap();
        assert_eq!(graph[c].parent(), Some(a));
        assert_eq!(diags.warnings().len(), 1);
        assert!(matches!(
            &diags.warnings()[0],
            BatchWarning::ParentConflict { node, .. } if node == "i=3"
        ));
    }

    #[test]
    fn unknown_parent_node_id_is_reported() {
        let doc = r#"<UANodeSet>
  <NamespaceUris><Uri>urn:e</Uri></NamespaceUris>
  <Models><Model ModelUri="urn:e" /></Models>
  <UAObject NodeId="ns=1;i=2" BrowseName="1:Orphan" ParentNodeId="ns=1;i=99">
    <References><Reference ReferenceType="i=40">i=58</Reference></References>
  </UAObject>
</UANodeSet>"#;
        let (graph, diags) = build(&[BASE, doc]);
        let orphan = graph.lookup("urn:e", "i=2").unwrap();
        assert_eq!(graph[orphan].parent(), None);
        assert_eq!(
            diags.warnings(),
            &[BatchWarning::UnresolvedParent {
                namespace: "urn:e".into(),
                node: "i=2".into(),
                parent: "nsu=urn:e;i=99".into(),
            }]
        );
    }

    #[test]
    fn other_edges_are_installed_both_ways() {
        let doc = r#"<UANodeSet>
  <NamespaceUris><Uri>urn:d</Uri></NamespaceUris>
  <Models><Model ModelUri="urn:d" /></Models>
  <UAObject NodeId="ns=1;i=1" BrowseName="1:Folder">
    <References><Reference ReferenceType="i=35">ns=1;i=2</Reference><Reference ReferenceType="i=40">i=58</Reference></References>
  </UAObject>
  <UAObject NodeId="ns=1;i=2" BrowseName="1:Item">
    <References><Reference ReferenceType="i=40">i=58</Reference></References>
  </UAObject>
</UANodeSet>"#;
        let (graph, _) = build(&[BASE, doc]);
        let folder = graph.lookup("urn:d", "i=1").unwrap();
        let item = graph.lookup("urn:d", "i=2").unwrap();
        let organizes = graph.lookup(well_known::UA_NAMESPACE_URI, "i=35").unwrap();
        assert_eq!(
            graph[folder].referenced,
            vec![OtherEdge {
                reference_type: organizes,
                peer: item
            }]
        );
        assert_eq!(
            graph[item].referencing,
            vec![OtherEdge {
                reference_type: organizes,
                peer: folder
            }]
        );
        assert!(graph[item].parent().is_none());
    }
}
