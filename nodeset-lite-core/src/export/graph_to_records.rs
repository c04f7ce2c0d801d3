//! Graph → relational records.
//!
//! Walks one namespace and writes a [`TypeDefinitionRecord`] for every
//! node that needs one, plus the compositions and attributes it owns.
//! Before a record is populated a placeholder is written and registered
//! under the node's handle, so recursive structures (a type whose field or
//! child refers back to itself) resolve to the id already in flight.
//! Edges to peers that receive their record later in the walk are patched
//! in a second pass.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ModelError, Result};
use crate::model::{
    ChildRole, DataTypeDefinition, Namespace, NamespaceId, Node, NodeGraph, NodeKind, NodePayload,
    NodeRef, OtherEdge, VariableData,
};
use crate::records::store::RecordStore;
use crate::records::{
    generated_code, AttributeKind, AttributeRecord, CompositionRecord, CompositionRole,
    DefinitionKind, ExistingKey, ModelRecord, RecordId, ReferenceTypeInfo, RequiredModelRecord,
    TypeDefinitionRecord, VariableInfo,
};

type Step<'s> = Pin<Box<dyn Future<Output = Result<RecordId>> + Send + 's>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectionSummary {
    pub namespace: String,
    pub created: usize,
    pub updated: usize,
    pub reused: usize,
    pub compositions: usize,
    pub attributes: usize,
}

pub struct RecordProjector<'g> {
    graph: &'g NodeGraph,
    store: &'g dyn RecordStore,
    update_existing: bool,
}

impl<'g> RecordProjector<'g> {
    pub fn new(graph: &'g NodeGraph, store: &'g dyn RecordStore) -> Self {
        Self {
            graph,
            store,
            update_existing: false,
        }
    }

    /// Overwrite records persisted by an earlier batch instead of reusing
    /// them unchanged.
    pub fn update_existing(mut self, update: bool) -> Self {
        self.update_existing = update;
        self
    }

    /// Projects one namespace. Records of other namespaces it references
    /// must already be in the store.
    pub async fn project(&self, namespace: NamespaceId) -> Result<ProjectionSummary> {
        let ns = self.graph.namespace(namespace).ok_or_else(|| {
            ModelError::InvalidDocument(format!("unknown namespace {:?}", namespace))
        })?;

        self.store.save_model(model_record(ns)).await?;

        let mut walk = Walk {
            graph: self.graph,
            store: self.store,
            update_existing: self.update_existing,
            ns,
            ids: HashMap::new(),
            deferred: Vec::new(),
            summary: ProjectionSummary {
                namespace: ns.uri.clone(),
                ..Default::default()
            },
        };

        for node in ns.nodes() {
            if needs_record(self.graph, node) {
                walk.record_for(node.handle, node.handle, "node").await?;
            }
        }
        walk.attach_deferred().await?;

        let summary = walk.summary;
        info!(
            namespace = %summary.namespace,
            created = summary.created,
            updated = summary.updated,
            reused = summary.reused,
            "projected namespace to records"
        );
        Ok(summary)
    }
}

/// Type nodes, top-level instances and instances that own children or
/// edges get a record of their own; every other instance is stored as a
/// composition or attribute of its parent.
pub(crate) fn needs_record(graph: &NodeGraph, node: &Node) -> bool {
    if node.kind().is_type() {
        return true;
    }
    if !node.children.is_empty() || !node.referenced.is_empty() {
        return true;
    }
    if node
        .referencing
        .iter()
        .any(|e| e.peer.namespace != node.namespace())
    {
        return true;
    }
    match node.parent() {
        None => true,
        Some(p) if p.namespace != node.namespace() => true,
        Some(p) => match (graph.get(p), ChildRole::for_child_kind(node.kind())) {
            (Some(parent), Some(role)) => !parent.children.get(role).contains(&node.handle),
            _ => true,
        },
    }
}

fn model_record(ns: &Namespace) -> ModelRecord {
    ModelRecord {
        namespace: ns.uri.clone(),
        version: ns.version.clone(),
        publication_date: ns.publication_date,
        required: ns
            .required
            .iter()
            .map(|r| RequiredModelRecord {
                namespace: r.uri.clone(),
                version: r.version.clone(),
                publication_date: r.publication_date,
            })
            .collect(),
    }
}

struct Walk<'g> {
    graph: &'g NodeGraph,
    store: &'g dyn RecordStore,
    update_existing: bool,
    ns: &'g Namespace,
    /// Completed and in-flight records of this namespace, plus cached
    /// lookups of foreign ones.
    ids: HashMap<NodeRef, RecordId>,
    deferred: Vec<(CompositionRecord, NodeRef)>,
    summary: ProjectionSummary,
}

impl<'g> Walk<'g> {
    fn node(&self, r: NodeRef) -> Result<&'g Node> {
        let graph = self.graph;
        graph.get(r).ok_or_else(|| {
            ModelError::InvalidDocument(format!("node {} was discarded", graph.qualified(r)))
        })
    }

    fn foreign_uri(&self, r: NodeRef) -> Option<String> {
        (r.namespace != self.ns.id).then(|| self.graph.uri_of(r).to_string())
    }

    fn register_placeholder(&mut self, r: NodeRef, id: RecordId) -> Result<()> {
        if self.ids.insert(r, id).is_some() {
            return Err(ModelError::PlaceholderRegistrationFailure {
                namespace: self.ns.uri.clone(),
                node: self.graph.qualified(r),
            });
        }
        Ok(())
    }

    /// Record id for `r`, projecting it first when it belongs to this
    /// namespace and has not been reached yet.
    fn record_for<'s>(&'s mut self, r: NodeRef, from: NodeRef, role: &'static str) -> Step<'s> {
        Box::pin(async move {
            if let Some(id) = self.ids.get(&r) {
                return Ok(*id);
            }
            let node = self.node(r)?;
            if r.namespace != self.ns.id {
                return match self.lookup_foreign(node).await? {
                    Some(id) => Ok(id),
                    None => Err(ModelError::DanglingReference {
                        namespace: self.ns.uri.clone(),
                        record: self.graph.qualified(from),
                        target: self.graph.qualified(r),
                        role,
                    }),
                };
            }

            let mut record = base_record(self.ns, node);
            let id = match self.existing(&record).await? {
                Some(found) => {
                    let id = found
                        .id
                        .ok_or_else(|| ModelError::Store("persisted record has no id".into()))?;
                    self.register_placeholder(r, id)?;
                    if !self.update_existing {
                        self.summary.reused += 1;
                        return Ok(id);
                    }
                    self.store.clear_owned(id).await?;
                    self.summary.updated += 1;
                    id
                }
                None => {
                    record.is_placeholder = true;
                    let (id, _) = self.store.upsert(record.clone(), false).await?;
                    self.register_placeholder(r, id)?;
                    self.summary.created += 1;
                    id
                }
            };
            debug!(node = %self.graph.qualified(r), id, "registered record");

            record.id = Some(id);
            record.is_placeholder = false;
            self.populate(node, &mut record).await?;
            self.store.upsert(record, true).await?;
            self.write_owned(node, id).await?;
            Ok(id)
        })
    }

    async fn existing(&self, record: &TypeDefinitionRecord) -> Result<Option<TypeDefinitionRecord>> {
        if let Some(wire_id) = &record.wire_id {
            let key = ExistingKey::WireId {
                namespace: record.namespace.clone(),
                wire_id: wire_id.clone(),
            };
            if let Some(found) = self.store.get_existing(&key).await? {
                return Ok(Some(found));
            }
        }
        match &record.generated_code {
            Some(code) => {
                let key = ExistingKey::GeneratedCode {
                    namespace: record.namespace.clone(),
                    code: code.clone(),
                };
                self.store.get_existing(&key).await
            }
            None => Ok(None),
        }
    }

    async fn lookup_foreign(&mut self, node: &'g Node) -> Result<Option<RecordId>> {
        let key = ExistingKey::WireId {
            namespace: self.graph.uri_of(node.handle).to_string(),
            wire_id: node.identifier.clone(),
        };
        let found = self.store.get_existing(&key).await?.and_then(|r| r.id);
        if let Some(id) = found {
            self.ids.insert(node.handle, id);
        }
        Ok(found)
    }

    async fn populate(&mut self, node: &'g Node, record: &mut TypeDefinitionRecord) -> Result<()> {
        let from = node.handle;
        if let Some(sup) = node.super_type() {
            record.super_type_id = Some(self.record_for(sup, from, "super type").await?);
        }
        if let Some(inst) = node.instance() {
            if let Some(td) = inst.type_definition {
                record.type_definition_id =
                    Some(self.record_for(td, from, "type definition").await?);
            }
            if let Some(parent) = inst.parent {
                record.parent_id = Some(self.record_for(parent, from, "parent").await?);
            }
        }
        for &iface in &node.children.interfaces {
            let id = self.record_for(iface, from, "interface").await?;
            record.interface_ids.push(id);
        }
        if let Some(var) = node.variable() {
            record.variable = Some(self.variable_info(var, from).await?);
        }
        Ok(())
    }

    async fn variable_info(&mut self, var: &'g VariableData, from: NodeRef) -> Result<VariableInfo> {
        let data_type_id = match var.data_type {
            Some(dt) => Some(self.record_for(dt, from, "data type").await?),
            None => None,
        };
        Ok(VariableInfo {
            data_type_id,
            value_rank: var.value_rank,
            array_dimensions: var.array_dimensions.clone(),
            value: var.value.clone(),
            access_level: var.access_level,
            user_access_level: var.user_access_level,
            historizing: var.historizing,
            engineering_units: var.engineering_units.clone(),
            eu_range: var.eu_range.clone(),
            instrument_range: var.instrument_range.clone(),
        })
    }

    /// Compositions and attributes owned by the record `owner`.
    async fn write_owned(&mut self, node: &'g Node, owner: RecordId) -> Result<()> {
        let from = node.handle;
        let mut next_composition = 0u32;
        let mut next_attribute = 0u32;

        for (role, child) in node.children.iter() {
            let c = self.node(child)?;
            match role {
                ChildRole::Interface => {}
                ChildRole::Object | ChildRole::Method => {
                    let kind = if role == ChildRole::Object {
                        CompositionRole::Object
                    } else {
                        CompositionRole::Method
                    };
                    let mut comp = CompositionRecord::new(owner, next_composition, kind, c.name());
                    self.describe_composition(&mut comp, c);
                    comp.wire_id = Some(c.identifier.clone());
                    if let Some(inst) = c.instance() {
                        comp.modeling_rule = inst.modeling_rule;
                        comp.is_required = inst.modeling_rule.is_some_and(|m| m.is_required());
                        if let Some(td) = inst.type_definition {
                            comp.related_type_id =
                                Some(self.record_for(td, child, "type definition").await?);
                        }
                    }
                    if needs_record(self.graph, c) {
                        comp.child_record_id = Some(self.record_for(child, from, "child").await?);
                    }
                    self.store.upsert_composition(comp).await?;
                    self.summary.compositions += 1;
                    next_composition += 1;
                }
                ChildRole::Event => {
                    let mut comp =
                        CompositionRecord::new(owner, next_composition, CompositionRole::Event, c.name());
                    self.describe_composition(&mut comp, c);
                    comp.related_type_id = Some(self.record_for(child, from, "event type").await?);
                    self.store.upsert_composition(comp).await?;
                    self.summary.compositions += 1;
                    next_composition += 1;
                }
                ChildRole::Property | ChildRole::DataVariable => {
                    let kind = if role == ChildRole::Property {
                        AttributeKind::Property
                    } else {
                        AttributeKind::DataVariable
                    };
                    let mut attr = AttributeRecord::new(owner, next_attribute, kind, c.name());
                    attr.browse_namespace = self.browse_namespace(c);
                    attr.display_name = Some(c.display_name.clone());
                    attr.description = c.description.clone();
                    attr.documentation = c.documentation.clone();
                    attr.symbolic_name = c.symbolic_name.clone();
                    attr.categories = c.categories.clone();
                    attr.wire_id = Some(c.identifier.clone());
                    attr.target_namespace = self.foreign_uri(child);
                    if let Some(inst) = c.instance() {
                        attr.modeling_rule = inst.modeling_rule;
                        if let Some(td) = inst.type_definition {
                            attr.type_definition_id =
                                Some(self.record_for(td, child, "type definition").await?);
                        }
                    }
                    if let Some(var) = c.variable() {
                        attr.variable = Some(self.variable_info(var, child).await?);
                    }
                    if needs_record(self.graph, c) {
                        attr.child_record_id = Some(self.record_for(child, from, "child").await?);
                    }
                    self.store.upsert_attribute(attr).await?;
                    self.summary.attributes += 1;
                    next_attribute += 1;
                }
            }
        }

        match node.data_type_definition() {
            Some(DataTypeDefinition::Structure(fields)) => {
                for f in fields {
                    let mut attr = AttributeRecord::new(
                        owner,
                        next_attribute,
                        AttributeKind::StructureField,
                        f.name.clone(),
                    );
                    attr.data_type_id = Some(self.record_for(f.data_type, from, "field data type").await?);
                    attr.value_rank = f.value_rank;
                    attr.array_dimensions = f.array_dimensions.clone();
                    attr.is_optional = f.is_optional;
                    attr.description = f.description.clone();
                    self.store.upsert_attribute(attr).await?;
                    self.summary.attributes += 1;
                    next_attribute += 1;
                }
            }
            Some(DataTypeDefinition::Enumeration(fields)) => {
                for f in fields {
                    let mut attr = AttributeRecord::new(
                        owner,
                        next_attribute,
                        AttributeKind::EnumField,
                        f.name.clone(),
                    );
                    attr.enum_value = Some(f.value);
                    attr.display_name = f.display_name.clone();
                    attr.description = f.description.clone();
                    self.store.upsert_attribute(attr).await?;
                    self.summary.attributes += 1;
                    next_attribute += 1;
                }
            }
            None => {}
        }

        for edge in &node.referenced {
            self.other_edge(node, owner, next_composition, edge, false).await?;
            next_composition += 1;
        }
        // Inverse edges from this namespace are stored forward on their source.
        for edge in node
            .referencing
            .iter()
            .filter(|e| e.peer.namespace != node.namespace())
        {
            self.other_edge(node, owner, next_composition, edge, true).await?;
            next_composition += 1;
        }
        Ok(())
    }

    async fn other_edge(
        &mut self,
        node: &'g Node,
        owner: RecordId,
        ordinal: u32,
        edge: &OtherEdge,
        inverse: bool,
    ) -> Result<()> {
        let peer = self.node(edge.peer)?;
        let mut comp = CompositionRecord::new(owner, ordinal, CompositionRole::Other, peer.name());
        comp.wire_id = Some(peer.identifier.clone());
        comp.target_namespace = self.foreign_uri(edge.peer);
        comp.is_inverse = inverse;
        comp.reference_type_id = Some(
            self.record_for(edge.reference_type, node.handle, "reference type")
                .await?,
        );

        let mut defer = false;
        if edge.peer.namespace != self.ns.id {
            comp.related_type_id = match self.ids.get(&edge.peer) {
                Some(id) => Some(*id),
                None => self.lookup_foreign(peer).await?,
            };
        } else if needs_record(self.graph, peer) {
            match self.ids.get(&edge.peer) {
                Some(id) => comp.related_type_id = Some(*id),
                None => defer = true,
            }
        }

        let id = self.store.upsert_composition(comp.clone()).await?;
        self.summary.compositions += 1;
        if defer {
            comp.id = Some(id);
            self.deferred.push((comp, edge.peer));
        }
        Ok(())
    }

    /// Second pass: edges whose peer had no record id yet.
    async fn attach_deferred(&mut self) -> Result<()> {
        for (mut comp, peer) in std::mem::take(&mut self.deferred) {
            comp.related_type_id = self.ids.get(&peer).copied();
            self.store.upsert_composition(comp).await?;
        }
        Ok(())
    }

    fn browse_namespace(&self, node: &Node) -> Option<String> {
        (node.browse_name.namespace_uri != self.ns.uri).then(|| node.browse_name.namespace_uri.clone())
    }

    fn describe_composition(&self, comp: &mut CompositionRecord, child: &Node) {
        comp.browse_namespace = self.browse_namespace(child);
        comp.display_name = Some(child.display_name.clone());
        comp.description = child.description.clone();
        comp.target_namespace = self.foreign_uri(child.handle);
    }
}

/// Scalar part of a node's record; links are filled in by `populate`.
fn base_record(ns: &Namespace, node: &Node) -> TypeDefinitionRecord {
    let mut rec = TypeDefinitionRecord::new(ns.uri.clone(), node.kind(), node.browse_name.name.clone());
    rec.wire_id = Some(node.identifier.clone());
    if node.browse_name.namespace_uri != ns.uri {
        rec.browse_namespace = Some(node.browse_name.namespace_uri.clone());
    }
    rec.display_name = node.display_name.clone();
    rec.description = node.description.clone();
    rec.documentation = node.documentation.clone();
    rec.categories = node.categories.clone();
    rec.symbolic_name = node.symbolic_name.clone();
    rec.is_abstract = node.is_abstract();
    rec.modeling_rule = node.instance().and_then(|i| i.modeling_rule);
    if node.kind() == NodeKind::DataType {
        rec.generated_code = Some(generated_code(&ns.uri, &node.browse_name.name));
    }
    match &node.payload {
        NodePayload::ReferenceType {
            symmetric,
            inverse_name,
            ..
        } => {
            rec.reference_type = Some(ReferenceTypeInfo {
                symmetric: *symmetric,
                inverse_name: inverse_name.clone(),
            });
        }
        NodePayload::DataType {
            definition: Some(def),
            ..
        } => {
            rec.definition_kind = Some(match def {
                DataTypeDefinition::Structure(_) => DefinitionKind::Structure,
                DataTypeDefinition::Enumeration(_) => DefinitionKind::Enumeration,
            });
        }
        NodePayload::Object { event_notifier, .. } => rec.event_notifier = *event_notifier,
        NodePayload::Method {
            method_declaration, ..
        } => rec.method_declaration = method_declaration.clone(),
        _ => {}
    }
    rec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::store::MemoryRecordStore;
    use crate::testing::{build, BASE, PUMPS};
    use crate::wire::well_known::UA_NAMESPACE_URI;

    async fn project_all(graph: &NodeGraph, store: &MemoryRecordStore) -> ProjectionSummary {
        let base = graph.namespace_id(UA_NAMESPACE_URI).unwrap();
        let pumps = graph.namespace_id("urn:pumps").unwrap();
        RecordProjector::new(graph, store).project(base).await.unwrap();
        RecordProjector::new(graph, store).project(pumps).await.unwrap()
    }

    async fn by_wire(store: &MemoryRecordStore, ns: &str, wire: &str) -> TypeDefinitionRecord {
        store
            .get_existing(&ExistingKey::WireId {
                namespace: ns.into(),
                wire_id: wire.into(),
            })
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn projects_types_and_attributes() {
        let (graph, _) = build(&[BASE, PUMPS]);
        let store = MemoryRecordStore::new();
        let summary = project_all(&graph, &store).await;
        // PumpType, BigPumpType, IMaintainable
        assert_eq!(summary.created, 3);

        let pump = by_wire(&store, "urn:pumps", "i=1001").await;
        assert!(!pump.is_placeholder);
        let base = by_wire(&store, UA_NAMESPACE_URI, "i=58").await;
        assert_eq!(pump.super_type_id, base.id);

        let attrs = store.attributes_of(pump.id.unwrap()).await.unwrap();
        let names: Vec<_> = attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Serial", "Speed"]);
        let speed = attrs[1].variable.as_ref().unwrap();
        assert_eq!(speed.eu_range.as_ref().unwrap().identifier, "i=1004");
    }

    #[tokio::test]
    async fn reprojection_reuses_existing_records() {
        let (graph, _) = build(&[BASE, PUMPS]);
        let store = MemoryRecordStore::new();
        project_all(&graph, &store).await;
        let before = store.type_count();

        let summary = project_all(&graph, &store).await;
        assert_eq!(summary.created, 0);
        assert_eq!(summary.reused, 3);
        assert_eq!(store.type_count(), before);
    }

    #[tokio::test]
    async fn update_existing_rewrites_owned_rows() {
        let (graph, _) = build(&[BASE, PUMPS]);
        let store = MemoryRecordStore::new();
        project_all(&graph, &store).await;
        let attributes = store.attribute_count();

        let pumps = graph.namespace_id("urn:pumps").unwrap();
        let summary = RecordProjector::new(&graph, &store)
            .update_existing(true)
            .project(pumps)
            .await
            .unwrap();
        assert_eq!(summary.updated, 3);
        assert_eq!(store.attribute_count(), attributes);
    }

    #[tokio::test]
    async fn missing_dependency_records_are_dangling() {
        let (graph, _) = build(&[BASE, PUMPS]);
        let store = MemoryRecordStore::new();
        let pumps = graph.namespace_id("urn:pumps").unwrap();
        let err = RecordProjector::new(&graph, &store)
            .project(pumps)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::DanglingReference { .. }), "{err}");
    }

    #[tokio::test]
    async fn self_referencing_structure_uses_in_flight_id() {
        let doc = r#"<UANodeSet>
  <NamespaceUris><Uri>urn:tree</Uri></NamespaceUris>
  <Models><Model ModelUri="urn:tree" /></Models>
  <UADataType NodeId="ns=1;i=1" BrowseName="1:TreeNode">
    <References><Reference ReferenceType="i=45" IsForward="false">i=22</Reference></References>
    <Definition Name="1:TreeNode">
      <Field Name="Weight" DataType="i=11" />
      <Field Name="Children" DataType="ns=1;i=1" ValueRank="1" />
    </Definition>
  </UADataType>
</UANodeSet>"#;
        let (graph, _) = build(&[BASE, doc]);
        let store = MemoryRecordStore::new();
        let base = graph.namespace_id(UA_NAMESPACE_URI).unwrap();
        let tree = graph.namespace_id("urn:tree").unwrap();
        RecordProjector::new(&graph, &store).project(base).await.unwrap();
        RecordProjector::new(&graph, &store).project(tree).await.unwrap();

        let rec = by_wire(&store, "urn:tree", "i=1").await;
        assert_eq!(rec.definition_kind, Some(DefinitionKind::Structure));
        assert_eq!(rec.generated_code.as_deref(), Some("urn:tree#TreeNode"));
        let fields = store.attributes_of(rec.id.unwrap()).await.unwrap();
        assert_eq!(fields[1].data_type_id, rec.id);
    }

    #[tokio::test]
    async fn forward_edge_to_later_record_is_patched() {
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
        let store = MemoryRecordStore::new();
        let base = graph.namespace_id(UA_NAMESPACE_URI).unwrap();
        let d = graph.namespace_id("urn:d").unwrap();
        RecordProjector::new(&graph, &store).project(base).await.unwrap();
        RecordProjector::new(&graph, &store).project(d).await.unwrap();

        let folder = by_wire(&store, "urn:d", "i=1").await;
        let item = by_wire(&store, "urn:d", "i=2").await;
        let comps = store.compositions_of(folder.id.unwrap()).await.unwrap();
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].role, CompositionRole::Other);
        assert_eq!(comps[0].related_type_id, item.id);
        assert!(!comps[0].is_inverse);
    }

    #[test]
    fn owned_leaf_instances_do_not_need_records() {
        let (graph, _) = build(&[BASE, PUMPS]);
        let serial = graph.lookup("urn:pumps", "i=1002").unwrap();
        let pump = graph.lookup("urn:pumps", "i=1001").unwrap();
        assert!(!needs_record(&graph, &graph[serial]));
        assert!(needs_record(&graph, &graph[pump]));
    }
}
