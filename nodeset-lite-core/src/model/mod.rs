//! Canonical node graph.
//!
//! Nodes live only in the [`Namespace`] that declares them (an arena of
//! slots). Everything else refers to a node through a copyable [`NodeRef`]
//! handle, so cyclic and self-referential type graphs need no shared
//! ownership. Handles are created exclusively by the identity registry.
//!
//! The node kinds form a closed set: the payload is a tagged union
//! ([`NodePayload`]) over a shared base ([`Node`]).

pub mod compare;
mod graph;
mod namespace;

pub use graph::NodeGraph;
pub use namespace::{Namespace, RequiredNamespace};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ── Handles ──────────────────────────────────────────────────

/// Index of a namespace inside its [`NodeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(pub u32);

/// Non-owning handle to a node: the owning namespace plus the node's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub namespace: NamespaceId,
    pub slot: u32,
}

// ── Kinds ────────────────────────────────────────────────────

/// Registry key kind. Variables are split by role because a property and a
/// data variable with the same identifier are inconsistent source data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Object,
    ObjectType,
    DataVariable,
    Property,
    VariableType,
    DataType,
    Method,
    Interface,
    ReferenceType,
}

impl NodeKind {
    pub const ALL: [NodeKind; 9] = [
        NodeKind::Object,
        NodeKind::ObjectType,
        NodeKind::DataVariable,
        NodeKind::Property,
        NodeKind::VariableType,
        NodeKind::DataType,
        NodeKind::Method,
        NodeKind::Interface,
        NodeKind::ReferenceType,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Object => "Object",
            NodeKind::ObjectType => "ObjectType",
            NodeKind::DataVariable => "DataVariable",
            NodeKind::Property => "Property",
            NodeKind::VariableType => "VariableType",
            NodeKind::DataType => "DataType",
            NodeKind::Method => "Method",
            NodeKind::Interface => "Interface",
            NodeKind::ReferenceType => "ReferenceType",
        }
    }

    pub fn is_instance(self) -> bool {
        matches!(
            self,
            NodeKind::Object | NodeKind::DataVariable | NodeKind::Property | NodeKind::Method
        )
    }

    pub fn is_type(self) -> bool {
        !self.is_instance()
    }

    pub fn is_variable(self) -> bool {
        matches!(self, NodeKind::DataVariable | NodeKind::Property)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Edges ────────────────────────────────────────────────────

/// Role of a child edge. The first four own their target (the target's
/// parent is the edge source); interfaces and events only reference types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildRole {
    Object,
    Property,
    DataVariable,
    Method,
    Interface,
    Event,
}

impl ChildRole {
    pub const ALL: [ChildRole; 6] = [
        ChildRole::Object,
        ChildRole::Property,
        ChildRole::DataVariable,
        ChildRole::Method,
        ChildRole::Interface,
        ChildRole::Event,
    ];

    pub fn owns_target(self) -> bool {
        !matches!(self, ChildRole::Interface | ChildRole::Event)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChildRole::Object => "object",
            ChildRole::Property => "property",
            ChildRole::DataVariable => "data_variable",
            ChildRole::Method => "method",
            ChildRole::Interface => "interface",
            ChildRole::Event => "event",
        }
    }

    /// Role an owned child of `kind` plays under its parent.
    pub fn for_child_kind(kind: NodeKind) -> Option<ChildRole> {
        match kind {
            NodeKind::Object => Some(ChildRole::Object),
            NodeKind::Property => Some(ChildRole::Property),
            NodeKind::DataVariable => Some(ChildRole::DataVariable),
            NodeKind::Method => Some(ChildRole::Method),
            _ => None,
        }
    }
}

/// Ordered child edges, grouped by role. Order within a role is the order
/// in which the edges were installed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildEdges {
    pub objects: Vec<NodeRef>,
    pub properties: Vec<NodeRef>,
    pub data_variables: Vec<NodeRef>,
    pub methods: Vec<NodeRef>,
    pub interfaces: Vec<NodeRef>,
    pub events: Vec<NodeRef>,
}

impl ChildEdges {
    pub fn get(&self, role: ChildRole) -> &[NodeRef] {
        match role {
            ChildRole::Object => &self.objects,
            ChildRole::Property => &self.properties,
            ChildRole::DataVariable => &self.data_variables,
            ChildRole::Method => &self.methods,
            ChildRole::Interface => &self.interfaces,
            ChildRole::Event => &self.events,
        }
    }

    pub fn get_mut(&mut self, role: ChildRole) -> &mut Vec<NodeRef> {
        match role {
            ChildRole::Object => &mut self.objects,
            ChildRole::Property => &mut self.properties,
            ChildRole::DataVariable => &mut self.data_variables,
            ChildRole::Method => &mut self.methods,
            ChildRole::Interface => &mut self.interfaces,
            ChildRole::Event => &mut self.events,
        }
    }

    /// Installs an edge unless it is already present. Returns true if added.
    pub fn add(&mut self, role: ChildRole, target: NodeRef) -> bool {
        let list = self.get_mut(role);
        if list.contains(&target) {
            return false;
        }
        list.push(target);
        true
    }

    pub fn remove(&mut self, target: NodeRef) {
        for role in ChildRole::ALL {
            self.get_mut(role).retain(|r| *r != target);
        }
    }

    /// All edges as (role, target), roles in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (ChildRole, NodeRef)> + '_ {
        ChildRole::ALL
            .into_iter()
            .flat_map(move |role| self.get(role).iter().map(move |r| (role, *r)))
    }

    pub fn owned(&self) -> impl Iterator<Item = (ChildRole, NodeRef)> + '_ {
        self.iter().filter(|(role, _)| role.owns_target())
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// A relation outside the standard roles, tagged with its reference type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OtherEdge {
    pub reference_type: NodeRef,
    pub peer: NodeRef,
}

// ── Scalar payloads ──────────────────────────────────────────

/// Browse name; the namespace is kept as a URI so that index renumbering
/// between documents does not change it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BrowseName {
    pub namespace_uri: String,
    pub name: String,
}

impl BrowseName {
    pub fn new(namespace_uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
            name: name.into(),
        }
    }
}

/// Opaque value payload, carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "body", rename_all = "snake_case")]
pub enum EncodedValue {
    /// Explicit null (`xsi:nil`), also produced for empty value elements.
    Null,
    /// Inner XML of the value element.
    Xml(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelingRule {
    Mandatory,
    Optional,
    MandatoryPlaceholder,
    OptionalPlaceholder,
    ExposesItsArray,
}

impl ModelingRule {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelingRule::Mandatory => "Mandatory",
            ModelingRule::Optional => "Optional",
            ModelingRule::MandatoryPlaceholder => "MandatoryPlaceholder",
            ModelingRule::OptionalPlaceholder => "OptionalPlaceholder",
            ModelingRule::ExposesItsArray => "ExposesItsArray",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Mandatory" => Some(ModelingRule::Mandatory),
            "Optional" => Some(ModelingRule::Optional),
            "MandatoryPlaceholder" => Some(ModelingRule::MandatoryPlaceholder),
            "OptionalPlaceholder" => Some(ModelingRule::OptionalPlaceholder),
            "ExposesItsArray" => Some(ModelingRule::ExposesItsArray),
            _ => None,
        }
    }

    pub fn is_required(self) -> bool {
        matches!(
            self,
            ModelingRule::Mandatory | ModelingRule::MandatoryPlaceholder
        )
    }
}

/// A folded EngineeringUnits / EURange / InstrumentRange child. The wire
/// identifier of the discarded child is kept so it can be re-emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideInfo {
    pub identifier: String,
    pub value: Option<EncodedValue>,
    pub modeling_rule: Option<ModelingRule>,
}

/// Which folded side-info slot a child fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideInfoKind {
    EngineeringUnits,
    EuRange,
    InstrumentRange,
}

impl SideInfoKind {
    pub const ALL: [SideInfoKind; 3] = [
        SideInfoKind::EngineeringUnits,
        SideInfoKind::EuRange,
        SideInfoKind::InstrumentRange,
    ];

    pub fn browse_name(self) -> &'static str {
        match self {
            SideInfoKind::EngineeringUnits => "EngineeringUnits",
            SideInfoKind::EuRange => "EURange",
            SideInfoKind::InstrumentRange => "InstrumentRange",
        }
    }

    pub fn from_browse_name(name: &str) -> Option<Self> {
        SideInfoKind::ALL
            .into_iter()
            .find(|k| k.browse_name() == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableData {
    pub data_type: Option<NodeRef>,
    pub value_rank: Option<i32>,
    pub array_dimensions: Option<String>,
    pub value: Option<EncodedValue>,
    pub access_level: Option<u8>,
    pub user_access_level: Option<u8>,
    pub historizing: bool,
    pub engineering_units: Option<SideInfo>,
    pub eu_range: Option<SideInfo>,
    pub instrument_range: Option<SideInfo>,
}

impl VariableData {
    pub fn side_info(&self, kind: SideInfoKind) -> Option<&SideInfo> {
        match kind {
            SideInfoKind::EngineeringUnits => self.engineering_units.as_ref(),
            SideInfoKind::EuRange => self.eu_range.as_ref(),
            SideInfoKind::InstrumentRange => self.instrument_range.as_ref(),
        }
    }

    pub fn side_info_mut(&mut self, kind: SideInfoKind) -> &mut Option<SideInfo> {
        match kind {
            SideInfoKind::EngineeringUnits => &mut self.engineering_units,
            SideInfoKind::EuRange => &mut self.eu_range,
            SideInfoKind::InstrumentRange => &mut self.instrument_range,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.value_rank, Some(rank) if rank >= 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureField {
    pub name: String,
    pub data_type: NodeRef,
    pub value_rank: Option<i32>,
    pub array_dimensions: Option<String>,
    pub is_optional: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumField {
    pub name: String,
    pub value: i64,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

/// Structure fields XOR enum fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataTypeDefinition {
    Structure(Vec<StructureField>),
    Enumeration(Vec<EnumField>),
}

impl DataTypeDefinition {
    pub fn field_names(&self) -> Vec<&str> {
        match self {
            DataTypeDefinition::Structure(fields) => {
                fields.iter().map(|f| f.name.as_str()).collect()
            }
            DataTypeDefinition::Enumeration(fields) => {
                fields.iter().map(|f| f.name.as_str()).collect()
            }
        }
    }
}

// ── Instance / type data ─────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceData {
    pub type_definition: Option<NodeRef>,
    pub parent: Option<NodeRef>,
    pub modeling_rule: Option<ModelingRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeData {
    pub super_type: Option<NodeRef>,
    pub is_abstract: bool,
    /// Computed from the super-type links of other nodes; never owning.
    pub sub_types: BTreeSet<NodeRef>,
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodePayload {
    Object {
        instance: InstanceData,
        event_notifier: Option<u8>,
    },
    Variable {
        instance: InstanceData,
        variable: VariableData,
        is_property: bool,
    },
    Method {
        instance: InstanceData,
        method_declaration: Option<String>,
    },
    ObjectType {
        ty: TypeData,
    },
    VariableType {
        ty: TypeData,
        variable: VariableData,
    },
    DataType {
        ty: TypeData,
        definition: Option<DataTypeDefinition>,
    },
    Interface {
        ty: TypeData,
    },
    ReferenceType {
        ty: TypeData,
        symmetric: bool,
        inverse_name: Option<String>,
    },
}

impl NodePayload {
    /// Empty payload for a freshly registered stub.
    pub fn empty(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Object => NodePayload::Object {
                instance: InstanceData::default(),
                event_notifier: None,
            },
            NodeKind::DataVariable | NodeKind::Property => NodePayload::Variable {
                instance: InstanceData::default(),
                variable: VariableData::default(),
                is_property: kind == NodeKind::Property,
            },
            NodeKind::Method => NodePayload::Method {
                instance: InstanceData::default(),
                method_declaration: None,
            },
            NodeKind::ObjectType => NodePayload::ObjectType {
                ty: TypeData::default(),
            },
            NodeKind::VariableType => NodePayload::VariableType {
                ty: TypeData::default(),
                variable: VariableData::default(),
            },
            NodeKind::DataType => NodePayload::DataType {
                ty: TypeData::default(),
                definition: None,
            },
            NodeKind::Interface => NodePayload::Interface {
                ty: TypeData::default(),
            },
            NodeKind::ReferenceType => NodePayload::ReferenceType {
                ty: TypeData::default(),
                symmetric: false,
                inverse_name: None,
            },
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodePayload::Object { .. } => NodeKind::Object,
            NodePayload::Variable { is_property, .. } => {
                if *is_property {
                    NodeKind::Property
                } else {
                    NodeKind::DataVariable
                }
            }
            NodePayload::Method { .. } => NodeKind::Method,
            NodePayload::ObjectType { .. } => NodeKind::ObjectType,
            NodePayload::VariableType { .. } => NodeKind::VariableType,
            NodePayload::DataType { .. } => NodeKind::DataType,
            NodePayload::Interface { .. } => NodeKind::Interface,
            NodePayload::ReferenceType { .. } => NodeKind::ReferenceType,
        }
    }
}

// ── Node ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub handle: NodeRef,
    /// Namespace-local wire identifier, e.g. `i=1001` or `s=Pump`.
    pub identifier: String,
    pub browse_name: BrowseName,
    pub display_name: String,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub categories: Vec<String>,
    pub symbolic_name: Option<String>,
    pub children: ChildEdges,
    /// Other edges where this node is the source.
    pub referenced: Vec<OtherEdge>,
    /// Other edges where this node is the target.
    pub referencing: Vec<OtherEdge>,
    /// Caller-supplied state, see [`crate::context::NodeAnnotator`].
    pub context: Option<serde_json::Value>,
    pub payload: NodePayload,
}

impl Node {
    pub fn stub(handle: NodeRef, identifier: &str, kind: NodeKind) -> Self {
        Self {
            handle,
            identifier: identifier.to_string(),
            browse_name: BrowseName::default(),
            display_name: String::new(),
            description: None,
            documentation: None,
            categories: Vec::new(),
            symbolic_name: None,
            children: ChildEdges::default(),
            referenced: Vec::new(),
            referencing: Vec::new(),
            context: None,
            payload: NodePayload::empty(kind),
        }
    }

    pub fn namespace(&self) -> NamespaceId {
        self.handle.namespace
    }

    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    pub fn name(&self) -> &str {
        if self.browse_name.name.is_empty() {
            &self.identifier
        } else {
            &self.browse_name.name
        }
    }

    pub fn instance(&self) -> Option<&InstanceData> {
        match &self.payload {
            NodePayload::Object { instance, .. }
            | NodePayload::Variable { instance, .. }
            | NodePayload::Method { instance, .. } => Some(instance),
            _ => None,
        }
    }

    pub fn instance_mut(&mut self) -> Option<&mut InstanceData> {
        match &mut self.payload {
            NodePayload::Object { instance, .. }
            | NodePayload::Variable { instance, .. }
            | NodePayload::Method { instance, .. } => Some(instance),
            _ => None,
        }
    }

    pub fn type_data(&self) -> Option<&TypeData> {
        match &self.payload {
            NodePayload::ObjectType { ty }
            | NodePayload::VariableType { ty, .. }
            | NodePayload::DataType { ty, .. }
            | NodePayload::Interface { ty }
            | NodePayload::ReferenceType { ty, .. } => Some(ty),
            _ => None,
        }
    }

    pub fn type_data_mut(&mut self) -> Option<&mut TypeData> {
        match &mut self.payload {
            NodePayload::ObjectType { ty }
            | NodePayload::VariableType { ty, .. }
            | NodePayload::DataType { ty, .. }
            | NodePayload::Interface { ty }
            | NodePayload::ReferenceType { ty, .. } => Some(ty),
            _ => None,
        }
    }

    pub fn variable(&self) -> Option<&VariableData> {
        match &self.payload {
            NodePayload::Variable { variable, .. } | NodePayload::VariableType { variable, .. } => {
                Some(variable)
            }
            _ => None,
        }
    }

    pub fn variable_mut(&mut self) -> Option<&mut VariableData> {
        match &mut self.payload {
            NodePayload::Variable { variable, .. } | NodePayload::VariableType { variable, .. } => {
                Some(variable)
            }
            _ => None,
        }
    }

    pub fn data_type_definition(&self) -> Option<&DataTypeDefinition> {
        match &self.payload {
            NodePayload::DataType { definition, .. } => definition.as_ref(),
            _ => None,
        }
    }

    pub fn super_type(&self) -> Option<NodeRef> {
        self.type_data().and_then(|t| t.super_type)
    }

    pub fn type_definition(&self) -> Option<NodeRef> {
        self.instance().and_then(|i| i.type_definition)
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.instance().and_then(|i| i.parent)
    }

    pub fn is_abstract(&self) -> bool {
        self.type_data().map(|t| t.is_abstract).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(slot: u32) -> NodeRef {
        NodeRef {
            namespace: NamespaceId(0),
            slot,
        }
    }

    #[test]
    fn payload_kind_round_trips_for_every_kind() {
        for kind in NodeKind::ALL {
            assert_eq!(NodePayload::empty(kind).kind(), kind);
        }
    }

    #[test]
    fn child_edges_add_is_idempotent() {
        let mut edges = ChildEdges::default();
        assert!(edges.add(ChildRole::Property, r(1)));
        assert!(!edges.add(ChildRole::Property, r(1)));
        assert!(edges.add(ChildRole::Object, r(2)));
        let all: Vec<_> = edges.iter().collect();
        assert_eq!(
            all,
            vec![(ChildRole::Object, r(2)), (ChildRole::Property, r(1))]
        );
    }

    #[test]
    fn owned_edges_skip_interfaces_and_events() {
        let mut edges = ChildEdges::default();
        edges.add(ChildRole::Interface, r(1));
        edges.add(ChildRole::Event, r(2));
        edges.add(ChildRole::Method, r(3));
        let owned: Vec<_> = edges.owned().map(|(_, t)| t).collect();
        assert_eq!(owned, vec![r(3)]);
    }

    #[test]
    fn side_info_kind_matches_browse_names() {
        assert_eq!(
            SideInfoKind::from_browse_name("EURange"),
            Some(SideInfoKind::EuRange)
        );
        assert_eq!(SideInfoKind::from_browse_name("Range"), None);
    }

    #[test]
    fn type_accessors_only_on_types() {
        let node = Node::stub(r(0), "i=1", NodeKind::Property);
        assert!(node.instance().is_some());
        assert!(node.type_data().is_none());
        assert!(node.variable().is_some());
        assert_eq!(node.kind(), NodeKind::Property);
        assert_eq!(node.name(), "i=1");
    }
}
