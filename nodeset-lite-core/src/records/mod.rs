//! Relational projection of a namespace.
//!
//! Persistence owns these rows; the projector and the record builder only
//! talk to it through [`store::RecordStore`]. Cross-record links are record
//! ids; links to nodes that have no record of their own (attributes) use
//! the node's namespace URI and wire id.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{EncodedValue, ModelingRule, NodeKind, SideInfo};

pub type RecordId = u64;

/// Namespace-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub namespace: String,
    pub version: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
    pub required: Vec<RequiredModelRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredModelRecord {
    pub namespace: String,
    pub version: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Structure,
    Enumeration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTypeInfo {
    pub symmetric: bool,
    pub inverse_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub data_type_id: Option<RecordId>,
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

/// One type node, top-level instance, or nested instance that owns
/// children of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinitionRecord {
    /// Assigned by the store.
    pub id: Option<RecordId>,
    pub namespace: String,
    pub wire_id: Option<String>,
    pub kind: NodeKind,
    pub browse_name: String,
    /// Only set when the browse name lives in another namespace.
    pub browse_namespace: Option<String>,
    pub display_name: String,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub categories: Vec<String>,
    pub symbolic_name: Option<String>,
    pub is_abstract: bool,
    pub super_type_id: Option<RecordId>,
    pub parent_id: Option<RecordId>,
    pub type_definition_id: Option<RecordId>,
    pub interface_ids: Vec<RecordId>,
    pub modeling_rule: Option<ModelingRule>,
    pub variable: Option<VariableInfo>,
    /// Stable name key for data types, see [`generated_code`].
    pub generated_code: Option<String>,
    pub reference_type: Option<ReferenceTypeInfo>,
    pub definition_kind: Option<DefinitionKind>,
    pub event_notifier: Option<u8>,
    pub method_declaration: Option<String>,
    /// True between placeholder registration and completion.
    pub is_placeholder: bool,
}

impl TypeDefinitionRecord {
    pub fn new(namespace: impl Into<String>, kind: NodeKind, browse_name: impl Into<String>) -> Self {
        let browse_name = browse_name.into();
        Self {
            id: None,
            namespace: namespace.into(),
            wire_id: None,
            kind,
            display_name: browse_name.clone(),
            browse_name,
            browse_namespace: None,
            description: None,
            documentation: None,
            categories: Vec::new(),
            symbolic_name: None,
            is_abstract: false,
            super_type_id: None,
            parent_id: None,
            type_definition_id: None,
            interface_ids: Vec::new(),
            modeling_rule: None,
            variable: None,
            generated_code: None,
            reference_type: None,
            definition_kind: None,
            event_notifier: None,
            method_declaration: None,
            is_placeholder: false,
        }
    }

    /// `wire id` or `#<record id>` for diagnostics.
    pub fn label(&self) -> String {
        match (&self.wire_id, self.id) {
            (Some(w), _) => w.clone(),
            (None, Some(id)) => format!("#{}", id),
            (None, None) => self.browse_name.clone(),
        }
    }
}

/// Key under which the projector looks for a record persisted earlier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExistingKey {
    WireId { namespace: String, wire_id: String },
    GeneratedCode { namespace: String, code: String },
}

impl ExistingKey {
    pub fn matches(&self, record: &TypeDefinitionRecord) -> bool {
        match self {
            ExistingKey::WireId { namespace, wire_id } => {
                &record.namespace == namespace && record.wire_id.as_deref() == Some(wire_id)
            }
            ExistingKey::GeneratedCode { namespace, code } => {
                &record.namespace == namespace && record.generated_code.as_deref() == Some(code)
            }
        }
    }
}

/// Data types are additionally matched by this name-derived code so a
/// re-import with renumbered ids still finds them.
pub fn generated_code(namespace: &str, browse_name: &str) -> String {
    format!("{}#{}", namespace.trim_end_matches('/'), browse_name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionRole {
    Object,
    Method,
    Event,
    Other,
}

/// A child edge or an "other" edge of the owner record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionRecord {
    pub id: Option<RecordId>,
    pub owner_id: RecordId,
    pub ordinal: u32,
    pub role: CompositionRole,
    pub name: String,
    pub browse_namespace: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    /// Wire id of the child (object / method) or the edge peer (other).
    pub wire_id: Option<String>,
    /// Namespace of the peer when it differs from the owner's.
    pub target_namespace: Option<String>,
    /// Type definition of the child, the event type, or the peer's record.
    pub related_type_id: Option<RecordId>,
    /// Record of the child when it owns children of its own.
    pub child_record_id: Option<RecordId>,
    pub is_required: bool,
    pub modeling_rule: Option<ModelingRule>,
    pub reference_type_id: Option<RecordId>,
    pub is_inverse: bool,
}

impl CompositionRecord {
    pub fn new(owner_id: RecordId, ordinal: u32, role: CompositionRole, name: impl Into<String>) -> Self {
        Self {
            id: None,
            owner_id,
            ordinal,
            role,
            name: name.into(),
            browse_namespace: None,
            display_name: None,
            description: None,
            wire_id: None,
            target_namespace: None,
            related_type_id: None,
            child_record_id: None,
            is_required: false,
            modeling_rule: None,
            reference_type_id: None,
            is_inverse: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Property,
    DataVariable,
    StructureField,
    EnumField,
}

/// Property, data variable, structure field or enum field of the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub id: Option<RecordId>,
    pub owner_id: RecordId,
    pub ordinal: u32,
    pub kind: AttributeKind,
    pub name: String,
    pub browse_namespace: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub symbolic_name: Option<String>,
    pub categories: Vec<String>,
    /// Variables only.
    pub wire_id: Option<String>,
    pub target_namespace: Option<String>,
    pub type_definition_id: Option<RecordId>,
    pub modeling_rule: Option<ModelingRule>,
    pub variable: Option<VariableInfo>,
    pub child_record_id: Option<RecordId>,
    /// Structure fields only.
    pub data_type_id: Option<RecordId>,
    pub value_rank: Option<i32>,
    pub array_dimensions: Option<String>,
    pub is_optional: bool,
    /// Enum fields only.
    pub enum_value: Option<i64>,
}

impl AttributeRecord {
    pub fn new(owner_id: RecordId, ordinal: u32, kind: AttributeKind, name: impl Into<String>) -> Self {
        Self {
            id: None,
            owner_id,
            ordinal,
            kind,
            name: name.into(),
            browse_namespace: None,
            display_name: None,
            description: None,
            documentation: None,
            symbolic_name: None,
            categories: Vec::new(),
            wire_id: None,
            target_namespace: None,
            type_definition_id: None,
            modeling_rule: None,
            variable: None,
            child_record_id: None,
            data_type_id: None,
            value_rank: None,
            array_dimensions: None,
            is_optional: false,
            enum_value: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_key_matches_on_namespace_and_id() {
        let mut rec = TypeDefinitionRecord::new("urn:a", NodeKind::DataType, "Mode");
        rec.wire_id = Some("i=3001".into());
        rec.generated_code = Some(generated_code("urn:a/", "Mode"));
        assert!(ExistingKey::WireId {
            namespace: "urn:a".into(),
            wire_id: "i=3001".into()
        }
        .matches(&rec));
        assert!(!ExistingKey::WireId {
            namespace: "urn:b".into(),
            wire_id: "i=3001".into()
        }
        .matches(&rec));
        assert!(ExistingKey::GeneratedCode {
            namespace: "urn:a".into(),
            code: "urn:a#Mode".into()
        }
        .matches(&rec));
    }

    #[test]
    fn records_serialize_with_snake_case_tags() {
        let rec = CompositionRecord::new(1, 0, CompositionRole::Event, "Alarm");
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["role"], "event");
    }

    #[test]
    fn label_prefers_wire_id() {
        let mut rec = TypeDefinitionRecord::new("urn:a", NodeKind::ObjectType, "T");
        assert_eq!(rec.label(), "T");
        rec.id = Some(4);
        assert_eq!(rec.label(), "#4");
        rec.wire_id = Some("i=1".into());
        assert_eq!(rec.label(), "i=1");
    }
}
