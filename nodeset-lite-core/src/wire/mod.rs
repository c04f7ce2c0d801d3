//! UANodeSet documents.
//!
//! [`NodeSetDocument`] is a faithful, string-level view of one document:
//! node ids and browse names keep their document-local namespace indices
//! and are resolved against [`NamespaceTable`] by the builder.

pub mod node_id;
mod reader;
pub mod validate;
pub mod well_known;
mod writer;

pub use node_id::{GlobalNodeId, NamespaceTable};
pub use reader::{normalize_empty_values, parse_nodeset};
pub use writer::write_nodeset;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSetDocument {
    pub namespace_uris: Vec<String>,
    pub models: Vec<ModelEntry>,
    pub aliases: BTreeMap<String, String>,
    pub nodes: Vec<WireNode>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl NodeSetDocument {
    pub fn namespace_table(&self) -> NamespaceTable {
        NamespaceTable::new(&self.namespace_uris)
    }

    /// The first model entry, which names the document's namespace.
    pub fn primary_model(&self) -> Option<&ModelEntry> {
        self.models.first()
    }

    pub fn model(&self, uri: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.model_uri == uri)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model_uri: String,
    pub version: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
    pub required: Vec<RequiredModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredModel {
    pub model_uri: String,
    pub version: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    Object,
    ObjectType,
    Variable,
    VariableType,
    DataType,
    Method,
    ReferenceType,
    View,
}

impl NodeClass {
    pub fn element_name(self) -> &'static str {
        match self {
            NodeClass::Object => "UAObject",
            NodeClass::ObjectType => "UAObjectType",
            NodeClass::Variable => "UAVariable",
            NodeClass::VariableType => "UAVariableType",
            NodeClass::DataType => "UADataType",
            NodeClass::Method => "UAMethod",
            NodeClass::ReferenceType => "UAReferenceType",
            NodeClass::View => "UAView",
        }
    }

    pub fn from_element_name(name: &str) -> Option<Self> {
        match name {
            "UAObject" => Some(NodeClass::Object),
            "UAObjectType" => Some(NodeClass::ObjectType),
            "UAVariable" => Some(NodeClass::Variable),
            "UAVariableType" => Some(NodeClass::VariableType),
            "UADataType" => Some(NodeClass::DataType),
            "UAMethod" => Some(NodeClass::Method),
            "UAReferenceType" => Some(NodeClass::ReferenceType),
            "UAView" => Some(NodeClass::View),
            _ => None,
        }
    }
}

/// One `UA*` element. Attributes that a node class does not carry stay at
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireNode {
    pub class: NodeClass,
    pub node_id: String,
    pub browse_name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub categories: Vec<String>,
    pub symbolic_name: Option<String>,
    pub parent_node_id: Option<String>,
    pub is_abstract: bool,
    pub symmetric: bool,
    pub inverse_name: Option<String>,
    pub data_type: Option<String>,
    pub value_rank: Option<i32>,
    pub array_dimensions: Option<String>,
    pub access_level: Option<u8>,
    pub user_access_level: Option<u8>,
    pub historizing: bool,
    pub event_notifier: Option<u8>,
    pub method_declaration_id: Option<String>,
    pub value: Option<WireValue>,
    pub definition: Option<WireDefinition>,
    pub references: Vec<WireReference>,
}

impl WireNode {
    pub fn new(class: NodeClass, node_id: impl Into<String>, browse_name: impl Into<String>) -> Self {
        Self {
            class,
            node_id: node_id.into(),
            browse_name: browse_name.into(),
            display_name: None,
            description: None,
            documentation: None,
            categories: Vec::new(),
            symbolic_name: None,
            parent_node_id: None,
            is_abstract: false,
            symmetric: false,
            inverse_name: None,
            data_type: None,
            value_rank: None,
            array_dimensions: None,
            access_level: None,
            user_access_level: None,
            historizing: false,
            event_notifier: None,
            method_declaration_id: None,
            value: None,
            definition: None,
            references: Vec::new(),
        }
    }
}

/// Content of a `<Value>` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireValue {
    Null,
    Xml(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireReference {
    pub reference_type: String,
    pub is_forward: bool,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireDefinition {
    pub name: String,
    pub fields: Vec<WireField>,
}

impl WireDefinition {
    /// Enumerations give every field a `Value`; structures never do.
    pub fn is_enumeration(&self) -> bool {
        !self.fields.is_empty() && self.fields.iter().all(|f| f.value.is_some())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireField {
    pub name: String,
    pub data_type: Option<String>,
    pub value_rank: Option<i32>,
    pub array_dimensions: Option<String>,
    pub is_optional: bool,
    pub value: Option<i64>,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

/// Hex SHA-256 of a document's text, used to tell identical re-supplies of
/// a namespace from conflicting ones.
pub fn content_hash(xml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(xml.as_bytes());
    hex::encode(hasher.finalize())
}
