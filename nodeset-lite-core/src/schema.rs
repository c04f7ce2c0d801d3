//! External typed-library schema document.
//!
//! Serialized as JSON. Every type is keyed by a fully-qualified name
//! `[library, relative-name]` where the library is derived from the
//! namespace URI the type lives in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const FORMAT_VERSION: &str = "1.0";

/// `[library, relative-name]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedName(pub String, pub String);

impl QualifiedName {
    pub fn new(namespace_uri: &str, name: impl Into<String>) -> Self {
        Self(library_name(namespace_uri), name.into())
    }

    pub fn library(&self) -> &str {
        &self.0
    }

    pub fn name(&self) -> &str {
        &self.1
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.0, self.1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaDocument {
    pub meta: SchemaMeta,
    pub libraries: Vec<Library>,
    pub types: Vec<SchemaType>,
    pub enumeration_types: Vec<EnumerationType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaMeta {
    pub export_namespace: String,
    pub timestamp: DateTime<Utc>,
    pub format_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Library {
    pub name: String,
    pub namespace_uri: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeCategory {
    ObjectType,
    Interface,
    Structure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaType {
    pub name: QualifiedName,
    pub category: TypeCategory,
    #[serde(default)]
    pub is_abstract: bool,
    /// Super-type names, nearest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub super_types: Vec<QualifiedName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<QualifiedName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<SchemaAttribute>,
    #[serde(default)]
    pub compositions: Vec<SchemaComposition>,
}

/// Scalar or enumeration-valued member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaAttribute {
    pub name: String,
    pub data_type: QualifiedName,
    #[serde(default)]
    pub is_enumeration: bool,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Nested member: a child object or a structure-valued variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaComposition {
    pub name: String,
    pub type_name: QualifiedName,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnumerationType {
    pub name: QualifiedName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub values: Vec<EnumerationValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnumerationValue {
    pub name: String,
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SchemaDocument {
    pub fn new(export_namespace: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            meta: SchemaMeta {
                export_namespace: export_namespace.into(),
                timestamp,
                format_version: FORMAT_VERSION.to_string(),
            },
            libraries: Vec::new(),
            types: Vec::new(),
            enumeration_types: Vec::new(),
        }
    }

    pub fn find_type(&self, name: &QualifiedName) -> Option<&SchemaType> {
        self.types.iter().find(|t| &t.name == name)
    }

    pub fn find_enumeration(&self, name: &QualifiedName) -> Option<&EnumerationType> {
        self.enumeration_types.iter().find(|t| &t.name == name)
    }

    /// True if a type or enumeration type already carries `name`.
    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.find_type(name).is_some() || self.find_enumeration(name).is_some()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Library name for a namespace URI: scheme and trailing slash removed.
pub fn library_name(namespace_uri: &str) -> String {
    let trimmed = namespace_uri
        .strip_prefix("https://")
        .or_else(|| namespace_uri.strip_prefix("http://"))
        .or_else(|| namespace_uri.strip_prefix("urn:"))
        .unwrap_or(namespace_uri);
    trimmed.trim_end_matches('/').to_string()
}

/// Three-part version derived from a model version string. The flag is
/// false when the source was present but not numeric.
pub fn semantic_version(version: Option<&str>) -> (String, bool) {
    let Some(raw) = version.map(str::trim).filter(|v| !v.is_empty()) else {
        return ("1.0.0".to_string(), true);
    };
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.iter().any(|p| p.is_empty() || p.parse::<u64>().is_err()) {
        return ("1.0.0".to_string(), false);
    }
    let mut numbers: Vec<&str> = parts.into_iter().take(3).collect();
    while numbers.len() < 3 {
        numbers.push("0");
    }
    (numbers.join("."), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_versions() {
        assert_eq!(semantic_version(None), ("1.0.0".into(), true));
        assert_eq!(semantic_version(Some("")), ("1.0.0".into(), true));
        assert_eq!(semantic_version(Some("1.04")), ("1.04.0".into(), true));
        assert_eq!(semantic_version(Some("2")), ("2.0.0".into(), true));
        assert_eq!(semantic_version(Some("1.2.3.4")), ("1.2.3".into(), true));
        assert_eq!(semantic_version(Some("draft")), ("1.0.0".into(), false));
        assert_eq!(semantic_version(Some("1.x")), ("1.0.0".into(), false));
    }

    #[test]
    fn library_names() {
        assert_eq!(library_name("http://opcfoundation.org/UA/"), "opcfoundation.org/UA");
        assert_eq!(library_name("urn:pumps"), "pumps");
        assert_eq!(library_name("plain"), "plain");
    }

    #[test]
    fn qualified_names_serialize_as_pairs() {
        let name = QualifiedName::new("urn:pumps", "PumpType");
        assert_eq!(serde_json::to_string(&name).unwrap(), r#"["pumps","PumpType"]"#);
        assert_eq!(name.to_string(), "pumps/PumpType");
    }

    #[test]
    fn document_json_uses_pascal_case() {
        let stamp = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let doc = SchemaDocument::new("urn:pumps", stamp);
        let json = doc.to_json().unwrap();
        assert!(json.contains("\"Meta\""));
        assert!(json.contains("\"EnumerationTypes\""));
        assert_eq!(SchemaDocument::from_json(&json).unwrap(), doc);
    }
}
