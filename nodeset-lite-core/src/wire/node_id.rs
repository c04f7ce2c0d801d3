//! Namespace-qualified node ids as written in nodeset documents
//! (`i=58`, `ns=1;i=1001`, `nsu=http://x/;s=Pump`).

use std::collections::BTreeMap;

use crate::error::{ModelError, Result};
use crate::wire::well_known::UA_NAMESPACE_URI;

/// Node id with its namespace spelled out as a URI; independent of any
/// document's namespace table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalNodeId {
    pub namespace_uri: String,
    pub identifier: String,
}

impl GlobalNodeId {
    pub fn new(namespace_uri: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
            identifier: identifier.into(),
        }
    }

    pub fn base(identifier: &str) -> Self {
        Self::new(UA_NAMESPACE_URI, identifier)
    }

    pub fn is_base(&self) -> bool {
        self.namespace_uri == UA_NAMESPACE_URI
    }

    /// True when this is the base-namespace node `identifier`.
    pub fn is_base_node(&self, identifier: &str) -> bool {
        self.is_base() && self.identifier == identifier
    }
}

impl std::fmt::Display for GlobalNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "nsu={};{}", self.namespace_uri, self.identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NamespaceRef {
    Index(u16),
    Uri(String),
}

/// Splits `ns=<n>;` / `nsu=<uri>;` off an id and checks the identifier form.
fn split_node_id(raw: &str) -> Result<(NamespaceRef, &str)> {
    let raw = raw.trim();
    let (ns, identifier) = if let Some(rest) = raw.strip_prefix("ns=") {
        let (index, id) = rest
            .split_once(';')
            .ok_or_else(|| ModelError::Parse(format!("malformed node id '{}'", raw)))?;
        let index = index
            .parse::<u16>()
            .map_err(|_| ModelError::Parse(format!("bad namespace index in '{}'", raw)))?;
        (NamespaceRef::Index(index), id)
    } else if let Some(rest) = raw.strip_prefix("nsu=") {
        let (uri, id) = rest
            .rsplit_once(';')
            .ok_or_else(|| ModelError::Parse(format!("malformed node id '{}'", raw)))?;
        (NamespaceRef::Uri(uri.to_string()), id)
    } else {
        (NamespaceRef::Index(0), raw)
    };
    check_identifier(identifier).map_err(|_| ModelError::Parse(format!("bad node id '{}'", raw)))?;
    Ok((ns, identifier))
}

/// Accepts `i=<u32>`, `s=<text>`, `g=<guid>`, `b=<base64>`.
pub fn check_identifier(identifier: &str) -> Result<()> {
    let ok = match identifier.split_at_checked(2) {
        Some(("i=", n)) => n.parse::<u32>().is_ok(),
        Some(("s=", s)) => !s.is_empty(),
        Some(("g=", g)) => g.len() == 36 && g.chars().all(|c| c.is_ascii_hexdigit() || c == '-'),
        Some(("b=", b)) => !b.is_empty(),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ModelError::Parse(format!(
            "bad identifier '{}'",
            identifier
        )))
    }
}

/// Maps document-local namespace indices to URIs. Index 0 is always the
/// base namespace; index n is the document's n-th `NamespaceUris` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceTable {
    uris: Vec<String>,
}

impl NamespaceTable {
    pub fn new(document_uris: &[String]) -> Self {
        let mut uris = vec![UA_NAMESPACE_URI.to_string()];
        uris.extend(document_uris.iter().cloned());
        Self { uris }
    }

    pub fn uri(&self, index: u16) -> Option<&str> {
        self.uris.get(index as usize).map(|s| s.as_str())
    }

    pub fn index_of(&self, uri: &str) -> Option<u16> {
        self.uris.iter().position(|u| u == uri).map(|i| i as u16)
    }

    /// Document entries (without index 0).
    pub fn document_uris(&self) -> &[String] {
        &self.uris[1..]
    }

    /// Resolves a raw id or alias against this table.
    pub fn resolve(&self, raw: &str, aliases: &BTreeMap<String, String>) -> Result<GlobalNodeId> {
        let raw = aliases.get(raw.trim()).map(|s| s.as_str()).unwrap_or(raw);
        let (ns, identifier) = split_node_id(raw)?;
        let uri = match ns {
            NamespaceRef::Uri(uri) => uri,
            NamespaceRef::Index(index) => self
                .uri(index)
                .ok_or_else(|| {
                    ModelError::Parse(format!(
                        "node id '{}' uses undeclared namespace index {}",
                        raw, index
                    ))
                })?
                .to_string(),
        };
        Ok(GlobalNodeId::new(uri, identifier))
    }

    /// Renders an id with this table's index for its namespace.
    pub fn render(&self, id: &GlobalNodeId) -> Result<String> {
        match self.index_of(&id.namespace_uri) {
            Some(0) => Ok(id.identifier.clone()),
            Some(index) => Ok(format!("ns={};{}", index, id.identifier)),
            None => Err(ModelError::InvalidDocument(format!(
                "namespace {} missing from the namespace table",
                id.namespace_uri
            ))),
        }
    }

    /// Rewrites the namespace index prefix of a qualified name (`1:Pump`).
    pub fn resolve_qualified_name(&self, raw: &str) -> Result<(String, String)> {
        match raw.split_once(':') {
            Some((index, name)) if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) => {
                let index = index
                    .parse::<u16>()
                    .map_err(|_| ModelError::Parse(format!("bad browse name '{}'", raw)))?;
                let uri = self.uri(index).ok_or_else(|| {
                    ModelError::Parse(format!(
                        "browse name '{}' uses undeclared namespace index {}",
                        raw, index
                    ))
                })?;
                Ok((uri.to_string(), name.to_string()))
            }
            _ => Ok((UA_NAMESPACE_URI.to_string(), raw.to_string())),
        }
    }

    pub fn render_qualified_name(&self, namespace_uri: &str, name: &str) -> Result<String> {
        match self.index_of(namespace_uri) {
            Some(0) => Ok(name.to_string()),
            Some(index) => Ok(format!("{}:{}", index, name)),
            None => Err(ModelError::InvalidDocument(format!(
                "namespace {} missing from the namespace table",
                namespace_uri
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> NamespaceTable {
        NamespaceTable::new(&["urn:a".to_string(), "urn:b".to_string()])
    }

    #[test]
    fn bare_id_is_base_namespace() {
        let id = table().resolve("i=58", &BTreeMap::new()).unwrap();
        assert!(id.is_base_node("i=58"));
    }

    #[test]
    fn indexed_and_uri_forms_agree() {
        let t = table();
        let a = t.resolve("ns=2;s=Pump", &BTreeMap::new()).unwrap();
        let b = t.resolve("nsu=urn:b;s=Pump", &BTreeMap::new()).unwrap();
        assert_eq!(a, b);
        assert_eq!(t.render(&a).unwrap(), "ns=2;s=Pump");
    }

    #[test]
    fn aliases_are_expanded() {
        let aliases = BTreeMap::from([("HasComponent".to_string(), "i=47".to_string())]);
        let id = table().resolve("HasComponent", &aliases).unwrap();
        assert!(id.is_base_node("i=47"));
    }

    #[test]
    fn undeclared_index_is_a_parse_error() {
        let err = table().resolve("ns=7;i=1", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ModelError::Parse(_)));
    }

    #[test]
    fn malformed_identifiers_are_rejected() {
        assert!(check_identifier("i=12").is_ok());
        assert!(check_identifier("i=abc").is_err());
        assert!(check_identifier("x=1").is_err());
        assert!(check_identifier("s=").is_err());
        assert!(check_identifier("g=09087e75-8e5e-499b-954f-f2a9603db28a").is_ok());
    }

    #[test]
    fn qualified_names_map_index_to_uri() {
        let t = table();
        assert_eq!(
            t.resolve_qualified_name("1:Pump").unwrap(),
            ("urn:a".to_string(), "Pump".to_string())
        );
        assert_eq!(
            t.resolve_qualified_name("Pump").unwrap().0,
            UA_NAMESPACE_URI.to_string()
        );
        assert_eq!(t.render_qualified_name("urn:b", "X").unwrap(), "2:X");
    }
}
