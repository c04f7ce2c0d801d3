use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::error::{ModelError, Result};
use crate::wire::{content_hash, parse_nodeset, NodeSetDocument, RequiredModel};

/// One version of one namespace, as supplied or fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceRecord {
    pub uri: String,
    pub version: Option<String>,
    pub publication_date: Option<DateTime<Utc>>,
    /// Hex SHA-256 of the parsed document.
    pub content_hash: String,
    pub document: Arc<NodeSetDocument>,
}

impl NamespaceRecord {
    /// Takes namespace, version and date from the document's first model.
    pub fn from_document(document: NodeSetDocument) -> Result<Self> {
        let model = document.models.first().ok_or_else(|| {
            ModelError::InvalidDocument("nodeset declares no model".to_string())
        })?;
        let canonical = serde_json::to_string(&document)?;
        Ok(Self {
            uri: model.model_uri.clone(),
            version: model.version.clone(),
            publication_date: model.publication_date,
            content_hash: content_hash(&canonical),
            document: Arc::new(document),
        })
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        Self::from_document(parse_nodeset(xml)?)
    }

    pub fn required(&self) -> &[RequiredModel] {
        self.document
            .models
            .first()
            .map(|m| m.required.as_slice())
            .unwrap_or_default()
    }
}

pub type CacheKey = (String, Option<DateTime<Utc>>);

/// How a candidate was chosen for a requested publication date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionMatch {
    /// Same publication date as requested.
    Exact,
    /// Earliest candidate published after the requested date.
    Newer,
    /// No date requested; the latest candidate.
    Latest,
}

/// Picks a candidate for `requested`. Candidates without a publication
/// date only satisfy requests without one.
pub fn select_version(
    candidates: &[Arc<NamespaceRecord>],
    requested: Option<DateTime<Utc>>,
    exact_match_only: bool,
) -> Option<(Arc<NamespaceRecord>, VersionMatch)> {
    let Some(requested) = requested else {
        return candidates
            .iter()
            .max_by_key(|c| c.publication_date)
            .map(|c| (Arc::clone(c), VersionMatch::Latest));
    };
    if let Some(exact) = candidates
        .iter()
        .find(|c| c.publication_date == Some(requested))
    {
        return Some((Arc::clone(exact), VersionMatch::Exact));
    }
    if exact_match_only {
        return None;
    }
    candidates
        .iter()
        .filter(|c| c.publication_date.is_some_and(|d| d > requested))
        .min_by_key(|c| c.publication_date)
        .map(|c| (Arc::clone(c), VersionMatch::Newer))
}

/// Namespace documents keyed by (uri, publication date).
///
/// Inserting a key that is already present keeps the first record, so
/// every lookup of a key returns the same `Arc`.
#[derive(Debug, Default)]
pub struct NamespaceCache {
    entries: RwLock<BTreeMap<CacheKey, Arc<NamespaceRecord>>>,
}

impl NamespaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached record for the key and whether `record` was new.
    pub fn insert(&self, record: NamespaceRecord) -> Result<(Arc<NamespaceRecord>, bool)> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| ModelError::Store(format!("Lock: {}", e)))?;
        let key = (record.uri.clone(), record.publication_date);
        if let Some(existing) = entries.get(&key) {
            return Ok((Arc::clone(existing), false));
        }
        let record = Arc::new(record);
        entries.insert(key, Arc::clone(&record));
        Ok((record, true))
    }

    /// Inserts a supplied record. A cached record with the same key but
    /// different content is replaced; identical content keeps the cached `Arc`.
    pub fn put(&self, record: NamespaceRecord) -> Result<Arc<NamespaceRecord>> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| ModelError::Store(format!("Lock: {}", e)))?;
        let key = (record.uri.clone(), record.publication_date);
        if let Some(existing) = entries.get(&key) {
            if existing.content_hash == record.content_hash {
                return Ok(Arc::clone(existing));
            }
            info!(
                namespace = %record.uri,
                cached = ?existing.version,
                supplied = ?record.version,
                "supplied document replaces cached copy"
            );
        }
        let record = Arc::new(record);
        entries.insert(key, Arc::clone(&record));
        Ok(record)
    }

    pub fn get(
        &self,
        uri: &str,
        publication_date: Option<DateTime<Utc>>,
    ) -> Result<Option<Arc<NamespaceRecord>>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| ModelError::Store(format!("Lock: {}", e)))?;
        Ok(entries.get(&(uri.to_string(), publication_date)).cloned())
    }

    /// Every cached version of `uri`, oldest first.
    pub fn candidates(&self, uri: &str) -> Result<Vec<Arc<NamespaceRecord>>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| ModelError::Store(format!("Lock: {}", e)))?;
        Ok(entries
            .iter()
            .filter(|((u, _), _)| u == uri)
            .map(|(_, r)| Arc::clone(r))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
