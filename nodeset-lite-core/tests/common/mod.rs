#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nodeset_lite_core::batch::build_graph;
use nodeset_lite_core::model::{NamespaceId, NodeGraph};
use nodeset_lite_core::resolver::{select_version, NamespaceFetcher, NamespaceRecord};
use nodeset_lite_core::wire::{parse_nodeset, NodeSetDocument};
use nodeset_lite_core::{Diagnostics, ModelError, Result};

pub const UA: &str = "http://opcfoundation.org/UA/";
pub const MACHINES: &str = "http://example.com/machines/";

pub const BASE_XML: &str = include_str!("../fixtures/base.xml");
pub const MACHINES_XML: &str = include_str!("../fixtures/machines.xml");

pub fn doc(xml: &str) -> NodeSetDocument {
    parse_nodeset(xml).unwrap()
}

pub fn record(xml: &str) -> Arc<NamespaceRecord> {
    Arc::new(NamespaceRecord::from_xml(xml).unwrap())
}

/// Builds the given documents, in order, into one graph.
pub fn graph_of(xmls: &[&str]) -> (NodeGraph, Vec<NamespaceId>) {
    let records: Vec<_> = xmls.iter().map(|x| record(x)).collect();
    let mut diagnostics = Diagnostics::new();
    build_graph(&records, &mut diagnostics).unwrap()
}

/// Serves a fixed set of documents and counts every call.
pub struct LibraryFetcher {
    library: Vec<Arc<NamespaceRecord>>,
    calls: AtomicUsize,
}

impl LibraryFetcher {
    pub fn new(xmls: &[&str]) -> Self {
        Self {
            library: xmls.iter().map(|x| record(x)).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NamespaceFetcher for LibraryFetcher {
    async fn resolve(
        &self,
        uri: &str,
        publication_date: Option<DateTime<Utc>>,
        exact_match_only: bool,
    ) -> Result<Option<NamespaceRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let candidates: Vec<_> = self
            .library
            .iter()
            .filter(|r| r.uri == uri)
            .cloned()
            .collect();
        Ok(select_version(&candidates, publication_date, exact_match_only)
            .map(|(r, _)| NamespaceRecord::clone(&r)))
    }
}

/// Always errors.
pub struct BrokenFetcher;

#[async_trait]
impl NamespaceFetcher for BrokenFetcher {
    async fn resolve(
        &self,
        uri: &str,
        _publication_date: Option<DateTime<Utc>>,
        _exact_match_only: bool,
    ) -> Result<Option<NamespaceRecord>> {
        Err(ModelError::Store(format!("library offline for {}", uri)))
    }
}
