//! Batch sequencing.
//!
//! `ImportBatch`: resolve → build → begin → project every namespace in
//! dependency order → commit. Any failure after `begin` rolls back.
//! `ExportBatch`: records → graph → nodeset XML or schema JSON.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::config::BatchConfig;
use crate::context::{BuildContext, NoAnnotation, NodeAnnotator};
use crate::error::{BatchWarning, Diagnostics, ModelError, Result};
use crate::export::graph_to_records::{ProjectionSummary, RecordProjector};
use crate::export::graph_to_schema::SchemaProjector;
use crate::export::graph_to_wire::WireProjector;
use crate::import::records_to_graph::RecordGraphBuilder;
use crate::import::wire_to_graph::WireGraphBuilder;
use crate::model::{NamespaceId, NodeGraph};
use crate::records::store::RecordStore;
use crate::registry::IdentityRegistry;
use crate::resolver::{DependencyResolver, NamespaceCache, NamespaceFetcher, NamespaceRecord};
use crate::schema::SchemaDocument;
use crate::wire::{write_nodeset, NodeSetDocument};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportOutcome {
    /// One entry per projected namespace, in projection order.
    pub namespaces: Vec<ProjectionSummary>,
    /// Namespaces the resolver tried to fetch.
    pub fetched: Vec<String>,
    pub warnings: Vec<BatchWarning>,
}

impl ImportOutcome {
    pub fn created(&self) -> usize {
        self.namespaces.iter().map(|s| s.created).sum()
    }
}

pub struct ImportBatch<'a> {
    store: &'a dyn RecordStore,
    cache: &'a NamespaceCache,
    fetcher: &'a dyn NamespaceFetcher,
    config: BatchConfig,
}

impl<'a> ImportBatch<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        cache: &'a NamespaceCache,
        fetcher: &'a dyn NamespaceFetcher,
    ) -> Self {
        Self {
            store,
            cache,
            fetcher,
            config: BatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn run(&self, supplied: Vec<NodeSetDocument>) -> Result<ImportOutcome> {
        let mut diagnostics = Diagnostics::new();

        let resolution = DependencyResolver::new(self.cache, self.fetcher)
            .exact_match_only(self.config.exact_match_only)
            .timeout(self.config.fetch_timeout())
            .resolve(supplied, &mut diagnostics)
            .await?;
        let fetched = resolution.fetched.clone();
        let records = resolution.into_ready()?;

        let (graph, namespaces) = build_graph(&records, &mut diagnostics)?;

        self.store.begin().await?;
        let mut summaries = Vec::with_capacity(namespaces.len());
        for id in &namespaces {
            let projected = RecordProjector::new(&graph, self.store)
                .update_existing(self.config.update_existing)
                .project(*id)
                .await;
            match projected {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    error!(error = %e, code = e.code(), "import failed, rolling back");
                    self.abandon().await;
                    return Err(e);
                }
            }
        }
        if let Err(e) = self.store.commit().await {
            error!(error = %e, "commit failed, rolling back");
            self.abandon().await;
            return Err(e);
        }

        info!(
            namespaces = summaries.len(),
            warnings = diagnostics.warnings().len(),
            "import committed"
        );
        Ok(ImportOutcome {
            namespaces: summaries,
            fetched,
            warnings: diagnostics.into_warnings(),
        })
    }

    /// Rolls back after a failure. The failure is what the caller sees, so a
    /// rollback error is only logged.
    async fn abandon(&self) {
        if let Err(e) = self.store.rollback().await {
            error!(error = %e, code = e.code(), "rollback failed");
        }
    }
}

/// Builds resolved namespaces into one graph. Returns their ids in the
/// order given.
pub fn build_graph(
    records: &[Arc<NamespaceRecord>],
    diagnostics: &mut Diagnostics,
) -> Result<(NodeGraph, Vec<NamespaceId>)> {
    build_graph_with(records, diagnostics, &mut NoAnnotation)
}

/// [`build_graph`] with every node's context slot filled by `annotator`.
pub fn build_graph_with(
    records: &[Arc<NamespaceRecord>],
    diagnostics: &mut Diagnostics,
    annotator: &mut dyn NodeAnnotator,
) -> Result<(NodeGraph, Vec<NamespaceId>)> {
    let mut registry = IdentityRegistry::new();
    let ids = {
        let mut ctx = BuildContext::new(&mut registry, diagnostics, annotator);
        WireGraphBuilder::with_documents(records.iter().map(|r| r.document.as_ref()))
            .build(&mut ctx)?
    };
    Ok((registry.into_graph(), ids))
}

pub struct ExportBatch<'a> {
    store: &'a dyn RecordStore,
    config: BatchConfig,
}

impl<'a> ExportBatch<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self {
            store,
            config: BatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Rebuilds `namespace` and every record it reaches from the store.
    pub async fn load(
        &self,
        namespace: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<(NodeGraph, NamespaceId)> {
        self.load_with(namespace, diagnostics, &mut NoAnnotation).await
    }

    /// [`Self::load`] with every node's context slot filled by `annotator`.
    pub async fn load_with(
        &self,
        namespace: &str,
        diagnostics: &mut Diagnostics,
        annotator: &mut (dyn NodeAnnotator + Send),
    ) -> Result<(NodeGraph, NamespaceId)> {
        let builder = RecordGraphBuilder::new(self.store);
        let set = builder.gather(namespace).await?;
        if set.model.is_none() && set.own().is_empty() {
            return Err(ModelError::MissingDependency {
                namespace: namespace.to_string(),
                missing: vec![namespace.to_string()],
            });
        }
        let mut registry = IdentityRegistry::new();
        let id = {
            let mut ctx = BuildContext::new(&mut registry, diagnostics, annotator);
            builder.build(&set, &mut ctx)?
        };
        Ok((registry.into_graph(), id))
    }

    pub async fn to_nodeset(&self, namespace: &str) -> Result<(String, Diagnostics)> {
        let mut diagnostics = Diagnostics::new();
        let (graph, id) = self.load(namespace, &mut diagnostics).await?;
        let doc = WireProjector::new(&graph).project(id)?;
        Ok((write_nodeset(&doc)?, diagnostics))
    }

    pub async fn to_schema(
        &self,
        namespace: &str,
        existing: Option<&SchemaDocument>,
    ) -> Result<(SchemaDocument, Diagnostics)> {
        let mut diagnostics = Diagnostics::new();
        let (graph, id) = self.load(namespace, &mut diagnostics).await?;
        let mut projector = SchemaProjector::new(&graph);
        if let Some(existing) = existing {
            projector = projector.with_existing(existing);
        }
        let mut doc = projector.project(id, &mut diagnostics)?;
        if let Some(name) = &self.config.export_namespace {
            doc.meta.export_namespace = name.clone();
        }
        Ok((doc, diagnostics))
    }
}
