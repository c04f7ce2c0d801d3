//! nodeset-lite-core
//!
//! Converts between four representations of an OPC UA information model:
//! - UANodeSet XML documents (`wire`)
//! - the canonical in-memory node graph (`model`, built through `registry`)
//! - normalized relational records (`records`)
//! - the external typed-library schema document (`schema`)
//!
//! The builders in `import` construct graphs, the projectors in `export`
//! serialize them, and `resolver` computes the namespace closure a batch
//! needs before anything is built. `batch` sequences the three.

pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod import;
pub mod model;
pub mod records;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod wire;

#[cfg(test)]
mod testing;

pub use crate::error::{BatchWarning, Diagnostics, ModelError, Result};

/// Convenience re-exports.
pub mod prelude {
    pub use crate::batch::{ExportBatch, ImportBatch, ImportOutcome};
    pub use crate::config::BatchConfig;
    pub use crate::context::{BuildContext, NodeAnnotator};
    pub use crate::export::graph_to_records::RecordProjector;
    pub use crate::export::graph_to_schema::SchemaProjector;
    pub use crate::export::graph_to_wire::WireProjector;
    pub use crate::import::records_to_graph::RecordGraphBuilder;
    pub use crate::import::wire_to_graph::WireGraphBuilder;
    pub use crate::model::{NamespaceId, Node, NodeGraph, NodeKind, NodeRef};
    pub use crate::records::store::{MemoryRecordStore, RecordStore};
    pub use crate::registry::IdentityRegistry;
    pub use crate::resolver::{DependencyResolver, NamespaceCache, NamespaceFetcher};
    pub use crate::wire::{parse_nodeset, write_nodeset, NodeSetDocument};
    pub use crate::{BatchWarning, Diagnostics, ModelError, Result};
}
