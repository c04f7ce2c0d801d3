//! Projectors: graph → relational records, graph → nodeset document,
//! graph → typed-library schema. Projectors only read the graph.

pub mod graph_to_records;
pub mod graph_to_schema;
pub mod graph_to_wire;
