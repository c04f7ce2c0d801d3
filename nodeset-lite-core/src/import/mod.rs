//! Graph builders: nodeset documents → graph, relational records → graph.
//!
//! Both go through [`crate::registry::IdentityRegistry`] for every node, so
//! a node referenced before its own element or record is reached exists as
//! a stub and is completed in place later.

pub mod records_to_graph;
pub mod wire_to_graph;
