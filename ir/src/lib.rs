//! Serialized form of a graft graph.
//!
//! A graph is stored as a JSON description of its nodes, edges and ports,
//! and a binary payload holding the raw little-endian bytes of its
//! constants.
//!
//! ```
//! use graft_core::internal::*;
//!
//! # fn main() -> GraftResult<()> {
//! let mut model = Graph::named("example");
//! let input = model.add_parameter("input", f32::fact([2]))?;
//! let bias = model.add_const("bias", rctensor1(&[1f32, 2.0]))?;
//! let sum = model.wire_node("sum", BinaryOp::Add, &[input, bias])?;
//! model.add_result("output", sum[0])?;
//!
//! let (description, payload) = graft_ir::serialize(&model)?;
//! assert_eq!(payload.len(), 8);
//! let reloaded = graft_ir::deserialize(&description, &payload)?;
//! assert!(reloaded.same_structure(&model)?);
//! # Ok(())
//! # }
//! ```
#[macro_use]
extern crate log;

pub mod container;
pub mod deser;
pub mod model;
pub mod ser;

pub use container::{load, save, Serialize};

use graft_core::internal::*;

/// Serializes a graph to its JSON description and binary payload.
pub fn serialize(model: &Graph) -> GraftResult<(String, Vec<u8>)> {
    let (proto, payload) = ser::to_proto_model(model)?;
    let text = serde_json::to_string_pretty(&proto)?;
    info!(
        "Serialized {:?}: {} nodes, {} bytes of payload",
        model.name,
        proto.graph.nodes.len(),
        payload.len()
    );
    Ok((text, payload))
}

/// Rebuilds a graph from its JSON description and binary payload.
pub fn deserialize(description: &str, payload: &[u8]) -> GraftResult<Graph> {
    let proto: model::ProtoModel =
        serde_json::from_str(description).context("Parsing graph description")?;
    deser::from_proto_model(&proto, payload)
}
