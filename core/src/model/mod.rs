//! ## Models and their lifecycle
//!
//! A `Graph` is a dataflow graph of `Node`s. Each node carries an
//! operation (`OpKind`), its inputs as `OutletId`s, and one `Outlet` per
//! output holding the output `TypedFact`, its consumers and its tensor
//! names.
//!
//! Graphs are built with `add_parameter`, `add_const`, `wire_node` and
//! `add_result`, then sealed with `with_interface`, which checks they are
//! acyclic and drops whatever does not contribute to a result or a sink.
//!
//! Passes (see `optim`) rewrite graphs in place, and `SimplePlan` runs
//! them.
mod fact;
mod graph;
mod node;
pub mod order;

pub use self::fact::{DatumExt, Dim, ShapeFact, TypedFact};
pub use self::graph::{Graph, Variable};
pub use self::node::{InletId, Node, NodeId, Outlet, OutletId};
