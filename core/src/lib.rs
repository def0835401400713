//! # Graft
//!
//! A small dataflow graph IR for neural network models, with an evaluator
//! and a pass manager running graph-to-graph transformations.
//!
//! ## Example
//!
//! ```
//! use graft_core::internal::*;
//! use graft_core::optim::ConstantFolding;
//!
//! # fn main() -> GraftResult<()> {
//! let mut model = Graph::named("example");
//! let input = model.add_parameter("input", f32::fact([3]))?;
//! let shape = model.wire_node("shape", ShapeOf::new(DatumType::I64), &[input])?;
//! let reshaped = model.wire_node("reshape", Reshape::new(false), &[input, shape[0]])?;
//! let output = model.add_result("output", reshaped[0])?;
//! let mut model = model.with_interface(&[output], &[input.node])?;
//!
//! let mut manager = PassManager::new();
//! manager.register(ConstantFolding);
//! manager.run(&mut model)?;
//! assert!(model.nodes().all(|n| n.op.name() != "ShapeOf"));
//!
//! let plan = SimplePlan::new(&model)?;
//! let outputs = plan.run(tvec!(tensor1(&[1.0f32, 2.5, 5.0]).into()))?;
//! assert_eq!(*outputs[0], tensor1(&[1.0f32, 2.5, 5.0]));
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate derive_new;
#[allow(unused_imports)]
#[macro_use]
extern crate log;

pub mod broadcast;
pub mod errors;
pub mod floats;
pub mod model;
pub mod ops;
pub mod optim;
pub mod plan;
pub mod transform;

pub use dyn_clone;
pub use graft_data;

pub mod prelude {
    pub use crate::errors::{GraftResult, GraphError};
    pub use crate::model::*;
    pub use crate::optim::{GraphPass, PassManager};
    pub use crate::plan::{SessionState, SimplePlan, SimpleState};
    pub use graft_data::prelude::*;
    pub use std::sync::Arc;
}

pub mod internal {
    pub use crate::ops::array::{Concat, Reshape, ShapeOf, Slice, Squeeze, Unsqueeze};
    pub use crate::ops::binary::BinaryOp;
    pub use crate::ops::cast::Convert;
    pub use crate::ops::custom::CustomOp;
    pub use crate::ops::element_wise::ElementWiseOp;
    pub use crate::ops::konst::Const;
    pub use crate::ops::memory::{Assign, ReadValue};
    pub use crate::ops::scan::{InputMapping, OutputMapping, TensorIterator};
    pub use crate::ops::sink::ResultOp;
    pub use crate::ops::source::Parameter;
    pub use crate::ops::{check_input_arity, OpKind, TypedOp};
    pub use crate::prelude::*;
    pub use anyhow::{anyhow, bail, ensure, format_err, Context as GraftContext};
    pub use graft_data::internal::*;
    pub use std::borrow::Cow;
    pub use std::collections::HashMap;
    pub use std::fmt;
}

#[cfg(test)]
#[allow(dead_code)]
fn setup_test_logger() {
    let _ = env_logger::Builder::from_env("GRAFT_LOG").try_init();
}
