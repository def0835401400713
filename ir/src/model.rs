//! Structural description of a graph, as stored in the JSON document.
//!
//! Nodes are listed in evaluation order and referred to by their position.
//! Dimensions are integers, `-1` standing for an unknown one. Constant
//! values live in the binary payload and are referred to by offset and
//! size.
use serde::{Deserialize, Serialize};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtoModel {
    pub version: u32,
    pub graph: ProtoGraph,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtoGraph {
    pub name: String,
    pub nodes: Vec<ProtoNode>,
    pub edges: Vec<ProtoEdge>,
    pub parameters: Vec<usize>,
    pub results: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sinks: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<ProtoVariable>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtoNode {
    pub id: usize,
    pub name: String,
    pub op: ProtoOp,
    #[serde(default)]
    pub outputs: Vec<ProtoPort>,
}

/// Output port of a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtoPort {
    pub element_type: String,
    pub shape: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtoEdge {
    pub from_node: usize,
    pub from_port: usize,
    pub to_node: usize,
    pub to_port: usize,
}

/// A tensor stored in the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtoTensorRef {
    pub element_type: String,
    pub shape: Vec<usize>,
    pub offset: u64,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtoVariable {
    pub id: String,
    pub element_type: String,
    pub shape: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<ProtoTensorRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProtoOp {
    Parameter { element_type: String, shape: Vec<i64> },
    Result,
    Const { value: ProtoTensorRef },
    Relu,
    Sigmoid,
    Neg,
    Abs,
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    Reshape { special_zero: bool },
    ShapeOf { output_type: String },
    Squeeze { axes: Option<Vec<i64>> },
    Unsqueeze { axes: Vec<i64> },
    Concat { axis: i64 },
    Slice { axis: usize, start: usize, end: usize },
    Convert { destination_type: String },
    ReadValue { variable_id: String, element_type: String, shape: Vec<i64> },
    Assign { variable_id: String },
    TensorIterator {
        body: Box<ProtoGraph>,
        input_mapping: Vec<ProtoInputMapping>,
        output_mapping: Vec<ProtoOutputMapping>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        num_iterations: Option<usize>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtoInputMapping {
    Sliced {
        outer: usize,
        body_param: usize,
        axis: usize,
        start: i64,
        end: i64,
        stride: i64,
        part_size: usize,
    },
    Invariant {
        outer: usize,
        body_param: usize,
    },
    Merged {
        outer: usize,
        body_param: usize,
        body_result: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtoOutputMapping {
    LastIteration { body_result: usize },
    Concatenated { body_result: usize, axis: usize, stride: i64, part_size: usize },
}
