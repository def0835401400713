use crate::model::*;
use graft_core::internal::*;
use std::collections::HashSet;

/// Accumulates constant tensors into the payload.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    pub bytes: Vec<u8>,
}

impl PayloadWriter {
    pub fn push(&mut self, tensor: &Tensor) -> ProtoTensorRef {
        let data = tensor.to_le_bytes();
        let offset = self.bytes.len() as u64;
        self.bytes.extend_from_slice(&data);
        ProtoTensorRef {
            element_type: tensor.datum_type().name().to_string(),
            shape: tensor.shape().to_vec(),
            offset,
            size: data.len() as u64,
        }
    }
}

pub fn to_proto_model(model: &Graph) -> GraftResult<(ProtoModel, Vec<u8>)> {
    let mut payload = PayloadWriter::default();
    let graph = to_proto_graph(model, &mut payload)?;
    Ok((ProtoModel { version: FORMAT_VERSION, graph }, payload.bytes))
}

fn dims(shape: &ShapeFact) -> Vec<i64> {
    shape
        .iter()
        .map(|d| match d {
            Dim::Fixed(d) => *d as i64,
            Dim::Dynamic => -1,
        })
        .collect()
}

fn check_unique_names(model: &Graph) -> GraftResult<()> {
    let mut seen = HashSet::new();
    for node in model.nodes() {
        for outlet in &node.outputs {
            for name in &outlet.names {
                if !seen.insert(name.as_str()) {
                    bail!(GraphError::DuplicateName(name.clone()))
                }
            }
        }
    }
    Ok(())
}

pub fn to_proto_graph(model: &Graph, payload: &mut PayloadWriter) -> GraftResult<ProtoGraph> {
    check_unique_names(model)?;
    let order = model.eval_order()?;
    let position = order.iter().enumerate().map(|(ix, id)| (*id, ix)).collect::<HashMap<_, _>>();
    let index = |id: &NodeId| -> GraftResult<usize> {
        position.get(id).copied().ok_or_else(|| {
            format_err!("{id} is not part of the graph {:?}", model.name)
        })
    };
    let mut nodes = vec![];
    let mut edges = vec![];
    for (ix, id) in order.iter().enumerate() {
        let node = model.node(*id)?;
        let op = op_to_proto(&node.op, payload).with_context(|| format!("Serializing {node}"))?;
        let outputs = node
            .outputs
            .iter()
            .map(|o| ProtoPort {
                element_type: o.fact.datum_type.name().to_string(),
                shape: dims(&o.fact.shape),
                names: o.names.iter().cloned().collect(),
            })
            .collect();
        for (to_port, input) in node.inputs.iter().enumerate() {
            edges.push(ProtoEdge {
                from_node: index(&input.node)?,
                from_port: input.slot,
                to_node: ix,
                to_port,
            });
        }
        nodes.push(ProtoNode { id: ix, name: node.name.clone(), op, outputs });
    }
    let variables = model
        .variables()
        .iter()
        .map(|v| ProtoVariable {
            id: v.id.clone(),
            element_type: v.fact.datum_type.name().to_string(),
            shape: dims(&v.fact.shape),
            initial: v.initial.as_ref().map(|t| payload.push(t)),
        })
        .collect();
    Ok(ProtoGraph {
        name: model.name.clone(),
        nodes,
        edges,
        parameters: model.parameters().iter().map(index).collect::<GraftResult<_>>()?,
        results: model.results().iter().map(index).collect::<GraftResult<_>>()?,
        sinks: model.sinks().iter().map(index).collect::<GraftResult<_>>()?,
        variables,
    })
}

fn op_to_proto(op: &OpKind, payload: &mut PayloadWriter) -> GraftResult<ProtoOp> {
    Ok(match op {
        OpKind::Parameter(p) => ProtoOp::Parameter {
            element_type: p.fact.datum_type.name().to_string(),
            shape: dims(&p.fact.shape),
        },
        OpKind::Result(_) => ProtoOp::Result,
        OpKind::Const(k) => ProtoOp::Const { value: payload.push(k.val()) },
        OpKind::ElementWise(ew) => match ew {
            ElementWiseOp::Relu => ProtoOp::Relu,
            ElementWiseOp::Sigmoid => ProtoOp::Sigmoid,
            ElementWiseOp::Neg => ProtoOp::Neg,
            ElementWiseOp::Abs => ProtoOp::Abs,
        },
        OpKind::Binary(bin) => match bin {
            BinaryOp::Add => ProtoOp::Add,
            BinaryOp::Sub => ProtoOp::Sub,
            BinaryOp::Mul => ProtoOp::Mul,
            BinaryOp::Div => ProtoOp::Div,
            BinaryOp::Max => ProtoOp::Max,
            BinaryOp::Min => ProtoOp::Min,
        },
        OpKind::Reshape(r) => ProtoOp::Reshape { special_zero: r.special_zero },
        OpKind::ShapeOf(s) => ProtoOp::ShapeOf { output_type: s.output_type.name().to_string() },
        OpKind::Squeeze(s) => ProtoOp::Squeeze { axes: s.axes.as_ref().map(|a| a.to_vec()) },
        OpKind::Unsqueeze(u) => ProtoOp::Unsqueeze { axes: u.axes.to_vec() },
        OpKind::Concat(c) => ProtoOp::Concat { axis: c.axis },
        OpKind::Slice(s) => ProtoOp::Slice { axis: s.axis, start: s.start, end: s.end },
        OpKind::Convert(c) => ProtoOp::Convert { destination_type: c.to.name().to_string() },
        OpKind::ReadValue(r) => ProtoOp::ReadValue {
            variable_id: r.variable_id.clone(),
            element_type: r.fact.datum_type.name().to_string(),
            shape: dims(&r.fact.shape),
        },
        OpKind::Assign(a) => ProtoOp::Assign { variable_id: a.variable_id.clone() },
        OpKind::TensorIterator(ti) => ProtoOp::TensorIterator {
            body: Box::new(to_proto_graph(&ti.body, payload).context("Serializing loop body")?),
            input_mapping: ti
                .input_mapping
                .iter()
                .map(|m| match *m {
                    InputMapping::Sliced { outer, body_param, axis, start, end, stride, part_size } => {
                        ProtoInputMapping::Sliced {
                            outer,
                            body_param,
                            axis,
                            start,
                            end,
                            stride,
                            part_size,
                        }
                    }
                    InputMapping::Invariant { outer, body_param } => {
                        ProtoInputMapping::Invariant { outer, body_param }
                    }
                    InputMapping::Merged { outer, body_param, body_result } => {
                        ProtoInputMapping::Merged { outer, body_param, body_result }
                    }
                })
                .collect(),
            output_mapping: ti
                .output_mapping
                .iter()
                .map(|m| match *m {
                    OutputMapping::LastIteration { body_result } => {
                        ProtoOutputMapping::LastIteration { body_result }
                    }
                    OutputMapping::Concatenated { body_result, axis, stride, part_size } => {
                        ProtoOutputMapping::Concatenated { body_result, axis, stride, part_size }
                    }
                })
                .collect(),
            num_iterations: ti.num_iterations,
        },
        OpKind::Custom(op) => {
            bail!(GraphError::UnsupportedOp(format!("Custom op {} can not be serialized", op.name())))
        }
    })
}
