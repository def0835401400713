use crate::model::*;
use graft_core::internal::*;

fn corrupt(msg: impl Into<String>) -> anyhow::Error {
    GraphError::CorruptPayload(msg.into()).into()
}

fn invalid(msg: impl Into<String>) -> anyhow::Error {
    GraphError::InvalidGraph(msg.into()).into()
}

fn datum_type(s: &str) -> GraftResult<DatumType> {
    s.parse::<DatumType>().map_err(|_| invalid(format!("Unknown element type {s:?}")))
}

fn fact(element_type: &str, shape: &[i64]) -> GraftResult<TypedFact> {
    let dims = shape
        .iter()
        .map(|&d| match d {
            -1 => Ok(Dim::Dynamic),
            d if d >= 0 => Ok(Dim::Fixed(d as usize)),
            d => Err(invalid(format!("Invalid dimension {d}"))),
        })
        .collect::<GraftResult<TVec<Dim>>>()?;
    Ok(TypedFact::dt_shape(datum_type(element_type)?, dims))
}

/// Reads a tensor from the payload, checking it lies within its bounds.
pub fn read_tensor(tensor: &ProtoTensorRef, payload: &[u8]) -> GraftResult<Arc<Tensor>> {
    let dt = datum_type(&tensor.element_type)?;
    let end = tensor
        .offset
        .checked_add(tensor.size)
        .ok_or_else(|| corrupt(format!("Tensor at {} overflows", tensor.offset)))?;
    if end > payload.len() as u64 {
        bail!(corrupt(format!(
            "Tensor at {}..{} is out of the {} bytes of payload",
            tensor.offset,
            end,
            payload.len()
        )))
    }
    let expected = tensor
        .shape
        .iter()
        .try_fold(dt.size_of(), |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| corrupt(format!("Tensor of shape {:?} overflows", tensor.shape)))?;
    ensure!(
        tensor.size == expected as u64,
        corrupt(format!(
            "{} bytes for a {} tensor of shape {:?}",
            tensor.size, dt, tensor.shape
        ))
    );
    let bytes = &payload[tensor.offset as usize..end as usize];
    Ok(Tensor::from_le_bytes(dt, &tensor.shape, bytes)?.into_arc_tensor())
}

pub fn from_proto_model(proto: &ProtoModel, payload: &[u8]) -> GraftResult<Graph> {
    ensure!(
        proto.version == FORMAT_VERSION,
        invalid(format!("Unsupported format version {}", proto.version))
    );
    from_proto_graph(&proto.graph, payload)
}

pub fn from_proto_graph(proto: &ProtoGraph, payload: &[u8]) -> GraftResult<Graph> {
    let mut model = Graph::named(&*proto.name);
    for variable in &proto.variables {
        let initial = variable.initial.as_ref().map(|t| read_tensor(t, payload)).transpose()?;
        model.add_variable(Variable {
            id: variable.id.clone(),
            fact: fact(&variable.element_type, &variable.shape)?,
            initial,
        })?;
    }
    let mut ids: Vec<NodeId> = vec![];
    for (ix, node) in proto.nodes.iter().enumerate() {
        ensure!(node.id == ix, invalid(format!("Node {:?} listed at position {ix}", node.name)));
        let mut edges = proto.edges.iter().filter(|e| e.to_node == ix).collect::<Vec<_>>();
        edges.sort_by_key(|e| e.to_port);
        let inputs = edges
            .iter()
            .enumerate()
            .map(|(port, e)| {
                ensure!(
                    e.to_port == port,
                    invalid(format!("Input port {port} of {:?} is not connected", node.name))
                );
                let from = ids.get(e.from_node).ok_or_else(|| {
                    invalid(format!("Edge to {:?} from a later node #{}", node.name, e.from_node))
                })?;
                Ok(OutletId::new(*from, e.from_port))
            })
            .collect::<GraftResult<TVec<_>>>()?;
        let op = op_from_proto(&node.op, payload)
            .with_context(|| format!("Loading node {:?}", node.name))?;
        let id = model.add_node(&*node.name, op, &inputs)?;
        let outputs = model.node(id)?.outputs.len();
        ensure!(
            outputs == node.outputs.len(),
            invalid(format!(
                "{:?} declares {} outputs, its op has {}",
                node.name,
                node.outputs.len(),
                outputs
            ))
        );
        for (slot, port) in node.outputs.iter().enumerate() {
            let outlet = OutletId::new(id, slot);
            let declared = fact(&port.element_type, &port.shape)?;
            let computed = model.outlet_fact(outlet)?;
            ensure!(
                computed.same_type_and_shape(&declared),
                GraphError::ShapeMismatch(format!(
                    "{:?} port {slot} declared as {declared:?}, computed {computed:?}",
                    node.name
                ))
            );
            model.set_outlet_names(outlet, port.names.iter().cloned())?;
        }
        ids.push(id);
    }
    let lookup = |ix: &usize| -> GraftResult<NodeId> {
        ids.get(*ix).copied().ok_or_else(|| invalid(format!("No node #{ix}")))
    };
    let parameters = proto.parameters.iter().map(lookup).collect::<GraftResult<Vec<_>>>()?;
    let results = proto.results.iter().map(lookup).collect::<GraftResult<Vec<_>>>()?;
    let sinks = proto.sinks.iter().map(lookup).collect::<GraftResult<Vec<_>>>()?;
    model.set_parameters(parameters)?;
    model.set_results(results)?;
    for sink in sinks {
        model.add_sink(sink)?;
    }
    model.validate()?;
    Ok(model)
}

fn op_from_proto(op: &ProtoOp, payload: &[u8]) -> GraftResult<OpKind> {
    Ok(match op {
        ProtoOp::Parameter { element_type, shape } => {
            Parameter::new(fact(element_type, shape)?).into()
        }
        ProtoOp::Result => ResultOp.into(),
        ProtoOp::Const { value } => Const::new(read_tensor(value, payload)?).into(),
        ProtoOp::Relu => ElementWiseOp::Relu.into(),
        ProtoOp::Sigmoid => ElementWiseOp::Sigmoid.into(),
        ProtoOp::Neg => ElementWiseOp::Neg.into(),
        ProtoOp::Abs => ElementWiseOp::Abs.into(),
        ProtoOp::Add => BinaryOp::Add.into(),
        ProtoOp::Sub => BinaryOp::Sub.into(),
        ProtoOp::Mul => BinaryOp::Mul.into(),
        ProtoOp::Div => BinaryOp::Div.into(),
        ProtoOp::Max => BinaryOp::Max.into(),
        ProtoOp::Min => BinaryOp::Min.into(),
        ProtoOp::Reshape { special_zero } => Reshape::new(*special_zero).into(),
        ProtoOp::ShapeOf { output_type } => ShapeOf::new(datum_type(output_type)?).into(),
        ProtoOp::Squeeze { axes } => {
            Squeeze::new(axes.as_ref().map(|a| a.iter().copied().collect())).into()
        }
        ProtoOp::Unsqueeze { axes } => Unsqueeze::new(axes.iter().copied().collect()).into(),
        ProtoOp::Concat { axis } => Concat::new(*axis).into(),
        ProtoOp::Slice { axis, start, end } => Slice::new(*axis, *start, *end).into(),
        ProtoOp::Convert { destination_type } => Convert::new(datum_type(destination_type)?).into(),
        ProtoOp::ReadValue { variable_id, element_type, shape } => {
            ReadValue::new(&**variable_id, fact(element_type, shape)?).into()
        }
        ProtoOp::Assign { variable_id } => Assign::new(&**variable_id).into(),
        ProtoOp::TensorIterator { body, input_mapping, output_mapping, num_iterations } => {
            let body = from_proto_graph(body, payload).context("Loading loop body")?;
            let mut ti = TensorIterator::new(body);
            ti.num_iterations = *num_iterations;
            ti.input_mapping = input_mapping
                .iter()
                .map(|m| match *m {
                    ProtoInputMapping::Sliced {
                        outer,
                        body_param,
                        axis,
                        start,
                        end,
                        stride,
                        part_size,
                    } => InputMapping::Sliced { outer, body_param, axis, start, end, stride, part_size },
                    ProtoInputMapping::Invariant { outer, body_param } => {
                        InputMapping::Invariant { outer, body_param }
                    }
                    ProtoInputMapping::Merged { outer, body_param, body_result } => {
                        InputMapping::Merged { outer, body_param, body_result }
                    }
                })
                .collect();
            ti.output_mapping = output_mapping
                .iter()
                .map(|m| match *m {
                    ProtoOutputMapping::LastIteration { body_result } => {
                        OutputMapping::LastIteration { body_result }
                    }
                    ProtoOutputMapping::Concatenated { body_result, axis, stride, part_size } => {
                        OutputMapping::Concatenated { body_result, axis, stride, part_size }
                    }
                })
                .collect();
            ti.into()
        }
    })
}
