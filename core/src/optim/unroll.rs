use crate::errors::invalid;
use crate::internal::*;
use crate::ops::scan::Chunks;

/// Replaces every loop with a static trip count by one inline copy of its
/// body per iteration.
#[derive(Clone, Debug, Default)]
pub struct UnrollTensorIterator;

impl GraphPass for UnrollTensorIterator {
    fn name(&self) -> Cow<'_, str> {
        "unroll-tensor-iterator".into()
    }

    fn run(&mut self, model: &mut Graph) -> GraftResult<bool> {
        let mut modified = false;
        for id in model.eval_order()? {
            let node = model.node(id)?;
            let Some(ti) = node.op.as_tensor_iterator() else { continue };
            let facts = node
                .inputs
                .iter()
                .map(|i| model.outlet_fact(*i))
                .collect::<GraftResult<Vec<_>>>()?;
            if ti.iteration_count(&facts)?.is_none() {
                warn!("Not unrolling {node}: trip count is not static");
                continue;
            }
            unroll_one(model, id, HashMap::new())?;
            modified = true;
        }
        if modified {
            model.refresh_facts()?;
        }
        Ok(modified)
    }
}

/// Inlines the loop `id`, then removes it.
///
/// `carried` overrides the initial value of back-edges, keyed by body
/// parameter. Returns the value each back-edge holds after the last
/// iteration.
pub fn unroll_one(
    model: &mut Graph,
    id: NodeId,
    mut carried: HashMap<usize, OutletId>,
) -> GraftResult<HashMap<usize, OutletId>> {
    let node = model.node(id)?;
    let ti = node
        .op
        .as_tensor_iterator()
        .ok_or_else(|| invalid(format!("{node} is not a TensorIterator")))?
        .clone();
    let (name, inputs) = (node.name.clone(), node.inputs.clone());
    let facts = inputs.iter().map(|i| model.outlet_fact(*i)).collect::<GraftResult<Vec<_>>>()?;
    let count = ti.iteration_count(&facts)?.ok_or_else(|| {
        GraphError::UnsupportedOp(format!("{name:?} does not have a static trip count"))
    })?;
    ensure!(count > 0, invalid(format!("{name:?} has no iteration")));
    let chunks = ti
        .input_mapping
        .iter()
        .map(|m| match m {
            InputMapping::Sliced { outer, axis, .. } => m.chunks(facts[*outer].shape[*axis].to_usize()),
            _ => Ok(None),
        })
        .collect::<GraftResult<Vec<Option<Chunks>>>>()?;
    for mapping in &ti.input_mapping {
        if let InputMapping::Merged { outer, body_param, .. } = mapping {
            carried.entry(*body_param).or_insert(inputs[*outer]);
        }
    }
    let body = &ti.body;
    let body_order = body.eval_order()?;
    let mut last: Vec<Option<OutletId>> = vec![None; ti.output_mapping.len()];
    let mut parts: Vec<Vec<OutletId>> = vec![vec![]; ti.output_mapping.len()];
    for i in 0..count {
        let mut mapping: HashMap<OutletId, OutletId> = HashMap::new();
        for (ix, input) in ti.input_mapping.iter().enumerate() {
            let param = body
                .parameters()
                .get(input.body_param())
                .copied()
                .ok_or_else(|| invalid(format!("No body parameter for {input:?}")))?;
            let value = match input {
                InputMapping::Sliced { outer, axis, .. } => {
                    let chunks = chunks[ix].ok_or_else(|| invalid("Unresolved slicing windows"))?;
                    let (start, end) = chunks.range(i);
                    let slice_name =
                        model.unique_name(&format!("{name}/{i}/{}", body.node(param)?.name));
                    model.wire_node(slice_name, Slice::new(*axis, start, end), &[inputs[*outer]])?[0]
                }
                InputMapping::Invariant { outer, .. } => inputs[*outer],
                InputMapping::Merged { body_param, .. } => carried
                    .get(body_param)
                    .copied()
                    .ok_or_else(|| invalid(format!("No carried value for {input:?}")))?,
            };
            mapping.insert(param.into(), value);
        }
        for &body_id in &body_order {
            let body_node = body.node(body_id)?;
            if matches!(body_node.op, OpKind::Parameter(_) | OpKind::Result(_)) {
                continue;
            }
            let wires = body_node
                .inputs
                .iter()
                .map(|i| {
                    mapping.get(i).copied().ok_or_else(|| invalid(format!("Unmapped body wire {i:?}")))
                })
                .collect::<GraftResult<TVec<_>>>()?;
            let copy_name = model.unique_name(&format!("{name}/{i}/{}", body_node.name));
            let outputs = model.wire_node(copy_name, body_node.op.clone(), &wires)?;
            for (slot, outlet) in outputs.into_iter().enumerate() {
                mapping.insert(OutletId::new(body_id, slot), outlet);
            }
        }
        let result = |k: usize| -> GraftResult<OutletId> {
            let outlet = body.result_outlet(k)?;
            mapping.get(&outlet).copied().ok_or_else(|| invalid(format!("Unmapped body result #{k}")))
        };
        for input in &ti.input_mapping {
            if let InputMapping::Merged { body_param, body_result, .. } = input {
                carried.insert(*body_param, result(*body_result)?);
            }
        }
        for (k, output) in ti.output_mapping.iter().enumerate() {
            match output {
                OutputMapping::LastIteration { body_result } => last[k] = Some(result(*body_result)?),
                OutputMapping::Concatenated { body_result, .. } => {
                    parts[k].push(result(*body_result)?)
                }
            }
        }
    }
    for (k, output) in ti.output_mapping.iter().enumerate() {
        let outlet = match output {
            OutputMapping::LastIteration { .. } => {
                last[k].ok_or_else(|| invalid(format!("No value for output #{k}")))?
            }
            OutputMapping::Concatenated { axis, stride, .. } => {
                let mut wires = std::mem::take(&mut parts[k]);
                if *stride < 0 {
                    wires.reverse();
                }
                if wires.len() == 1 {
                    wires[0]
                } else {
                    let concat_name = model.unique_name(&format!("{name}/concat.{k}"));
                    model.wire_node(concat_name, Concat::new(*axis as i64), &wires)?[0]
                }
            }
        };
        let original = OutletId::new(id, k);
        model.move_names(original, outlet)?;
        model.shunt(original, outlet)?;
    }
    model.remove_node(id)?;
    debug!("Unrolled {name:?} into {count} iterations");
    Ok(carried)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// acc' = acc + x[i] * w, over rows of x
    fn model(rows: Dim) -> GraftResult<Graph> {
        let mut body = Graph::named("body");
        let row = body.add_parameter("row", f32::fact([1, 3]))?;
        let w = body.add_parameter("w", f32::fact([1, 3]))?;
        let acc = body.add_parameter("acc", f32::fact([1, 3]))?;
        let prod = body.wire_node("prod", BinaryOp::Mul, &[row, w])?;
        let sum = body.wire_node("sum", BinaryOp::Add, &[prod[0], acc])?;
        body.add_result("acc_out", sum[0])?;
        let mut ti = TensorIterator::new(body);
        ti.sliced_input(0, 0, 0, 1, 1, -1);
        ti.invariant_input(1);
        ti.merged_input(2, 0);
        ti.last_iteration_output(0);
        ti.concatenated_output(0, 0, 1, 1);

        let mut model = Graph::named("loop");
        let x = model.add_parameter("x", TypedFact::dt_shape(DatumType::F32, [rows, Dim::Fixed(3)]))?;
        let w = model.add_const("w", rctensor2(&[[1f32, 2.0, 3.0]]))?;
        let init = model.add_const("init", rctensor2(&[[0f32, 0.0, 0.0]]))?;
        let outputs = model.wire_node("loop", ti, &[x, w, init])?;
        model.set_outlet_names(outputs[1], ["all"])?;
        model.add_result("last", outputs[0])?;
        model.add_result("all", outputs[1])?;
        Ok(model)
    }

    #[test]
    fn unrolled_loop_is_equivalent() -> GraftResult<()> {
        crate::setup_test_logger();
        let original = model(Dim::Fixed(4))?;
        let mut unrolled = original.clone();
        assert!(UnrollTensorIterator.run(&mut unrolled)?);
        assert!(unrolled.nodes().all(|n| n.op.as_tensor_iterator().is_none()));
        assert_eq!(unrolled.find_outlet("all"), Some(unrolled.result_outlet(1)?));
        assert_eq!(*unrolled.result_fact(1)?, f32::fact([4, 3]));

        let x = rctensor2(&[[1f32, 1.0, 1.0], [2.0, 0.0, 1.0], [0.0, 0.5, 1.0], [1.0, 1.0, -1.0]]);
        let expected = SimplePlan::new(&original)?.run(tvec!(x.clone()))?;
        let found = SimplePlan::new(&unrolled)?.run(tvec!(x))?;
        for (e, f) in expected.iter().zip(found.iter()) {
            assert_eq!(e.shape(), f.shape());
            for (a, b) in e.to_vec::<f32>()?.iter().zip(f.to_vec::<f32>()?.iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-6);
            }
        }
        assert_eq!(*found[0], tensor2(&[[4f32, 5.0, 6.0]]));
        Ok(())
    }

    #[test]
    fn carried_override() -> GraftResult<()> {
        let mut model = model(Dim::Fixed(2))?;
        let bias = model.add_const("bias", rctensor2(&[[10f32, 20.0, 30.0]]))?;
        let ti = model.node_by_name("loop")?.id;
        let finals = unroll_one(&mut model, ti, maplit::hashmap! { 2 => bias })?;
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[&2], model.result_outlet(0)?);
        model.prune()?;
        let x = rctensor2(&[[1f32, 1.0, 1.0], [2.0, 0.0, 1.0]]);
        let found = SimplePlan::new(&model)?.run(tvec!(x))?;
        assert_eq!(*found[0], tensor2(&[[13f32, 22.0, 36.0]]));
        Ok(())
    }

    #[test]
    fn dynamic_trip_count_is_left_alone() -> GraftResult<()> {
        let mut model = model(Dim::Dynamic)?;
        assert!(!UnrollTensorIterator.run(&mut model)?);
        assert_eq!(model.nodes().filter(|n| n.op.as_tensor_iterator().is_some()).count(), 1);
        Ok(())
    }
}
