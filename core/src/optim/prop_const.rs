use crate::internal::*;

/// Replaces every stateless node whose value is known at compile time by a
/// `Const`, until there is nothing left to fold. Loop bodies are folded
/// too.
#[derive(Clone, Debug, Default)]
pub struct ConstantFolding;

impl GraphPass for ConstantFolding {
    fn name(&self) -> Cow<'_, str> {
        "constant-folding".into()
    }

    fn run(&mut self, model: &mut Graph) -> GraftResult<bool> {
        let mut folded = 0;
        let bound = model.len();
        while folded < bound && fold_next(model)? {
            folded += 1;
        }
        let mut modified = folded > 0;
        let loops = model
            .nodes()
            .filter(|n| n.op.as_tensor_iterator().is_some())
            .map(|n| n.id)
            .collect::<Vec<_>>();
        for id in loops {
            let node = model.node_mut(id)?;
            let name = node.name.clone();
            if let OpKind::TensorIterator(ti) = &mut node.op {
                modified |= ConstantFolding
                    .run(&mut ti.body)
                    .with_context(|| format!("Folding body of {name:?}"))?;
            }
        }
        if folded > 0 {
            model.prune()?;
            debug!("Folded {folded} nodes in {:?}", model.name);
        }
        Ok(modified)
    }
}

/// Output values of the node, if they can be known without running the
/// graph.
fn constant_outputs(model: &Graph, node: &Node) -> GraftResult<Option<TVec<Arc<Tensor>>>> {
    if !node.op.is_stateless()
        || matches!(node.op, OpKind::Const(_))
        || node.outputs.is_empty()
    {
        return Ok(None);
    }
    if let Some(values) = node.outputs.iter().map(|o| o.fact.konst.clone()).collect() {
        return Ok(Some(values));
    }
    let inputs = node
        .inputs
        .iter()
        .map(|i| Ok(model.outlet_fact(*i)?.konst.clone()))
        .collect::<GraftResult<Option<TVec<Arc<Tensor>>>>>()?;
    let Some(inputs) = inputs else { return Ok(None) };
    let outputs = node.op.eval(inputs).with_context(|| format!("Eager eval of {node}"))?;
    Ok(Some(outputs))
}

fn fold_next(model: &mut Graph) -> GraftResult<bool> {
    for id in model.eval_order()? {
        let node = model.node(id)?;
        let Some(values) = constant_outputs(model, node)? else { continue };
        let name = node.name.clone();
        trace!("Folding {node}");
        for (ix, value) in values.into_iter().enumerate() {
            let outlet = OutletId::new(id, ix);
            let konst = model.add_const(model.unique_name(&format!("{name}.{ix}")), value)?;
            model.move_names(outlet, konst)?;
            model.shunt(outlet, konst)?;
        }
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    #[test]
    fn fold_shape_of() -> GraftResult<()> {
        crate::setup_test_logger();
        let mut model = Graph::default();
        let input = model.add_parameter("input", f32::fact([2, 3]))?;
        let shape = model.wire_node("shape", ShapeOf::default(), &[input])?;
        let two = model.add_const("two", rctensor0(2i64))?;
        let doubled = model.wire_node("doubled", BinaryOp::Mul, &[shape[0], two])?;
        model.set_outlet_names(doubled[0], ["doubled:0"])?;
        let relu = model.wire_node("relu", ElementWiseOp::Relu, &[input])?;
        model.add_result("output", relu[0])?;
        model.add_result("shape", doubled[0])?;

        assert!(ConstantFolding.run(&mut model)?);
        assert!(model.nodes().all(|n| !matches!(n.op, OpKind::ShapeOf(_) | OpKind::Binary(_))));
        let folded = model.find_outlet("doubled:0").unwrap();
        assert!(matches!(model.node(folded.node)?.op, OpKind::Const(_)));
        assert_eq!(model.result_outlet(1)?, folded);
        assert_eq!(
            model.outlet_fact(folded)?.konst.as_deref(),
            Some(&tensor1(&[4i64, 6]))
        );
        assert!(!ConstantFolding.run(&mut model)?);
        Ok(())
    }

    #[test]
    fn nothing_to_fold() -> GraftResult<()> {
        let mut model = Graph::default();
        let input = model.add_parameter("input", f32::fact([2]))?;
        let relu = model.wire_node("relu", ElementWiseOp::Relu, &[input])?;
        model.add_result("output", relu[0])?;
        assert!(!ConstantFolding.run(&mut model)?);
        assert_eq!(model.len(), 3);
        Ok(())
    }

    #[test]
    fn stale_handle_after_fold() -> GraftResult<()> {
        let mut model = Graph::default();
        let a = model.add_const("a", rctensor1(&[1f32, -2.0]))?;
        let neg = model.wire_node("neg", ElementWiseOp::Neg, &[a])?;
        model.add_result("output", neg[0])?;
        assert!(ConstantFolding.run(&mut model)?);
        let err = model.node(neg[0].node).unwrap_err();
        assert_eq!(GraphError::find(&err), Some(&GraphError::StaleHandle(neg[0].node)));
        Ok(())
    }

    fn binary_op() -> impl Strategy<Value = BinaryOp> {
        prop_oneof![
            Just(BinaryOp::Add),
            Just(BinaryOp::Sub),
            Just(BinaryOp::Mul),
            Just(BinaryOp::Div),
            Just(BinaryOp::Max),
            Just(BinaryOp::Min),
        ]
    }

    proptest! {
        #[test]
        fn folding_is_bit_exact(
            op in binary_op(),
            (a, b) in (1usize..8).prop_flat_map(|n| (vec(-100f32..100f32, n), vec(0.5f32..100f32, n)))
        ) {
            let a = rctensor1(&a);
            let b = rctensor1(&b);
            let expected = OpKind::from(op).eval(tvec!(a.clone(), b.clone())).unwrap();
            let mut model = Graph::default();
            let a = model.add_const("a", a).unwrap();
            let b = model.add_const("b", b).unwrap();
            let c = model.wire_node("c", op, &[a, b]).unwrap();
            model.add_result("output", c[0]).unwrap();
            prop_assert!(ConstantFolding.run(&mut model).unwrap());
            prop_assert_eq!(model.len(), 2);
            let folded = model.outlet_fact(model.result_outlet(0).unwrap()).unwrap();
            prop_assert_eq!(folded.konst.as_deref(), Some(&*expected[0]));
        }
    }
}
