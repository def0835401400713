//! Evaluation order for nodes.
use crate::errors::invalid;
use crate::internal::*;
use bit_set::BitSet;

/// Find an evaluation order for a graph.
///
/// Declared parameters come first, in declaration order, then every node
/// contributing to a result or a sink, each one after all of its inputs.
/// Nodes contributing to nothing are not part of the order.
pub fn eval_order(model: &Graph) -> GraftResult<Vec<NodeId>> {
    let roots = model
        .parameters()
        .iter()
        .chain(model.results().iter())
        .chain(model.sinks().iter())
        .copied()
        .collect::<Vec<NodeId>>();
    eval_order_for_nodes(model, &roots)
}

/// Depth first walk from `targets` towards the graph inputs.
///
/// Fails on cycles and on edges pointing to removed nodes.
pub fn eval_order_for_nodes(model: &Graph, targets: &[NodeId]) -> GraftResult<Vec<NodeId>> {
    let capacity = model.nodes().map(|n| n.id.slot + 1).max().unwrap_or(0);
    let mut done = BitSet::with_capacity(capacity);
    let mut pending = BitSet::with_capacity(capacity);
    let mut order: Vec<NodeId> = vec![];
    for &target in targets {
        let mut needed: Vec<(NodeId, bool)> = vec![(target, false)];
        while let Some((node, expanded)) = needed.pop() {
            if done.contains(node.slot) {
                continue;
            }
            if expanded {
                pending.remove(node.slot);
                done.insert(node.slot);
                order.push(node);
                continue;
            }
            if pending.contains(node.slot) {
                let node = model.node(node)?;
                bail!(invalid(format!("Cycle detected through {node}")));
            }
            let n = model
                .node(node)
                .map_err(|_| invalid(format!("Dangling edge to removed node {node}")))?;
            pending.insert(node.slot);
            needed.push((node, true));
            for input in n.inputs.iter().rev() {
                if !done.contains(input.node.slot) {
                    if !model.contains(input.node) {
                        bail!(invalid(format!(
                            "Dangling edge from {} to {n}",
                            input.node
                        )));
                    }
                    needed.push((input.node, false));
                }
            }
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple() -> GraftResult<()> {
        let mut model = Graph::default();
        let a = model.add_parameter("a", f32::fact([2]))?;
        let b = model.add_const("b", tensor1(&[12.0f32, 1.0]))?;
        let add = model.wire_node("add", BinaryOp::Add, &[a, b])?;
        let result = model.add_result("result", add[0])?;
        assert_eq!(model.eval_order()?, vec!(a.node, b.node, add[0].node, result));
        Ok(())
    }

    #[test]
    fn test_diamond() -> GraftResult<()> {
        let mut model = Graph::default();
        let a = model.add_parameter("a", f32::fact([2]))?;
        let add = model.wire_node("add", BinaryOp::Add, &[a, a])?;
        let result = model.add_result("result", add[0])?;
        assert_eq!(model.eval_order()?, vec!(a.node, add[0].node, result));
        Ok(())
    }

    #[test]
    fn test_cycle() -> GraftResult<()> {
        let mut model = Graph::default();
        let a = model.add_parameter("a", f32::fact([2]))?;
        let relu = model.wire_node("relu", ElementWiseOp::Relu, &[a])?;
        let neg = model.wire_node("neg", ElementWiseOp::Neg, &[relu[0]])?;
        model.add_result("result", neg[0])?;
        model.set_input(InletId::new(relu[0].node, 0), neg[0])?;
        let err = model.eval_order().unwrap_err();
        assert!(matches!(GraphError::find(&err), Some(GraphError::InvalidGraph(_))));
        Ok(())
    }
}
