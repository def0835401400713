use super::order::eval_order;
use crate::errors::invalid;
use crate::internal::*;
use std::collections::{BTreeSet, HashSet};

/// A state variable, read by `ReadValue` nodes and written by `Assign`
/// nodes sharing its id.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub id: String,
    pub fact: TypedFact,
    pub initial: Option<Arc<Tensor>>,
}

#[derive(Clone, Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Main graph structure.
///
/// Nodes live in an arena. Removing a node frees its slot for reuse and
/// invalidates every `NodeId` pointing to it.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub name: String,
    slots: Vec<Slot>,
    free: Vec<usize>,
    parameters: Vec<NodeId>,
    results: Vec<NodeId>,
    sinks: Vec<NodeId>,
    variables: Vec<Variable>,
}

impl Graph {
    pub fn named(name: impl Into<String>) -> Graph {
        Graph { name: name.into(), ..Graph::default() }
    }

    /// Sets the interface of the graph, validates and prunes it.
    pub fn with_interface(
        mut self,
        results: &[NodeId],
        parameters: &[NodeId],
    ) -> GraftResult<Graph> {
        self.set_interface(results, parameters)?;
        Ok(self)
    }

    pub fn set_interface(&mut self, results: &[NodeId], parameters: &[NodeId]) -> GraftResult<()> {
        self.set_results(results.iter().copied())?;
        self.set_parameters(parameters.iter().copied())?;
        self.validate()?;
        self.prune()?;
        Ok(())
    }

    // nodes

    fn alloc(
        &mut self,
        name: String,
        op: OpKind,
        inputs: TVec<OutletId>,
        outputs: TVec<Outlet>,
    ) -> NodeId {
        let slot = if let Some(slot) = self.free.pop() {
            slot
        } else {
            self.slots.push(Slot::default());
            self.slots.len() - 1
        };
        let id = NodeId { slot, generation: self.slots[slot].generation };
        self.slots[slot].node = Some(Node { id, name, op, inputs, outputs });
        id
    }

    /// Adds a node, computing its output facts from its op and inputs.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        op: impl Into<OpKind>,
        inputs: &[OutletId],
    ) -> GraftResult<NodeId> {
        let name = name.into();
        let op = op.into();
        let input_facts =
            inputs.iter().map(|o| self.outlet_fact(*o)).collect::<GraftResult<Vec<_>>>()?;
        let output_facts = op
            .output_facts(&input_facts)
            .with_context(|| format!("Wiring node \"{}\" ({})", name, op.name()))?;
        let outputs = output_facts.into_iter().map(Outlet::new).collect();
        let id = self.alloc(name, op, inputs.into(), outputs);
        for (ix, input) in inputs.iter().enumerate() {
            self.outlet_mut(*input)?.successors.push(InletId::new(id, ix));
        }
        Ok(id)
    }

    /// Adds a node and returns its outlets.
    pub fn wire_node(
        &mut self,
        name: impl Into<String>,
        op: impl Into<OpKind>,
        inputs: &[OutletId],
    ) -> GraftResult<TVec<OutletId>> {
        let id = self.add_node(name, op, inputs)?;
        Ok((0..self.node(id)?.outputs.len()).map(|slot| OutletId::new(id, slot)).collect())
    }

    /// Adds a `Parameter` node, and appends it to the declared parameters.
    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        fact: TypedFact,
    ) -> GraftResult<OutletId> {
        let id = self.add_node(name, Parameter::new(fact.without_value()), &[])?;
        self.parameters.push(id);
        Ok(id.into())
    }

    pub fn add_const(
        &mut self,
        name: impl Into<String>,
        v: impl IntoArcTensor,
    ) -> GraftResult<OutletId> {
        Ok(self.add_node(name, Const::new(v.into_arc_tensor()), &[])?.into())
    }

    /// Adds a `Result` node, and appends it to the declared results.
    pub fn add_result(&mut self, name: impl Into<String>, outlet: OutletId) -> GraftResult<NodeId> {
        let id = self.add_node(name, ResultOp, &[outlet])?;
        self.results.push(id);
        Ok(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slots
            .get(id.slot)
            .map(|s| s.generation == id.generation && s.node.is_some())
            .unwrap_or(false)
    }

    pub fn node(&self, id: NodeId) -> GraftResult<&Node> {
        self.slots
            .get(id.slot)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
            .ok_or_else(|| GraphError::StaleHandle(id).into())
    }

    pub fn node_mut(&mut self, id: NodeId) -> GraftResult<&mut Node> {
        self.slots
            .get_mut(id.slot)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or_else(|| GraphError::StaleHandle(id).into())
    }

    /// Live nodes, in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.slots.iter().filter_map(|s| s.node.as_ref())
    }

    pub fn len(&self) -> usize {
        self.nodes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes().next().is_none()
    }

    pub fn node_by_name(&self, name: &str) -> GraftResult<&Node> {
        self.nodes().find(|n| n.name == name).ok_or_else(|| invalid(format!("No node named {name:?}")))
    }

    /// Nodes in evaluation order.
    pub fn ordered_nodes(&self) -> GraftResult<Vec<&Node>> {
        self.eval_order()?.into_iter().map(|id| self.node(id)).collect()
    }

    pub fn unique_name(&self, prefix: &str) -> String {
        let taken = self.nodes().map(|n| n.name.as_str()).collect::<HashSet<_>>();
        if !taken.contains(prefix) {
            return prefix.to_string();
        }
        let mut i = 1;
        loop {
            let candidate = format!("{prefix}.{i}");
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            i += 1;
        }
    }

    /// Removes a node. It must not have any consumer left.
    pub fn remove_node(&mut self, id: NodeId) -> GraftResult<Node> {
        let node = self.node(id)?;
        if let Some(outlet) = node.outputs.iter().find(|o| !o.successors.is_empty()) {
            bail!(invalid(format!(
                "Can not remove {node}, still consumed by {:?}",
                outlet.successors
            )));
        }
        self.unlink_inputs(id)?;
        self.detach(id)
    }

    fn unlink_inputs(&mut self, id: NodeId) -> GraftResult<()> {
        let inputs = self.node(id)?.inputs.clone();
        for (ix, input) in inputs.iter().enumerate() {
            if let Ok(outlet) = self.outlet_mut(*input) {
                outlet.successors.retain(|s| *s != InletId::new(id, ix));
            }
        }
        Ok(())
    }

    fn detach(&mut self, id: NodeId) -> GraftResult<Node> {
        self.node(id)?;
        let slot = &mut self.slots[id.slot];
        let node = slot.node.take().ok_or(GraphError::StaleHandle(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.slot);
        self.parameters.retain(|p| *p != id);
        self.results.retain(|r| *r != id);
        self.sinks.retain(|s| *s != id);
        Ok(node)
    }

    /// Removes every node not contributing to a result or a sink.
    ///
    /// Declared parameters are kept even when unused.
    pub fn prune(&mut self) -> GraftResult<usize> {
        let keep = self.eval_order()?.into_iter().collect::<HashSet<NodeId>>();
        let doomed = self.nodes().map(|n| n.id).filter(|id| !keep.contains(id)).collect::<Vec<_>>();
        for &id in &doomed {
            self.unlink_inputs(id)?;
        }
        for &id in &doomed {
            self.detach(id)?;
        }
        if !doomed.is_empty() {
            trace!("Pruned {} nodes from {:?}", doomed.len(), self.name);
        }
        Ok(doomed.len())
    }

    // edges and outlets

    pub fn outlet_fact(&self, outlet: OutletId) -> GraftResult<&TypedFact> {
        Ok(&self.outlet(outlet)?.fact)
    }

    pub fn set_outlet_fact(&mut self, outlet: OutletId, fact: TypedFact) -> GraftResult<()> {
        self.outlet_mut(outlet)?.fact = fact;
        Ok(())
    }

    pub fn outlet_successors(&self, outlet: OutletId) -> GraftResult<&[InletId]> {
        Ok(&self.outlet(outlet)?.successors)
    }

    pub fn outlet_names(&self, outlet: OutletId) -> GraftResult<&BTreeSet<String>> {
        Ok(&self.outlet(outlet)?.names)
    }

    pub fn set_outlet_names<S: Into<String>>(
        &mut self,
        outlet: OutletId,
        names: impl IntoIterator<Item = S>,
    ) -> GraftResult<()> {
        self.outlet_mut(outlet)?.names = names.into_iter().map(|s| s.into()).collect();
        Ok(())
    }

    pub fn add_outlet_name(&mut self, outlet: OutletId, name: impl Into<String>) -> GraftResult<()> {
        self.outlet_mut(outlet)?.names.insert(name.into());
        Ok(())
    }

    /// Moves the tensor names of `from` to `to`.
    pub fn move_names(&mut self, from: OutletId, to: OutletId) -> GraftResult<()> {
        let names = std::mem::take(&mut self.outlet_mut(from)?.names);
        self.outlet_mut(to)?.names.extend(names);
        Ok(())
    }

    /// Finds the outlet carrying a tensor name.
    pub fn find_outlet(&self, tensor_name: &str) -> Option<OutletId> {
        self.nodes().find_map(|n| {
            n.outputs
                .iter()
                .position(|o| o.names.contains(tensor_name))
                .map(|slot| OutletId::new(n.id, slot))
        })
    }

    fn outlet(&self, outlet: OutletId) -> GraftResult<&Outlet> {
        let node = self.node(outlet.node)?;
        node.outputs.get(outlet.slot).ok_or_else(|| invalid(format!("No outlet {outlet:?} on {node}")))
    }

    fn outlet_mut(&mut self, outlet: OutletId) -> GraftResult<&mut Outlet> {
        self.node_mut(outlet.node)?
            .outputs
            .get_mut(outlet.slot)
            .ok_or_else(|| invalid(format!("No outlet {outlet:?}")))
    }

    /// Connects `inlet` to `outlet`, disconnecting it from its previous producer.
    ///
    /// Facts are not recomputed.
    pub fn set_input(&mut self, inlet: InletId, outlet: OutletId) -> GraftResult<()> {
        self.outlet(outlet)?;
        let previous = {
            let node = self.node_mut(inlet.node)?;
            let input = node
                .inputs
                .get_mut(inlet.slot)
                .ok_or_else(|| invalid(format!("No inlet {inlet:?}")))?;
            std::mem::replace(input, outlet)
        };
        if let Ok(previous) = self.outlet_mut(previous) {
            previous.successors.retain(|s| *s != inlet);
        }
        self.outlet_mut(outlet)?.successors.push(inlet);
        Ok(())
    }

    /// Moves every consumer of `from` to `to`, except `to`'s own node.
    pub fn shunt(&mut self, from: OutletId, to: OutletId) -> GraftResult<()> {
        let successors = self.outlet_successors(from)?.to_vec();
        for succ in successors {
            if succ.node != to.node {
                self.set_input(succ, to)?;
            }
        }
        Ok(())
    }

    // interface

    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    pub fn results(&self) -> &[NodeId] {
        &self.results
    }

    pub fn sinks(&self) -> &[NodeId] {
        &self.sinks
    }

    pub fn parameter_fact(&self, ix: usize) -> GraftResult<&TypedFact> {
        let id = self.parameters.get(ix).ok_or_else(|| invalid(format!("No parameter #{ix}")))?;
        self.outlet_fact((*id).into())
    }

    pub fn result_outlet(&self, ix: usize) -> GraftResult<OutletId> {
        let id = self.results.get(ix).ok_or_else(|| invalid(format!("No result #{ix}")))?;
        Ok(self.node(*id)?.inputs[0])
    }

    pub fn result_fact(&self, ix: usize) -> GraftResult<&TypedFact> {
        self.outlet_fact(self.result_outlet(ix)?)
    }

    pub fn set_parameters(&mut self, ids: impl IntoIterator<Item = NodeId>) -> GraftResult<()> {
        let ids = ids.into_iter().collect::<Vec<_>>();
        for (ix, id) in ids.iter().enumerate() {
            let node = self.node(*id)?;
            ensure!(
                matches!(node.op, OpKind::Parameter(_)),
                invalid(format!("{node} is not a Parameter"))
            );
            ensure!(!ids[..ix].contains(id), invalid(format!("{node} declared twice")));
        }
        self.parameters = ids;
        Ok(())
    }

    pub fn set_results(&mut self, ids: impl IntoIterator<Item = NodeId>) -> GraftResult<()> {
        let ids = ids.into_iter().collect::<Vec<_>>();
        for (ix, id) in ids.iter().enumerate() {
            let node = self.node(*id)?;
            ensure!(
                matches!(node.op, OpKind::Result(_)),
                invalid(format!("{node} is not a Result"))
            );
            ensure!(!ids[..ix].contains(id), invalid(format!("{node} declared twice")));
        }
        self.results = ids;
        Ok(())
    }

    pub fn add_sink(&mut self, id: NodeId) -> GraftResult<()> {
        let node = self.node(id)?;
        ensure!(matches!(node.op, OpKind::Assign(_)), invalid(format!("{node} is not an Assign")));
        if !self.sinks.contains(&id) {
            self.sinks.push(id);
        }
        Ok(())
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.id == id)
    }

    pub fn variables_mut(&mut self) -> impl Iterator<Item = &mut Variable> {
        self.variables.iter_mut()
    }

    pub fn add_variable(&mut self, variable: Variable) -> GraftResult<()> {
        ensure!(
            self.variable(&variable.id).is_none(),
            invalid(format!("Variable {:?} declared twice", variable.id))
        );
        if let Some(initial) = &variable.initial {
            variable.fact.check_tensor(initial)?;
        }
        self.variables.push(variable);
        Ok(())
    }

    // whole graph

    pub fn eval_order(&self) -> GraftResult<Vec<NodeId>> {
        eval_order(self)
    }

    /// Checks the graph is acyclic, without dangling edge, and that all its
    /// reachable parameters and variables are declared.
    pub fn validate(&self) -> GraftResult<()> {
        for id in self.eval_order()? {
            let node = self.node(id)?;
            for (ix, input) in node.inputs.iter().enumerate() {
                ensure!(
                    self.outlet_successors(*input)?.contains(&InletId::new(id, ix)),
                    invalid(format!("Edge from {input:?} to {node} is not recorded as a successor"))
                );
            }
            match &node.op {
                OpKind::Parameter(_) => ensure!(
                    self.parameters.contains(&id),
                    invalid(format!("{node} is used but not declared as a parameter"))
                ),
                OpKind::ReadValue(ReadValue { variable_id, .. })
                | OpKind::Assign(Assign { variable_id, .. }) => ensure!(
                    self.variable(variable_id).is_some(),
                    invalid(format!("{node} refers to undeclared variable {variable_id:?}"))
                ),
                _ => (),
            }
        }
        Ok(())
    }

    /// Recomputes every output fact from parameters down.
    pub fn refresh_facts(&mut self) -> GraftResult<()> {
        for id in self.eval_order()? {
            let node = self.node(id)?;
            let inputs =
                node.inputs.iter().map(|o| self.outlet_fact(*o)).collect::<GraftResult<Vec<_>>>()?;
            let facts = node
                .op
                .output_facts(&inputs)
                .with_context(|| format!("Computing output facts of {node}"))?;
            ensure!(
                facts.len() == node.outputs.len(),
                invalid(format!("{node} changed its number of outputs"))
            );
            let node = self.node_mut(id)?;
            for (outlet, fact) in node.outputs.iter_mut().zip(facts) {
                outlet.fact = fact;
            }
        }
        Ok(())
    }

    /// Structural equality: same declared interface, same variables, and
    /// the same nodes in the same evaluation order, with the same names,
    /// attributes, edges, output types and tensor names.
    pub fn same_structure(&self, other: &Graph) -> GraftResult<bool> {
        let order = self.eval_order()?;
        let other_order = other.eval_order()?;
        if order.len() != other_order.len()
            || self.parameters.len() != other.parameters.len()
            || self.results.len() != other.results.len()
            || self.sinks.len() != other.sinks.len()
            || self.variables != other.variables
        {
            return Ok(false);
        }
        let position =
            order.iter().enumerate().map(|(ix, id)| (*id, ix)).collect::<HashMap<_, _>>();
        let other_position =
            other_order.iter().enumerate().map(|(ix, id)| (*id, ix)).collect::<HashMap<_, _>>();
        for (a, b) in order.iter().zip(other_order.iter()) {
            let (a, b) = (self.node(*a)?, other.node(*b)?);
            if a.name != b.name
                || !a.op.same_as(&b.op)?
                || a.inputs.len() != b.inputs.len()
                || a.outputs.len() != b.outputs.len()
            {
                return Ok(false);
            }
            for (i, j) in a.inputs.iter().zip(b.inputs.iter()) {
                if position.get(&i.node) != other_position.get(&j.node) || i.slot != j.slot {
                    return Ok(false);
                }
            }
            for (o, p) in a.outputs.iter().zip(b.outputs.iter()) {
                if !o.fact.same_type_and_shape(&p.fact) || o.names != p.names {
                    return Ok(false);
                }
            }
        }
        let same_ids = |a: &[NodeId], b: &[NodeId]| {
            a.iter().zip(b.iter()).all(|(x, y)| position.get(x) == other_position.get(y))
        };
        Ok(same_ids(&self.parameters, &other.parameters)
            && same_ids(&self.results, &other.results)
            && same_ids(&self.sinks, &other.sinks))
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        writeln!(fmt, "graph {:?}", self.name)?;
        let order = self.eval_order().unwrap_or_else(|_| self.nodes().map(|n| n.id).collect());
        for id in order {
            let Ok(node) = self.node(id) else { continue };
            write!(fmt, "  {node}")?;
            for input in &node.inputs {
                write!(fmt, " {input:?}")?;
            }
            for output in &node.outputs {
                write!(fmt, " -> {:?}", output.fact)?;
            }
            writeln!(fmt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relu_model() -> GraftResult<(Graph, OutletId, NodeId)> {
        let mut model = Graph::named("relu");
        let input = model.add_parameter("input", f32::fact([1, 3]))?;
        let relu = model.wire_node("relu", ElementWiseOp::Relu, &[input])?;
        let result = model.add_result("result", relu[0])?;
        Ok((model, input, result))
    }

    #[test]
    fn stale_handle_after_removal() -> GraftResult<()> {
        let (mut model, input, result) = relu_model()?;
        let relu = model.node(result)?.inputs[0];
        model.remove_node(result)?;
        model.remove_node(relu.node)?;
        let err = model.node(relu.node).unwrap_err();
        assert_eq!(GraphError::find(&err), Some(&GraphError::StaleHandle(relu.node)));
        // slot reuse does not resurrect old handles
        let neg = model.wire_node("neg", ElementWiseOp::Neg, &[input])?;
        assert_eq!(neg[0].node.slot(), relu.node.slot());
        assert!(model.node(relu.node).is_err());
        assert_eq!(model.node(neg[0].node)?.name, "neg");
        Ok(())
    }

    #[test]
    fn remove_consumed_node_fails() -> GraftResult<()> {
        let (mut model, input, _) = relu_model()?;
        assert!(model.remove_node(input.node).is_err());
        Ok(())
    }

    #[test]
    fn undeclared_parameter() -> GraftResult<()> {
        let (model, _, result) = relu_model()?;
        let err = model.with_interface(&[result], &[]).unwrap_err();
        assert!(matches!(GraphError::find(&err), Some(GraphError::InvalidGraph(_))));
        Ok(())
    }

    #[test]
    fn unused_parameter_is_kept() -> GraftResult<()> {
        let (mut model, input, result) = relu_model()?;
        let other = model.add_parameter("other", f32::fact([2]))?;
        let dead = model.wire_node("dead", ElementWiseOp::Neg, &[other])?;
        let model = model.with_interface(&[result], &[input.node, other.node])?;
        assert_eq!(model.parameters(), &[input.node, other.node]);
        assert!(!model.contains(dead[0].node));
        assert_eq!(model.len(), 4);
        Ok(())
    }

    #[test]
    fn shunt_and_names() -> GraftResult<()> {
        let (mut model, input, result) = relu_model()?;
        let relu = model.result_outlet(0)?;
        model.set_outlet_names(relu, ["relu:0"])?;
        let neg = model.wire_node("neg", ElementWiseOp::Neg, &[relu])?;
        model.shunt(relu, neg[0])?;
        model.move_names(relu, neg[0])?;
        assert_eq!(model.node(result)?.inputs[0], neg[0]);
        assert_eq!(model.find_outlet("relu:0"), Some(neg[0]));
        assert_eq!(model.outlet_successors(relu)?, &[InletId::new(neg[0].node, 0)]);
        assert_eq!(model.eval_order()?.len(), 4);
        let _ = input;
        Ok(())
    }

    #[test]
    fn same_structure_compares_order_and_attributes() -> GraftResult<()> {
        let (a, _, _) = relu_model()?;
        let (b, _, _) = relu_model()?;
        assert!(a.same_structure(&b)?);
        let mut c = Graph::named("relu");
        let input = c.add_parameter("input", f32::fact([1, 3]))?;
        let neg = c.wire_node("relu", ElementWiseOp::Neg, &[input])?;
        c.add_result("result", neg[0])?;
        assert!(!a.same_structure(&c)?);
        Ok(())
    }
}
