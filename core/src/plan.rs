use std::borrow::Borrow;
use std::marker::PhantomData;

use crate::errors::invalid;
use crate::internal::*;

/// Values surviving from one run to the next: the variable registers.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    pub variables: HashMap<String, Arc<Tensor>>,
}

#[derive(Debug, Clone)]
pub struct SimplePlan<M: Borrow<Graph>> {
    pub model: M,
    pub order: Vec<NodeId>,
}

impl<M: Borrow<Graph>> SimplePlan<M> {
    pub fn new(model: M) -> GraftResult<SimplePlan<M>> {
        let order = model.borrow().eval_order()?;
        Ok(SimplePlan { model, order })
    }

    pub fn model(&self) -> &Graph {
        self.model.borrow()
    }

    /// Runs the graph once, from empty variable registers.
    pub fn run(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        let mut state = SimpleState::new(self)?;
        state.run(inputs)
    }
}

#[derive(Debug, Clone)]
pub struct SimpleState<M, P>
where
    M: Borrow<Graph>,
    P: Borrow<SimplePlan<M>>,
{
    plan: P,
    pub session_state: SessionState,
    _phantom: PhantomData<M>,
}

impl<M, P> SimpleState<M, P>
where
    M: Borrow<Graph>,
    P: Borrow<SimplePlan<M>>,
{
    pub fn new(plan: P) -> GraftResult<SimpleState<M, P>> {
        Ok(SimpleState { plan, session_state: SessionState::default(), _phantom: PhantomData })
    }

    pub fn plan(&self) -> &SimplePlan<M> {
        self.plan.borrow()
    }

    pub fn model(&self) -> &Graph {
        self.plan().model()
    }

    /// Clears the variable registers.
    pub fn reset(&mut self) {
        self.session_state.variables.clear()
    }

    /// Runs the graph. `Assign` writes become visible to the next run.
    pub fn run(&mut self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        let plan = self.plan.borrow();
        let model = plan.model();
        ensure!(
            inputs.len() == model.parameters().len(),
            "Wrong number of inputs: model has {}, got {}",
            model.parameters().len(),
            inputs.len()
        );
        let mut values: HashMap<NodeId, TVec<Arc<Tensor>>> = HashMap::new();
        for (ix, (param, input)) in model.parameters().iter().zip(inputs).enumerate() {
            model
                .outlet_fact((*param).into())?
                .check_tensor(&input)
                .with_context(|| format!("Checking input #{ix}"))?;
            values.insert(*param, tvec!(input));
        }
        let mut writes: Vec<(String, Arc<Tensor>)> = vec![];
        for &id in &plan.order {
            if values.contains_key(&id) {
                continue;
            }
            let node = model.node(id)?;
            trace!("Running {node}");
            let inputs = node
                .inputs
                .iter()
                .map(|o| {
                    values
                        .get(&o.node)
                        .and_then(|v| v.get(o.slot))
                        .cloned()
                        .ok_or_else(|| invalid(format!("Missing value for {o:?}")))
                })
                .collect::<GraftResult<TVec<Arc<Tensor>>>>()?;
            let outputs = match &node.op {
                OpKind::Parameter(_) => {
                    bail!(invalid(format!("{node} is not a declared parameter")))
                }
                OpKind::Result(_) => tvec!(),
                OpKind::ReadValue(op) => {
                    tvec!(self.read_variable(model, op, inputs).with_context(|| format!("Evaluating {node}"))?)
                }
                OpKind::Assign(op) => {
                    writes.push((op.variable_id.clone(), inputs[0].clone()));
                    tvec!()
                }
                op => op.eval(inputs).with_context(|| format!("Evaluating {node}"))?,
            };
            ensure!(
                outputs.len() == node.outputs.len(),
                "{} produced {} outputs, expected {}",
                node,
                outputs.len(),
                node.outputs.len()
            );
            values.insert(id, outputs);
        }
        for (id, value) in writes {
            self.session_state.variables.insert(id, value);
        }
        model
            .results()
            .iter()
            .map(|r| {
                let outlet = model.node(*r)?.inputs[0];
                values
                    .get(&outlet.node)
                    .and_then(|v| v.get(outlet.slot))
                    .cloned()
                    .ok_or_else(|| invalid(format!("Missing value for result {outlet:?}")))
            })
            .collect()
    }

    fn read_variable(
        &self,
        model: &Graph,
        op: &ReadValue,
        inputs: TVec<Arc<Tensor>>,
    ) -> GraftResult<Arc<Tensor>> {
        if let Some(value) = self.session_state.variables.get(&op.variable_id) {
            return Ok(value.clone());
        }
        if let Some(init) = inputs.into_iter().next() {
            return Ok(init);
        }
        if let Some(initial) = model.variable(&op.variable_id).and_then(|v| v.initial.clone()) {
            return Ok(initial);
        }
        let shape = op.fact.shape.as_concrete().ok_or_else(|| {
            invalid(format!("Variable {:?} needs an initial value", op.variable_id))
        })?;
        Ok(Tensor::zero_dt(op.fact.datum_type, &shape).into_arc_tensor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_input_type() -> GraftResult<()> {
        let mut model = Graph::default();
        let input = model.add_parameter("input", f32::fact([2]))?;
        model.add_result("output", input)?;
        let plan = SimplePlan::new(&model)?;
        assert!(plan.run(tvec!(rctensor1(&[1i32, 2]))).is_err());
        assert!(plan.run(tvec!(rctensor1(&[1f32, 2.0, 3.0]))).is_err());
        assert_eq!(*plan.run(tvec!(rctensor1(&[1f32, 2.0])))?[0], tensor1(&[1f32, 2.0]));
        Ok(())
    }

    #[test]
    fn accumulator() -> GraftResult<()> {
        let mut model = Graph::default();
        let x = model.add_parameter("x", f32::fact([2]))?;
        model.add_variable(Variable { id: "acc".into(), fact: f32::fact([2]), initial: None })?;
        let acc = model.wire_node("acc", ReadValue::new("acc", f32::fact([2])), &[])?;
        let sum = model.wire_node("sum", BinaryOp::Add, &[x, acc[0]])?;
        let assign = model.add_node("store", Assign::new("acc"), &sum)?;
        model.add_sink(assign)?;
        model.add_result("output", acc[0])?;

        let plan = SimplePlan::new(&model)?;
        let mut state = SimpleState::new(&plan)?;
        let mut seen = vec![];
        for _ in 0..3 {
            seen.push(state.run(tvec!(rctensor1(&[1f32, 2.0])))?[0].to_vec::<f32>()?);
        }
        assert_eq!(seen, vec![vec![0., 0.], vec![1., 2.], vec![2., 4.]]);
        state.reset();
        assert_eq!(*state.run(tvec!(rctensor1(&[1f32, 2.0])))?[0], tensor1(&[0f32, 0.0]));
        Ok(())
    }
}
