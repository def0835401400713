use crate::errors::{invalid, shape_mismatch};
use crate::internal::*;

/// Turns (parameter, result) pairs into state variables.
///
/// The parameter node becomes a `ReadValue`, the result node an `Assign`
/// declared as a sink. Both leave the graph interface. Parameters and
/// results are looked up by node name, or by the tensor name of the value
/// they carry.
#[derive(Clone, Debug, Default)]
pub struct MakeStateful {
    pub pairs: Vec<(String, String)>,
    pub initializers: HashMap<String, Arc<Tensor>>,
}

impl MakeStateful {
    pub fn new<P: Into<String>, R: Into<String>>(
        pairs: impl IntoIterator<Item = (P, R)>,
    ) -> MakeStateful {
        MakeStateful {
            pairs: pairs.into_iter().map(|(p, r)| (p.into(), r.into())).collect(),
            initializers: HashMap::new(),
        }
    }

    /// Initial value of the variable replacing `param`. Zeros otherwise.
    pub fn with_initializer(mut self, param: impl Into<String>, value: impl IntoArcTensor) -> Self {
        self.initializers.insert(param.into(), value.into_arc_tensor());
        self
    }

    /// Finds the node matching `name` among `candidates`, by node name first,
    /// then by the tensor name of the value it carries.
    fn find(
        model: &Graph,
        candidates: &[NodeId],
        name: &str,
        carried: impl Fn(&Node) -> OutletId,
    ) -> GraftResult<Option<NodeId>> {
        let nodes = candidates.iter().map(|&id| model.node(id)).collect::<GraftResult<Vec<_>>>()?;
        if let Some(node) = nodes.iter().find(|n| n.name == name) {
            return Ok(Some(node.id));
        }
        let mut by_tensor = vec![];
        for node in &nodes {
            if model.outlet_names(carried(node))?.contains(name) {
                by_tensor.push(node.id);
            }
        }
        ensure!(
            by_tensor.len() <= 1,
            invalid(format!("Tensor name {name:?} is ambiguous, it designates {} nodes", by_tensor.len()))
        );
        Ok(by_tensor.pop())
    }

    fn find_parameter(model: &Graph, name: &str) -> GraftResult<Option<NodeId>> {
        Self::find(model, model.parameters(), name, |n| n.id.into())
    }

    fn find_result(model: &Graph, name: &str) -> GraftResult<Option<NodeId>> {
        Self::find(model, model.results(), name, |n| n.inputs[0])
    }

    /// Whether the pair was already turned into a variable by a previous run.
    fn already_stateful(model: &Graph, param_name: &str) -> GraftResult<bool> {
        let readers = model
            .nodes()
            .filter(|n| matches!(n.op, OpKind::ReadValue(_)))
            .map(|n| n.id)
            .collect::<Vec<_>>();
        Ok(Self::find(model, &readers, param_name, |n| n.id.into())?.is_some())
    }
}

impl GraphPass for MakeStateful {
    fn name(&self) -> Cow<'_, str> {
        "make-stateful".into()
    }

    fn run(&mut self, model: &mut Graph) -> GraftResult<bool> {
        let mut resolved = vec![];
        for (param_name, result_name) in &self.pairs {
            let Some(param) = Self::find_parameter(model, param_name)? else {
                if Self::already_stateful(model, param_name)? {
                    continue;
                }
                bail!(invalid(format!("No parameter named {param_name:?}")))
            };
            let result = Self::find_result(model, result_name)?
                .ok_or_else(|| invalid(format!("No result named {result_name:?}")))?;
            let param_fact = model.outlet_fact(param.into())?;
            let result_fact = model.outlet_fact(model.node(result)?.inputs[0])?;
            ensure!(
                param_fact.same_type_and_shape(result_fact),
                shape_mismatch(format!(
                    "Can not pair parameter {param_name:?} ({param_fact:?}) with result {result_name:?} ({result_fact:?})"
                ))
            );
            ensure!(
                !resolved.iter().any(|(p, r, _)| *p == param || *r == result),
                invalid(format!("{param_name:?} or {result_name:?} paired twice"))
            );
            resolved.push((param, result, param_fact.without_value()));
        }
        let modified = !resolved.is_empty();
        for (param, result, fact) in resolved {
            let param_name = model.node(param)?.name.clone();
            let result_node = model.node(result)?;
            let (result_name, value) = (result_node.name.clone(), result_node.inputs[0]);
            let variable_id = format!("{param_name}/{result_name}");
            let initial = self.initializers.get(&param_name).cloned();
            model.add_variable(Variable { id: variable_id.clone(), fact: fact.clone(), initial })?;
            model.node_mut(param)?.op = ReadValue::new(&*variable_id, fact).into();
            let parameters =
                model.parameters().iter().copied().filter(|p| *p != param).collect::<Vec<_>>();
            model.set_parameters(parameters)?;
            model.remove_node(result)?;
            let assign = model.add_node(result_name, Assign::new(&*variable_id), &[value])?;
            model.add_sink(assign)?;
            debug!("Made {variable_id:?} stateful");
        }
        Ok(modified)
    }
}
