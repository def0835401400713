//! Floating point precision conversion.
use crate::internal::*;

/// Whether `op` can run with its floating point tensors in `dt`.
///
/// Operations missing here are not supported, rather than silently
/// skipped.
pub fn supports_precision(op: &OpKind, dt: DatumType) -> bool {
    match op {
        OpKind::Parameter(_)
        | OpKind::Result(_)
        | OpKind::Const(_)
        | OpKind::Convert(_)
        | OpKind::ReadValue(_)
        | OpKind::Assign(_) => true,
        OpKind::Reshape(_)
        | OpKind::ShapeOf(_)
        | OpKind::Squeeze(_)
        | OpKind::Unsqueeze(_)
        | OpKind::Concat(_)
        | OpKind::Slice(_) => true,
        OpKind::ElementWise(_) | OpKind::Binary(_) => dt.is_float(),
        OpKind::TensorIterator(ti) => ti.body.nodes().all(|n| supports_precision(&n.op, dt)),
        OpKind::Custom(op) => op.supports_precision(dt),
    }
}

/// Rewrites every `from` tensor of the graph to `to`.
///
/// By default parameters and results change type too. With `keep_io`, the
/// interface keeps its types and `Convert` nodes are inserted behind the
/// parameters and in front of the results.
#[derive(Clone, Debug)]
pub struct ConvertPrecision {
    pub from: DatumType,
    pub to: DatumType,
    pub keep_io: bool,
}

impl ConvertPrecision {
    pub fn f32_to_f16() -> ConvertPrecision {
        ConvertPrecision { from: DatumType::F32, to: DatumType::F16, keep_io: false }
    }

    pub fn keep_io(self, keep_io: bool) -> ConvertPrecision {
        ConvertPrecision { keep_io, ..self }
    }

    fn check(&self, model: &Graph) -> GraftResult<()> {
        for node in model.nodes() {
            let touches = node.outputs.iter().any(|o| o.fact.datum_type == self.from)
                || node
                    .inputs
                    .iter()
                    .map(|i| model.outlet_fact(*i))
                    .collect::<GraftResult<Vec<_>>>()?
                    .iter()
                    .any(|f| f.datum_type == self.from);
            if touches && !supports_precision(&node.op, self.to) {
                bail!(GraphError::UnsupportedOpPrecision {
                    op: node.op.name().into_owned(),
                    datum_type: self.to
                })
            }
        }
        Ok(())
    }

    fn convert_fact(&self, fact: &TypedFact) -> TypedFact {
        if fact.datum_type == self.from {
            fact.with_datum_type(self.to)
        } else {
            fact.clone()
        }
    }

    fn convert_tensor(&self, t: &Arc<Tensor>) -> GraftResult<Arc<Tensor>> {
        if t.datum_type() == self.from {
            Ok(t.cast_to_dt(self.to)?.into_owned().into_arc_tensor())
        } else {
            Ok(t.clone())
        }
    }

    /// Converts ops in place, facts are refreshed by the caller.
    fn convert_ops(&self, model: &mut Graph, skip: &[NodeId]) -> GraftResult<usize> {
        let mut changed = 0;
        let ids = model.nodes().map(|n| n.id).filter(|id| !skip.contains(id)).collect::<Vec<_>>();
        for id in ids {
            let node = model.node_mut(id)?;
            let new_op: Option<OpKind> = match &node.op {
                OpKind::Parameter(p) if p.fact.datum_type == self.from => {
                    Some(Parameter::new(self.convert_fact(&p.fact)).into())
                }
                OpKind::Const(k) if k.val().datum_type() == self.from => {
                    Some(Const::new(self.convert_tensor(k.val())?).into())
                }
                OpKind::Convert(c) if c.to == self.from => Some(Convert::new(self.to).into()),
                OpKind::ReadValue(r) if r.fact.datum_type == self.from => {
                    Some(ReadValue::new(&*r.variable_id, self.convert_fact(&r.fact)).into())
                }
                OpKind::TensorIterator(ti) => {
                    let mut ti = ti.clone();
                    let plain = ConvertPrecision { keep_io: false, ..self.clone() };
                    if plain.convert(&mut ti.body)? {
                        Some((*ti).into())
                    } else {
                        None
                    }
                }
                _ => None,
            };
            if let Some(op) = new_op {
                trace!("Converting {} to {}", node, self.to);
                node.op = op;
                changed += 1;
            }
        }
        for variable in model.variables_mut() {
            if variable.fact.datum_type == self.from {
                variable.fact = self.convert_fact(&variable.fact);
                if let Some(initial) = &variable.initial {
                    variable.initial = Some(self.convert_tensor(initial)?);
                }
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// A `Convert` back to `from` feeding results only, as inserted by
    /// `keep_io`.
    fn is_output_boundary(&self, model: &Graph, node: &Node) -> bool {
        matches!(&node.op, OpKind::Convert(c) if c.to == self.from)
            && !node.outputs[0].successors.is_empty()
            && node.outputs[0].successors.iter().all(|s| model.results().contains(&s.node))
    }

    /// A parameter consumed by `Convert`s to `to` only.
    fn is_input_boundary(&self, model: &Graph, param: NodeId) -> bool {
        model.outlet_successors(param.into()).map_or(false, |succ| {
            !succ.is_empty()
                && succ.iter().all(|s| {
                    model
                        .node(s.node)
                        .map_or(false, |n| matches!(&n.op, OpKind::Convert(c) if c.to == self.to))
                })
        })
    }

    fn convert(&self, model: &mut Graph) -> GraftResult<bool> {
        self.check(model)?;
        let mut skip = vec![];
        let mut kept_params = vec![];
        let mut kept_results = vec![];
        if self.keep_io {
            for &param in model.parameters() {
                if model.outlet_fact(param.into())?.datum_type == self.from {
                    skip.push(param);
                    if !self.is_input_boundary(model, param) {
                        kept_params.push(param);
                    }
                }
            }
            for &result in model.results() {
                let input = model.node(result)?.inputs[0];
                let producer = model.node(input.node)?;
                if self.is_output_boundary(model, producer) {
                    skip.push(producer.id);
                } else if model.outlet_fact(input)?.datum_type == self.from {
                    kept_results.push(result);
                }
            }
        }
        let changed = self.convert_ops(model, &skip)?;
        if changed == 0 {
            return Ok(false);
        }
        for param in kept_params {
            let name = model.unique_name(&format!("{}.to_{}", model.node(param)?.name, self.to));
            let convert = model.wire_node(name, Convert::new(self.to), &[param.into()])?;
            model.shunt(param.into(), convert[0])?;
        }
        model.refresh_facts()?;
        for result in kept_results {
            let input = model.node(result)?.inputs[0];
            let name = model.unique_name(&format!("{}.to_{}", model.node(result)?.name, self.from));
            let convert = model.wire_node(name, Convert::new(self.from), &[input])?;
            model.set_input(InletId::new(result, 0), convert[0])?;
            model.move_names(input, convert[0])?;
        }
        model.refresh_facts()?;
        Ok(true)
    }
}

impl GraphPass for ConvertPrecision {
    fn name(&self) -> Cow<'_, str> {
        format!("{}-to-{}{}", self.from, self.to, if self.keep_io { "-keep-io" } else { "" })
            .to_lowercase()
            .into()
    }

    fn run(&mut self, model: &mut Graph) -> GraftResult<bool> {
        let modified = self.convert(model)?;
        if modified {
            debug!("Converted {:?} from {} to {}", model.name, self.from, self.to);
        }
        Ok(modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> GraftResult<Graph> {
        let mut model = Graph::named("model");
        let input = model.add_parameter("input", f32::fact([1, 3]))?;
        let shape = model.wire_node("shape", ShapeOf::default(), &[input])?;
        let scale = model.add_const("scale", rctensor2(&[[0.5f32, 70000.0, 1.0]]))?;
        let mul = model.wire_node("mul", BinaryOp::Mul, &[input, scale])?;
        let reshape = model.wire_node("reshape", Reshape::new(false), &[mul[0], shape[0]])?;
        model.set_outlet_names(reshape[0], ["output"])?;
        model.add_result("output", reshape[0])?;
        Ok(model)
    }

    #[test]
    fn converts_everything() -> GraftResult<()> {
        let mut model = model()?;
        assert!(ConvertPrecision::f32_to_f16().run(&mut model)?);
        assert_eq!(*model.parameter_fact(0)?, f16::fact([1, 3]));
        assert_eq!(model.result_fact(0)?.datum_type, DatumType::F16);
        assert_eq!(model.outlet_fact(model.node_by_name("shape")?.id.into())?.datum_type, DatumType::I64);
        let outputs = SimplePlan::new(&model)?
            .run(tvec!(tensor2(&[[1f32, 1.0, 2.0]]).cast_to::<f16>()?.into_owned().into()))?;
        let out = outputs[0].to_vec::<f16>()?;
        assert_eq!(out[0], f16::from_f32(0.5));
        // overflows to infinity
        assert!(out[1].is_infinite());
        assert_eq!(out[2], f16::from_f32(2.0));
        assert!(!ConvertPrecision::f32_to_f16().run(&mut model)?);
        Ok(())
    }

    #[test]
    fn keeps_io() -> GraftResult<()> {
        let mut model = model()?;
        assert!(ConvertPrecision::f32_to_f16().keep_io(true).run(&mut model)?);
        assert_eq!(*model.parameter_fact(0)?, f32::fact([1, 3]));
        assert_eq!(*model.result_fact(0)?, f32::fact([1, 3]));
        assert_eq!(model.find_outlet("output"), Some(model.result_outlet(0)?));
        let mul = model.node_by_name("mul")?;
        assert_eq!(mul.outputs[0].fact.datum_type, DatumType::F16);
        let outputs = SimplePlan::new(&model)?.run(tvec!(rctensor2(&[[1f32, 1.0, 3.0]])))?;
        assert_eq!(*outputs[0], tensor2(&[[0.5f32, f32::INFINITY, 3.0]]));
        Ok(())
    }

    #[test]
    fn keep_io_reaches_fixpoint() -> GraftResult<()> {
        let mut once = model()?;
        ConvertPrecision::f32_to_f16().keep_io(true).run(&mut once)?;
        assert!(!ConvertPrecision::f32_to_f16().keep_io(true).run(&mut once.clone())?);

        let mut model = model()?;
        let mut manager = PassManager::new().with_fixpoint(5);
        manager.register(ConvertPrecision::f32_to_f16().keep_io(true));
        manager.run(&mut model)?;
        assert_eq!(model.len(), once.len());
        assert_eq!(model.nodes().filter(|n| matches!(n.op, OpKind::Convert(_))).count(), 2);
        assert_eq!(*model.parameter_fact(0)?, f32::fact([1, 3]));
        assert_eq!(*model.result_fact(0)?, f32::fact([1, 3]));
        Ok(())
    }

    #[derive(Debug, Clone)]
    struct F32Only;

    impl CustomOp for F32Only {
        fn name(&self) -> Cow<'_, str> {
            "F32Only".into()
        }

        fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
            Ok(tvec!(inputs[0].without_value()))
        }

        fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
            Ok(inputs)
        }
    }

    #[test]
    fn unsupported_custom_op() -> GraftResult<()> {
        let mut model = Graph::default();
        let input = model.add_parameter("input", f32::fact([2]))?;
        let op = model.wire_node("op", OpKind::custom(F32Only), &[input])?;
        model.add_result("output", op[0])?;
        let err = ConvertPrecision::f32_to_f16().run(&mut model).unwrap_err();
        assert_eq!(
            GraphError::find(&err),
            Some(&GraphError::UnsupportedOpPrecision {
                op: "F32Only".into(),
                datum_type: DatumType::F16
            })
        );
        Ok(())
    }
}
