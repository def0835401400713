use super::{Chunks, InputMapping, OutputMapping};
use crate::errors::{invalid, shape_mismatch};
use crate::internal::*;

/// Loop operation: runs `body` once per iteration.
///
/// Outer input `i` and outer output `k` are described by the mappings
/// whose `outer` is `i` and by `output_mapping[k]`. Body parameters and
/// results are referred to by their position in the body interface.
#[derive(Clone, Debug)]
pub struct TensorIterator {
    pub body: Graph,
    pub input_mapping: Vec<InputMapping>,
    pub output_mapping: Vec<OutputMapping>,
    /// Trip count used when no input is sliced.
    pub num_iterations: Option<usize>,
}

impl TensorIterator {
    pub fn new(body: Graph) -> TensorIterator {
        TensorIterator { body, input_mapping: vec![], output_mapping: vec![], num_iterations: None }
    }

    pub fn with_num_iterations(self, num_iterations: usize) -> TensorIterator {
        TensorIterator { num_iterations: Some(num_iterations), ..self }
    }

    /// Maps the next outer input to a sliced body parameter. Returns the
    /// outer input slot.
    pub fn sliced_input(
        &mut self,
        body_param: usize,
        axis: usize,
        start: i64,
        stride: i64,
        part_size: usize,
        end: i64,
    ) -> usize {
        let outer = self.input_mapping.len();
        self.input_mapping.push(InputMapping::Sliced {
            outer,
            body_param,
            axis,
            start,
            end,
            stride,
            part_size,
        });
        outer
    }

    pub fn invariant_input(&mut self, body_param: usize) -> usize {
        let outer = self.input_mapping.len();
        self.input_mapping.push(InputMapping::Invariant { outer, body_param });
        outer
    }

    pub fn merged_input(&mut self, body_param: usize, body_result: usize) -> usize {
        let outer = self.input_mapping.len();
        self.input_mapping.push(InputMapping::Merged { outer, body_param, body_result });
        outer
    }

    /// Exposes the final value of a body result. Returns the outer output slot.
    pub fn last_iteration_output(&mut self, body_result: usize) -> usize {
        self.output_mapping.push(OutputMapping::LastIteration { body_result });
        self.output_mapping.len() - 1
    }

    pub fn concatenated_output(
        &mut self,
        body_result: usize,
        axis: usize,
        stride: i64,
        part_size: usize,
    ) -> usize {
        self.output_mapping.push(OutputMapping::Concatenated {
            body_result,
            axis,
            stride,
            part_size,
        });
        self.output_mapping.len() - 1
    }

    pub fn mapping_for_param(&self, body_param: usize) -> Option<&InputMapping> {
        self.input_mapping.iter().find(|m| m.body_param() == body_param)
    }

    /// Trip count, if it can be computed from the input facts.
    pub fn iteration_count(&self, inputs: &[&TypedFact]) -> GraftResult<Option<usize>> {
        let mut count = None;
        let mut sliced = false;
        for mapping in &self.input_mapping {
            if let InputMapping::Sliced { outer, axis, .. } = mapping {
                sliced = true;
                let fact = inputs
                    .get(*outer)
                    .ok_or_else(|| invalid(format!("No outer input #{outer}")))?;
                ensure!(*axis < fact.rank(), invalid(format!("Slicing axis {axis} of {fact:?}")));
                let Some(chunks) = mapping.chunks(fact.shape[*axis].to_usize())? else {
                    return Ok(None);
                };
                if let Some(previous) = count {
                    ensure!(
                        previous == chunks.count,
                        invalid(format!(
                            "Sliced inputs disagree on trip count: {previous} and {}",
                            chunks.count
                        ))
                    );
                }
                count = Some(chunks.count);
            }
        }
        Ok(if sliced { count } else { self.num_iterations })
    }

    fn check(&self, inputs: &[&TypedFact]) -> GraftResult<()> {
        check_input_arity(self, inputs.len(), self.input_mapping.len())?;
        ensure!(self.body.sinks().is_empty(), invalid("TensorIterator body can not hold state"));
        let params = self.body.parameters().len();
        for p in 0..params {
            let count = self.input_mapping.iter().filter(|m| m.body_param() == p).count();
            ensure!(count == 1, invalid(format!("Body parameter #{p} is mapped {count} times")));
        }
        for (ix, mapping) in self.input_mapping.iter().enumerate() {
            ensure!(
                self.input_mapping.iter().filter(|m| m.outer() == mapping.outer()).count() == 1
                    && mapping.outer() < inputs.len(),
                invalid(format!("Invalid outer slot in {mapping:?}"))
            );
            ensure!(mapping.body_param() < params, invalid(format!("Invalid mapping #{ix}")));
            let outer = inputs[mapping.outer()];
            let body = self.body.parameter_fact(mapping.body_param())?;
            let expected = match mapping {
                InputMapping::Sliced { axis, part_size, .. } => {
                    ensure!(*axis < outer.rank(), invalid(format!("Slicing axis {axis} of {outer:?}")));
                    let mut chunk = outer.without_value();
                    chunk.shape.set(*axis, Dim::Fixed(*part_size));
                    chunk
                }
                InputMapping::Merged { body_result, .. } => {
                    let result = self.body.result_fact(*body_result)?;
                    ensure!(
                        compatible(result, body),
                        shape_mismatch(format!(
                            "Back-edge from {result:?} to body parameter {body:?}"
                        ))
                    );
                    outer.without_value()
                }
                InputMapping::Invariant { .. } => outer.without_value(),
            };
            ensure!(
                compatible(&expected, body),
                shape_mismatch(format!("Outer input {outer:?} bound to body parameter {body:?}"))
            );
        }
        for mapping in &self.output_mapping {
            let result = self.body.result_fact(mapping.body_result())?;
            if let OutputMapping::Concatenated { axis, stride, part_size, .. } = mapping {
                ensure!(
                    *axis < result.rank()
                        && result.shape[*axis].compatible_with(&Dim::Fixed(*part_size)),
                    shape_mismatch(format!("Concatenating {result:?} by {part_size} on {axis}"))
                );
                if stride.unsigned_abs() as usize != *part_size {
                    bail!(GraphError::UnsupportedOp(format!(
                        "Concatenated output with stride {stride} and part size {part_size}"
                    )))
                }
            }
        }
        Ok(())
    }

    pub fn same_as(&self, other: &TensorIterator) -> GraftResult<bool> {
        Ok(self.input_mapping == other.input_mapping
            && self.output_mapping == other.output_mapping
            && self.num_iterations == other.num_iterations
            && self.body.same_structure(&other.body)?)
    }
}

fn compatible(a: &TypedFact, b: &TypedFact) -> bool {
    a.datum_type == b.datum_type && a.shape.compatible_with(&b.shape)
}

impl TypedOp for TensorIterator {
    fn name(&self) -> Cow<'_, str> {
        "TensorIterator".into()
    }

    fn info(&self) -> Vec<String> {
        let mut info = vec![];
        for mapping in &self.input_mapping {
            info.push(format!("{mapping:?}"));
        }
        for mapping in &self.output_mapping {
            info.push(format!("{mapping:?}"));
        }
        info
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        self.check(inputs)?;
        let count = self.iteration_count(inputs)?;
        self.output_mapping
            .iter()
            .map(|mapping| {
                let mut fact = self.body.result_fact(mapping.body_result())?.without_value();
                if let OutputMapping::Concatenated { axis, part_size, .. } = mapping {
                    let dim = count.map(|n| Dim::Fixed(n * part_size)).unwrap_or(Dim::Dynamic);
                    fact.shape.set(*axis, dim);
                }
                Ok(fact)
            })
            .collect()
    }

    fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        let facts = inputs.iter().map(|t| TypedFact::from(&**t)).collect::<TVec<_>>();
        let fact_refs = facts.iter().collect::<TVec<_>>();
        self.check(&fact_refs)?;
        let count = self.iteration_count(&fact_refs)?.ok_or_else(|| {
            GraphError::UnsupportedOp("TensorIterator without a trip count".into())
        })?;
        ensure!(count > 0, invalid("TensorIterator with no iteration"));
        let chunks = self
            .input_mapping
            .iter()
            .map(|m| match m {
                InputMapping::Sliced { outer, axis, .. } => {
                    m.chunks(inputs[*outer].shape().get(*axis).copied())
                }
                _ => Ok(None),
            })
            .collect::<GraftResult<Vec<Option<Chunks>>>>()?;
        let mut carried = self
            .input_mapping
            .iter()
            .filter_map(|m| match m {
                InputMapping::Merged { outer, body_param, .. } => {
                    Some((*body_param, inputs[*outer].clone()))
                }
                _ => None,
            })
            .collect::<HashMap<usize, Arc<Tensor>>>();
        let plan = SimplePlan::new(&self.body)?;
        let mut last: Vec<Option<Arc<Tensor>>> = vec![None; self.output_mapping.len()];
        let mut parts: Vec<Vec<Arc<Tensor>>> = vec![vec![]; self.output_mapping.len()];
        for i in 0..count {
            let mut body_inputs: TVec<Arc<Tensor>> = tvec!();
            for p in 0..self.body.parameters().len() {
                let (ix, mapping) = self
                    .input_mapping
                    .iter()
                    .enumerate()
                    .find(|(_, m)| m.body_param() == p)
                    .ok_or_else(|| invalid(format!("Body parameter #{p} is not mapped")))?;
                let value = match mapping {
                    InputMapping::Sliced { outer, axis, .. } => {
                        let chunks =
                            chunks[ix].ok_or_else(|| invalid("Unresolved slicing windows"))?;
                        let (begin, end) = chunks.range(i);
                        inputs[*outer].slice(*axis, begin, end)?.into_arc_tensor()
                    }
                    InputMapping::Invariant { outer, .. } => inputs[*outer].clone(),
                    InputMapping::Merged { .. } => carried
                        .get(&p)
                        .cloned()
                        .ok_or_else(|| invalid(format!("No carried value for #{p}")))?,
                };
                body_inputs.push(value);
            }
            let outputs = plan.run(body_inputs).with_context(|| format!("Iteration {i}"))?;
            for mapping in &self.input_mapping {
                if let InputMapping::Merged { body_param, body_result, .. } = mapping {
                    carried.insert(*body_param, outputs[*body_result].clone());
                }
            }
            for (k, mapping) in self.output_mapping.iter().enumerate() {
                match mapping {
                    OutputMapping::LastIteration { body_result } => {
                        last[k] = Some(outputs[*body_result].clone())
                    }
                    OutputMapping::Concatenated { body_result, .. } => {
                        parts[k].push(outputs[*body_result].clone())
                    }
                }
            }
        }
        self.output_mapping
            .iter()
            .enumerate()
            .map(|(k, mapping)| match mapping {
                OutputMapping::LastIteration { .. } => {
                    last[k].take().ok_or_else(|| invalid("No iteration value"))
                }
                OutputMapping::Concatenated { axis, stride, .. } => {
                    if *stride < 0 {
                        parts[k].reverse();
                    }
                    let tensors = parts[k].iter().map(|t| &**t).collect::<Vec<&Tensor>>();
                    Ok(Tensor::concat(*axis, &tensors)?.into_arc_tensor())
                }
            })
            .collect()
    }
}
