use super::unroll::unroll_one;
use crate::errors::shape_mismatch;
use crate::internal::*;

/// Turns the back-edges of every loop with a static trip count into state
/// variables, then unrolls the loop.
///
/// Each back-edge becomes a `ReadValue` initialized by the loop's initial
/// value, and an `Assign` of the value the last iteration computes. A
/// second run of the graph resumes from where the first one stopped.
///
/// Every iteration of the loop is inlined: one run of the graph still
/// covers the whole sequence the loop covered. The graph is not reduced to
/// a single iteration per run.
#[derive(Clone, Debug, Default)]
pub struct LowLatency;

impl GraphPass for LowLatency {
    fn name(&self) -> Cow<'_, str> {
        "low-latency".into()
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
                warn!("Leaving {node} alone: trip count is not static");
                continue;
            }
            let name = node.name.clone();
            let mut registers = vec![];
            for mapping in &ti.input_mapping {
                let InputMapping::Merged { outer, body_param, .. } = mapping else { continue };
                let param = ti.body.parameters()[*body_param];
                let variable_id = format!("{}/{}", name, ti.body.node(param)?.name);
                let init = node.inputs[*outer];
                let body_fact = ti.body.outlet_fact(param.into())?;
                let fact = facts[*outer].without_value();
                ensure!(
                    fact.datum_type == body_fact.datum_type
                        && fact.shape.compatible_with(&body_fact.shape),
                    shape_mismatch(format!("Back-edge {variable_id:?}: {fact:?} and {body_fact:?}"))
                );
                registers.push((*body_param, variable_id, init, fact));
            }
            let mut carried = HashMap::new();
            for (body_param, variable_id, init, fact) in &registers {
                model.add_variable(Variable {
                    id: variable_id.clone(),
                    fact: fact.clone(),
                    initial: None,
                })?;
                let read = model.wire_node(
                    model.unique_name(variable_id),
                    ReadValue::new(&**variable_id, fact.clone()),
                    &[*init],
                )?;
                carried.insert(*body_param, read[0]);
            }
            let finals = unroll_one(model, id, carried)?;
            for (body_param, variable_id, _, _) in registers {
                let value = finals[&body_param];
                let assign = model.add_node(
                    model.unique_name(&format!("{variable_id}/assign")),
                    Assign::new(&*variable_id),
                    &[value],
                )?;
                model.add_sink(assign)?;
            }
            debug!("Low latency transformation applied to {name:?}");
            modified = true;
        }
        if modified {
            model.refresh_facts()?;
        }
        Ok(modified)
    }
}
