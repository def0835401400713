use crate::errors::shape_mismatch;
use crate::internal::*;

/// Reads the current value of a state variable.
///
/// The optional input provides the value used before the first write.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadValue {
    pub variable_id: String,
    pub fact: TypedFact,
}

impl ReadValue {
    pub fn new(variable_id: impl Into<String>, fact: TypedFact) -> ReadValue {
        ReadValue { variable_id: variable_id.into(), fact: fact.without_value() }
    }
}

impl TypedOp for ReadValue {
    fn name(&self) -> Cow<'_, str> {
        "ReadValue".into()
    }

    fn info(&self) -> Vec<String> {
        vec![format!("variable: {:?}", self.variable_id), format!("{:?}", self.fact)]
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        ensure!(inputs.len() <= 1, "ReadValue takes at most one initializer input");
        if let Some(init) = inputs.first() {
            ensure!(
                init.datum_type == self.fact.datum_type
                    && init.shape.compatible_with(&self.fact.shape),
                shape_mismatch(format!(
                    "Variable {:?} is {:?}, initialized with {:?}",
                    self.variable_id, self.fact, init
                ))
            );
        }
        Ok(tvec!(self.fact.clone()))
    }

    fn is_stateless(&self) -> bool {
        false
    }
}
