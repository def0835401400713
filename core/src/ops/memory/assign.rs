use crate::internal::*;

/// Writes its input to a state variable. The write is visible to the next
/// run only.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Assign {
    pub variable_id: String,
}

impl Assign {
    pub fn new(variable_id: impl Into<String>) -> Assign {
        Assign { variable_id: variable_id.into() }
    }
}

impl TypedOp for Assign {
    fn name(&self) -> Cow<'_, str> {
        "Assign".into()
    }

    fn info(&self) -> Vec<String> {
        vec![format!("variable: {:?}", self.variable_id)]
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        check_input_arity(self, inputs.len(), 1)?;
        Ok(tvec!())
    }

    fn is_stateless(&self) -> bool {
        false
    }
}
