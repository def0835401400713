use crate::internal::*;

/// Graph input. Values are fed by the plan, never computed.
#[derive(Debug, Clone, new, PartialEq)]
pub struct Parameter {
    pub fact: TypedFact,
}

impl TypedOp for Parameter {
    fn name(&self) -> Cow<'_, str> {
        "Parameter".into()
    }

    fn info(&self) -> Vec<String> {
        vec![format!("{:?}", self.fact)]
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        check_input_arity(self, inputs.len(), 0)?;
        Ok(tvec!(self.fact.without_value()))
    }

    fn is_stateless(&self) -> bool {
        false
    }
}
