use crate::internal::*;

/// Graph output. Consumes one tensor, produces nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ResultOp;

impl TypedOp for ResultOp {
    fn name(&self) -> Cow<'_, str> {
        "Result".into()
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        check_input_arity(self, inputs.len(), 1)?;
        Ok(tvec!())
    }

    fn is_stateless(&self) -> bool {
        false
    }
}
