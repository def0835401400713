use crate::errors::invalid;
use crate::internal::*;

/// Static slice `[start..end)` along one axis.
#[derive(Debug, Clone, Copy, new, PartialEq, Eq, Hash)]
pub struct Slice {
    pub axis: usize,
    pub start: usize,
    pub end: usize,
}

impl TypedOp for Slice {
    fn name(&self) -> Cow<'_, str> {
        "Slice".into()
    }

    fn info(&self) -> Vec<String> {
        vec![format!("axis: {}, {}..{}", self.axis, self.start, self.end)]
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        check_input_arity(self, inputs.len(), 1)?;
        let input = inputs[0];
        ensure!(
            self.axis < input.rank() && self.start <= self.end,
            invalid(format!("Invalid slice {:?} of {:?}", self, input))
        );
        if let Dim::Fixed(dim) = input.shape[self.axis] {
            ensure!(self.end <= dim, invalid(format!("Slice {:?} out of {:?}", self, input)));
        }
        let mut fact = input.without_value();
        fact.shape.set(self.axis, Dim::Fixed(self.end - self.start));
        Ok(tvec!(fact))
    }

    fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        check_input_arity(self, inputs.len(), 1)?;
        Ok(tvec!(inputs[0].slice(self.axis, self.start, self.end)?.into_arc_tensor()))
    }
}
