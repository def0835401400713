use crate::internal::*;

#[derive(Debug, Clone, new, PartialEq)]
pub struct Const(pub Arc<Tensor>);

impl Const {
    pub fn val(&self) -> &Arc<Tensor> {
        &self.0
    }
}

impl TypedOp for Const {
    fn name(&self) -> Cow<'_, str> {
        "Const".into()
    }

    fn info(&self) -> Vec<String> {
        vec![format!("{:?}", self.0)]
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        check_input_arity(self, inputs.len(), 0)?;
        Ok(tvec!(Arc::clone(&self.0).into()))
    }

    fn eval(&self, _inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        Ok(tvec![self.0.clone()])
    }
}
