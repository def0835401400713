use crate::errors::invalid;
use crate::internal::*;

/// Produces the shape of its input as a 1D integer tensor.
#[derive(Debug, Clone, Copy, new, PartialEq, Eq, Hash)]
pub struct ShapeOf {
    pub output_type: DatumType,
}

impl Default for ShapeOf {
    fn default() -> ShapeOf {
        ShapeOf { output_type: DatumType::I64 }
    }
}

impl ShapeOf {
    fn shape_tensor(&self, shape: &[usize]) -> GraftResult<Tensor> {
        let shape = shape.iter().map(|d| *d as i64).collect::<Vec<_>>();
        Ok(tensor1(&shape).cast_to_dt(self.output_type)?.into_owned())
    }
}

impl TypedOp for ShapeOf {
    fn name(&self) -> Cow<'_, str> {
        "ShapeOf".into()
    }

    fn info(&self) -> Vec<String> {
        vec![format!("output_type: {}", self.output_type)]
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        check_input_arity(self, inputs.len(), 1)?;
        ensure!(
            matches!(self.output_type, DatumType::I32 | DatumType::I64),
            invalid(format!("ShapeOf can not output {}", self.output_type))
        );
        let mut fact = TypedFact::dt_shape(self.output_type, [inputs[0].rank()]);
        if let Some(shape) = inputs[0].shape.as_concrete() {
            fact.konst = Some(self.shape_tensor(&shape)?.into_arc_tensor());
        }
        Ok(tvec!(fact))
    }

    fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        check_input_arity(self, inputs.len(), 1)?;
        Ok(tvec!(self.shape_tensor(inputs[0].shape())?.into_arc_tensor()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_shape_is_known_early() -> GraftResult<()> {
        let input = f32::fact([1, 3, 22, 22]);
        let facts = ShapeOf::new(DatumType::I32).output_facts(&[&input])?;
        assert_eq!(facts[0].konst.as_deref(), Some(&tensor1(&[1i32, 3, 22, 22])));
        Ok(())
    }

    #[test]
    fn dynamic_shape() -> GraftResult<()> {
        let input = TypedFact::dt_shape(DatumType::F32, [Dim::Dynamic, Dim::Fixed(3)]);
        let facts = ShapeOf::default().output_facts(&[&input])?;
        assert!(facts[0].konst.is_none());
        assert_eq!(facts[0].shape, ShapeFact::from_dims([2usize]));
        Ok(())
    }
}
