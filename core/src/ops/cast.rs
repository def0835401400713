use crate::internal::*;

/// Element type conversion.
#[derive(Debug, Clone, Copy, new, PartialEq, Eq, Hash)]
pub struct Convert {
    pub to: DatumType,
}

impl TypedOp for Convert {
    fn name(&self) -> Cow<'_, str> {
        "Convert".into()
    }

    fn info(&self) -> Vec<String> {
        vec![format!("to: {}", self.to)]
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        check_input_arity(self, inputs.len(), 1)?;
        Ok(tvec!(inputs[0].with_datum_type(self.to)))
    }

    fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        check_input_arity(self, inputs.len(), 1)?;
        let converted = inputs[0].cast_to_dt(self.to)?.into_owned();
        Ok(tvec!(converted.into_arc_tensor()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_to_i64_truncates() -> GraftResult<()> {
        let out = Convert::new(DatumType::I64).eval(tvec!(rctensor1(&[1.7f32, -2.5])))?;
        assert_eq!(*out[0], tensor1(&[1i64, -2]));
        Ok(())
    }
}
