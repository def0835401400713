use super::resolve_axis;
use crate::errors::{invalid, shape_mismatch};
use crate::internal::*;

#[derive(Debug, Clone, Copy, new, PartialEq, Eq, Hash)]
pub struct Concat {
    pub axis: i64,
}

impl TypedOp for Concat {
    fn name(&self) -> Cow<'_, str> {
        "Concat".into()
    }

    fn info(&self) -> Vec<String> {
        vec![format!("axis: {}", self.axis)]
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        ensure!(!inputs.is_empty(), invalid("Concat needs at least one input"));
        let first = inputs[0];
        let axis = resolve_axis(self.axis, first.rank())?;
        let mut shape = first.shape.clone();
        let mut len = Some(0usize);
        for input in inputs {
            ensure!(
                input.datum_type == first.datum_type && input.rank() == first.rank(),
                invalid(format!("Concat of {first:?} and {input:?}"))
            );
            for (ix, dim) in input.shape.iter().enumerate() {
                if ix == axis {
                    len = len.zip(dim.to_usize()).map(|(a, b)| a + b);
                } else if !shape[ix].compatible_with(dim) {
                    bail!(shape_mismatch(format!("Concat on axis {axis} of {first:?} and {input:?}")))
                } else if let Dim::Fixed(_) = dim {
                    shape.set(ix, *dim);
                }
            }
        }
        shape.set(axis, len.map(Dim::Fixed).unwrap_or(Dim::Dynamic));
        Ok(tvec!(TypedFact { datum_type: first.datum_type, shape, konst: None }))
    }

    fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        ensure!(!inputs.is_empty(), "Concat needs at least one input");
        let axis = resolve_axis(self.axis, inputs[0].rank())?;
        let tensors = inputs.iter().map(|t| &**t).collect::<Vec<&Tensor>>();
        Ok(tvec!(Tensor::concat(axis, &tensors)?.into_arc_tensor()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facts() -> GraftResult<()> {
        let a = f32::fact([2, 3]);
        let b = TypedFact::dt_shape(DatumType::F32, [Dim::Dynamic, Dim::Fixed(3)]);
        let c = f32::fact([4, 3]);
        assert_eq!(Concat::new(0).output_facts(&[&a, &c])?[0], f32::fact([6, 3]));
        assert_eq!(Concat::new(-2).output_facts(&[&a, &b])?[0].shape[0], Dim::Dynamic);
        assert!(Concat::new(1).output_facts(&[&a, &c]).is_err());
        Ok(())
    }

    #[test]
    fn eval() -> GraftResult<()> {
        let out = Concat::new(1)
            .eval(tvec!(rctensor2(&[[1i32], [2]]), rctensor2(&[[3i32, 4], [5, 6]])))?;
        assert_eq!(*out[0], tensor2(&[[1i32, 3, 4], [2, 5, 6]]));
        Ok(())
    }
}
