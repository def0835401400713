use crate::errors::invalid;
use crate::internal::*;
use itertools::Itertools;

/// Reshape the first input to the shape given by the second one.
///
/// A `-1` entry is inferred from the element count. With `special_zero`,
/// a `0` entry copies the input dimension at the same position.
#[derive(Debug, Clone, Copy, new, Default, PartialEq, Eq, Hash)]
pub struct Reshape {
    pub special_zero: bool,
}

impl Reshape {
    pub fn resolve(&self, input: &[Dim], spec: &[i64]) -> GraftResult<TVec<Dim>> {
        let mut placeholder = None;
        let mut shape: TVec<Dim> = tvec!();
        for (ix, &s) in spec.iter().enumerate() {
            let dim = match s {
                0 if self.special_zero => *input.get(ix).ok_or_else(|| {
                    invalid(format!("Reshape copies axis {ix} of a rank {} input", input.len()))
                })?,
                -1 => {
                    if placeholder.replace(ix).is_some() {
                        bail!(invalid("Reshape with more than one -1"))
                    }
                    Dim::Dynamic
                }
                s if s >= 0 => Dim::Fixed(s as usize),
                s => bail!(invalid(format!("Reshape to negative dimension {s}"))),
            };
            shape.push(dim);
        }
        let input_volume = input.iter().map(|d| d.to_usize()).product::<Option<usize>>();
        let others = shape
            .iter()
            .enumerate()
            .filter(|(ix, _)| Some(*ix) != placeholder)
            .map(|(_, d)| d.to_usize())
            .product::<Option<usize>>();
        if let (Some(input_volume), Some(others)) = (input_volume, others) {
            if let Some(placeholder) = placeholder {
                if others == 0 || input_volume % others != 0 {
                    bail!(invalid(format!(
                        "Can not reshape {} elements to {}",
                        input_volume,
                        spec.iter().join(",")
                    )))
                }
                shape[placeholder] = Dim::Fixed(input_volume / others);
            } else if input_volume != others {
                bail!(invalid(format!(
                    "Can not reshape {} elements to {}",
                    input_volume,
                    spec.iter().join(",")
                )))
            }
        }
        Ok(shape)
    }
}

impl TypedOp for Reshape {
    fn name(&self) -> Cow<'_, str> {
        "Reshape".into()
    }

    fn info(&self) -> Vec<String> {
        vec![format!("special_zero: {}", self.special_zero)]
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        check_input_arity(self, inputs.len(), 2)?;
        let (data, shape) = (inputs[0], inputs[1]);
        ensure!(
            shape.datum_type.is_integer() && shape.rank() == 1,
            invalid(format!("Reshape target must be a 1D integer tensor, got {shape:?}"))
        );
        let dims = if let Some(spec) = &shape.konst {
            let spec = spec.cast_to::<i64>()?.to_vec::<i64>()?;
            self.resolve(data.shape.dims(), &spec)?
        } else if let Dim::Fixed(rank) = shape.shape[0] {
            tvec!(Dim::Dynamic; rank)
        } else {
            bail!(GraphError::UnsupportedOp("Reshape to a shape of unknown rank".into()))
        };
        Ok(tvec!(TypedFact::dt_shape(data.datum_type, dims)))
    }

    fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        check_input_arity(self, inputs.len(), 2)?;
        let spec = inputs[1].cast_to::<i64>()?.to_vec::<i64>()?;
        let input = inputs[0].clone();
        let input_dims = input.shape().iter().map(|d| Dim::Fixed(*d)).collect::<TVec<_>>();
        let shape = self
            .resolve(&input_dims, &spec)?
            .iter()
            .map(|d| d.to_usize().ok_or_else(|| invalid("Unresolved reshape dimension")))
            .collect::<GraftResult<TVec<usize>>>()?;
        let output = input.into_tensor().into_shape(&shape)?;
        Ok(tvec!(output.into_arc_tensor()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(shape: &[usize]) -> TVec<Dim> {
        shape.iter().map(|d| Dim::Fixed(*d)).collect()
    }

    #[test]
    fn placeholder() -> GraftResult<()> {
        assert_eq!(Reshape::new(false).resolve(&dims(&[2, 3, 4]), &[4, -1])?, dims(&[4, 6]));
        Ok(())
    }

    #[test]
    fn special_zero() -> GraftResult<()> {
        assert_eq!(Reshape::new(true).resolve(&dims(&[2, 3, 4]), &[0, -1])?, dims(&[2, 12]));
        assert!(Reshape::new(false).resolve(&dims(&[2, 3, 4]), &[0, -1]).is_err());
        Ok(())
    }

    #[test]
    fn volume_mismatch() {
        assert!(Reshape::new(false).resolve(&dims(&[2, 3]), &[4, 2]).is_err());
        assert!(Reshape::new(false).resolve(&dims(&[2, 3]), &[-1, -1]).is_err());
    }

    #[test]
    fn dynamic_input() -> GraftResult<()> {
        let input = [Dim::Dynamic, Dim::Fixed(4)];
        assert_eq!(
            Reshape::new(false).resolve(&input, &[-1, 2])?,
            tvec!(Dim::Dynamic, Dim::Fixed(2))
        );
        Ok(())
    }

    #[test]
    fn eval() -> GraftResult<()> {
        let out = Reshape::new(false)
            .eval(tvec!(rctensor2(&[[1f32, 2.0], [3.0, 4.0]]), rctensor1(&[-1i64])))?;
        assert_eq!(*out[0], tensor1(&[1f32, 2.0, 3.0, 4.0]));
        Ok(())
    }
}
