use super::resolve_axis;
use crate::errors::invalid;
use crate::internal::*;

/// Removes size-one axes, all of them when `axes` is `None`.
#[derive(Debug, Clone, new, Default, PartialEq, Eq, Hash)]
pub struct Squeeze {
    pub axes: Option<TVec<i64>>,
}

impl Squeeze {
    fn compute_shape(&self, input: &[Dim]) -> GraftResult<TVec<Dim>> {
        if let Some(axes) = &self.axes {
            let mut axes =
                axes.iter().map(|a| resolve_axis(*a, input.len())).collect::<GraftResult<Vec<_>>>()?;
            axes.sort();
            axes.dedup();
            let mut shape: TVec<Dim> = input.into();
            for &axis in axes.iter().rev() {
                if !shape.remove(axis).compatible_with(&Dim::Fixed(1)) {
                    bail!(invalid(format!("Squeezing axis {axis} which dimension is not one")))
                }
            }
            Ok(shape)
        } else if input.iter().any(|d| !d.is_fixed()) {
            bail!(GraphError::UnsupportedOp("Squeeze of all unit axes with dynamic dimensions".into()))
        } else {
            Ok(input.iter().copied().filter(|d| *d != Dim::Fixed(1)).collect())
        }
    }
}

impl TypedOp for Squeeze {
    fn name(&self) -> Cow<'_, str> {
        "Squeeze".into()
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        check_input_arity(self, inputs.len(), 1)?;
        let shape = self.compute_shape(inputs[0].shape.dims())?;
        Ok(tvec!(TypedFact::dt_shape(inputs[0].datum_type, shape)))
    }

    fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        check_input_arity(self, inputs.len(), 1)?;
        let input = inputs[0].clone();
        let dims = input.shape().iter().map(|d| Dim::Fixed(*d)).collect::<TVec<_>>();
        let shape = self.compute_shape(&dims)?.iter().filter_map(|d| d.to_usize()).collect::<TVec<_>>();
        Ok(tvec!(input.into_tensor().into_shape(&shape)?.into_arc_tensor()))
    }
}

/// Inserts size-one axes. Axes refer to the output rank.
#[derive(Debug, Clone, new, Default, PartialEq, Eq, Hash)]
pub struct Unsqueeze {
    pub axes: TVec<i64>,
}

impl Unsqueeze {
    fn compute_shape(&self, input: &[Dim]) -> GraftResult<TVec<Dim>> {
        let rank = input.len() + self.axes.len();
        let mut axes =
            self.axes.iter().map(|a| resolve_axis(*a, rank)).collect::<GraftResult<Vec<_>>>()?;
        axes.sort();
        let before = axes.len();
        axes.dedup();
        ensure!(before == axes.len(), invalid("Unsqueeze with repeated axes"));
        let mut shape: TVec<Dim> = input.into();
        for axis in axes {
            shape.insert(axis, Dim::Fixed(1));
        }
        Ok(shape)
    }
}

impl TypedOp for Unsqueeze {
    fn name(&self) -> Cow<'_, str> {
        "Unsqueeze".into()
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        check_input_arity(self, inputs.len(), 1)?;
        let shape = self.compute_shape(inputs[0].shape.dims())?;
        Ok(tvec!(TypedFact::dt_shape(inputs[0].datum_type, shape)))
    }

    fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        check_input_arity(self, inputs.len(), 1)?;
        let input = inputs[0].clone();
        let dims = input.shape().iter().map(|d| Dim::Fixed(*d)).collect::<TVec<_>>();
        let shape = self.compute_shape(&dims)?.iter().filter_map(|d| d.to_usize()).collect::<TVec<_>>();
        Ok(tvec!(input.into_tensor().into_shape(&shape)?.into_arc_tensor()))
    }
}
