use crate::errors::invalid;
use crate::internal::*;
use num_traits::Float;

/// Unary element-wise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementWiseOp {
    Relu,
    Sigmoid,
    Neg,
    Abs,
}

impl ElementWiseOp {
    fn accepts(&self, dt: DatumType) -> bool {
        match self {
            ElementWiseOp::Sigmoid => dt.is_float(),
            _ => dt.is_number(),
        }
    }
}

fn eval_t<T: NumDatum>(op: ElementWiseOp, t: &Tensor) -> GraftResult<Tensor> {
    let zero = T::zero();
    let a = t.to_array_view::<T>()?;
    let output = match op {
        ElementWiseOp::Relu => a.mapv(|x| if x > zero { x } else { zero }),
        ElementWiseOp::Neg => a.mapv(|x| zero - x),
        ElementWiseOp::Abs => a.mapv(|x| if x < zero { zero - x } else { x }),
        ElementWiseOp::Sigmoid => bail!("Sigmoid needs a float input"),
    };
    Ok(output.into_tensor())
}

fn sigmoid_t<T: Datum + Float>(t: &Tensor) -> GraftResult<Tensor> {
    let one = T::one();
    Ok(t.to_array_view::<T>()?.mapv(|x| one / (one + (-x).exp())).into_tensor())
}

impl TypedOp for ElementWiseOp {
    fn name(&self) -> Cow<'_, str> {
        format!("{self:?}").into()
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        check_input_arity(self, inputs.len(), 1)?;
        ensure!(
            self.accepts(inputs[0].datum_type),
            invalid(format!("{self:?} does not accept {} input", inputs[0].datum_type))
        );
        Ok(tvec!(inputs[0].without_value()))
    }

    fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        check_input_arity(self, inputs.len(), 1)?;
        let input = &inputs[0];
        let output = if *self == ElementWiseOp::Sigmoid {
            dispatch_floatlike!(sigmoid_t(input.datum_type())(input))?
        } else {
            dispatch_numbers!(eval_t(input.datum_type())(*self, input))?
        };
        Ok(tvec!(output.into_arc_tensor()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn relu() -> GraftResult<()> {
        let out = ElementWiseOp::Relu.eval(tvec!(rctensor1(&[-1f32, 0.0, 2.5])))?;
        assert_eq!(*out[0], tensor1(&[0f32, 0.0, 2.5]));
        let out = ElementWiseOp::Relu.eval(tvec!(rctensor1(&[-3i64, 4])))?;
        assert_eq!(*out[0], tensor1(&[0i64, 4]));
        Ok(())
    }

    #[test]
    fn sigmoid() -> GraftResult<()> {
        let out = ElementWiseOp::Sigmoid.eval(tvec!(rctensor1(&[0f32, 100.0])))?;
        let out = out[0].to_vec::<f32>()?;
        assert_abs_diff_eq!(out[0], 0.5);
        assert_abs_diff_eq!(out[1], 1.0);
        Ok(())
    }

    #[test]
    fn sigmoid_refuses_integers() {
        let fact = i32::fact([2]);
        assert!(ElementWiseOp::Sigmoid.output_facts(&[&fact]).is_err());
        assert!(ElementWiseOp::Abs.output_facts(&[&fact]).is_ok());
    }
}
