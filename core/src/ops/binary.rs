use crate::broadcast::{multi_broadcast, multi_broadcast_dims};
use crate::errors::invalid;
use crate::internal::*;
use graft_ndarray::{IxDyn, Zip};

/// Binary arithmetic with numpy-style broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
}

impl BinaryOp {
    fn compute<T: NumDatum>(&self, a: T, b: T) -> T {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Max => {
                if b > a {
                    b
                } else {
                    a
                }
            }
            BinaryOp::Min => {
                if b < a {
                    b
                } else {
                    a
                }
            }
        }
    }
}

fn eval_t<T: NumDatum>(op: BinaryOp, a: &Tensor, b: &Tensor) -> GraftResult<Tensor> {
    let a = a.to_array_view::<T>()?;
    let b = b.to_array_view::<T>()?;
    if op == BinaryOp::Div && !T::datum_type().is_float() && b.iter().any(|x| *x == T::zero()) {
        bail!("Integer division by zero");
    }
    let shape = multi_broadcast(&[a.shape(), b.shape()])?;
    let a = a
        .broadcast(IxDyn(&shape))
        .with_context(|| format!("Broadcasting {:?} to {:?}", a.shape(), shape))?;
    let b = b
        .broadcast(IxDyn(&shape))
        .with_context(|| format!("Broadcasting {:?} to {:?}", b.shape(), shape))?;
    Ok(Zip::from(&a).and(&b).map_collect(|x, y| op.compute(*x, *y)).into_tensor())
}

impl TypedOp for BinaryOp {
    fn name(&self) -> Cow<'_, str> {
        format!("{self:?}").into()
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        check_input_arity(self, inputs.len(), 2)?;
        let (a, b) = (inputs[0], inputs[1]);
        ensure!(
            a.datum_type == b.datum_type,
            invalid(format!("{self:?} operands disagree on type: {a:?} and {b:?}"))
        );
        ensure!(
            a.datum_type.is_number(),
            invalid(format!("{self:?} does not accept {} operands", a.datum_type))
        );
        let shape = multi_broadcast_dims(&[a.shape.dims(), b.shape.dims()])?;
        Ok(tvec!(TypedFact { datum_type: a.datum_type, shape, konst: None }))
    }

    fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        check_input_arity(self, inputs.len(), 2)?;
        let (a, b) = (&inputs[0], &inputs[1]);
        ensure!(a.datum_type() == b.datum_type(), "Mixed operand types");
        let output = dispatch_numbers!(eval_t(a.datum_type())(*self, a, b))?;
        Ok(tvec!(output.into_arc_tensor()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_add() -> GraftResult<()> {
        let out = BinaryOp::Add.eval(tvec!(
            rctensor2(&[[1f32, 2.0], [3.0, 4.0]]),
            rctensor1(&[10f32, 20.0])
        ))?;
        assert_eq!(*out[0], tensor2(&[[11f32, 22.0], [13.0, 24.0]]));
        Ok(())
    }

    #[test]
    fn max_min() -> GraftResult<()> {
        let a = rctensor1(&[1i32, 5]);
        let b = rctensor1(&[3i32, 2]);
        assert_eq!(*BinaryOp::Max.eval(tvec!(a.clone(), b.clone()))?[0], tensor1(&[3i32, 5]));
        assert_eq!(*BinaryOp::Min.eval(tvec!(a, b))?[0], tensor1(&[1i32, 2]));
        Ok(())
    }

    #[test]
    fn integer_division_by_zero() {
        assert!(BinaryOp::Div.eval(tvec!(rctensor1(&[1i64]), rctensor1(&[0i64]))).is_err());
    }

    #[test]
    fn facts_must_agree_on_type() {
        let a = f32::fact([2]);
        let b = f16::fact([2]);
        assert!(BinaryOp::Mul.output_facts(&[&a, &b]).is_err());
        let c = f32::fact([3, 1]);
        assert_eq!(BinaryOp::Mul.output_facts(&[&a, &c]).unwrap()[0], f32::fact([3, 2]));
    }
}
