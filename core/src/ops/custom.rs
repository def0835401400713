//! Operations defined outside of graft.
use crate::internal::*;
use downcast_rs::{impl_downcast, Downcast};
use dyn_clone::DynClone;

/// An operation implemented by an external component.
///
/// Custom ops take part in evaluation and constant folding like builtin
/// ones. Precision conversion refuses them unless they opt in through
/// `supports_precision`, and the serialized description can not carry
/// them.
pub trait CustomOp: fmt::Debug + DynClone + Downcast + Send + Sync {
    fn name(&self) -> Cow<'_, str>;

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>>;

    fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>>;

    fn is_stateless(&self) -> bool {
        true
    }

    /// Whether the op can run with its floating point tensors in `_dt`.
    fn supports_precision(&self, _dt: DatumType) -> bool {
        false
    }

    fn same_as(&self, _other: &dyn CustomOp) -> bool {
        false
    }
}

dyn_clone::clone_trait_object!(CustomOp);
impl_downcast!(CustomOp);

impl TypedOp for Box<dyn CustomOp> {
    fn name(&self) -> Cow<'_, str> {
        (**self).name()
    }

    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        (**self).output_facts(inputs)
    }

    fn is_stateless(&self) -> bool {
        (**self).is_stateless()
    }

    fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        (**self).eval(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Double;

    impl CustomOp for Double {
        fn name(&self) -> Cow<'_, str> {
            "Double".into()
        }

        fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
            Ok(tvec!(inputs[0].without_value()))
        }

        fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
            let doubled = inputs[0].to_array_view::<f32>()?.mapv(|x| x * 2.0);
            Ok(tvec!(doubled.into_arc_tensor()))
        }

        fn same_as(&self, other: &dyn CustomOp) -> bool {
            other.downcast_ref::<Double>() == Some(self)
        }
    }

    #[test]
    fn custom_op_runs() -> GraftResult<()> {
        let mut model = Graph::default();
        let input = model.add_parameter("input", f32::fact([2]))?;
        let double = model.wire_node("double", OpKind::custom(Double), &[input])?;
        model.add_result("output", double[0])?;
        let outputs = SimplePlan::new(&model)?.run(tvec!(tensor1(&[1f32, 2.0]).into()))?;
        assert_eq!(*outputs[0], tensor1(&[2f32, 4.0]));
        assert!(OpKind::custom(Double).same_as(&OpKind::custom(Double))?);
        Ok(())
    }
}
