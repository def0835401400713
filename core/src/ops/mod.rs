//! Ops
use crate::errors::invalid;
use crate::internal::*;

pub mod array;
pub mod binary;
pub mod cast;
pub mod custom;
pub mod element_wise;
pub mod konst;
pub mod memory;
pub mod scan;
pub mod sink;
pub mod source;

pub fn check_input_arity(op: &dyn TypedOp, inputs: usize, expected: usize) -> GraftResult<()> {
    if inputs != expected {
        bail!(invalid(format!(
            "Wrong input number for {}. Expected {}, node has {}.",
            op.name(),
            expected,
            inputs
        )))
    } else {
        Ok(())
    }
}

/// Behaviour shared by all operations.
pub trait TypedOp: fmt::Debug + Send + Sync {
    /// Type tag of the operation, as used in serialized graphs.
    fn name(&self) -> Cow<'_, str>;

    /// Short human readable attribute dump.
    fn info(&self) -> Vec<String> {
        vec![]
    }

    /// Deduce output facts from input facts.
    fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>>;

    /// Stateless ops can be evaluated from their inputs only, and are
    /// candidates to constant folding.
    fn is_stateless(&self) -> bool {
        true
    }

    fn eval(&self, _inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        bail!(GraphError::UnsupportedOp(format!("{} can not be evaluated on its own", self.name())))
    }
}

/// The closed set of operations a graph node can carry.
///
/// `Custom` is the extension point for operations defined outside this
/// crate.
#[derive(Clone, Debug)]
pub enum OpKind {
    Parameter(Parameter),
    Result(ResultOp),
    Const(Const),
    ElementWise(ElementWiseOp),
    Binary(BinaryOp),
    Reshape(Reshape),
    ShapeOf(ShapeOf),
    Squeeze(Squeeze),
    Unsqueeze(Unsqueeze),
    Concat(Concat),
    Slice(Slice),
    Convert(Convert),
    ReadValue(ReadValue),
    Assign(Assign),
    TensorIterator(Box<TensorIterator>),
    Custom(Box<dyn CustomOp>),
}

impl OpKind {
    pub fn custom(op: impl CustomOp + 'static) -> OpKind {
        OpKind::Custom(Box::new(op))
    }

    pub fn as_op(&self) -> &dyn TypedOp {
        match self {
            OpKind::Parameter(op) => op,
            OpKind::Result(op) => op,
            OpKind::Const(op) => op,
            OpKind::ElementWise(op) => op,
            OpKind::Binary(op) => op,
            OpKind::Reshape(op) => op,
            OpKind::ShapeOf(op) => op,
            OpKind::Squeeze(op) => op,
            OpKind::Unsqueeze(op) => op,
            OpKind::Concat(op) => op,
            OpKind::Slice(op) => op,
            OpKind::Convert(op) => op,
            OpKind::ReadValue(op) => op,
            OpKind::Assign(op) => op,
            OpKind::TensorIterator(op) => &**op,
            OpKind::Custom(op) => op,
        }
    }

    pub fn name(&self) -> Cow<'_, str> {
        self.as_op().name()
    }

    pub fn info(&self) -> Vec<String> {
        self.as_op().info()
    }

    pub fn output_facts(&self, inputs: &[&TypedFact]) -> GraftResult<TVec<TypedFact>> {
        self.as_op().output_facts(inputs)
    }

    pub fn is_stateless(&self) -> bool {
        self.as_op().is_stateless()
    }

    pub fn eval(&self, inputs: TVec<Arc<Tensor>>) -> GraftResult<TVec<Arc<Tensor>>> {
        self.as_op().eval(inputs)
    }

    pub fn as_tensor_iterator(&self) -> Option<&TensorIterator> {
        if let OpKind::TensorIterator(ti) = self {
            Some(ti)
        } else {
            None
        }
    }

    /// Same operation with the same attributes, sub-graphs included.
    pub fn same_as(&self, other: &OpKind) -> GraftResult<bool> {
        use OpKind::*;
        Ok(match (self, other) {
            (Parameter(a), Parameter(b)) => a.fact.same_type_and_shape(&b.fact),
            (Result(_), Result(_)) => true,
            (Const(a), Const(b)) => a == b,
            (ElementWise(a), ElementWise(b)) => a == b,
            (Binary(a), Binary(b)) => a == b,
            (Reshape(a), Reshape(b)) => a == b,
            (ShapeOf(a), ShapeOf(b)) => a == b,
            (Squeeze(a), Squeeze(b)) => a == b,
            (Unsqueeze(a), Unsqueeze(b)) => a == b,
            (Concat(a), Concat(b)) => a == b,
            (Slice(a), Slice(b)) => a == b,
            (Convert(a), Convert(b)) => a == b,
            (ReadValue(a), ReadValue(b)) => {
                a.variable_id == b.variable_id && a.fact.same_type_and_shape(&b.fact)
            }
            (Assign(a), Assign(b)) => a == b,
            (TensorIterator(a), TensorIterator(b)) => a.same_as(b)?,
            (Custom(a), Custom(b)) => a.same_as(&**b),
            _ => false,
        })
    }
}

macro_rules! op_kind_from {
    ($($op:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$op> for OpKind {
                fn from(op: $op) -> OpKind {
                    OpKind::$variant(op)
                }
            }
        )*
    }
}

op_kind_from!(
    Parameter => Parameter,
    ResultOp => Result,
    Const => Const,
    ElementWiseOp => ElementWise,
    BinaryOp => Binary,
    Reshape => Reshape,
    ShapeOf => ShapeOf,
    Squeeze => Squeeze,
    Unsqueeze => Unsqueeze,
    Concat => Concat,
    Slice => Slice,
    Convert => Convert,
    ReadValue => ReadValue,
    Assign => Assign,
    Box<dyn CustomOp> => Custom,
);

impl From<TensorIterator> for OpKind {
    fn from(op: TensorIterator) -> OpKind {
        OpKind::TensorIterator(Box::new(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_checks_input_count() {
        let ops: Vec<OpKind> = vec![
            BinaryOp::Add.into(),
            ElementWiseOp::Relu.into(),
            ShapeOf::default().into(),
            Slice::new(0, 0, 1).into(),
            Squeeze::new(None).into(),
            Unsqueeze::new(tvec!(0)).into(),
            Reshape::new(false).into(),
            Convert::new(DatumType::F16).into(),
        ];
        for op in ops {
            let err = op.eval(tvec!()).unwrap_err();
            assert!(
                matches!(GraphError::find(&err), Some(GraphError::InvalidGraph(_))),
                "{}: {err:?}",
                op.name()
            );
        }
        let err = BinaryOp::Mul.eval(tvec!(rctensor1(&[1f32]))).unwrap_err();
        assert!(matches!(GraphError::find(&err), Some(GraphError::InvalidGraph(_))));
    }
}
