//! Static type information attached to tensors flowing in a graph.
use crate::errors::shape_mismatch;
use crate::internal::*;

/// A tensor dimension, either known at graph construction or not.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Dim {
    Fixed(usize),
    Dynamic,
}

impl Dim {
    pub fn to_usize(&self) -> Option<usize> {
        match self {
            Dim::Fixed(d) => Some(*d),
            Dim::Dynamic => None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Dim::Fixed(_))
    }

    /// Whether two dimensions can describe the same runtime extent.
    pub fn compatible_with(&self, other: &Dim) -> bool {
        match (self, other) {
            (Dim::Fixed(a), Dim::Fixed(b)) => a == b,
            _ => true,
        }
    }
}

impl From<usize> for Dim {
    fn from(d: usize) -> Dim {
        Dim::Fixed(d)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dim::Fixed(d) => write!(fmt, "{d}"),
            Dim::Dynamic => write!(fmt, "?"),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct ShapeFact(TVec<Dim>);

impl ShapeFact {
    pub fn scalar() -> ShapeFact {
        ShapeFact(tvec!())
    }

    pub fn from_dims<D: Into<Dim>>(dims: impl IntoIterator<Item = D>) -> ShapeFact {
        ShapeFact(dims.into_iter().map(|d| d.into()).collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.0
    }

    pub fn set(&mut self, axis: usize, dim: Dim) {
        self.0[axis] = dim
    }

    pub fn is_concrete(&self) -> bool {
        self.0.iter().all(|d| d.is_fixed())
    }

    pub fn as_concrete(&self) -> Option<TVec<usize>> {
        self.0.iter().map(|d| d.to_usize()).collect()
    }

    pub fn volume(&self) -> Option<usize> {
        self.0.iter().map(|d| d.to_usize()).product()
    }

    pub fn compatible_with(&self, other: &ShapeFact) -> bool {
        self.rank() == other.rank()
            && self.0.iter().zip(other.0.iter()).all(|(a, b)| a.compatible_with(b))
    }
}

impl std::ops::Deref for ShapeFact {
    type Target = [Dim];
    fn deref(&self) -> &[Dim] {
        &self.0
    }
}

impl fmt::Debug for ShapeFact {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.0.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(","))
    }
}

impl fmt::Display for ShapeFact {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "[{:?}]", self)
    }
}

/// Fully determined element type, and (maybe partially) determined shape.
///
/// When the tensor value is known at graph construction time, `konst`
/// holds it.
#[derive(Clone, PartialEq)]
pub struct TypedFact {
    pub datum_type: DatumType,
    pub shape: ShapeFact,
    pub konst: Option<Arc<Tensor>>,
}

impl TypedFact {
    pub fn dt_shape<D: Into<Dim>>(
        datum_type: DatumType,
        shape: impl IntoIterator<Item = D>,
    ) -> TypedFact {
        TypedFact { datum_type, shape: ShapeFact::from_dims(shape), konst: None }
    }

    pub fn dt_scalar(datum_type: DatumType) -> TypedFact {
        TypedFact { datum_type, shape: ShapeFact::scalar(), konst: None }
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn without_value(&self) -> TypedFact {
        TypedFact { konst: None, ..self.clone() }
    }

    pub fn with_datum_type(&self, datum_type: DatumType) -> TypedFact {
        TypedFact { datum_type, shape: self.shape.clone(), konst: None }
    }

    /// Same element type and shape, value ignored.
    pub fn same_type_and_shape(&self, other: &TypedFact) -> bool {
        self.datum_type == other.datum_type && self.shape == other.shape
    }

    /// Checks that a runtime tensor can flow where this fact is expected.
    pub fn check_tensor(&self, t: &Tensor) -> GraftResult<()> {
        if t.datum_type() != self.datum_type {
            bail!(shape_mismatch(format!(
                "expected {:?}, got a {:?} tensor",
                self,
                t.datum_type()
            )));
        }
        if t.rank() != self.rank()
            || self.shape.iter().zip(t.shape()).any(|(d, &s)| !d.compatible_with(&Dim::Fixed(s)))
        {
            bail!(shape_mismatch(format!("expected {:?}, got shape {:?}", self, t.shape())));
        }
        Ok(())
    }
}

impl From<Arc<Tensor>> for TypedFact {
    fn from(t: Arc<Tensor>) -> TypedFact {
        TypedFact {
            datum_type: t.datum_type(),
            shape: ShapeFact::from_dims(t.shape().iter().copied()),
            konst: Some(t),
        }
    }
}

impl<'a> From<&'a Tensor> for TypedFact {
    fn from(t: &'a Tensor) -> TypedFact {
        TypedFact::dt_shape(t.datum_type(), t.shape().iter().copied())
    }
}

impl fmt::Debug for TypedFact {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if self.rank() > 0 {
            write!(fmt, "{:?},", self.shape)?;
        }
        write!(fmt, "{}", self.datum_type)?;
        if self.konst.is_some() {
            write!(fmt, " 🟰")?;
        }
        Ok(())
    }
}

pub trait DatumExt {
    fn fact(shape: impl AsRef<[usize]>) -> TypedFact;
    fn scalar_fact() -> TypedFact;
}

impl<T: Datum> DatumExt for T {
    fn fact(shape: impl AsRef<[usize]>) -> TypedFact {
        TypedFact::dt_shape(T::datum_type(), shape.as_ref().iter().copied())
    }

    fn scalar_fact() -> TypedFact {
        TypedFact::dt_scalar(T::datum_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_tensor_accepts_dynamic_dims() {
        let fact = TypedFact::dt_shape(DatumType::F32, [Dim::Dynamic, Dim::Fixed(2)]);
        fact.check_tensor(&Tensor::zero::<f32>(&[7, 2])).unwrap();
        assert!(fact.check_tensor(&Tensor::zero::<f32>(&[7, 3])).is_err());
        assert!(fact.check_tensor(&Tensor::zero::<f16>(&[7, 2])).is_err());
    }

    #[test]
    fn volume() {
        assert_eq!(f32::fact([2, 3]).shape.volume(), Some(6));
        assert_eq!(
            TypedFact::dt_shape(DatumType::F32, [Dim::Dynamic, Dim::Fixed(3)]).shape.volume(),
            None
        );
        assert_eq!(f32::scalar_fact().shape.volume(), Some(1));
    }

    #[test]
    fn debug() {
        assert_eq!(format!("{:?}", TypedFact::dt_shape(DatumType::F32, [Dim::Fixed(1), Dim::Dynamic])), "1,?,f32");
    }
}
