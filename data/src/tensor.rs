//! `Tensor`, graft main data object of interest.
use crate::datum::{Datum, DatumType};
use byteorder::{ByteOrder, LittleEndian};
use half::f16;
use itertools::Itertools;
use ndarray::prelude::*;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

pub mod litteral;

#[doc(hidden)]
#[derive(Clone, PartialEq)]
pub enum Storage {
    Bool(ArrayD<bool>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    F16(ArrayD<f16>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

macro_rules! with_storage {
    ($s: expr, $a: ident => $e: expr) => {
        match $s {
            Storage::Bool($a) => $e,
            Storage::I32($a) => $e,
            Storage::I64($a) => $e,
            Storage::F16($a) => $e,
            Storage::F32($a) => $e,
            Storage::F64($a) => $e,
        }
    };
}

macro_rules! map_storage {
    ($s: expr, $a: ident => $e: expr) => {
        match $s {
            Storage::Bool($a) => Storage::Bool($e),
            Storage::I32($a) => Storage::I32($e),
            Storage::I64($a) => Storage::I64($e),
            Storage::F16($a) => Storage::F16($e),
            Storage::F32($a) => Storage::F32($e),
            Storage::F64($a) => Storage::F64($e),
        }
    };
}

/// Tensor is a concrete, dense, n-dimensional value.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    storage: Storage,
}

impl Default for Tensor {
    fn default() -> Tensor {
        litteral::tensor0(0f32)
    }
}

impl Tensor {
    /// Tensor of zeros (`false` for booleans).
    pub fn zero<T: Datum>(shape: &[usize]) -> Tensor {
        ArrayD::<T>::default(IxDyn(shape)).into_tensor()
    }

    pub fn zero_dt(dt: DatumType, shape: &[usize]) -> Tensor {
        fn zero_t<T: Datum>(shape: &[usize]) -> Tensor {
            Tensor::zero::<T>(shape)
        }
        dispatch_datum!(zero_t(dt)(shape))
    }

    /// Build a tensor from a shape and data in row-major order.
    pub fn from_shape<T: Datum>(shape: &[usize], data: &[T]) -> anyhow::Result<Tensor> {
        Ok(ArrayD::from_shape_vec(IxDyn(shape), data.to_vec())?.into_tensor())
    }

    pub fn datum_type(&self) -> DatumType {
        match &self.storage {
            Storage::Bool(_) => DatumType::Bool,
            Storage::I32(_) => DatumType::I32,
            Storage::I64(_) => DatumType::I64,
            Storage::F16(_) => DatumType::F16,
            Storage::F32(_) => DatumType::F32,
            Storage::F64(_) => DatumType::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_storage!(&self.storage, a => a.shape())
    }

    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn access_error<D: Datum>(&self) -> anyhow::Error {
        anyhow::format_err!(
            "Tensor datum type error: tensor is {:?}, accessed as {:?}",
            self.datum_type(),
            D::datum_type(),
        )
    }

    /// Borrow the data as a `ndarray::ArrayView`.
    pub fn to_array_view<D: Datum>(&self) -> anyhow::Result<ArrayViewD<'_, D>> {
        D::storage_ref(&self.storage).map(|a| a.view()).ok_or_else(|| self.access_error::<D>())
    }

    /// Transform the tensor into a `ndarray::Array`.
    pub fn into_array<D: Datum>(self) -> anyhow::Result<ArrayD<D>> {
        let error = self.access_error::<D>();
        D::storage_take(self.storage).map_err(|_| error)
    }

    /// Copy the elements out, in row-major order.
    pub fn to_vec<D: Datum>(&self) -> anyhow::Result<Vec<D>> {
        Ok(self.to_array_view::<D>()?.iter().copied().collect())
    }

    /// Access the single value of a tensor with one element.
    pub fn to_scalar<D: Datum>(&self) -> anyhow::Result<D> {
        let view = self.to_array_view::<D>()?;
        anyhow::ensure!(view.len() == 1, "to_scalar called on a tensor of shape {:?}", self.shape());
        view.iter().next().copied().ok_or_else(|| anyhow::format_err!("empty tensor"))
    }

    /// Reshape, keeping the row-major element order.
    pub fn into_shape(self, shape: &[usize]) -> anyhow::Result<Tensor> {
        anyhow::ensure!(
            shape.iter().product::<usize>() == self.len(),
            "Can not reshape {:?} to {:?}",
            self.shape(),
            shape
        );
        let storage = map_storage!(self.storage, a => {
            let data = a.iter().cloned().collect::<Vec<_>>();
            ArrayD::from_shape_vec(IxDyn(shape), data)?
        });
        Ok(Tensor { storage })
    }

    /// Extract the `start..end` range along `axis`.
    pub fn slice(&self, axis: usize, start: usize, end: usize) -> anyhow::Result<Tensor> {
        anyhow::ensure!(axis < self.rank(), "Invalid axis {} for shape {:?}", axis, self.shape());
        anyhow::ensure!(
            start <= end && end <= self.shape()[axis],
            "Invalid range {}..{} for axis {} of shape {:?}",
            start,
            end,
            axis,
            self.shape()
        );
        let storage = map_storage!(&self.storage, a => {
            a.slice_axis(Axis(axis), ndarray::Slice::from(start..end)).to_owned()
        });
        Ok(Tensor { storage })
    }

    /// Concatenate tensors of the same type along `axis`.
    pub fn concat(axis: usize, tensors: &[&Tensor]) -> anyhow::Result<Tensor> {
        fn concat_t<T: Datum>(axis: usize, tensors: &[&Tensor]) -> anyhow::Result<Tensor> {
            let views =
                tensors.iter().map(|t| t.to_array_view::<T>()).collect::<anyhow::Result<Vec<_>>>()?;
            Ok(ndarray::concatenate(Axis(axis), &views)?.into_tensor())
        }
        anyhow::ensure!(!tensors.is_empty(), "Concatenating zero tensors");
        let dt = tensors[0].datum_type();
        dispatch_datum!(concat_t(dt)(axis, tensors))
    }

    fn floats(&self) -> ArrayD<f64> {
        match &self.storage {
            Storage::Bool(a) => a.mapv(|x| if x { 1.0 } else { 0.0 }),
            Storage::I32(a) => a.mapv(|x| x as f64),
            Storage::I64(a) => a.mapv(|x| x as f64),
            Storage::F16(a) => a.mapv(|x| x.to_f64()),
            Storage::F32(a) => a.mapv(|x| x as f64),
            Storage::F64(a) => a.clone(),
        }
    }

    fn integers(&self) -> ArrayD<i64> {
        match &self.storage {
            Storage::Bool(a) => a.mapv(|x| x as i64),
            Storage::I32(a) => a.mapv(|x| x as i64),
            Storage::I64(a) => a.clone(),
            Storage::F16(a) => a.mapv(|x| x.to_f64() as i64),
            Storage::F32(a) => a.mapv(|x| x as i64),
            Storage::F64(a) => a.mapv(|x| x as i64),
        }
    }

    pub fn cast_to<D: Datum>(&self) -> anyhow::Result<Cow<'_, Tensor>> {
        self.cast_to_dt(D::datum_type())
    }

    /// Element type conversion.
    ///
    /// Conversion to f16 rounds to nearest, ties to even, and saturates to infinity past the
    /// f16 range. Float to integer conversion truncates toward zero.
    pub fn cast_to_dt(&self, dt: DatumType) -> anyhow::Result<Cow<'_, Tensor>> {
        if self.datum_type() == dt {
            return Ok(Cow::Borrowed(self));
        }
        let from_float = self.datum_type().is_float();
        let storage = match dt {
            DatumType::Bool if from_float => Storage::Bool(self.floats().mapv(|x| x != 0.0)),
            DatumType::Bool => Storage::Bool(self.integers().mapv(|x| x != 0)),
            DatumType::I32 => Storage::I32(self.integers().mapv(|x| x as i32)),
            DatumType::I64 => Storage::I64(self.integers()),
            DatumType::F16 => match &self.storage {
                Storage::F32(a) => Storage::F16(a.mapv(f16::from_f32)),
                _ => Storage::F16(self.floats().mapv(f16::from_f64)),
            },
            DatumType::F32 => match &self.storage {
                Storage::F16(a) => Storage::F32(a.mapv(|x| x.to_f32())),
                _ => Storage::F32(self.floats().mapv(|x| x as f32)),
            },
            DatumType::F64 => Storage::F64(self.floats()),
        };
        Ok(Cow::Owned(Tensor { storage }))
    }

    /// Raw little-endian representation, row-major, booleans as one byte.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.len() * self.datum_type().size_of()];
        match &self.storage {
            Storage::Bool(a) => {
                bytes.iter_mut().zip(a.iter()).for_each(|(byte, b)| *byte = *b as u8)
            }
            Storage::I32(a) => {
                LittleEndian::write_i32_into(&a.iter().copied().collect_vec(), &mut bytes)
            }
            Storage::I64(a) => {
                LittleEndian::write_i64_into(&a.iter().copied().collect_vec(), &mut bytes)
            }
            Storage::F16(a) => LittleEndian::write_u16_into(
                &a.iter().map(|x| x.to_bits()).collect_vec(),
                &mut bytes,
            ),
            Storage::F32(a) => {
                LittleEndian::write_f32_into(&a.iter().copied().collect_vec(), &mut bytes)
            }
            Storage::F64(a) => {
                LittleEndian::write_f64_into(&a.iter().copied().collect_vec(), &mut bytes)
            }
        }
        bytes
    }

    /// Inverse of `to_le_bytes`.
    pub fn from_le_bytes(dt: DatumType, shape: &[usize], bytes: &[u8]) -> anyhow::Result<Tensor> {
        let len = shape.iter().product::<usize>();
        anyhow::ensure!(
            bytes.len() == len * dt.size_of(),
            "Expected {} bytes for a {:?} tensor of shape {:?}, got {}",
            len * dt.size_of(),
            dt,
            shape,
            bytes.len()
        );
        let shape = IxDyn(shape);
        let storage = match dt {
            DatumType::Bool => {
                Storage::Bool(ArrayD::from_shape_vec(shape, bytes.iter().map(|b| *b != 0).collect())?)
            }
            DatumType::I32 => {
                let mut data = vec![0i32; len];
                LittleEndian::read_i32_into(bytes, &mut data);
                Storage::I32(ArrayD::from_shape_vec(shape, data)?)
            }
            DatumType::I64 => {
                let mut data = vec![0i64; len];
                LittleEndian::read_i64_into(bytes, &mut data);
                Storage::I64(ArrayD::from_shape_vec(shape, data)?)
            }
            DatumType::F16 => {
                let mut data = vec![0u16; len];
                LittleEndian::read_u16_into(bytes, &mut data);
                Storage::F16(ArrayD::from_shape_vec(
                    shape,
                    data.into_iter().map(f16::from_bits).collect(),
                )?)
            }
            DatumType::F32 => {
                let mut data = vec![0f32; len];
                LittleEndian::read_f32_into(bytes, &mut data);
                Storage::F32(ArrayD::from_shape_vec(shape, data)?)
            }
            DatumType::F64 => {
                let mut data = vec![0f64; len];
                LittleEndian::read_f64_into(bytes, &mut data);
                Storage::F64(ArrayD::from_shape_vec(shape, data)?)
            }
        };
        Ok(Tensor { storage })
    }

    /// Compare two tensors, allowing for rounding errors.
    pub fn close_enough(&self, other: &Self, approx: bool) -> anyhow::Result<()> {
        if self.shape() != other.shape() {
            anyhow::bail!("Shape mismatch {:?} != {:?}", self.shape(), other.shape())
        }
        if approx {
            let atol = 5e-4;
            let rtol = 1e-4;
            let ma = self.floats();
            let mb = other.floats();
            ndarray::indices_of(&ma).into_iter().try_for_each(|indices| {
                let a = ma[&indices];
                let b = mb[&indices];
                if !((a.is_nan() && b.is_nan())
                    || (a.is_infinite() && b.is_infinite() && a.signum() == b.signum())
                    || (a - b).abs() <= atol + rtol * b.abs())
                {
                    anyhow::bail!("Mismatch at {:?} {} != {}", indices.slice(), a, b)
                }
                Ok(())
            })
        } else if self == other {
            Ok(())
        } else {
            anyhow::bail!("Mismatch between {:?} and {:?}", self, other)
        }
    }

    /// Dump the tensor in a human readable form.
    ///
    /// `force_full` will force the tensor to be dump in full even if it is big.
    pub fn dump(&self, force_full: bool) -> String {
        let trunc = self.len() > 12 && !force_full;
        let n = if trunc { 12 } else { self.len() };
        let data = with_storage!(&self.storage, a => a.iter().take(n).join(", "));
        format!(
            "{},{:?} {}{}",
            self.shape().iter().join(","),
            self.datum_type(),
            data,
            if trunc { "..." } else { "" }
        )
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "{}", self.dump(false))
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "{}", self.dump(false))
    }
}

pub trait IntoTensor: Sized {
    fn into_tensor(self) -> Tensor;
}

pub trait IntoArcTensor: Sized {
    fn into_arc_tensor(self) -> Arc<Tensor>;
}

impl<D: Datum, S: Dimension> IntoTensor for Array<D, S> {
    fn into_tensor(self) -> Tensor {
        Tensor { storage: D::into_storage(self.into_dyn()) }
    }
}

impl IntoTensor for Tensor {
    fn into_tensor(self) -> Tensor {
        self
    }
}

impl IntoTensor for Arc<Tensor> {
    fn into_tensor(self) -> Tensor {
        Arc::try_unwrap(self).unwrap_or_else(|t| (*t).clone())
    }
}

impl<T: IntoTensor> IntoArcTensor for T {
    fn into_arc_tensor(self) -> Arc<Tensor> {
        Arc::new(self.into_tensor())
    }
}

impl<D: Datum, S: Dimension> From<Array<D, S>> for Tensor {
    fn from(it: Array<D, S>) -> Tensor {
        it.into_tensor()
    }
}

#[cfg(test)]
mod tests {
    use super::litteral::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn cast_f32_to_f16_rounds_and_saturates() {
        let t = tensor1(&[1.0f32, 0.1, 65504.0, 65520.0, -1e6, 1e-8]);
        let h = t.cast_to::<f16>().unwrap();
        let h = h.to_vec::<f16>().unwrap();
        assert_eq!(h[0], f16::ONE);
        assert_eq!(h[1], f16::from_f32(0.1));
        assert_eq!(h[2], f16::MAX);
        assert!(h[3].is_infinite() && h[3].is_sign_positive());
        assert!(h[4].is_infinite() && h[4].is_sign_negative());
        assert_eq!(h[5], f16::ZERO);
    }

    #[test]
    fn cast_float_to_int_truncates() {
        let t = tensor1(&[1.7f32, -1.7, 3.0]);
        assert_eq!(t.cast_to::<i64>().unwrap().to_vec::<i64>().unwrap(), vec![1, -1, 3]);
        assert_eq!(
            t.cast_to::<bool>().unwrap().to_vec::<bool>().unwrap(),
            vec![true, true, true]
        );
    }

    #[test]
    fn bytes_are_little_endian() {
        let t = tensor1(&[1i32, 256]);
        assert_eq!(t.to_le_bytes(), vec![1, 0, 0, 0, 0, 1, 0, 0]);
        let back = Tensor::from_le_bytes(DatumType::I32, &[2], &t.to_le_bytes()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn from_bytes_checks_length() {
        assert!(Tensor::from_le_bytes(DatumType::F32, &[2, 2], &[0u8; 15]).is_err());
    }

    #[test]
    fn slice_and_concat() {
        let t = Tensor::from_shape(&[4, 2], &[0f32, 1., 2., 3., 4., 5., 6., 7.]).unwrap();
        let a = t.slice(0, 0, 2).unwrap();
        let b = t.slice(0, 2, 4).unwrap();
        assert_eq!(a.shape(), &[2, 2]);
        assert_eq!(b.to_vec::<f32>().unwrap(), vec![4., 5., 6., 7.]);
        assert_eq!(Tensor::concat(0, &[&a, &b]).unwrap(), t);
        assert!(t.slice(0, 3, 5).is_err());
    }

    #[test]
    fn reshape_keeps_order() {
        let t = tensor2(&[[1i64, 2, 3], [4, 5, 6]]);
        let r = t.clone().into_shape(&[3, 2]).unwrap();
        assert_eq!(r.to_vec::<i64>().unwrap(), t.to_vec::<i64>().unwrap());
        assert!(t.into_shape(&[4]).is_err());
    }

    #[test]
    fn wrong_type_access_fails() {
        let t = tensor0(1f32);
        assert!(t.to_array_view::<i32>().is_err());
        assert_eq!(t.to_scalar::<f32>().unwrap(), 1.0);
    }

    proptest! {
        #[test]
        fn f16_cast_matches_half(x in proptest::num::f32::ANY) {
            let h = tensor0(x).cast_to::<f16>().unwrap().to_scalar::<f16>().unwrap();
            let expected = f16::from_f32(x);
            prop_assert!(h.to_bits() == expected.to_bits() || (h.is_nan() && expected.is_nan()));
        }

        #[test]
        fn bytes_round_trip(data in proptest::collection::vec(-1e6f32..1e6, 0..32)) {
            let t = tensor1(&data);
            let back = Tensor::from_le_bytes(DatumType::F32, &[data.len()], &t.to_le_bytes()).unwrap();
            prop_assert_eq!(back, t);
        }
    }
}
