//! Element types supported by graft tensors.
use crate::tensor::Storage;
use half::f16;
use ndarray::ArrayD;
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum DatumType {
    Bool,
    I32,
    I64,
    F16,
    F32,
    F64,
}

impl DatumType {
    pub fn is_float(&self) -> bool {
        matches!(self, DatumType::F16 | DatumType::F32 | DatumType::F64)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, DatumType::I32 | DatumType::I64)
    }

    pub fn is_number(&self) -> bool {
        self.is_float() || self.is_integer()
    }

    #[inline]
    pub fn size_of(&self) -> usize {
        match self {
            DatumType::Bool => 1,
            DatumType::I32 => 4,
            DatumType::I64 => 8,
            DatumType::F16 => 2,
            DatumType::F32 => 4,
            DatumType::F64 => 8,
        }
    }

    /// Short lowercase name, as used in serialized graphs.
    pub fn name(&self) -> &'static str {
        match self {
            DatumType::Bool => "boolean",
            DatumType::I32 => "i32",
            DatumType::I64 => "i64",
            DatumType::F16 => "f16",
            DatumType::F32 => "f32",
            DatumType::F64 => "f64",
        }
    }
}

impl fmt::Display for DatumType {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.name())
    }
}

impl std::str::FromStr for DatumType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<DatumType> {
        Ok(match s {
            "boolean" | "bool" => DatumType::Bool,
            "i32" => DatumType::I32,
            "i64" => DatumType::I64,
            "f16" => DatumType::F16,
            "f32" => DatumType::F32,
            "f64" => DatumType::F64,
            _ => anyhow::bail!("Unknown element type {:?}", s),
        })
    }
}

/// A scalar type that can live in a `Tensor`.
///
/// The storage accessors are an implementation detail of `Tensor`.
pub trait Datum:
    Clone + Copy + fmt::Debug + fmt::Display + Default + PartialEq + Send + Sync + 'static
{
    fn datum_type() -> DatumType;

    #[doc(hidden)]
    fn into_storage(array: ArrayD<Self>) -> Storage;
    #[doc(hidden)]
    fn storage_ref(storage: &Storage) -> Option<&ArrayD<Self>>;
    #[doc(hidden)]
    fn storage_take(storage: Storage) -> Result<ArrayD<Self>, Storage>;
}

/// Datum types with arithmetic.
pub trait NumDatum: Datum + num_traits::Num + PartialOrd {}

macro_rules! impl_datum {
    ($t: ty, $v: ident) => {
        impl Datum for $t {
            fn datum_type() -> DatumType {
                DatumType::$v
            }

            fn into_storage(array: ArrayD<Self>) -> Storage {
                Storage::$v(array)
            }

            fn storage_ref(storage: &Storage) -> Option<&ArrayD<Self>> {
                if let Storage::$v(it) = storage {
                    Some(it)
                } else {
                    None
                }
            }

            fn storage_take(storage: Storage) -> Result<ArrayD<Self>, Storage> {
                if let Storage::$v(it) = storage {
                    Ok(it)
                } else {
                    Err(storage)
                }
            }
        }
    };
}

impl_datum!(bool, Bool);
impl_datum!(i32, I32);
impl_datum!(i64, I64);
impl_datum!(f16, F16);
impl_datum!(f32, F32);
impl_datum!(f64, F64);

impl NumDatum for i32 {}
impl NumDatum for i64 {}
impl NumDatum for f16 {}
impl NumDatum for f32 {}
impl NumDatum for f64 {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for dt in [
            DatumType::Bool,
            DatumType::I32,
            DatumType::I64,
            DatumType::F16,
            DatumType::F32,
            DatumType::F64,
        ] {
            assert_eq!(dt.name().parse::<DatumType>().unwrap(), dt);
        }
        assert!("f8".parse::<DatumType>().is_err());
    }

    #[test]
    fn sizes() {
        assert_eq!(DatumType::F16.size_of(), 2);
        assert_eq!(f32::datum_type().size_of(), std::mem::size_of::<f32>());
        assert!(DatumType::F16.is_float());
        assert!(!DatumType::I64.is_float());
    }
}
