#[macro_use]
mod macros;

/// A Smallvec instantiation with 4 embeddable values.
///
/// Used about everywhere in graft, for node inputs and outputs, or
/// tensor dimensions.
pub type TVec<T> = smallvec::SmallVec<[T; 4]>;

pub mod prelude {
    pub use crate::datum::{Datum, DatumType, NumDatum};
    pub use crate::tensor::litteral::*;
    pub use crate::tensor::{IntoArcTensor, IntoTensor, Tensor};
    pub use crate::tvec;
    pub use crate::TVec;
    pub use crate::{dispatch_datum, dispatch_floatlike, dispatch_numbers};
    pub use half::f16;
}

pub mod internal {
    pub use crate::prelude::*;
    pub use ndarray as graft_ndarray;
    pub use smallvec as graft_smallvec;
}

pub use anyhow;

mod datum;
mod tensor;
