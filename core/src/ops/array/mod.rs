//! Shape manipulation ops.
use crate::errors::invalid;
use crate::internal::*;

mod concat;
mod reshape;
mod shape_of;
mod slice;
mod squeeze;

pub use self::concat::Concat;
pub use self::reshape::Reshape;
pub use self::shape_of::ShapeOf;
pub use self::slice::Slice;
pub use self::squeeze::{Squeeze, Unsqueeze};

/// Resolves a possibly negative axis against a rank.
pub(crate) fn resolve_axis(axis: i64, rank: usize) -> GraftResult<usize> {
    let resolved = if axis < 0 { axis + rank as i64 } else { axis };
    if resolved < 0 || resolved >= rank as i64 {
        bail!(invalid(format!("Axis {axis} out of range for rank {rank}")))
    }
    Ok(resolved as usize)
}
