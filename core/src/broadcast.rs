//! N-way tensor broadcast
use crate::errors::shape_mismatch;
use crate::internal::*;

/// Computes a shape, if any, to which all shapes can be broadcasted.
pub fn multi_broadcast(shapes: &[impl AsRef<[usize]>]) -> GraftResult<TVec<usize>> {
    let Some(len) = shapes.iter().map(|shape| shape.as_ref().len()).max() else {
        return Ok(tvec!());
    };
    let mut shape: TVec<usize> = tvec!();
    for i in 0..len {
        let mut wanted_size = 1;
        for shape in shapes {
            let len = shape.as_ref().len();
            let dim = if i < len { shape.as_ref()[len - i - 1] } else { 1 };
            wanted_size = match (wanted_size, dim) {
                (a, b) if a == b => a,
                (1, b) => b,
                (a, 1) => a,
                (a, b) => bail!(shape_mismatch(format!("can not broadcast {a} against {b}"))),
            };
        }
        shape.push(wanted_size)
    }
    shape.reverse();
    Ok(shape)
}

/// Broadcast over possibly dynamic dimensions.
///
/// A dynamic dimension broadcasts to the other side when the latter is
/// known and larger than one, and stays dynamic otherwise.
pub fn multi_broadcast_dims(shapes: &[&[Dim]]) -> GraftResult<ShapeFact> {
    let Some(len) = shapes.iter().map(|shape| shape.len()).max() else {
        return Ok(ShapeFact::scalar());
    };
    let mut shape: TVec<Dim> = tvec!();
    for i in 0..len {
        let mut wanted = Dim::Fixed(1);
        for shape in shapes {
            let dim = if i < shape.len() { shape[shape.len() - i - 1] } else { Dim::Fixed(1) };
            wanted = match (wanted, dim) {
                (a, b) if a == b => a,
                (Dim::Fixed(1), b) => b,
                (a, Dim::Fixed(1)) => a,
                (Dim::Dynamic, Dim::Fixed(b)) | (Dim::Fixed(b), Dim::Dynamic) => Dim::Fixed(b),
                (a, b) => bail!(shape_mismatch(format!("can not broadcast {a} against {b}"))),
            };
        }
        shape.push(wanted)
    }
    shape.reverse();
    Ok(ShapeFact::from_dims(shape))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onnx_1() {
        assert_eq!(multi_broadcast(&[tvec![2, 3, 4, 5], tvec![]]).unwrap(), tvec![2, 3, 4, 5])
    }

    #[test]
    fn onnx_2() {
        assert_eq!(multi_broadcast(&[tvec![2, 3, 4, 5], tvec![5]]).unwrap(), tvec![2, 3, 4, 5])
    }

    #[test]
    fn onnx_4() {
        assert_eq!(
            multi_broadcast(&[tvec![1, 4, 5], tvec![2, 3, 4, 1]]).unwrap(),
            tvec![2, 3, 4, 5]
        )
    }

    #[test]
    fn incompatible() {
        let err = multi_broadcast(&[tvec![3], tvec![4]]).unwrap_err();
        assert!(matches!(GraphError::find(&err), Some(GraphError::ShapeMismatch(_))));
    }

    #[test]
    fn dynamic_dims() {
        let a = [Dim::Dynamic, Dim::Fixed(3)];
        let b = [Dim::Fixed(2), Dim::Fixed(1)];
        let c = [Dim::Fixed(1)];
        assert_eq!(
            multi_broadcast_dims(&[&a, &b]).unwrap(),
            ShapeFact::from_dims([Dim::Fixed(2), Dim::Fixed(3)])
        );
        assert_eq!(
            multi_broadcast_dims(&[&a, &c]).unwrap(),
            ShapeFact::from_dims([Dim::Dynamic, Dim::Fixed(3)])
        );
    }
}
