use super::{IntoArcTensor, IntoTensor, Tensor};
use crate::datum::Datum;
use ndarray::*;
use std::sync::Arc;

pub fn tensor0<A: Datum>(x: A) -> Tensor {
    arr0(x).into_tensor()
}

pub fn tensor1<A: Datum>(xs: &[A]) -> Tensor {
    arr1(xs).into_tensor()
}

pub fn tensor2<A: Datum, const N: usize>(xs: &[[A; N]]) -> Tensor {
    arr2(xs).into_tensor()
}

pub fn tensor3<A: Datum, const N: usize, const M: usize>(xs: &[[[A; M]; N]]) -> Tensor {
    arr3(xs).into_tensor()
}

pub fn rctensor0<A: Datum>(x: A) -> Arc<Tensor> {
    tensor0(x).into_arc_tensor()
}

pub fn rctensor1<A: Datum>(xs: &[A]) -> Arc<Tensor> {
    tensor1(xs).into_arc_tensor()
}

pub fn rctensor2<A: Datum, const N: usize>(xs: &[[A; N]]) -> Arc<Tensor> {
    tensor2(xs).into_arc_tensor()
}
