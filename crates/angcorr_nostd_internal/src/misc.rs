use ndarray::ArrayView2;

/// calculate the squared norm of the difference between two (mathematical)
/// vectors taken from arrays that encode a list of vectors with the vector
/// components on the "slow axis"
///
/// For unit vectors this is the squared chord length, `2 - 2cos(θ)`, which
/// we use for binning angular separations. Unlike `1 - cos(θ)`, the
/// difference form keeps full relative precision at milli-degree scales.
#[inline(always)]
pub fn squared_diff_norm(v1: ArrayView2<f64>, v2: ArrayView2<f64>, i1: usize, i2: usize) -> f64 {
    let mut sum = 0.0;
    for k in 0..v1.shape()[0] {
        let diff = v1[[k, i1]] - v2[[k, i2]];
        sum += diff * diff; // NOTE: .powi can't be used in no_std crates
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squared_diff_norm_simple() {
        #[rustfmt::skip]
        let positions = [
            1.0, 0.0,
            0.0, 1.0,
            0.0, 0.0,
        ];
        let view = ArrayView2::from_shape((3, 2), &positions).unwrap();
        assert_eq!(squared_diff_norm(view, view, 0, 1), 2.0);
        assert_eq!(squared_diff_norm(view, view, 1, 1), 0.0);
    }
}
