//! Define basic accumulator machinery (that doesn't require the standard lib)
//!
//! # Accumulation Machinery
//!
//! Every estimator in this package is built upon the concept of accumulation.
//! We compute binned statistics for a stream of values, where each element
//! of the stream is `𝒗ᵢ = [xᵢ, yᵢ, wᵢ]`:
//! - `xᵢ` is used for binning (for us, always the separation of a pair of
//!   points or a pair of cells on the sphere)
//! - `yᵢ` is the quantity that contributes to the statistic
//! - `wᵢ` is the weighting applied to `yᵢ`.
//!
//! In practice, we use [`Datum`] to package together `yᵢ` & `wᵢ`.
//!
//! The binning is taken care of separately. The accumulation machinery is
//! responsible for computing the statistic within a single bin. We draw a
//! distinction between the current state of an accumulator and the actual
//! accumulation logic:
//! - We refer to the current state of a single accumulator as the
//!   `accum_state`.
//! - The accumulation logic is encapsulated by the functions implemented by
//!   the [`Reducer`] trait. A Reducer implements logic for modifying a
//!   single `accum_state` at a time.
//!
//! External code manages each bin's `accum_state`; a collection of them is
//! usually managed by a [`StatePackViewMut`](crate::StatePackViewMut).

use crate::state::{AccumStateView, AccumStateViewMut};
use ndarray::ArrayViewMut1;

/// Instances of this element are consumed by the Reducer
///
/// I don't love that this defines copy, but it's convenient when a datum is
/// built once and handed to several reducers.
#[derive(Clone, Copy, Debug)]
pub struct Datum {
    pub value: f64,
    pub weight: f64,
}

/// describes the output components from a single Reducer accum_state
pub enum OutputDescr {
    /// one named scalar per component
    MultiScalarComp(&'static [&'static str]),
}

impl OutputDescr {
    /// the number of components to allocate per component
    pub fn n_per_accum_state(&self) -> usize {
        match self {
            Self::MultiScalarComp(names) => names.len(),
        }
    }
}

/// Reducers generally operate on individual `accum_state`s.
pub trait Reducer {
    /// the number of f64 elements needed to track the accumulator data
    fn accum_state_size(&self) -> usize;

    /// initializes the storage tracking the acumulator's state.
    ///
    /// You need to call this function before you start working with the
    /// storage. You can also use this to reset the accumulator's state since
    /// it blindly overwrites any existing values.
    fn init_accum_state(&self, accum_state: &mut AccumStateViewMut);

    /// consume the value and weight to update the accum_state
    fn consume(&self, accum_state: &mut AccumStateViewMut, datum: &Datum);

    /// merge the state information tracked by `accum_state` and `other`, and
    /// update `accum_state` accordingly
    fn merge(&self, accum_state: &mut AccumStateViewMut, other: &AccumStateView);

    /// extract all output-values from a single accum_state. Expects `value` to
    /// have the shape given by `[self.output_descr().n_per_accum_state()]`
    fn value_from_accum_state(&self, value: &mut ArrayViewMut1<f64>, accum_state: &AccumStateView);

    /// Describes the outputs produced from a single accum_state
    fn output_descr(&self) -> OutputDescr;
}

/// Weighted mean of the consumed values.
///
/// The pixel estimator feeds this the normalized density product of each
/// cell pair, weighted by the product of the cells' coverage. The `weight`
/// register then holds the expected (uniform-density) cross term and the
/// `total` register the observed one.
#[derive(Clone, Copy)]
pub struct Mean;

impl Mean {
    pub const TOTAL: usize = 0;
    pub const WEIGHT: usize = 1;

    const VALUE_MEAN: usize = 0;
    const VALUE_WEIGHT: usize = 1;
    const OUTPUT_COMPONENTS: &'static [&'static str] = &["mean", "weight"];
}

impl Reducer for Mean {
    fn accum_state_size(&self) -> usize {
        2_usize
    }

    fn init_accum_state(&self, accum_state: &mut AccumStateViewMut) {
        accum_state[Mean::TOTAL] = 0.0;
        accum_state[Mean::WEIGHT] = 0.0;
    }

    fn consume(&self, accum_state: &mut AccumStateViewMut, datum: &Datum) {
        accum_state[Mean::WEIGHT] += datum.weight;
        accum_state[Mean::TOTAL] += datum.value * datum.weight;
    }

    fn merge(&self, accum_state: &mut AccumStateViewMut, other: &AccumStateView) {
        accum_state[Mean::TOTAL] += other[Mean::TOTAL];
        accum_state[Mean::WEIGHT] += other[Mean::WEIGHT];
    }

    fn output_descr(&self) -> OutputDescr {
        OutputDescr::MultiScalarComp(Mean::OUTPUT_COMPONENTS)
    }

    fn value_from_accum_state(&self, value: &mut ArrayViewMut1<f64>, accum_state: &AccumStateView) {
        value[[Mean::VALUE_MEAN]] = accum_state[Mean::TOTAL] / accum_state[Mean::WEIGHT];
        value[[Mean::VALUE_WEIGHT]] = accum_state[Mean::WEIGHT];
    }
}

/// Weighted pair counting.
///
/// The consumed value is ignored: each datum adds its weight (the product of
/// the two point weights) to the count. The squared weights are tracked so
/// that a Poisson variance can be formed from the same accum_state.
#[derive(Clone, Copy)]
pub struct WeightedCount;

impl WeightedCount {
    pub const WEIGHT: usize = 0;
    pub const WEIGHT_SQ: usize = 1;
    pub const COUNT: usize = 2;

    const OUTPUT_COMPONENTS: &'static [&'static str] = &["weight", "weight_sq", "count"];
}

impl Reducer for WeightedCount {
    fn accum_state_size(&self) -> usize {
        3_usize
    }

    fn init_accum_state(&self, accum_state: &mut AccumStateViewMut) {
        accum_state.fill(0.0);
    }

    #[inline(always)]
    fn consume(&self, accum_state: &mut AccumStateViewMut, datum: &Datum) {
        accum_state[WeightedCount::WEIGHT] += datum.weight;
        accum_state[WeightedCount::WEIGHT_SQ] += datum.weight * datum.weight;
        accum_state[WeightedCount::COUNT] += 1.0;
    }

    fn merge(&self, accum_state: &mut AccumStateViewMut, other: &AccumStateView) {
        accum_state[WeightedCount::WEIGHT] += other[WeightedCount::WEIGHT];
        accum_state[WeightedCount::WEIGHT_SQ] += other[WeightedCount::WEIGHT_SQ];
        accum_state[WeightedCount::COUNT] += other[WeightedCount::COUNT];
    }

    fn output_descr(&self) -> OutputDescr {
        OutputDescr::MultiScalarComp(WeightedCount::OUTPUT_COMPONENTS)
    }

    fn value_from_accum_state(&self, value: &mut ArrayViewMut1<f64>, accum_state: &AccumStateView) {
        for i in 0..3 {
            value[[i]] = accum_state[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn mean_consume_and_merge() {
        let reducer = Mean;
        let mut buf = Array1::<f64>::zeros(2);
        let mut other_buf = Array1::<f64>::zeros(2);
        let mut state = AccumStateViewMut::from_array_view(buf.view_mut());
        let mut other = AccumStateViewMut::from_array_view(other_buf.view_mut());
        reducer.init_accum_state(&mut state);
        reducer.init_accum_state(&mut other);

        reducer.consume(&mut state, &Datum { value: 4.0, weight: 1.0 });
        reducer.consume(&mut state, &Datum { value: 8.0, weight: 1.0 });
        reducer.consume(&mut other, &Datum { value: 1.0, weight: 2.0 });
        reducer.merge(&mut state, &other.as_view());

        let mut out = Array1::<f64>::zeros(2);
        reducer.value_from_accum_state(&mut out.view_mut(), &state.as_view());
        assert_eq!(out[0], 14.0 / 4.0);
        assert_eq!(out[1], 4.0);
    }

    #[test]
    fn weighted_count_tracks_squares() {
        let reducer = WeightedCount;
        let mut buf = Array1::<f64>::zeros(3);
        let mut state = AccumStateViewMut::from_array_view(buf.view_mut());
        reducer.init_accum_state(&mut state);
        reducer.consume(&mut state, &Datum { value: 1.0, weight: 0.5 });
        reducer.consume(&mut state, &Datum { value: 1.0, weight: 2.0 });
        assert_eq!(state[WeightedCount::WEIGHT], 2.5);
        assert_eq!(state[WeightedCount::WEIGHT_SQ], 4.25);
        assert_eq!(state[WeightedCount::COUNT], 2.0);
    }
}
