// this defines some basic utilities used in reductions.
// it's unclear if we want these things to be part of the public API, but
// every executor backend needs them

use crate::reducer::Reducer;
use crate::state::{StatePackView, StatePackViewMut};

/// initialize every accum_state held by `statepack`
pub fn reset_full_statepack(reducer: &impl Reducer, statepack: &mut StatePackViewMut) {
    for i in 0..statepack.n_states() {
        reducer.init_accum_state(&mut statepack.get_state_mut(i));
    }
}

/// merge each accum_state of `other` into the matching accum_state of
/// `statepack`
pub fn merge_full_statepacks(
    reducer: &impl Reducer,
    statepack: &mut StatePackViewMut,
    other: &StatePackView,
) {
    let n_bins = statepack.n_states();
    assert_eq!(n_bins, other.n_states());
    for i in 0..n_bins {
        reducer.merge(&mut statepack.get_state_mut(i), &other.get_state(i));
    }
}
