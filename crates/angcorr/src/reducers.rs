use std::collections::HashMap;
use std::num::NonZeroU32;

use ndarray::{Array2, ArrayViewMut2, Axis};

use angcorr_nostd_internal::{
    Executor, OutputDescr, ReductionSpec, Reducer, StatePackView, StatePackViewMut,
};

use crate::error::Error;
use crate::parallel_rayon::RayonExecutor;
use crate::parallel_serial::SerialExecutor;

/// How the estimators drive their reductions.
#[derive(Clone, Copy, Debug)]
pub struct Execution {
    /// The number of teams the units of work are split between. Results are
    /// reproducible bit-for-bit for a fixed value.
    pub n_teams: NonZeroU32,
    /// Use [`RayonExecutor`] instead of [`SerialExecutor`]
    pub parallel: bool,
}

impl Execution {
    /// Carry out `reduction_spec` and return the resulting statepack, with
    /// shape `(accum_state_size, n_bins)`.
    pub fn reduce(&self, reduction_spec: &(impl ReductionSpec + Sync)) -> Result<Array2<f64>, Error> {
        let reducer = reduction_spec.get_reducer();
        let mut statepack =
            Array2::<f64>::zeros((reducer.accum_state_size(), reduction_spec.n_bins()));
        let mut out = StatePackViewMut::from_array_view(statepack.view_mut());
        let result = if self.parallel {
            RayonExecutor.drive_reduce(&mut out, reduction_spec, self.n_teams)
        } else {
            SerialExecutor.drive_reduce(&mut out, reduction_spec, self.n_teams)
        };
        result.map_err(Error::internal)?;
        Ok(statepack)
    }
}

/// compute the output quantities from each accum_state in a statepack and
/// return the result in a HashMap keyed by the reducer's component names.
pub fn get_output(
    reducer: &impl Reducer,
    statepack: &StatePackView,
) -> HashMap<&'static str, Vec<f64>> {
    let description = reducer.output_descr();
    let n_bins = statepack.n_states();
    let n_comps = description.n_per_accum_state();

    let mut buffer = Array2::<f64>::zeros((n_comps, n_bins));
    let mut buffer_view: ArrayViewMut2<f64> = buffer.view_mut();
    for i in 0..n_bins {
        reducer.value_from_accum_state(
            &mut buffer_view.index_axis_mut(Axis(1), i),
            &statepack.get_state(i),
        );
    }

    let OutputDescr::MultiScalarComp(names) = description;
    names
        .iter()
        .copied()
        .zip(buffer.rows().into_iter().map(|row| row.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use angcorr_nostd_internal::{Datum, WeightedCount};

    #[test]
    fn outputs_are_keyed_by_component() {
        let reducer = WeightedCount;
        let mut statepack = Array2::<f64>::zeros((reducer.accum_state_size(), 2));
        let mut view = StatePackViewMut::from_array_view(statepack.view_mut());
        for weight in [0.5, 2.0] {
            reducer.consume(&mut view.get_state_mut(1), &Datum { value: 1.0, weight });
        }

        let output = get_output(&reducer, &StatePackView::from_array_view(statepack.view()));
        assert_eq!(output.len(), 3);
        assert_eq!(output["weight"], vec![0.0, 2.5]);
        assert_eq!(output["weight_sq"], vec![0.0, 4.25]);
        assert_eq!(output["count"], vec![0.0, 2.0]);
    }
}
