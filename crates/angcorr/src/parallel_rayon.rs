//! Implements a multi-threaded backend built on rayon

use angcorr_nostd_internal::{
    Executor, ReductionSpec, StandardTeamParam, StatePackView, StatePackViewMut,
    check_statepack_shape, fill_single_team_statepack, merge_full_statepacks,
    reset_full_statepack,
};
use ndarray::Array2;
use rayon::prelude::*;
use std::num::NonZeroU32;

/// Hands each team to rayon's global thread pool.
///
/// Teams never share mutable state. Each team fills a private statepack and
/// the finished statepacks are merged on the calling thread in team order.
/// For a fixed number of teams, the result doesn't depend on the number of
/// threads or on how rayon schedules the teams.
pub struct RayonExecutor;

impl Executor for RayonExecutor {
    fn drive_reduce(
        &mut self,
        out: &mut StatePackViewMut,
        reduction_spec: &(impl ReductionSpec + Sync),
        n_teams: NonZeroU32,
    ) -> Result<(), &'static str> {
        check_statepack_shape(out, reduction_spec)?;
        let shape = (out.state_size(), out.n_states());
        let team_param = StandardTeamParam {
            n_teams: n_teams.get() as usize,
        };

        let team_statepacks: Vec<Array2<f64>> = (0..team_param.n_teams)
            .into_par_iter()
            .map(|team_id| {
                let mut buf = Array2::<f64>::zeros(shape);
                fill_single_team_statepack(
                    &mut StatePackViewMut::from_array_view(buf.view_mut()),
                    team_id,
                    &team_param,
                    reduction_spec,
                );
                buf
            })
            .collect();

        let reducer = reduction_spec.get_reducer();
        reset_full_statepack(reducer, out);
        for buf in &team_statepacks {
            merge_full_statepacks(reducer, out, &StatePackView::from_array_view(buf.view()));
        }
        Ok(())
    }
}
