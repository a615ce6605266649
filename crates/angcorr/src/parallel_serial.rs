//! Implements the "serial" backend for running thread teams

use angcorr_nostd_internal::{
    Executor, ReductionSpec, StandardTeamParam, StatePackViewMut, check_statepack_shape,
    fill_single_team_statepack, merge_full_statepacks, reset_full_statepack,
};
use ndarray::Array2;
use std::num::NonZeroU32;

/// Drives every team, one after another, on the calling thread.
pub struct SerialExecutor;

impl Executor for SerialExecutor {
    fn drive_reduce(
        &mut self,
        out: &mut StatePackViewMut,
        reduction_spec: &(impl ReductionSpec + Sync),
        n_teams: NonZeroU32,
    ) -> Result<(), &'static str> {
        check_statepack_shape(out, reduction_spec)?;
        let reducer = reduction_spec.get_reducer();
        let team_param = StandardTeamParam {
            n_teams: n_teams.get() as usize,
        };

        // the team statepacks are merged into `out` in exactly the same
        // order as the rayon backend, so both produce bitwise identical
        // results
        let mut team_buf = Array2::<f64>::zeros((out.state_size(), out.n_states()));
        reset_full_statepack(reducer, out);
        for team_id in 0..team_param.n_teams {
            let mut team_statepack = StatePackViewMut::from_array_view(team_buf.view_mut());
            fill_single_team_statepack(&mut team_statepack, team_id, &team_param, reduction_spec);
            merge_full_statepacks(reducer, out, &team_statepack.as_view());
        }
        Ok(())
    }
}
