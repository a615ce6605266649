//! Our parallelism abstractions use the concepts of teams & reductions
//!
//! In general, a parallel reduction is a way of characterizing a certain kind
//! of calculation that can be broken into parts, where each part can be
//! computed simultaneously, and each of the partial results can be combined
//! together into a single result.
//!
//! When we decompose a binned reduction into pieces or "units of work":
//! - the units of work are distributed among 1 or more teams. Each team is
//!   handed a contiguous block of units.
//! - each team fills a private statepack (there is no shared mutable state
//!   between teams, so nothing needs a lock)
//! - once every team is done, the team statepacks are merged into the output
//!   statepack **in team order**.
//!
//! The last point is what makes results reproducible: for a fixed number of
//! teams the floating point operations happen in exactly the same order no
//! matter which backend drives the reduction or how its threads get
//! scheduled.

use crate::reduce_utils::reset_full_statepack;
use crate::reducer::Reducer;
use crate::state::StatePackViewMut;
use core::num::NonZeroU32;

/// This struct holds standardized parameters that describe Team parallelism.
/// Different backends may require extra parameters.
pub struct StandardTeamParam {
    pub n_teams: usize,
}

/// Used for specifying the details of a binned reduction, providing an
/// interface for external code to carry it out (e.g.
/// [`fill_single_team_statepack`]), potentially in parallel.
///
/// At a high-level, types that implement this trait:
///
/// 1. encode details about a _binned reduction_, wherein pairs (of points or
///    of cells) are partitioned into separation bins, with a separate
///    `accum_state` for each bin. The collection of `accum_state`s for each
///    bin is called a `statepack`.
/// 2. have access to the data-source used in the binned reduction
/// 3. know how to decompose the overall reduction into _units of work_. A
///    unit of work consists of generating and processing a unique subset of
///    pairs (e.g. every pair whose first member lives in a given cell).
pub trait ReductionSpec {
    // An important premise is that you do error-checking while constructing
    // structs, and you design the logic such that you don't have to do **any**
    // error-handling in this trait's methods.
    type ReducerType: Reducer;

    /// return a reference to the reducer
    fn get_reducer(&self) -> &Self::ReducerType;

    /// The number of bins in this reduction.
    fn n_bins(&self) -> usize;

    /// The total number of units of work
    fn n_work_units(&self) -> usize;

    /// Provides the (contiguous) range of work units that the team with
    /// `team_id` is responsible for.
    fn team_loop_bounds(&self, team_id: usize, team_param: &StandardTeamParam) -> (usize, usize) {
        let n_units = self.n_work_units();
        let n_teams = if team_param.n_teams == 0 {
            1
        } else {
            team_param.n_teams
        };
        let per_team = n_units.div_ceil(n_teams);
        let start = (team_id * per_team).min(n_units);
        let stop = (start + per_team).min(n_units);
        (start, stop)
    }

    /// Generates every datum associated with `work_unit` and uses each one
    /// to update the appropriate accum_state in `binned_statepack`
    fn add_contributions(&self, binned_statepack: &mut StatePackViewMut, work_unit: usize);
}

/// Initialize and fill a single Team's `statepack`.
///
/// The statepack is reset, then every unit of work in the team's block is
/// processed in ascending order.
pub fn fill_single_team_statepack(
    binned_statepack: &mut StatePackViewMut,
    team_id: usize,
    team_param: &StandardTeamParam,
    reduce_spec: &impl ReductionSpec,
) {
    reset_full_statepack(reduce_spec.get_reducer(), binned_statepack);

    let (start, stop) = reduce_spec.team_loop_bounds(team_id, team_param);
    for work_unit in start..stop {
        reduce_spec.add_contributions(binned_statepack, work_unit);
    }
}

/// a trait for expressing how to launch a reduction
///
/// We implement this for each parallelism "backend," so we have a uniform
/// interface for easily switching between backends.
pub trait Executor {
    /// Drive `reduction_spec` with `n_teams` teams and store the merged
    /// result in `out`. `out` must have the shape
    /// `(reducer.accum_state_size(), reduction_spec.n_bins())`.
    fn drive_reduce(
        &mut self,
        out: &mut StatePackViewMut,
        reduction_spec: &(impl ReductionSpec + Sync),
        n_teams: NonZeroU32,
    ) -> Result<(), &'static str>;
}

/// Checks that `out` is shaped appropriately for `reduction_spec`
pub fn check_statepack_shape(
    out: &StatePackViewMut,
    reduction_spec: &impl ReductionSpec,
) -> Result<(), &'static str> {
    if out.state_size() != reduction_spec.get_reducer().accum_state_size() {
        Err("the out argument doesn't have the correct accum_state size!")
    } else if out.n_states() != reduction_spec.n_bins() {
        Err("the out argument doesn't have one accum_state per bin!")
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blocks(usize);

    impl ReductionSpec for Blocks {
        type ReducerType = crate::reducer::Mean;

        fn get_reducer(&self) -> &Self::ReducerType {
            &crate::reducer::Mean
        }

        fn n_bins(&self) -> usize {
            1
        }

        fn n_work_units(&self) -> usize {
            self.0
        }

        fn add_contributions(&self, _: &mut StatePackViewMut, _: usize) {}
    }

    #[test]
    fn team_blocks_cover_every_unit_once() {
        for n_units in [0_usize, 1, 7, 64, 101] {
            for n_teams in [1_usize, 2, 3, 8, 200] {
                let spec = Blocks(n_units);
                let param = StandardTeamParam { n_teams };
                let mut expected_start = 0;
                for team_id in 0..n_teams {
                    let (start, stop) = spec.team_loop_bounds(team_id, &param);
                    assert!(start <= stop);
                    assert_eq!(start, expected_start.min(n_units));
                    expected_start = stop;
                }
                assert_eq!(expected_start, n_units);
            }
        }
    }
}
