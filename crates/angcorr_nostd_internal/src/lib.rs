//! Internal accumulation machinery shared by the `angcorr` crate.
//!
//! Nothing in here touches the sphere directly (that requires
//! transcendental functions, which aren't available without the standard
//! library). This crate only knows about binned reductions: how a datum
//! updates an `accum_state`, how statepacks are laid out and merged, and how
//! a reduction is split into units of work for teams.
#![no_std]
mod bins;
mod misc;
mod parallel;
mod reduce_utils;
mod reducer;
mod state;

pub use bins::{BinEdges, IrregularBinEdges};
pub use misc::squared_diff_norm;
pub use parallel::{
    Executor, ReductionSpec, StandardTeamParam, check_statepack_shape, fill_single_team_statepack,
};
pub use reduce_utils::{merge_full_statepacks, reset_full_statepack};
pub use reducer::{Datum, Mean, OutputDescr, Reducer, WeightedCount};
pub use state::{AccumStateView, AccumStateViewMut, StatePackView, StatePackViewMut};
