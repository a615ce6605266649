//! Introduces the view types used to reach into accumulator storage.
//!
//! A "statepack" is the collection of `accum_state`s tracked for every bin of
//! a binned reduction. It is laid out as a 2D array with shape
//! `(accum_state_size, n_states)`: axis 0 holds the registers of a single
//! `accum_state` and axis 1 enumerates the bins.
//!
//! Currently these simply wrap `ndarray` views. There is some benefit to
//! defining them even though they are thin wrappers, since it helps contain
//! all references to the ndarray package to a single file.

use core::ops::{Index, IndexMut};
use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};

/// A read-only view of a single `accum_state`
pub struct AccumStateView<'a> {
    data: ArrayView1<'a, f64>,
}

impl<'a> AccumStateView<'a> {
    pub fn from_array_view(data: ArrayView1<'a, f64>) -> Self {
        Self { data }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Index<usize> for AccumStateView<'_> {
    type Output = f64;

    #[inline(always)]
    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}

/// A mutable view of a single `accum_state`
pub struct AccumStateViewMut<'a> {
    data: ArrayViewMut1<'a, f64>,
}

impl<'a> AccumStateViewMut<'a> {
    pub fn from_array_view(data: ArrayViewMut1<'a, f64>) -> Self {
        Self { data }
    }

    pub fn as_view(&self) -> AccumStateView<'_> {
        AccumStateView {
            data: self.data.view(),
        }
    }

    pub fn fill(&mut self, val: f64) {
        self.data.fill(val);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Index<usize> for AccumStateViewMut<'_> {
    type Output = f64;

    #[inline(always)]
    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<usize> for AccumStateViewMut<'_> {
    #[inline(always)]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// Represents a collection of accumulator states
pub struct StatePackViewMut<'a> {
    data: ArrayViewMut2<'a, f64>,
}

impl<'a> StatePackViewMut<'a> {
    pub fn from_array_view(array_view: ArrayViewMut2<'a, f64>) -> Self {
        Self { data: array_view }
    }

    pub fn get_state(&self, i: usize) -> AccumStateView<'_> {
        AccumStateView::from_array_view(self.data.index_axis(Axis(1), i))
    }

    pub fn get_state_mut(&mut self, i: usize) -> AccumStateViewMut<'_> {
        AccumStateViewMut::from_array_view(self.data.index_axis_mut(Axis(1), i))
    }

    pub fn as_view(&self) -> StatePackView<'_> {
        StatePackView {
            data: self.data.view(),
        }
    }

    pub fn state_size(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn n_states(&self) -> usize {
        self.data.len_of(Axis(1))
    }
}

/// Represents a read-only collection of accumulator states
///
/// This mostly exists so that finished team statepacks can be merged into
/// an output statepack without handing out mutable access.
pub struct StatePackView<'a> {
    data: ArrayView2<'a, f64>,
}

impl<'a> StatePackView<'a> {
    pub fn from_array_view(array_view: ArrayView2<'a, f64>) -> Self {
        Self { data: array_view }
    }

    pub fn get_state(&self, i: usize) -> AccumStateView<'_> {
        AccumStateView::from_array_view(self.data.index_axis(Axis(1), i))
    }

    pub fn state_size(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn n_states(&self) -> usize {
        self.data.len_of(Axis(1))
    }
}
