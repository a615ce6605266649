//! Implements types to represent "bin edges" used for separation binning of
//! accumulators. The [`BinEdges`] trait provides a common interface that is
//! implemented by [`IrregularBinEdges`].
//!
//! Angular bins are log-spaced, so the edges are always irregular. Callers
//! bin in squared chord length (`|p - q|²` for unit vectors `p` and `q`),
//! which is a monotonic function of the angular separation and avoids a
//! trig call per pair.

/// Super simple. This can be expanded as needed.
pub trait BinEdges {
    /// Calculate the bin index for a given value. Values which are equal to
    /// boundary values are considered part of the higher bin, i.e. intervals
    /// do not include the right edge.
    fn bin_index(&self, value: f64) -> Option<usize>;

    fn n_bins(&self) -> usize;
}

#[derive(Clone, Debug)]
pub struct IrregularBinEdges<'a> {
    bin_edges: &'a [f64],
}

impl<'a> IrregularBinEdges<'a> {
    pub fn new(bin_edges: &'a [f64]) -> Result<IrregularBinEdges<'a>, &'static str> {
        if bin_edges.len() < 2 {
            return Err("A minimum of two bin edges are required");
        }

        if bin_edges.iter().any(|&x| !x.is_finite()) {
            return Err("Bin edges must be finite");
        }

        // Check if bin_edges are in strictly increasing order
        for i in 1..bin_edges.len() {
            if bin_edges[i] <= bin_edges[i - 1] {
                return Err("Bin edges must be in strictly increasing order");
            }
        }

        Ok(IrregularBinEdges { bin_edges })
    }

    pub fn edges(&self) -> &'a [f64] {
        self.bin_edges
    }
}

impl BinEdges for IrregularBinEdges<'_> {
    #[inline]
    fn bin_index(&self, value: f64) -> Option<usize> {
        if value < self.bin_edges[0] || value >= self.bin_edges[self.bin_edges.len() - 1] {
            return None;
        }

        let index = self
            .bin_edges
            // There may be downsides to using total_cmp (perf?)
            .binary_search_by(|probe| probe.total_cmp(&value))
            // Ok is used for an exact match, Err for a lower bound
            .unwrap_or_else(|i| i - 1);

        Some(index)
    }

    fn n_bins(&self) -> usize {
        self.bin_edges.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irregular_bins_invalid_creation() {
        // not enough edges
        assert!(IrregularBinEdges::new(&[0.0]).is_err());

        // unsorted bin edges
        assert!(IrregularBinEdges::new(&[2.0, 1.0]).is_err());
        assert!(IrregularBinEdges::new(&[0.0, 3.0, 2.0]).is_err());

        // Non-finite values
        assert!(IrregularBinEdges::new(&[f64::NAN, 10.0]).is_err());
        assert!(IrregularBinEdges::new(&[0.0, f64::INFINITY]).is_err());
    }

    #[test]
    fn irregular_bins_bin_indexing() {
        let bins = IrregularBinEdges::new(&[1e-6, 1e-5, 1e-4, 1e-3]).unwrap();

        assert_eq!(bins.n_bins(), 3);

        assert_eq!(bins.bin_index(1e-6), Some(0));
        assert_eq!(bins.bin_index(5e-6), Some(0));
        assert_eq!(bins.bin_index(1e-5), Some(1));
        assert_eq!(bins.bin_index(9.9e-5), Some(1));
        assert_eq!(bins.bin_index(1e-4), Some(2));
        assert_eq!(bins.bin_index(5e-4), Some(2));

        // Test boundary conditions
        assert_eq!(bins.bin_index(1e-3), None); // max is exclusive
        assert_eq!(bins.bin_index(0.0), None); // below min
        assert_eq!(bins.bin_index(2e-3), None); // above max
    }
}
