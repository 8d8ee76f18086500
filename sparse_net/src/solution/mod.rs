//! Compiled execution plans: [`PartialSolution`] units arranged into a [`Solution`] grid.

mod builder;
mod partial;
mod partial_builder;

use serde::{Deserialize, Serialize};

use crate::error::{check_index, Result, SparseNetError};

pub use builder::{SolutionBuilder, SolutionConfig, DEFAULT_DEVICE_MAX_BYTES};
pub use partial::{neuron_cost_bytes, PartialSolution};
pub use partial_builder::PartialSolutionBuilder;

/// A grid of partial solutions. Rows are solved one after another, the columns of
/// a row are independent of each other and only read external inputs or neurons
/// committed by earlier rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// Row major storage of the grid.
    pub partial_solutions: Vec<PartialSolution>,
    /// Number of columns in each row.
    pub cols: Vec<usize>,
    pub neuron_number: usize,
    pub output_neuron_number: usize,
    pub input_data_size: usize,
}

impl Solution {
    pub fn rows(&self) -> usize {
        self.cols.len()
    }

    pub fn cols(&self, row: usize) -> Result<usize> {
        check_index("row", row, self.rows())?;
        Ok(self.cols[row])
    }

    /// Every partial solution of `row`, in column order.
    pub fn row(&self, row: usize) -> Result<&[PartialSolution]> {
        check_index("row", row, self.rows())?;
        let len = self.partial_solutions.len();
        let start = self.cols[..row]
            .iter()
            .try_fold(0usize, |sum, cols| sum.checked_add(*cols))
            .ok_or_else(|| SparseNetError::out_of_range("partial solution", usize::MAX, len))?;
        let end = start
            .checked_add(self.cols[row])
            .ok_or_else(|| SparseNetError::out_of_range("partial solution", start, len))?;
        if end > len {
            return Err(SparseNetError::out_of_range("partial solution", end - 1, len));
        }
        Ok(&self.partial_solutions[start..end])
    }

    pub fn partial(&self, row: usize, col: usize) -> Result<&PartialSolution> {
        let partials = self.row(row)?;
        check_index("column", col, partials.len())?;
        Ok(&partials[col])
    }

    pub fn estimated_size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.cols.len() * std::mem::size_of::<usize>()
            + self
                .partial_solutions
                .iter()
                .map(PartialSolution::estimated_size_bytes)
                .sum::<usize>()
    }
}
