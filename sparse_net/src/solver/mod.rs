//! Execution of compiled [`Solution`]s.

mod partial;

use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};
use tracing::{debug, instrument};

use crate::{
    context::ServiceContext,
    error::{check_index, Result, SparseNetError},
    solution::Solution,
};

pub use partial::PartialSolutionSolver;

/// Values of every neuron of a net, kept by the caller between solves so memory
/// filters can blend in the previous run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NeuronData {
    values: Vec<f64>,
}

impl NeuronData {
    pub fn new(neuron_number: usize) -> Self {
        Self {
            values: vec![0.0; neuron_number],
        }
    }

    pub fn for_solution(solution: &Solution) -> Self {
        Self::new(solution.neuron_number)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Forgets every previous value.
    pub fn reset(&mut self) {
        self.values.iter_mut().for_each(|value| *value = 0.0);
    }
}

/// Solves [`Solution`]s row by row, running the columns of a row on a dedicated pool.
pub struct SolutionSolver {
    context: ServiceContext,
    pool: ThreadPool,
}

impl SolutionSolver {
    pub fn new(context: &ServiceContext) -> Result<Self> {
        context.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(context.max_solve_threads)
            .build()
            .map_err(|e| {
                SparseNetError::InvalidState(format!("failed to build the solver thread pool: {e}"))
            })?;
        Ok(Self {
            context: context.clone(),
            pool,
        })
    }

    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    /// Solves with a fresh neuron state and returns the output values.
    pub fn solve_once(&self, solution: &Solution, input: &[f64]) -> Result<Vec<f64>> {
        let mut neuron_data = NeuronData::for_solution(solution);
        self.solve(solution, input, &mut neuron_data)
    }

    /// Solves `solution` for `input`, updating `neuron_data` in place, and returns the
    /// values of the output neurons.
    #[instrument(name = "SolutionSolver::solve", skip_all, fields(rows = solution.rows()), level = "debug")]
    pub fn solve(
        &self,
        solution: &Solution,
        input: &[f64],
        neuron_data: &mut NeuronData,
    ) -> Result<Vec<f64>> {
        if input.len() != solution.input_data_size {
            return Err(SparseNetError::LengthMismatch {
                expected: solution.input_data_size,
                actual: input.len(),
            });
        }
        if neuron_data.len() != solution.neuron_number {
            return Err(SparseNetError::LengthMismatch {
                expected: solution.neuron_number,
                actual: neuron_data.len(),
            });
        }

        let grid_size = solution
            .cols
            .iter()
            .try_fold(0usize, |sum, cols| sum.checked_add(*cols));
        if grid_size != Some(solution.partial_solutions.len()) {
            return Err(SparseNetError::InconsistentGraphState(format!(
                "columns {:?} do not cover {} partial solutions",
                solution.cols,
                solution.partial_solutions.len()
            )));
        }

        let mut committed = vec![false; solution.neuron_number];
        for row in 0..solution.rows() {
            let partials = solution.row(row)?;
            let values = neuron_data.values();
            let committed_view = committed.as_slice();
            // the row barrier: every column is collected before anything is committed
            let results = self.pool.install(|| {
                partials
                    .par_iter()
                    .map(|partial| {
                        PartialSolutionSolver::new(partial).solve(input, values, committed_view)
                    })
                    .collect::<Result<Vec<_>>>()
            })?;
            for (partial, results) in partials.iter().zip(results) {
                for (neuron_index, value) in partial.output_indices().zip(results) {
                    check_index("neuron", neuron_index, solution.neuron_number)?;
                    neuron_data.values[neuron_index] = value;
                    committed[neuron_index] = true;
                }
            }
            debug!(row, cols = partials.len(), "solved row");
        }

        if let Some(neuron_index) = committed.iter().position(|committed| !committed) {
            return Err(SparseNetError::InconsistentGraphState(format!(
                "neuron {neuron_index} is not solved by any partial solution"
            )));
        }

        let output_start = solution
            .neuron_number
            .saturating_sub(solution.output_neuron_number);
        Ok(neuron_data.values[output_start..].to_vec())
    }
}
