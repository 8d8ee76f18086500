use tracing::{debug, info, instrument};

use super::{PartialSolution, PartialSolutionBuilder, Solution};
use crate::{
    context::ServiceContext,
    error::{Result, SparseNetError},
    net::SparseNet,
    router::NeuronRouter,
};

pub const DEFAULT_DEVICE_MAX_BYTES: usize = 2048 * utils::BYTES_PER_MEGABYTE;

/// Arguments of a [`SolutionBuilder`]; `max_solve_threads` is required.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolutionConfig {
    pub max_solve_threads: Option<usize>,
    pub device_max_bytes: Option<usize>,
}

impl SolutionConfig {
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = vec![];
        if self.max_solve_threads.is_none() {
            missing.push("max_solve_threads");
        }
        missing
    }
}

/// Compiles a [`SparseNet`] into a [`Solution`].
///
/// Every row of the grid holds one subset collected by the [`NeuronRouter`]. The
/// subset is packed into as many columns as needed so no partial solution grows
/// beyond `device_max_bytes / max_solve_threads`.
#[derive(Clone, Debug, Default)]
pub struct SolutionBuilder {
    config: SolutionConfig,
}

impl SolutionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_solve_threads(mut self, threads: usize) -> Self {
        self.config.max_solve_threads = Some(threads);
        self
    }

    pub fn device_max_bytes(mut self, bytes: usize) -> Self {
        self.config.device_max_bytes = Some(bytes);
        self
    }

    pub fn device_max_megabytes(self, megabytes: f64) -> Self {
        self.device_max_bytes(utils::megabytes_to_bytes(megabytes))
    }

    /// Takes both the thread count and the device memory from `context`.
    pub fn service_context(self, context: &ServiceContext) -> Self {
        self.max_solve_threads(context.max_solve_threads)
            .device_max_megabytes(context.device_max_megabytes)
    }

    /// Compiles `net` row by row until every neuron is committed.
    ///
    /// A strict collection only stalls on a cyclic net, so the relaxed retry is never
    /// reached for a feed-forward one; on a cycle it finds nothing either and the build
    /// fails with [`SparseNetError::InconsistentGraphState`].
    #[instrument(name = "SolutionBuilder::build", skip_all, fields(neurons = net.neuron_count()))]
    pub fn build(&self, net: &SparseNet) -> Result<Solution> {
        let missing = self.config.missing();
        if !missing.is_empty() {
            return Err(SparseNetError::MissingConfiguration(missing));
        }
        let threads = self.config.max_solve_threads.unwrap_or_default();
        if threads == 0 {
            return Err(SparseNetError::InvalidState(
                "max_solve_threads must be at least 1".to_string(),
            ));
        }
        let device_bytes = self
            .config
            .device_max_bytes
            .unwrap_or(DEFAULT_DEVICE_MAX_BYTES);
        let unit_budget = device_bytes / threads;

        let router = NeuronRouter::new(net)?;
        let mut available = vec![false; net.neuron_count()];
        let mut solution = Solution {
            neuron_number: net.neuron_count(),
            output_neuron_number: net.output_neuron_number,
            input_data_size: net.input_data_size,
            ..Default::default()
        };

        while !router.finished() {
            let mut subset = router.collect_subset(threads, device_bytes, true)?;
            if subset.is_empty() {
                // cyclic input only
                debug!(iteration = router.iteration(), "strict collection stalled, relaxing");
                subset = router.collect_subset(threads, device_bytes, false)?;
            }
            if subset.is_empty() {
                return Err(SparseNetError::InconsistentGraphState(format!(
                    "no solvable neuron left after iteration {} with {} neurons unprocessed",
                    router.iteration(),
                    available.iter().filter(|done| !**done).count()
                )));
            }

            let (columns, committed) = compile_row(net, &router, &available, unit_budget)?;
            for neuron_index in committed {
                available[neuron_index] = true;
            }
            info!(
                row = solution.rows(),
                neurons = subset.len(),
                cols = columns.len(),
                "compiled row"
            );
            solution.cols.push(columns.len());
            solution.partial_solutions.extend(columns);
        }

        info!(
            rows = solution.rows(),
            partial_solutions = solution.partial_solutions.len(),
            size = %utils::human_bytes(solution.estimated_size_bytes()),
            "built solution"
        );
        Ok(solution)
    }
}

/// Packs the router's current subset into partial solutions, returning them with the
/// neurons they commit. Neurons reading a neuron compiled into another column of the
/// same row are omitted and left for a later row.
fn compile_row(
    net: &SparseNet,
    router: &NeuronRouter,
    available: &[bool],
    unit_budget: usize,
) -> Result<(Vec<PartialSolution>, Vec<usize>)> {
    let mut columns = vec![];
    let mut committed = vec![];
    let mut builder = PartialSolutionBuilder::new(net, available);
    while let Some(neuron_index) = router.first_neuron_from_subset()? {
        if !builder.is_empty()
            && builder.can_resolve(neuron_index)?
            && !builder.fits(neuron_index, unit_budget)?
        {
            let full = std::mem::replace(&mut builder, PartialSolutionBuilder::new(net, available));
            debug!(
                col = columns.len(),
                neurons = full.neuron_count(),
                size = full.estimated_size_bytes(),
                "partial solution full"
            );
            columns.push(full.finish());
        }
        if !builder.can_resolve(neuron_index)? {
            router.confirm_first_omitted(neuron_index)?;
            continue;
        }
        if !builder.fits(neuron_index, unit_budget)? {
            return Err(SparseNetError::ResourceExhausted {
                required: PartialSolution::empty_size_bytes()
                    + builder.neuron_cost_bytes(neuron_index)?,
                budget: unit_budget,
            });
        }
        builder.add_neuron(neuron_index)?;
        router.confirm_first_processed(neuron_index)?;
        committed.push(neuron_index);
    }
    if !builder.is_empty() {
        columns.push(builder.finish());
    }
    Ok((columns, committed))
}
