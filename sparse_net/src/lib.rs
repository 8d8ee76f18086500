//! Partitioning, compilation and parallel solving of sparse neural networks.
//!
//! A [`SparseNet`] is compiled by the [`SolutionBuilder`] into a [`Solution`]: a grid
//! of [`PartialSolution`]s whose rows are solved in order and whose columns are
//! solved in parallel by the [`SolutionSolver`]. The rows come from the
//! [`NeuronRouter`], which collects the neurons whose inputs are already solved.
//!
//! ```ignore
//! let net = SparseNetBuilder::new()
//!     .input_size(5)
//!     .expected_input_range(5.0)
//!     .dense_layers(&[2, 4, 3])?;
//! let context = ServiceContext::default();
//! let solution = SolutionBuilder::new().service_context(&context).build(&net)?;
//! let output = SolutionSolver::new(&context)?.solve_once(&solution, &[1.0; 5])?;
//! ```

pub mod context;
mod error;
pub mod net;
pub mod router;
pub mod solution;
pub mod solver;
pub mod synapse;

#[cfg(test)]
mod testing;

pub use context::ServiceContext;
pub use error::{Result, SparseNetError};
pub use net::{Neuron, SparseNet, SparseNetBuilder, TransferFunction, WeightInitializer};
pub use router::NeuronRouter;
pub use solution::{PartialSolution, PartialSolutionBuilder, Solution, SolutionBuilder};
pub use solver::{NeuronData, PartialSolutionSolver, SolutionSolver};
pub use synapse::SynapseInterval;
