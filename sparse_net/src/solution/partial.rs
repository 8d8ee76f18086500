use std::mem::size_of;

use serde::{Deserialize, Serialize};

use crate::{
    net::{Neuron, TransferFunction},
    synapse::{SynapseInterval, SynapseIterator},
};

/// A compiled, self-contained group of neurons.
///
/// Neurons are stored in local order `0..neuron_count()`. Every per-neuron vector
/// (`neuron_transfer_functions`, `bias_index`, `memory_filter_index`,
/// `weight_synapse_number`, `index_synapse_number`) has one entry per local position.
///
/// Values never point back into the [`crate::SparseNet`] the unit was compiled from:
/// weights are copied into `weight_table`, and the only global references are
/// `output_data` (where results are committed) and `input_data` (what the unit reads).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialSolution {
    /// Global neuron indices of the local positions, in local order.
    pub output_data: Vec<SynapseInterval>,
    /// External inputs (negative) and neurons of earlier rows (non-negative) read by the
    /// unit, each listed once, in order of first use.
    pub input_data: Vec<SynapseInterval>,
    pub neuron_transfer_functions: Vec<TransferFunction>,
    pub weight_table: Vec<f64>,
    /// Ranges over `weight_table`; `weight_synapse_number[p]` of them belong to position `p`.
    pub weight_indices: Vec<SynapseInterval>,
    pub weight_synapse_number: Vec<usize>,
    /// Indices into `weight_table`.
    pub bias_index: Vec<usize>,
    pub memory_filter_index: Vec<usize>,
    /// Inputs of each position: a non-negative index is an earlier local position,
    /// a negative index `-(slot + 1)` is a slot of the collected `input_data`.
    pub inside_indices: Vec<SynapseInterval>,
    pub index_synapse_number: Vec<usize>,
}

impl PartialSolution {
    pub fn neuron_count(&self) -> usize {
        self.neuron_transfer_functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neuron_transfer_functions.is_empty()
    }

    /// Number of values collected through `input_data`.
    pub fn input_count(&self) -> usize {
        SynapseIterator::new(&self.input_data).size()
    }

    /// Global neuron indices of the local positions.
    pub fn output_indices(&self) -> impl Iterator<Item = usize> + '_ {
        SynapseIterator::new(&self.output_data)
            .iter()
            .map(|index| index as usize)
    }

    /// Size of the unit in memory, counting the heap content of its tables.
    pub fn estimated_size_bytes(&self) -> usize {
        Self::empty_size_bytes()
            + (self.output_data.len()
                + self.input_data.len()
                + self.weight_indices.len()
                + self.inside_indices.len())
                * size_of::<SynapseInterval>()
            + self.neuron_transfer_functions.len() * size_of::<TransferFunction>()
            + self.weight_table.len() * size_of::<f64>()
            + (self.weight_synapse_number.len()
                + self.bias_index.len()
                + self.memory_filter_index.len()
                + self.index_synapse_number.len())
                * size_of::<usize>()
    }

    pub fn empty_size_bytes() -> usize {
        size_of::<Self>()
    }
}

/// Upper bound on the growth of a [`PartialSolution`] when `neuron` is added to it.
pub fn neuron_cost_bytes(neuron: &Neuron) -> usize {
    let inputs = neuron.input_count();
    // weights, bias and memory filter
    (inputs + 2) * size_of::<f64>()
        // inside and input ranges in the worst case, one output and one weight range
        + (2 * inputs + 2) * size_of::<SynapseInterval>()
        + 4 * size_of::<usize>()
        + size_of::<TransferFunction>()
}
