//! The network graph: [`Neuron`]s, the shared weight table and the tools to build them.

mod builder;
mod initializer;
mod transfer;

use serde::{Deserialize, Serialize};

use crate::{
    error::{check_index, Result},
    synapse::{is_index_input, SynapseInterval, SynapseIterator},
};

pub use builder::{NetConfig, SparseNetBuilder};
pub use initializer::{limit_weight, DenseNetWeightInitializer, ExpectedInputs, WeightInitializer};
pub use transfer::TransferFunction;

/// A node of the graph. Indices point into [`SparseNet::weight_table`]; input
/// ranges use the signed encoding of [`crate::synapse`], weight ranges are plain
/// upward ranges over the weight table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Neuron {
    pub transfer_function: TransferFunction,
    pub bias_idx: usize,
    pub memory_filter_idx: usize,
    pub input_indices: Vec<SynapseInterval>,
    pub input_weights: Vec<SynapseInterval>,
}

impl Neuron {
    /// Number of input references, external inputs included.
    pub fn input_count(&self) -> usize {
        SynapseIterator::new(&self.input_indices).size()
    }

    pub fn inputs(&self) -> impl Iterator<Item = i64> + '_ {
        SynapseIterator::new(&self.input_indices).iter()
    }

    /// Indices of the neurons this neuron reads from, one entry per reference.
    pub fn neuron_inputs(&self) -> impl Iterator<Item = usize> + '_ {
        self.inputs()
            .filter(|index| !is_index_input(*index))
            .map(|index| index as usize)
    }

    pub fn weight_indices(&self) -> impl Iterator<Item = usize> + '_ {
        SynapseIterator::new(&self.input_weights)
            .iter()
            .map(|index| index as usize)
    }
}

/// A feed-forward graph of neurons. The trailing `output_neuron_number` neurons
/// produce the output of the net.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseNet {
    pub input_data_size: usize,
    pub output_neuron_number: usize,
    pub expected_input_range: f64,
    pub neuron_array: Vec<Neuron>,
    pub weight_table: Vec<f64>,
}

impl SparseNet {
    pub fn neuron_count(&self) -> usize {
        self.neuron_array.len()
    }

    pub fn neuron(&self, neuron_index: usize) -> Result<&Neuron> {
        check_index("neuron", neuron_index, self.neuron_array.len())?;
        Ok(&self.neuron_array[neuron_index])
    }

    pub fn weight(&self, weight_index: usize) -> Result<f64> {
        check_index("weight", weight_index, self.weight_table.len())?;
        Ok(self.weight_table[weight_index])
    }
}
