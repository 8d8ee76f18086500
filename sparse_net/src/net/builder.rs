//! Construction of [`SparseNet`]s, either from hand-made parts or as dense layers.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::{DenseNetWeightInitializer, Neuron, SparseNet, TransferFunction, WeightInitializer};
use crate::{
    error::{Result, SparseNetError},
    synapse::SynapseInterval,
};

/// Every argument a [`SparseNetBuilder`] may receive. Which fields are required
/// depends on the build mode; [`NetConfig::missing_for_manual`] and
/// [`NetConfig::missing_for_dense`] list the absent ones in one go.
#[derive(Clone, Debug, Default)]
pub struct NetConfig {
    pub input_size: Option<usize>,
    pub output_neuron_number: Option<usize>,
    /// Absolute amplitude of one average input value, used to scale initial weights.
    pub expected_input_range: Option<f64>,
    pub neuron_array: Option<Vec<Neuron>>,
    pub weight_table: Option<Vec<f64>>,
    pub allowed_transfer_functions_by_layer: Option<Vec<Vec<TransferFunction>>>,
    pub seed: Option<u64>,
}

impl NetConfig {
    pub fn missing_for_manual(&self) -> Vec<&'static str> {
        let mut missing = vec![];
        if self.input_size.is_none() {
            missing.push("input_size");
        }
        if self.output_neuron_number.is_none() {
            missing.push("output_neuron_number");
        }
        if self.neuron_array.is_none() {
            missing.push("neuron_array");
        }
        if self.weight_table.is_none() {
            missing.push("weight_table");
        }
        missing
    }

    pub fn missing_for_dense(&self) -> Vec<&'static str> {
        let mut missing = vec![];
        if self.input_size.is_none() {
            missing.push("input_size");
        }
        if self.expected_input_range.is_none() {
            missing.push("expected_input_range");
        }
        missing
    }
}

/// Builder for [`SparseNet`]s.
///
/// [`SparseNetBuilder::build`] assembles a net from a given neuron array and weight
/// table without checking their integrity: the caller is responsible for the
/// structure. [`SparseNetBuilder::dense_layers`] generates a fully connected
/// feed-forward net, drawing values from the configured [`WeightInitializer`].
#[derive(Default)]
pub struct SparseNetBuilder {
    config: NetConfig,
    weight_initializer: Option<Box<dyn WeightInitializer>>,
}

impl SparseNetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_size(mut self, size: usize) -> Self {
        self.config.input_size = Some(size);
        self
    }

    pub fn output_neuron_number(mut self, number: usize) -> Self {
        self.config.output_neuron_number = Some(number);
        self
    }

    pub fn expected_input_range(mut self, range: f64) -> Self {
        self.config.expected_input_range = Some(range);
        self
    }

    /// Replaces the default [`DenseNetWeightInitializer`] used by [`Self::dense_layers`].
    pub fn weight_initializer(mut self, initializer: Box<dyn WeightInitializer>) -> Self {
        self.weight_initializer = Some(initializer);
        self
    }

    pub fn neuron_array(mut self, neurons: Vec<Neuron>) -> Self {
        self.config.neuron_array = Some(neurons);
        self
    }

    pub fn weight_table(mut self, table: Vec<f64>) -> Self {
        self.config.weight_table = Some(table);
        self
    }

    /// Restricts the transfer functions [`Self::dense_layers`] may pick, one list per layer.
    pub fn allowed_transfer_functions_by_layer(mut self, filter: Vec<Vec<TransferFunction>>) -> Self {
        self.config.allowed_transfer_functions_by_layer = Some(filter);
        self
    }

    /// Seeds the transfer function choice and the default initializer.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Moves the configured neuron array and weight table into a net.
    pub fn build(self) -> Result<SparseNet> {
        let missing = self.config.missing_for_manual();
        if !missing.is_empty() {
            return Err(SparseNetError::MissingConfiguration(missing));
        }
        let NetConfig {
            input_size,
            output_neuron_number,
            expected_input_range,
            neuron_array,
            weight_table,
            ..
        } = self.config;
        Ok(SparseNet {
            input_data_size: input_size.unwrap_or_default(),
            output_neuron_number: output_neuron_number.unwrap_or_default(),
            expected_input_range: expected_input_range
                .unwrap_or_else(|| TransferFunction::Identity.average_output_range()),
            neuron_array: neuron_array.unwrap_or_default(),
            weight_table: weight_table.unwrap_or_default(),
        })
    }

    /// Creates a fully connected feed-forward net. Layer `0` reads every input,
    /// layer `i` reads every neuron of layer `i - 1`; the last layer is the output.
    pub fn dense_layers(mut self, layer_sizes: &[usize]) -> Result<SparseNet> {
        let missing = self.config.missing_for_dense();
        if !missing.is_empty() {
            return Err(SparseNetError::MissingConfiguration(missing));
        }
        let input_size = self.config.input_size.unwrap_or_default();
        let expected_input_range = self.config.expected_input_range.unwrap_or_default();
        let output_neuron_number = match (layer_sizes.last(), self.config.output_neuron_number) {
            (None, _) => {
                return Err(SparseNetError::InvalidState(
                    "dense layers need at least one layer".to_string(),
                ));
            }
            (Some(&last), Some(requested)) if last != requested => {
                return Err(SparseNetError::InvalidState(format!(
                    "output neuron number {requested} does not match the last layer size {last}"
                )));
            }
            (Some(&last), _) => last,
        };
        if let Some(layer) = layer_sizes.iter().position(|size| *size == 0) {
            return Err(SparseNetError::InvalidState(format!("layer {layer} is empty")));
        }
        if let Some(filter) = &self.config.allowed_transfer_functions_by_layer {
            if filter.len() != layer_sizes.len() {
                return Err(SparseNetError::InvalidState(format!(
                    "{} transfer function filters given for {} layers",
                    filter.len(),
                    layer_sizes.len()
                )));
            }
            if let Some(layer) = filter.iter().position(|allowed| allowed.is_empty()) {
                return Err(SparseNetError::InvalidState(format!(
                    "layer {layer} allows no transfer function"
                )));
            }
        }

        let seed = self.config.seed;
        let mut initializer = self
            .weight_initializer
            .take()
            .unwrap_or_else(|| Box::new(DenseNetWeightInitializer::new(seed)));
        let mut rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let total_neurons = layer_sizes.iter().sum::<usize>();
        let mut neuron_array = Vec::with_capacity(total_neurons);
        let mut weight_table = vec![];
        let mut previous_layer: Option<usize> = None;
        let mut previous_size = input_size;
        let mut layer_start = 0;
        let mut expected_range = expected_input_range;
        let every_function = TransferFunction::ALL;

        for (layer_index, &layer_size) in layer_sizes.iter().enumerate() {
            initializer.set(previous_size, expected_range);
            let allowed = match &self.config.allowed_transfer_functions_by_layer {
                Some(filter) => filter[layer_index].as_slice(),
                None => &every_function[..],
            };
            let mut layer_range = 0.0f64;
            for _ in 0..layer_size {
                let transfer_function =
                    TransferFunction::random_from(&mut rng, allowed).unwrap_or_default();
                layer_range = layer_range.max(transfer_function.average_output_range());

                let weight_start = weight_table.len();
                for _ in 0..previous_size {
                    weight_table.push(initializer.next_weight_for(transfer_function));
                }
                let bias_idx = weight_table.len();
                weight_table.push(initializer.next_bias());
                let memory_filter_idx = weight_table.len();
                weight_table.push(initializer.next_memory_filter());

                let (input_indices, input_weights) = if previous_size == 0 {
                    (vec![], vec![])
                } else {
                    let inputs = match previous_layer {
                        None => SynapseInterval::inputs(0, previous_size),
                        Some(start) => SynapseInterval::neurons(start, previous_size),
                    };
                    (
                        vec![inputs],
                        vec![SynapseInterval::new(weight_start as i64, previous_size)],
                    )
                };
                neuron_array.push(Neuron {
                    transfer_function,
                    bias_idx,
                    memory_filter_idx,
                    input_indices,
                    input_weights,
                });
            }
            previous_layer = Some(layer_start);
            previous_size = layer_size;
            layer_start += layer_size;
            expected_range = layer_range;
        }

        debug!(
            layers = layer_sizes.len(),
            neurons = neuron_array.len(),
            weights = weight_table.len(),
            "built dense net"
        );
        Ok(SparseNet {
            input_data_size: input_size,
            output_neuron_number,
            expected_input_range,
            neuron_array,
            weight_table,
        })
    }
}
