//! Strategies producing the initial weights, biases and memory filters of a net.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::TransferFunction;

/// Source of initial values for neuron parameters. Only consulted while a
/// [`super::SparseNet`] is being built.
pub trait WeightInitializer: Send {
    /// Configures the number of inputs and the input amplitude the next values should fit.
    fn set(&mut self, expected_input_number: usize, expected_input_maximum_value: f64);

    /// A weight fitting a neuron using `transfer_function`.
    fn next_weight_for(&mut self, transfer_function: TransferFunction) -> f64;

    /// A memory filter ratio in `[0, 1]`.
    fn next_memory_filter(&mut self) -> f64;

    fn next_bias(&mut self) -> f64;

    fn next_weight(&mut self) -> f64 {
        self.next_weight_for(TransferFunction::Identity)
    }
}

/// Sanitized input expectations shared by initializers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExpectedInputs {
    pub number: usize,
    pub maximum_value: f64,
}

impl ExpectedInputs {
    pub fn new(number: usize, maximum_value: f64) -> Self {
        let number = number.max(1);
        let maximum_value = maximum_value.abs();
        let maximum_value = if maximum_value == 0.0 || maximum_value.is_nan() {
            f64::EPSILON
        } else if (number as f64 * maximum_value).is_finite() {
            maximum_value
        } else {
            // would overflow a weighted sum, use the largest safe amplitude
            f64::MAX / number as f64
        };
        Self {
            number,
            maximum_value,
        }
    }
}

impl Default for ExpectedInputs {
    fn default() -> Self {
        Self::new(1, TransferFunction::Identity.average_output_range())
    }
}

/// Keeps weights inside the range used by the nets.
pub fn limit_weight(weight: f64) -> f64 {
    weight.clamp(-1.0, 1.0)
}

/// Initializer for fully connected feed-forward nets: He scaling for rectifiers,
/// LeCun scaling for everything else.
#[derive(Clone, Debug)]
pub struct DenseNetWeightInitializer {
    rng: ChaCha8Rng,
    memory_min: f64,
    memory_max: f64,
    expected: ExpectedInputs,
}

impl DenseNetWeightInitializer {
    /// Memory filters span the whole `[0, 1]` range. A `None` seed draws one from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        Self::with_memory_range(seed, 0.0, 1.0)
    }

    pub fn with_memory_range(seed: Option<u64>, memory_min: f64, memory_max: f64) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let (low, high) = if memory_min <= memory_max {
            (memory_min, memory_max)
        } else {
            (memory_max, memory_min)
        };
        Self {
            rng,
            memory_min: low.clamp(0.0, 1.0),
            memory_max: high.clamp(0.0, 1.0),
            expected: ExpectedInputs::default(),
        }
    }

    pub fn expected_inputs(&self) -> ExpectedInputs {
        self.expected
    }

    /// Expected weight amplitude for `transfer_function`, always at least `f64::EPSILON`.
    fn weight_amplitude(&self, transfer_function: TransferFunction) -> f64 {
        let fan_in = self.expected.number as f64;
        let amplitude = match transfer_function {
            TransferFunction::Relu | TransferFunction::Elu => (2.0 / fan_in).sqrt(),
            TransferFunction::Selu
            | TransferFunction::Tanh
            | TransferFunction::Sigmoid
            | TransferFunction::Identity => (1.0 / fan_in).sqrt(),
        };
        (amplitude / self.expected.maximum_value).max(f64::EPSILON)
    }
}

impl WeightInitializer for DenseNetWeightInitializer {
    fn set(&mut self, expected_input_number: usize, expected_input_maximum_value: f64) {
        self.expected = ExpectedInputs::new(expected_input_number, expected_input_maximum_value);
    }

    fn next_weight_for(&mut self, transfer_function: TransferFunction) -> f64 {
        let amplitude = self.weight_amplitude(transfer_function);
        limit_weight(self.rng.gen_range(-amplitude..=amplitude))
    }

    fn next_memory_filter(&mut self) -> f64 {
        self.rng.gen_range(self.memory_min..=self.memory_max)
    }

    fn next_bias(&mut self) -> f64 {
        let amplitude = self.weight_amplitude(TransferFunction::Identity);
        limit_weight(self.rng.gen_range(-amplitude..=amplitude))
    }
}
