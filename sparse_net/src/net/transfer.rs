use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

const SELU_LAMBDA: f64 = 1.0507009873554805;
const SELU_ALPHA: f64 = 1.6732632423543772;
const ELU_ALPHA: f64 = 1.0;

/// Activation applied to the weighted input sum of a neuron.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferFunction {
    #[default]
    Identity,
    Sigmoid,
    Tanh,
    Elu,
    Selu,
    Relu,
}

impl TransferFunction {
    pub const ALL: [TransferFunction; 6] = [
        TransferFunction::Identity,
        TransferFunction::Sigmoid,
        TransferFunction::Tanh,
        TransferFunction::Elu,
        TransferFunction::Selu,
        TransferFunction::Relu,
    ];

    #[inline(always)]
    pub fn apply(&self, data: f64) -> f64 {
        match self {
            TransferFunction::Identity => data,
            TransferFunction::Sigmoid => 1.0 / (1.0 + (-data).exp()),
            TransferFunction::Tanh => data.tanh(),
            TransferFunction::Elu => {
                if data <= 0.0 {
                    ELU_ALPHA * (data.exp() - 1.0)
                } else {
                    data
                }
            }
            TransferFunction::Selu => {
                if data <= 0.0 {
                    SELU_LAMBDA * SELU_ALPHA * (data.exp() - 1.0)
                } else {
                    SELU_LAMBDA * data
                }
            }
            TransferFunction::Relu => data.max(0.0),
        }
    }

    /// Typical absolute amplitude of the function output, used to scale initial weights.
    pub fn average_output_range(&self) -> f64 {
        match self {
            TransferFunction::Sigmoid | TransferFunction::Tanh => 1.0,
            TransferFunction::Identity
            | TransferFunction::Elu
            | TransferFunction::Selu
            | TransferFunction::Relu => 50.0,
        }
    }

    /// A uniformly chosen transfer function.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::random_from(rng, &Self::ALL).unwrap_or_default()
    }

    /// A uniformly chosen element of `allowed`, `None` when it is empty.
    pub fn random_from<R: Rng + ?Sized>(rng: &mut R, allowed: &[TransferFunction]) -> Option<Self> {
        allowed.choose(rng).copied()
    }
}
