//! Nets and solutions shared by the tests of this crate.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    net::{Neuron, SparseNet, SparseNetBuilder, TransferFunction},
    solution::{PartialSolution, Solution},
    synapse::{input_index_from_synapse_index, is_index_input, SynapseInterval, SynapseIterator},
};

/// `n` identity neurons in a line: neuron 0 reads input 0, neuron `i` reads neuron
/// `i - 1`. Neuron `i` owns weights `3i` (input), `3i + 1` (bias), `3i + 2` (memory filter).
pub fn chain_net(n: usize) -> SparseNet {
    let neuron_array = (0..n)
        .map(|i| Neuron {
            transfer_function: TransferFunction::Identity,
            input_indices: vec![if i == 0 {
                SynapseInterval::inputs(0, 1)
            } else {
                SynapseInterval::neurons(i - 1, 1)
            }],
            input_weights: vec![SynapseInterval::new(3 * i as i64, 1)],
            bias_idx: 3 * i + 1,
            memory_filter_idx: 3 * i + 2,
        })
        .collect();
    SparseNet {
        input_data_size: 1,
        output_neuron_number: 1,
        expected_input_range: 1.0,
        neuron_array,
        weight_table: [1.0, 0.0, 0.0].repeat(n),
    }
}

pub fn dense_net(input_size: usize, layer_sizes: &[usize], seed: u64) -> SparseNet {
    SparseNetBuilder::new()
        .input_size(input_size)
        .expected_input_range(TransferFunction::Identity.average_output_range())
        .seed(seed)
        .dense_layers(layer_sizes)
        .unwrap()
}

/// A feed-forward net without layers: every neuron reads one to four ranges, each
/// either a run of inputs or a run of any earlier neurons, so references skip ahead
/// freely, mix inputs with neurons and may repeat.
pub fn random_net(
    seed: u64,
    input_size: usize,
    neuron_count: usize,
    output_neuron_number: usize,
) -> SparseNet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut weight_table = vec![];
    let mut neuron_array = Vec::with_capacity(neuron_count);
    for neuron_index in 0..neuron_count {
        let mut input_indices = vec![];
        for _ in 0..rng.gen_range(1..=4) {
            if neuron_index == 0 || rng.gen_bool(0.3) {
                let first = rng.gen_range(0..input_size);
                let size = rng.gen_range(1..=input_size - first);
                input_indices.push(SynapseInterval::inputs(first, size));
            } else {
                let first = rng.gen_range(0..neuron_index);
                let size = rng.gen_range(1..=(neuron_index - first).min(3));
                input_indices.push(SynapseInterval::neurons(first, size));
            }
        }
        let input_count = SynapseIterator::new(&input_indices).size();
        let weight_start = weight_table.len();
        for _ in 0..input_count {
            weight_table.push(rng.gen_range(-1.0..=1.0) / input_count as f64);
        }
        let bias_idx = weight_table.len();
        weight_table.push(rng.gen_range(-0.5..=0.5));
        let memory_filter_idx = weight_table.len();
        weight_table.push(if rng.gen_bool(0.5) {
            0.0
        } else {
            rng.gen_range(0.0..=1.0)
        });
        neuron_array.push(Neuron {
            transfer_function: TransferFunction::random(&mut rng),
            bias_idx,
            memory_filter_idx,
            input_indices,
            input_weights: vec![SynapseInterval::new(weight_start as i64, input_count)],
        });
    }
    SparseNet {
        input_data_size: input_size,
        output_neuron_number,
        expected_input_range: 1.0,
        neuron_array,
        weight_table,
    }
}

/// Evaluates `net` neuron by neuron in index order straight from its weight table,
/// blending into `neuron_data`, and returns the output values.
pub fn evaluate_net(net: &SparseNet, input: &[f64], neuron_data: &mut [f64]) -> Vec<f64> {
    for (neuron_index, neuron) in net.neuron_array.iter().enumerate() {
        let mut sum = 0.0;
        for (synapse_index, weight_index) in neuron.inputs().zip(neuron.weight_indices()) {
            let value = if is_index_input(synapse_index) {
                input[input_index_from_synapse_index(synapse_index)]
            } else {
                neuron_data[synapse_index as usize]
            };
            sum += net.weight_table[weight_index] * value;
        }
        let memory_filter = net.weight_table[neuron.memory_filter_idx];
        let fresh = neuron
            .transfer_function
            .apply(sum + net.weight_table[neuron.bias_idx]);
        neuron_data[neuron_index] =
            memory_filter * neuron_data[neuron_index] + (1.0 - memory_filter) * fresh;
    }
    neuron_data[net.neuron_count() - net.output_neuron_number..].to_vec()
}

/// Two neurons reading the `collected` values: the first reads all of them, the
/// second reads all of them and then the first neuron.
fn manual_partial(input_data: SynapseInterval, output_start: usize) -> PartialSolution {
    let k = input_data.interval_size;
    PartialSolution {
        output_data: vec![SynapseInterval::neurons(output_start, 2)],
        input_data: vec![input_data],
        neuron_transfer_functions: vec![TransferFunction::Identity; 2],
        weight_table: vec![0.5; 2 * k + 5],
        weight_indices: vec![
            SynapseInterval::new(0, k),
            SynapseInterval::new(k as i64 + 2, k + 1),
        ],
        weight_synapse_number: vec![1, 1],
        bias_index: vec![k, 2 * k + 3],
        memory_filter_index: vec![k + 1, 2 * k + 4],
        inside_indices: vec![
            SynapseInterval::new(-1, k),
            SynapseInterval::new(-1, k),
            SynapseInterval::new(0, 1),
        ],
        index_synapse_number: vec![1, 2],
    }
}

/// Two rows of two partial solutions over 8 neurons and 4 inputs.
///
/// Row 0 reads inputs `0, 1` into neurons `0, 1` and inputs `2, 3` into neurons `2, 3`;
/// row 1 reads neurons `0..4` into neurons `4, 5` and neurons `1, 2` into neurons `6, 7`.
pub fn manual_solution() -> Solution {
    Solution {
        partial_solutions: vec![
            manual_partial(SynapseInterval::inputs(0, 2), 0),
            manual_partial(SynapseInterval::inputs(2, 2), 2),
            manual_partial(SynapseInterval::neurons(0, 4), 4),
            manual_partial(SynapseInterval::neurons(1, 2), 6),
        ],
        cols: vec![2, 2],
        neuron_number: 8,
        output_neuron_number: 2,
        input_data_size: 4,
    }
}

/// Draws new weights, biases, memory filters and transfer functions for a partial
/// solution built by [`manual_solution`].
pub fn randomize_partial<R: Rng>(partial: &mut PartialSolution, rng: &mut R) {
    for weight in &mut partial.weight_table {
        *weight = rng.gen_range(-1.0..=1.0);
    }
    for index in &partial.memory_filter_index {
        partial.weight_table[*index] = rng.gen_range(0.0..=1.0);
    }
    for transfer_function in &mut partial.neuron_transfer_functions {
        *transfer_function = TransferFunction::random(rng);
    }
}

/// Evaluates [`manual_solution`] neuron by neuron, blending into `neuron_data`.
pub fn solve_manually(solution: &Solution, input: &[f64], neuron_data: &mut [f64]) {
    let sources: [(&[usize], bool); 4] = [
        (&[0, 1], true),
        (&[2, 3], true),
        (&[0, 1, 2, 3], false),
        (&[1, 2], false),
    ];
    for (unit, (partial, (source, from_input))) in
        solution.partial_solutions.iter().zip(sources).enumerate()
    {
        let collected = source
            .iter()
            .map(|i| if from_input { input[*i] } else { neuron_data[*i] })
            .collect::<Vec<_>>();
        let k = collected.len();
        let w = &partial.weight_table;
        let tf = &partial.neuron_transfer_functions;
        let first = 2 * unit;
        let second = first + 1;

        let mut sum = 0.0;
        for (i, value) in collected.iter().enumerate() {
            sum += w[i] * value;
        }
        let memory_filter = w[k + 1];
        neuron_data[first] =
            memory_filter * neuron_data[first] + (1.0 - memory_filter) * tf[0].apply(sum + w[k]);

        let mut sum = 0.0;
        for (i, value) in collected.iter().enumerate() {
            sum += w[k + 2 + i] * value;
        }
        sum += w[2 * k + 2] * neuron_data[first];
        let memory_filter = w[2 * k + 4];
        neuron_data[second] = memory_filter * neuron_data[second]
            + (1.0 - memory_filter) * tf[1].apply(sum + w[2 * k + 3]);
    }
}
