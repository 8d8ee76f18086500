use crate::{
    error::{check_index, Result, SparseNetError},
    solution::PartialSolution,
    synapse::{input_index_from_synapse_index, is_index_input, SynapseIterator},
};

/// Evaluates a single [`PartialSolution`].
#[derive(Clone, Copy, Debug)]
pub struct PartialSolutionSolver<'a> {
    partial: &'a PartialSolution,
}

impl<'a> PartialSolutionSolver<'a> {
    pub fn new(partial: &'a PartialSolution) -> Self {
        Self { partial }
    }

    /// Gathers the values named by the unit's `input_data`: external inputs come from
    /// `input`, neurons from `neuron_data`, provided `committed` marks them as solved.
    pub fn collect_input_data(
        &self,
        input: &[f64],
        neuron_data: &[f64],
        committed: &[bool],
    ) -> Result<Vec<f64>> {
        SynapseIterator::new(&self.partial.input_data)
            .iter()
            .map(|synapse_index| {
                if is_index_input(synapse_index) {
                    let input_index = input_index_from_synapse_index(synapse_index);
                    check_index("input", input_index, input.len())?;
                    Ok(input[input_index])
                } else {
                    let neuron_index = synapse_index as usize;
                    let limit = neuron_data.len().min(committed.len());
                    if neuron_index >= limit || !committed[neuron_index] {
                        return Err(SparseNetError::out_of_range(
                            "committed neuron",
                            neuron_index,
                            limit,
                        ));
                    }
                    Ok(neuron_data[neuron_index])
                }
            })
            .collect()
    }

    /// Values of the unit's neurons in local order.
    ///
    /// Each neuron computes `transfer(Σ weight · input + bias)` and blends it with its
    /// previous value from `neuron_data` using the memory filter `m`:
    /// `m · previous + (1 - m) · transfer(..)`.
    pub fn solve(&self, input: &[f64], neuron_data: &[f64], committed: &[bool]) -> Result<Vec<f64>> {
        let partial = self.partial;
        let collected = self.collect_input_data(input, neuron_data, committed)?;
        let neuron_count = partial.neuron_count();
        for (what, len) in [
            ("output", SynapseIterator::new(&partial.output_data).size()),
            ("bias", partial.bias_index.len()),
            ("memory filter", partial.memory_filter_index.len()),
            ("weight synapse number", partial.weight_synapse_number.len()),
            ("index synapse number", partial.index_synapse_number.len()),
        ] {
            if len != neuron_count {
                return Err(SparseNetError::InconsistentGraphState(format!(
                    "partial solution has {neuron_count} neurons but {len} {what} entries"
                )));
            }
        }

        let mut results = Vec::with_capacity(neuron_count);
        let mut weight_synapse_start = 0;
        let mut index_synapse_start = 0;
        for (position, global_index) in partial.output_indices().enumerate() {
            let weight_synapses = slice_ranges(
                &partial.weight_indices,
                weight_synapse_start,
                partial.weight_synapse_number[position],
            )?;
            let index_synapses = slice_ranges(
                &partial.inside_indices,
                index_synapse_start,
                partial.index_synapse_number[position],
            )?;
            weight_synapse_start += partial.weight_synapse_number[position];
            index_synapse_start += partial.index_synapse_number[position];

            let weights = SynapseIterator::new(weight_synapses);
            let inputs = SynapseIterator::new(index_synapses);
            if weights.size() != inputs.size() {
                return Err(SparseNetError::InconsistentGraphState(format!(
                    "neuron {global_index} has {} inputs but {} weights",
                    inputs.size(),
                    weights.size()
                )));
            }
            let mut sum = 0.0;
            for (weight_index, inside_index) in weights.iter().zip(inputs.iter()) {
                let weight_index = weight_index as usize;
                check_index("weight", weight_index, partial.weight_table.len())?;
                let value = if is_index_input(inside_index) {
                    let slot = input_index_from_synapse_index(inside_index);
                    check_index("input slot", slot, collected.len())?;
                    collected[slot]
                } else {
                    let local = inside_index as usize;
                    check_index("local neuron", local, results.len())?;
                    results[local]
                };
                sum += partial.weight_table[weight_index] * value;
            }

            let bias_index = partial.bias_index[position];
            let memory_filter_index = partial.memory_filter_index[position];
            check_index("bias", bias_index, partial.weight_table.len())?;
            check_index("memory filter", memory_filter_index, partial.weight_table.len())?;
            check_index("neuron", global_index, neuron_data.len())?;
            let transfer_function = partial.neuron_transfer_functions[position];
            let memory_filter = partial.weight_table[memory_filter_index];
            let fresh = transfer_function.apply(sum + partial.weight_table[bias_index]);
            results.push(memory_filter * neuron_data[global_index] + (1.0 - memory_filter) * fresh);
        }
        Ok(results)
    }
}

fn slice_ranges<T>(ranges: &[T], start: usize, count: usize) -> Result<&[T]> {
    let end = start
        .checked_add(count)
        .ok_or_else(|| SparseNetError::out_of_range("synapse", start, ranges.len()))?;
    if end > ranges.len() {
        return Err(SparseNetError::out_of_range("synapse", end - 1, ranges.len()));
    }
    Ok(&ranges[start..end])
}
