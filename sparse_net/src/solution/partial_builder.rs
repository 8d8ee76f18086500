use std::collections::HashMap;

use tracing::trace;

use super::partial::{neuron_cost_bytes, PartialSolution};
use crate::{
    error::{check_index, Result, SparseNetError},
    net::{Neuron, SparseNet},
    synapse::{
        append_index, input_index_from_synapse_index, is_index_input,
        synapse_index_from_input_index, SynapseInterval,
    },
};

/// How one input reference of a neuron is read by the unit under construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    /// Result of an earlier local position.
    Local(usize),
    /// A slot of the unit's `input_data` already collecting this reference.
    Slot(usize),
    /// An external input or committed neuron not yet collected by the unit.
    Collect,
}

/// Compiles neurons into a single [`PartialSolution`].
///
/// `available[i]` tells whether neuron `i` is committed by an earlier row, in which
/// case the unit may read it through its `input_data`.
pub struct PartialSolutionBuilder<'a> {
    net: &'a SparseNet,
    available: &'a [bool],
    partial: PartialSolution,
    local_positions: HashMap<usize, usize>,
    input_slots: HashMap<i64, usize>,
}

impl<'a> PartialSolutionBuilder<'a> {
    pub fn new(net: &'a SparseNet, available: &'a [bool]) -> Self {
        Self {
            net,
            available,
            partial: PartialSolution::default(),
            local_positions: HashMap::new(),
            input_slots: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.partial.is_empty()
    }

    pub fn neuron_count(&self) -> usize {
        self.partial.neuron_count()
    }

    pub fn estimated_size_bytes(&self) -> usize {
        self.partial.estimated_size_bytes()
    }

    pub fn contains(&self, neuron_index: usize) -> bool {
        self.local_positions.contains_key(&neuron_index)
    }

    /// Bytes the unit may grow by when `neuron_index` is added.
    pub fn neuron_cost_bytes(&self, neuron_index: usize) -> Result<usize> {
        Ok(neuron_cost_bytes(self.net.neuron(neuron_index)?))
    }

    /// Whether the unit stays within `budget_bytes` after adding `neuron_index`.
    pub fn fits(&self, neuron_index: usize, budget_bytes: usize) -> Result<bool> {
        let required = self.estimated_size_bytes() + self.neuron_cost_bytes(neuron_index)?;
        Ok(required <= budget_bytes)
    }

    /// Whether every input of `neuron_index` is an external input, a committed
    /// neuron or a neuron already inside this unit.
    pub fn can_resolve(&self, neuron_index: usize) -> Result<bool> {
        let neuron = self.net.neuron(neuron_index)?;
        Ok(neuron
            .neuron_inputs()
            .all(|input| self.contains(input) || self.is_available(input)))
    }

    fn is_available(&self, neuron_index: usize) -> bool {
        self.available.get(neuron_index).copied().unwrap_or(false)
    }

    fn source_of(&self, synapse_index: i64) -> Source {
        if !is_index_input(synapse_index) {
            if let Some(position) = self.local_positions.get(&(synapse_index as usize)) {
                return Source::Local(*position);
            }
        }
        match self.input_slots.get(&synapse_index) {
            Some(slot) => Source::Slot(*slot),
            None => Source::Collect,
        }
    }

    /// Checks every reference of `neuron` before the unit is touched.
    fn validate(&self, neuron_index: usize, neuron: &Neuron) -> Result<()> {
        if self.contains(neuron_index) {
            return Err(SparseNetError::InvalidState(format!(
                "neuron {neuron_index} is already part of the partial solution"
            )));
        }
        let weights = self.net.weight_table.len();
        check_index("bias weight", neuron.bias_idx, weights)?;
        check_index("memory filter weight", neuron.memory_filter_idx, weights)?;
        let mut weight_count = 0;
        for weight_index in neuron.weight_indices() {
            check_index("weight", weight_index, weights)?;
            weight_count += 1;
        }
        let input_count = neuron.input_count();
        if weight_count != input_count {
            return Err(SparseNetError::InconsistentGraphState(format!(
                "neuron {neuron_index} has {input_count} inputs but {weight_count} weights"
            )));
        }
        for synapse_index in neuron.inputs() {
            if is_index_input(synapse_index) {
                let input_index = input_index_from_synapse_index(synapse_index);
                check_index("input", input_index, self.net.input_data_size)?;
                continue;
            }
            let input_neuron = synapse_index as usize;
            check_index("neuron", input_neuron, self.net.neuron_count())?;
            if !self.contains(input_neuron) && !self.is_available(input_neuron) {
                return Err(SparseNetError::InconsistentGraphState(format!(
                    "input {input_neuron} of neuron {neuron_index} is neither committed nor part of the partial solution"
                )));
            }
        }
        Ok(())
    }

    /// Appends a neuron to the unit: its weights are copied and each of its inputs is
    /// routed either to an earlier local position or to a collected input slot.
    pub fn add_neuron(&mut self, neuron_index: usize) -> Result<()> {
        let neuron = self.net.neuron(neuron_index)?;
        self.validate(neuron_index, neuron)?;

        let position = self.partial.neuron_count();
        let weight_start = self.partial.weight_table.len();
        for weight_index in neuron.weight_indices() {
            self.partial.weight_table.push(self.net.weight(weight_index)?);
        }
        let weight_count = self.partial.weight_table.len() - weight_start;
        if weight_count > 0 {
            self.partial
                .weight_indices
                .push(SynapseInterval::new(weight_start as i64, weight_count));
            self.partial.weight_synapse_number.push(1);
        } else {
            self.partial.weight_synapse_number.push(0);
        }
        self.partial.bias_index.push(self.partial.weight_table.len());
        self.partial.weight_table.push(self.net.weight(neuron.bias_idx)?);
        self.partial.memory_filter_index.push(self.partial.weight_table.len());
        self.partial
            .weight_table
            .push(self.net.weight(neuron.memory_filter_idx)?);

        // ranges of one neuron never continue into the next one
        let mut inside = vec![];
        for synapse_index in neuron.inputs() {
            let inside_index = match self.source_of(synapse_index) {
                Source::Local(local) => local as i64,
                Source::Slot(slot) => synapse_index_from_input_index(slot),
                Source::Collect => {
                    let slot = self.input_slots.len();
                    self.input_slots.insert(synapse_index, slot);
                    append_index(&mut self.partial.input_data, synapse_index);
                    synapse_index_from_input_index(slot)
                }
            };
            append_index(&mut inside, inside_index);
        }
        self.partial.index_synapse_number.push(inside.len());
        self.partial.inside_indices.extend(inside);

        self.partial
            .neuron_transfer_functions
            .push(neuron.transfer_function);
        append_index(&mut self.partial.output_data, neuron_index as i64);
        self.local_positions.insert(neuron_index, position);
        trace!(
            neuron_index,
            position,
            size = self.partial.estimated_size_bytes(),
            "added neuron to partial solution"
        );
        Ok(())
    }

    pub fn finish(self) -> PartialSolution {
        self.partial
    }
}
