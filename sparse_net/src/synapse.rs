//! Run-length encoded index ranges ("synapses").
//!
//! A single signed index space is shared by neurons and external inputs:
//! non-negative indices address neurons and ranges over them walk upwards,
//! negative indices address input slots through `-(input_index + 1)` and
//! ranges over them walk downwards (`-1, -2, ..` are inputs `0, 1, ..`).

use serde::{Deserialize, Serialize};

/// A contiguous run of indices in traversal order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynapseInterval {
    pub starts: i64,
    pub interval_size: usize,
}

impl SynapseInterval {
    pub fn new(starts: i64, interval_size: usize) -> Self {
        Self {
            starts,
            interval_size,
        }
    }

    /// Range over `interval_size` consecutive input slots starting at `first_input`.
    pub fn inputs(first_input: usize, interval_size: usize) -> Self {
        Self::new(synapse_index_from_input_index(first_input), interval_size)
    }

    /// Range over `interval_size` consecutive neurons starting at `first_neuron`.
    pub fn neurons(first_neuron: usize, interval_size: usize) -> Self {
        Self::new(first_neuron as i64, interval_size)
    }

    pub fn is_input(&self) -> bool {
        is_index_input(self.starts)
    }

    /// The index which would directly continue this range.
    pub fn next_index(&self) -> i64 {
        let size = self.interval_size as i64;
        if self.is_input() {
            self.starts - size
        } else {
            self.starts + size
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> {
        let starts = self.starts;
        let downwards = self.is_input();
        (0..self.interval_size as i64).map(move |offset| {
            if downwards {
                starts - offset
            } else {
                starts + offset
            }
        })
    }
}

pub fn synapse_index_from_input_index(input_index: usize) -> i64 {
    -(input_index as i64) - 1
}

/// Inverse of [`synapse_index_from_input_index`]; `synapse_index` must be negative.
pub fn input_index_from_synapse_index(synapse_index: i64) -> usize {
    debug_assert!(is_index_input(synapse_index));
    (-(synapse_index + 1)) as usize
}

pub fn is_index_input(synapse_index: i64) -> bool {
    synapse_index < 0
}

/// Appends `index` to the sequence: the last range is extended when `index` is its
/// [`SynapseInterval::next_index`], otherwise a new range of size 1 is opened.
/// The result only depends on the previous sequence and `index`.
pub fn append_index(intervals: &mut Vec<SynapseInterval>, index: i64) {
    match intervals.last_mut() {
        Some(last) if last.interval_size > 0 && last.next_index() == index => {
            last.interval_size += 1;
        }
        _ => intervals.push(SynapseInterval::new(index, 1)),
    }
}

/// Read-only view over a sequence of ranges.
#[derive(Clone, Copy, Debug)]
pub struct SynapseIterator<'a> {
    intervals: &'a [SynapseInterval],
}

impl<'a> SynapseIterator<'a> {
    pub fn new(intervals: &'a [SynapseInterval]) -> Self {
        Self { intervals }
    }

    /// Number of indices in all ranges.
    pub fn size(&self) -> usize {
        self.intervals.iter().map(|i| i.interval_size).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + 'a {
        self.intervals.iter().flat_map(|interval| interval.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_index_bijection() {
        for input in [0usize, 1, 7, 1023] {
            let synapse_index = synapse_index_from_input_index(input);
            assert!(is_index_input(synapse_index));
            assert_eq!(input_index_from_synapse_index(synapse_index), input);
        }
        assert_eq!(synapse_index_from_input_index(0), -1);
        assert!(!is_index_input(0));
    }

    #[test]
    fn test_interval_traversal_direction() {
        let inputs = SynapseInterval::inputs(2, 3);
        assert_eq!(inputs.iter().collect::<Vec<_>>(), vec![-3, -4, -5]);
        assert_eq!(inputs.next_index(), -6);

        let neurons = SynapseInterval::neurons(4, 2);
        assert_eq!(neurons.iter().collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(neurons.next_index(), 6);
    }

    #[test]
    fn test_append_index_coalesces_contiguous_runs() {
        let mut intervals = vec![];
        for index in [3, 4, 5, 9, 10, -1, -2, -3, -5, 0] {
            append_index(&mut intervals, index);
        }
        assert_eq!(
            intervals,
            vec![
                SynapseInterval::new(3, 3),
                SynapseInterval::new(9, 2),
                SynapseInterval::new(-1, 3),
                SynapseInterval::new(-5, 1),
                SynapseInterval::new(0, 1),
            ]
        );
    }

    #[test]
    fn test_append_index_never_joins_inputs_with_neurons() {
        // -1 is followed by -2 in traversal order, 0 starts a neuron range
        let mut intervals = vec![SynapseInterval::inputs(0, 1)];
        append_index(&mut intervals, 0);
        assert_eq!(intervals.len(), 2);
    }

    #[test]
    fn test_iterator_size_and_order() {
        let intervals = vec![SynapseInterval::inputs(0, 2), SynapseInterval::neurons(7, 3)];
        let iter = SynapseIterator::new(&intervals);
        assert_eq!(iter.size(), 5);
        assert_eq!(iter.iter().collect::<Vec<_>>(), vec![-1, -2, 7, 8, 9]);
        assert_eq!(SynapseIterator::new(&[]).size(), 0);
    }
}
