//! Discovery of the neurons that can be solved together.
//!
//! The [`NeuronRouter`] keeps one atomic state per neuron. Each call to
//! [`NeuronRouter::collect_subset`] starts a new iteration, lets a number of worker
//! threads reserve every neuron whose inputs are satisfied, and leaves the result in
//! the router's subset. The caller then walks the subset front to back, confirming
//! each neuron as processed (which satisfies the inputs of its dependents) or as
//! omitted (which makes it collectable again).

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
    thread,
};

use itertools::Itertools;
use tracing::{debug, trace};

use crate::{
    error::{check_index, Result, SparseNetError},
    net::SparseNet,
    solution::neuron_cost_bytes,
};

const COUNT_BITS: u32 = 32;
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;
const TAG_OPEN: u64 = 0;
const TAG_PROCESSED: u64 = 1;
/// Tags from here on mean "reserved", offset by the reserving iteration.
const TAG_RESERVED: u64 = 2;
const MAX_ITERATION: u32 = u32::MAX - TAG_RESERVED as u32;

/// Decoded form of a neuron state word. The number of satisfied neuron inputs lives
/// in the low bits of every state, the tag in the high bits, so the two never alias.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NeuronState {
    Open { satisfied: u32 },
    Reserved { iteration: u32, satisfied: u32 },
    Processed,
}

impl NeuronState {
    fn decode(word: u64) -> Self {
        let satisfied = (word & COUNT_MASK) as u32;
        match word >> COUNT_BITS {
            TAG_OPEN => NeuronState::Open { satisfied },
            TAG_PROCESSED => NeuronState::Processed,
            tag => NeuronState::Reserved {
                iteration: (tag - TAG_RESERVED) as u32,
                satisfied,
            },
        }
    }

    fn encode(self) -> u64 {
        match self {
            NeuronState::Open { satisfied } => (TAG_OPEN << COUNT_BITS) | satisfied as u64,
            NeuronState::Reserved {
                iteration,
                satisfied,
            } => ((iteration as u64 + TAG_RESERVED) << COUNT_BITS) | satisfied as u64,
            NeuronState::Processed => TAG_PROCESSED << COUNT_BITS,
        }
    }
}

/// Neurons reserved by the workers of one collection, with their summed cost.
#[derive(Debug, Default)]
struct Collected {
    entries: Vec<(usize, usize)>,
    bytes: usize,
}

/// Clears the running flag when a collection ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct NeuronRouter<'a> {
    net: &'a SparseNet,
    states: Vec<AtomicU64>,
    /// Number of neuron references among the inputs of each neuron.
    input_counts: Vec<u32>,
    /// For each neuron, the neurons reading it, once per reference.
    dependents: Vec<Vec<usize>>,
    iteration: AtomicU32,
    processed: AtomicUsize,
    collection_running: AtomicBool,
    subset: Mutex<VecDeque<usize>>,
}

impl<'a> NeuronRouter<'a> {
    pub fn new(net: &'a SparseNet) -> Result<Self> {
        let neuron_count = net.neuron_count();
        let mut input_counts = Vec::with_capacity(neuron_count);
        let mut dependents = vec![vec![]; neuron_count];
        for (neuron_index, neuron) in net.neuron_array.iter().enumerate() {
            let mut count = 0u32;
            for input in neuron.neuron_inputs() {
                check_index("neuron", input, neuron_count)?;
                dependents[input].push(neuron_index);
                count = count.checked_add(1).ok_or_else(|| {
                    SparseNetError::InvalidState(format!(
                        "neuron {neuron_index} has too many inputs to route"
                    ))
                })?;
            }
            input_counts.push(count);
        }
        let states = (0..neuron_count)
            .map(|_| AtomicU64::new(NeuronState::Open { satisfied: 0 }.encode()))
            .collect();
        Ok(Self {
            net,
            states,
            input_counts,
            dependents,
            iteration: AtomicU32::new(0),
            processed: AtomicUsize::new(0),
            collection_running: AtomicBool::new(false),
            subset: Mutex::new(VecDeque::new()),
        })
    }

    pub fn neuron_count(&self) -> usize {
        self.states.len()
    }

    /// Number of collections started so far.
    pub fn iteration(&self) -> u32 {
        self.iteration.load(Ordering::Acquire)
    }

    /// True once every neuron, the output neurons included, is processed.
    pub fn finished(&self) -> bool {
        self.processed.load(Ordering::Acquire) == self.neuron_count()
    }

    fn state(&self, neuron_index: usize) -> NeuronState {
        NeuronState::decode(self.states[neuron_index].load(Ordering::Acquire))
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.collection_running.load(Ordering::Acquire) {
            Err(SparseNetError::InvalidState(
                "a subset collection is running".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn lock_subset(&self) -> Result<MutexGuard<'_, VecDeque<usize>>> {
        self.subset
            .lock()
            .map_err(|_| SparseNetError::InvalidState("subset lock is poisoned".to_string()))
    }

    pub fn is_neuron_processed(&self, neuron_index: usize) -> Result<bool> {
        check_index("neuron", neuron_index, self.neuron_count())?;
        Ok(self.state(neuron_index) == NeuronState::Processed)
    }

    pub fn is_neuron_reserved(&self, neuron_index: usize) -> Result<bool> {
        check_index("neuron", neuron_index, self.neuron_count())?;
        Ok(matches!(
            self.state(neuron_index),
            NeuronState::Reserved { .. }
        ))
    }

    /// Open with every neuron input processed.
    pub fn is_neuron_solvable(&self, neuron_index: usize) -> Result<bool> {
        check_index("neuron", neuron_index, self.neuron_count())?;
        Ok(matches!(
            self.state(neuron_index),
            NeuronState::Open { satisfied } if satisfied == self.input_counts[neuron_index]
        ))
    }

    /// Reserved by the latest collection.
    pub fn is_neuron_in_progress(&self, neuron_index: usize) -> Result<bool> {
        check_index("neuron", neuron_index, self.neuron_count())?;
        Ok(matches!(
            self.state(neuron_index),
            NeuronState::Reserved { iteration, .. } if iteration == self.iteration()
        ))
    }

    /// Runs `to_run` with every neuron input of `neuron_index`.
    pub fn for_each_neuron_input(
        &self,
        neuron_index: usize,
        to_run: impl FnMut(usize),
    ) -> Result<()> {
        self.net.neuron(neuron_index)?.neuron_inputs().for_each(to_run);
        Ok(())
    }

    /// In non strict mode inputs reserved in `iteration` count as satisfied.
    fn is_candidate(&self, neuron_index: usize, iteration: u32, strict: bool) -> bool {
        let NeuronState::Open { satisfied } = self.state(neuron_index) else {
            return false;
        };
        let required = self.input_counts[neuron_index];
        if satisfied == required {
            return true;
        }
        if strict {
            return false;
        }
        self.net.neuron_array[neuron_index]
            .neuron_inputs()
            .all(|input| match self.state(input) {
                NeuronState::Processed => true,
                NeuronState::Reserved {
                    iteration: reserved_in,
                    ..
                } => reserved_in == iteration,
                NeuronState::Open { .. } => false,
            })
    }

    fn try_reserve(&self, neuron_index: usize, iteration: u32) -> bool {
        let cell = &self.states[neuron_index];
        let mut current = cell.load(Ordering::Acquire);
        loop {
            let NeuronState::Open { satisfied } = NeuronState::decode(current) else {
                return false;
            };
            let reserved = NeuronState::Reserved {
                iteration,
                satisfied,
            }
            .encode();
            match cell.compare_exchange_weak(current, reserved, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Moves a reserved neuron back to open, keeping its satisfied input count.
    fn release(&self, neuron_index: usize) -> Result<()> {
        let cell = &self.states[neuron_index];
        let mut current = cell.load(Ordering::Acquire);
        loop {
            let NeuronState::Reserved { satisfied, .. } = NeuronState::decode(current) else {
                return Err(SparseNetError::InvalidState(format!(
                    "neuron {neuron_index} is not reserved"
                )));
            };
            let open = NeuronState::Open { satisfied }.encode();
            match cell.compare_exchange_weak(current, open, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn mark_processed(&self, neuron_index: usize) -> Result<()> {
        let cell = &self.states[neuron_index];
        let current = cell.load(Ordering::Acquire);
        if !matches!(NeuronState::decode(current), NeuronState::Reserved { .. }) {
            return Err(SparseNetError::InvalidState(format!(
                "neuron {neuron_index} is not reserved"
            )));
        }
        cell.compare_exchange(
            current,
            NeuronState::Processed.encode(),
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .map_err(|_| {
            SparseNetError::InvalidState(format!("neuron {neuron_index} changed while confirmed"))
        })?;
        for dependent in &self.dependents[neuron_index] {
            // only the count bits move, whatever the dependent's tag is
            self.states[*dependent].fetch_add(1, Ordering::AcqRel);
        }
        self.processed.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn next_iteration(&self) -> u32 {
        let next = match self.iteration.load(Ordering::Acquire) {
            MAX_ITERATION => 1,
            current => current + 1,
        };
        self.iteration.store(next, Ordering::Release);
        next
    }

    /// Scans neurons `first, first + stride, ..` reserving candidates until the
    /// worker's own running total would exceed the budget. Everything a worker holds
    /// lies below the candidate, so a rejected neuron can never be part of the final
    /// prefix; it lowers `cutoff` and every worker stops above it.
    #[allow(clippy::too_many_arguments)]
    fn collect_worker(
        &self,
        first: usize,
        stride: usize,
        iteration: u32,
        memory_budget_bytes: usize,
        strict: bool,
        cutoff: &AtomicUsize,
        collected: &Mutex<Collected>,
    ) -> Result<()> {
        let mut reserved = vec![];
        let mut running_bytes = 0usize;
        let mut outcome = Ok(());
        for neuron_index in (first..self.neuron_count()).step_by(stride) {
            if neuron_index > cutoff.load(Ordering::Acquire) {
                break;
            }
            if !self.is_candidate(neuron_index, iteration, strict)
                || !self.try_reserve(neuron_index, iteration)
            {
                continue;
            }
            let cost = neuron_cost_bytes(&self.net.neuron_array[neuron_index]);
            match running_bytes.checked_add(cost) {
                Some(total) if total <= memory_budget_bytes => {
                    running_bytes = total;
                    reserved.push((neuron_index, cost));
                }
                _ => {
                    outcome = self.release(neuron_index);
                    cutoff.fetch_min(neuron_index, Ordering::AcqRel);
                    break;
                }
            }
        }
        // reserved neurons are always handed over, so the caller can release them
        let mut collected = collected.lock().map_err(|_| {
            SparseNetError::InvalidState("collection lock is poisoned".to_string())
        })?;
        collected.bytes += running_bytes;
        collected.entries.extend(reserved);
        outcome
    }

    /// Collects the next subset of neurons which can be solved together and returns it
    /// in ascending order. The subset stays in the router until every element of it
    /// is confirmed.
    ///
    /// In strict mode a neuron is collected only when all its neuron inputs are
    /// processed. Otherwise inputs reserved in this same collection are accepted too.
    /// The sum of the neurons' [`neuron_cost_bytes`] never exceeds `memory_budget_bytes`.
    pub fn collect_subset(
        &self,
        max_threads: usize,
        memory_budget_bytes: usize,
        strict: bool,
    ) -> Result<Vec<usize>> {
        if self
            .collection_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SparseNetError::InvalidState(
                "a subset collection is already running".to_string(),
            ));
        }
        let _running = RunningGuard(&self.collection_running);
        if !self.lock_subset()?.is_empty() {
            return Err(SparseNetError::InvalidState(
                "the previous subset is not confirmed".to_string(),
            ));
        }

        let iteration = self.next_iteration();
        let threads = max_threads.clamp(1, self.neuron_count().max(1));
        let collected = Mutex::new(Collected::default());
        let cutoff = AtomicUsize::new(usize::MAX);
        let results = thread::scope(|scope| {
            let handles = (0..threads)
                .map(|first| {
                    let collected = &collected;
                    let cutoff = &cutoff;
                    scope.spawn(move || {
                        self.collect_worker(
                            first,
                            threads,
                            iteration,
                            memory_budget_bytes,
                            strict,
                            cutoff,
                            collected,
                        )
                    })
                })
                .collect_vec();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(SparseNetError::InvalidState(
                            "subset collection worker panicked".to_string(),
                        ))
                    })
                })
                .collect_vec()
        });
        let Collected {
            entries,
            bytes: reserved_bytes,
        } = collected.into_inner().map_err(|_| {
            SparseNetError::InvalidState("collection lock is poisoned".to_string())
        })?;
        let cutoff = cutoff.into_inner();
        let failure = results.into_iter().find_map(|result| result.err());

        // keep the longest ascending prefix within budget, release everything else
        let mut subset = vec![];
        let mut used_bytes = 0;
        let mut full = failure.is_some();
        for (neuron_index, cost) in entries.into_iter().sorted() {
            full |= neuron_index >= cutoff || used_bytes + cost > memory_budget_bytes;
            if full {
                self.release(neuron_index)?;
            } else {
                used_bytes += cost;
                subset.push(neuron_index);
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }
        if subset.is_empty() && cutoff != usize::MAX {
            let required = neuron_cost_bytes(&self.net.neuron_array[cutoff]);
            return Err(SparseNetError::ResourceExhausted {
                required,
                budget: memory_budget_bytes,
            });
        }

        trace!(iteration, subset = ?subset, "collected subset");
        debug!(
            iteration,
            strict,
            threads,
            neurons = subset.len(),
            bytes = used_bytes,
            reserved_bytes,
            "collected subset"
        );
        self.lock_subset()?.extend(subset.iter().copied());
        Ok(subset)
    }

    pub fn subset_size(&self) -> Result<usize> {
        self.ensure_idle()?;
        Ok(self.lock_subset()?.len())
    }

    pub fn neuron_index_from_subset(&self, subset_index: usize) -> Result<usize> {
        self.ensure_idle()?;
        let subset = self.lock_subset()?;
        subset
            .get(subset_index)
            .copied()
            .ok_or_else(|| SparseNetError::out_of_range("subset", subset_index, subset.len()))
    }

    /// The next neuron of the subset waiting for confirmation, if any.
    pub fn first_neuron_from_subset(&self) -> Result<Option<usize>> {
        self.ensure_idle()?;
        Ok(self.lock_subset()?.front().copied())
    }

    fn pop_first(&self, neuron_index: usize) -> Result<()> {
        self.ensure_idle()?;
        check_index("neuron", neuron_index, self.neuron_count())?;
        let mut subset = self.lock_subset()?;
        match subset.front().copied() {
            Some(first) if first == neuron_index => {
                subset.pop_front();
                Ok(())
            }
            first => Err(SparseNetError::InvalidState(format!(
                "neuron {neuron_index} is not the first element of the subset (first is {first:?})"
            ))),
        }
    }

    /// Marks the first neuron of the subset as processed, satisfying it as an input
    /// of every neuron reading it.
    pub fn confirm_first_processed(&self, neuron_index: usize) -> Result<()> {
        self.pop_first(neuron_index)?;
        self.mark_processed(neuron_index)
    }

    /// Removes the first neuron from the subset without processing it, so a later
    /// collection may pick it up again.
    pub fn confirm_first_omitted(&self, neuron_index: usize) -> Result<()> {
        self.pop_first(neuron_index)?;
        self.release(neuron_index)
    }

    /// Omits every neuron still waiting in the subset.
    pub fn reset_remaining_subset(&self) -> Result<()> {
        self.ensure_idle()?;
        let remaining = self.lock_subset()?.drain(..).collect_vec();
        for neuron_index in remaining {
            self.release(neuron_index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rstest::rstest;

    use super::*;
    use crate::{net::SparseNetBuilder, testing::chain_net};

    const BIG_BUDGET: usize = 1 << 40;

    fn dense_net(layer_sizes: &[usize]) -> SparseNet {
        SparseNetBuilder::new()
            .input_size(5)
            .expected_input_range(5.0)
            .seed(1)
            .dense_layers(layer_sizes)
            .unwrap()
    }

    fn confirm_all(router: &NeuronRouter) {
        while let Some(neuron_index) = router.first_neuron_from_subset().unwrap() {
            router.confirm_first_processed(neuron_index).unwrap();
        }
    }

    #[test]
    fn test_state_encoding() {
        for state in [
            NeuronState::Open { satisfied: 0 },
            NeuronState::Open { satisfied: 17 },
            NeuronState::Reserved {
                iteration: 1,
                satisfied: 3,
            },
            NeuronState::Reserved {
                iteration: MAX_ITERATION,
                satisfied: u32::MAX,
            },
            NeuronState::Processed,
        ] {
            assert_eq!(NeuronState::decode(state.encode()), state);
        }
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(8)]
    fn test_dense_layers_are_collected_one_by_one(#[case] threads: usize) {
        let layer_sizes = [2, 3, 3, 5];
        let net = dense_net(&layer_sizes);
        let router = NeuronRouter::new(&net).unwrap();
        let mut layer_start = 0;
        for layer_size in layer_sizes {
            assert!(!router.finished());
            let subset = router.collect_subset(threads, BIG_BUDGET, true).unwrap();
            assert_eq!(subset, (layer_start..layer_start + layer_size).collect_vec());
            confirm_all(&router);
            layer_start += layer_size;
        }
        assert!(router.finished());
        assert_eq!(router.iteration(), layer_sizes.len() as u32);
        assert!(router.collect_subset(threads, BIG_BUDGET, true).unwrap().is_empty());
    }

    #[test]
    fn test_every_neuron_is_collected_exactly_once() {
        let net = dense_net(&[4, 6, 1, 5]);
        let router = NeuronRouter::new(&net).unwrap();
        let mut seen = HashSet::new();
        while !router.finished() {
            let subset = router.collect_subset(4, BIG_BUDGET, true).unwrap();
            assert!(!subset.is_empty());
            for neuron_index in &subset {
                router
                    .for_each_neuron_input(*neuron_index, |input| {
                        assert!(router.is_neuron_processed(input).unwrap())
                    })
                    .unwrap();
                assert!(seen.insert(*neuron_index));
            }
            confirm_all(&router);
        }
        assert_eq!(seen.len(), net.neuron_count());
    }

    #[test]
    fn test_omitted_neurons_are_collected_again() {
        let net = dense_net(&[3, 2]);
        let router = NeuronRouter::new(&net).unwrap();
        let subset = router.collect_subset(2, BIG_BUDGET, true).unwrap();
        assert_eq!(subset, vec![0, 1, 2]);
        assert!(router.is_neuron_in_progress(1).unwrap());
        router.confirm_first_processed(0).unwrap();
        router.confirm_first_omitted(1).unwrap();
        router.reset_remaining_subset().unwrap();
        assert!(router.is_neuron_solvable(1).unwrap());
        assert!(router.is_neuron_solvable(2).unwrap());
        assert!(!router.is_neuron_reserved(2).unwrap());

        let subset = router.collect_subset(2, BIG_BUDGET, true).unwrap();
        assert_eq!(subset, vec![1, 2]);
    }

    #[test]
    fn test_subset_protocol_violations() {
        let net = chain_net(3);
        let router = NeuronRouter::new(&net).unwrap();
        assert_eq!(router.collect_subset(2, BIG_BUDGET, true).unwrap(), vec![0]);
        assert!(matches!(
            router.collect_subset(2, BIG_BUDGET, true),
            Err(SparseNetError::InvalidState(_))
        ));
        assert!(matches!(
            router.confirm_first_processed(1),
            Err(SparseNetError::InvalidState(_))
        ));
        assert!(matches!(
            router.neuron_index_from_subset(1),
            Err(SparseNetError::IndexOutOfRange { index: 1, len: 1, .. })
        ));
        assert!(matches!(
            router.is_neuron_processed(3),
            Err(SparseNetError::IndexOutOfRange { index: 3, .. })
        ));
        assert_eq!(router.neuron_index_from_subset(0).unwrap(), 0);
        assert_eq!(router.subset_size().unwrap(), 1);

        router.collection_running.store(true, Ordering::Release);
        assert!(matches!(
            router.first_neuron_from_subset(),
            Err(SparseNetError::InvalidState(_))
        ));
        router.collection_running.store(false, Ordering::Release);
        router.confirm_first_processed(0).unwrap();
        assert!(router.is_neuron_solvable(1).unwrap());
    }

    #[test]
    fn test_non_strict_collection_accepts_reserved_inputs() {
        let net = chain_net(3);
        let router = NeuronRouter::new(&net).unwrap();
        let subset = router.collect_subset(1, BIG_BUDGET, false).unwrap();
        assert_eq!(subset, vec![0, 1, 2]);
        confirm_all(&router);
        assert!(router.finished());
    }

    #[rstest]
    #[case(2)]
    #[case(4)]
    #[case(7)]
    fn test_non_strict_collection_with_threads(#[case] threads: usize) {
        let net = chain_net(40);
        let router = NeuronRouter::new(&net).unwrap();
        let mut seen = HashSet::new();
        while !router.finished() {
            let subset = router.collect_subset(threads, BIG_BUDGET, false).unwrap();
            assert!(!subset.is_empty());
            assert!(subset.windows(2).all(|pair| pair[0] < pair[1]));
            let members = subset.iter().copied().collect::<HashSet<_>>();
            for neuron_index in &subset {
                router
                    .for_each_neuron_input(*neuron_index, |input| {
                        assert!(
                            router.is_neuron_processed(input).unwrap()
                                || members.contains(&input)
                        )
                    })
                    .unwrap();
                assert!(seen.insert(*neuron_index));
            }
            confirm_all(&router);
        }
        assert_eq!(seen.len(), net.neuron_count());
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    fn test_budget_limits_subset_deterministically(#[case] threads: usize) {
        let net = dense_net(&[6, 2]);
        let cost = neuron_cost_bytes(&net.neuron_array[0]);
        let router = NeuronRouter::new(&net).unwrap();
        let subset = router.collect_subset(threads, 4 * cost, true).unwrap();
        assert_eq!(subset, vec![0, 1, 2, 3]);
        assert!(router.is_neuron_solvable(4).unwrap());
        assert!(router.is_neuron_solvable(5).unwrap());
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(16)]
    fn test_budget_limits_wide_layer(#[case] threads: usize) {
        let net = dense_net(&[3000, 1]);
        let cost = neuron_cost_bytes(&net.neuron_array[0]);
        let router = NeuronRouter::new(&net).unwrap();
        let subset = router.collect_subset(threads, 1234 * cost + cost / 2, true).unwrap();
        assert_eq!(subset, (0..1234).collect_vec());
        assert!((1234..3000).all(|neuron_index| router.is_neuron_solvable(neuron_index).unwrap()));
        confirm_all(&router);
        let subset = router.collect_subset(threads, 1234 * cost, true).unwrap();
        assert_eq!(subset, (1234..2468).collect_vec());
    }

    #[test]
    fn test_budget_below_single_neuron() {
        let net = chain_net(2);
        let router = NeuronRouter::new(&net).unwrap();
        assert!(matches!(
            router.collect_subset(2, 1, true),
            Err(SparseNetError::ResourceExhausted { budget: 1, .. })
        ));
        assert!(router.is_neuron_solvable(0).unwrap());
    }
}
