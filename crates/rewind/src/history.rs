use std::collections::VecDeque;

use thiserror::Error;

const MAX_PREALLOCATED_ENTRIES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history capacity must be greater than zero, got {capacity}")]
    InvalidConfiguration { capacity: usize },
    #[error("history index {index} out of range for {len} entries")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("history buffer is empty")]
    EmptyBuffer,
}

/// Bracketing pair for a time query. `t` is the normalized position of the
/// target between `before` and `after`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolation<'a, T> {
    pub before: &'a T,
    pub after: &'a T,
    pub t: f32,
}

/// Fixed-capacity history ordered oldest (index 0) to newest. Once full, every
/// push evicts the oldest entry.
///
/// Time queries take a key selector and assume entries are ascending by that key.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, HistoryError> {
        if capacity == 0 {
            return Err(HistoryError::InvalidConfiguration { capacity });
        }
        Ok(Self {
            entries: VecDeque::with_capacity(capacity.min(MAX_PREALLOCATED_ENTRIES)),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    pub fn push(&mut self, item: T) {
        if self.is_full() {
            self.entries.pop_front();
        }
        self.entries.push_back(item);
    }

    pub fn get(&self, index: usize) -> Result<&T, HistoryError> {
        self.entries.get(index).ok_or(HistoryError::IndexOutOfRange {
            index,
            len: self.entries.len(),
        })
    }

    pub fn oldest(&self) -> Result<&T, HistoryError> {
        self.entries.front().ok_or(HistoryError::EmptyBuffer)
    }

    pub fn newest(&self) -> Result<&T, HistoryError> {
        self.entries.back().ok_or(HistoryError::EmptyBuffer)
    }

    pub fn pop_newest(&mut self) -> Result<T, HistoryError> {
        self.entries.pop_back().ok_or(HistoryError::EmptyBuffer)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keeps the `count` newest entries.
    pub fn trim_to_count(&mut self, count: usize) {
        let len = self.entries.len();
        if count >= len {
            return;
        }
        self.entries.drain(..len - count);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Index of the entry whose key is nearest `target`; ties go to the newer entry.
    pub fn find_closest_index<F>(&self, target: f32, key: F) -> Option<usize>
    where
        F: Fn(&T) -> f32,
    {
        if self.entries.is_empty() {
            return None;
        }

        let after = self.entries.partition_point(|entry| key(entry) <= target);
        if after == 0 {
            return Some(0);
        }
        let before = after - 1;
        if after == self.entries.len() {
            return Some(before);
        }

        let before_distance = (target - key(&self.entries[before])).abs();
        let after_distance = (key(&self.entries[after]) - target).abs();
        if after_distance <= before_distance {
            Some(after)
        } else {
            Some(before)
        }
    }

    /// Returns `None` for an empty buffer or a NaN target. Targets outside the
    /// recorded range clamp to the oldest or newest bracket with `t = 0`.
    pub fn interpolation_states<F>(&self, target: f32, key: F) -> Option<Interpolation<'_, T>>
    where
        F: Fn(&T) -> f32,
    {
        let oldest = self.entries.front()?;
        let newest = self.entries.back()?;
        if target.is_nan() {
            return None;
        }

        if self.entries.len() == 1 {
            return Some(Interpolation {
                before: oldest,
                after: oldest,
                t: 0.0,
            });
        }

        let oldest_bracket = Interpolation {
            before: oldest,
            after: &self.entries[1],
            t: 0.0,
        };
        let newest_bracket = Interpolation {
            before: newest,
            after: newest,
            t: 0.0,
        };
        if target <= key(oldest) {
            return Some(oldest_bracket);
        }
        if target >= key(newest) {
            return Some(newest_bracket);
        }

        // A NaN key breaks the ordering, so the split point may land on either end.
        let after_index = self.entries.partition_point(|entry| key(entry) <= target);
        if after_index == 0 {
            return Some(oldest_bracket);
        }
        let Some(after) = self.entries.get(after_index) else {
            return Some(newest_bracket);
        };
        let before = &self.entries[after_index - 1];
        let before_key = key(before);
        let span = key(after) - before_key;
        let t = if span > 0.0 {
            ((target - before_key) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Some(Interpolation { before, after, t })
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;
    use crate::Snapshot;

    fn timestamp(snapshot: &Snapshot) -> f32 {
        snapshot.timestamp
    }

    fn at(time: f32) -> Snapshot {
        Snapshot::new(Vec3::splat(time), Quat::IDENTITY, time)
    }

    fn buffer_with(capacity: usize, times: &[f32]) -> HistoryBuffer<Snapshot> {
        let mut buffer = HistoryBuffer::new(capacity).expect("buffer");
        for time in times {
            buffer.push(at(*time));
        }
        buffer
    }

    fn timestamps(buffer: &HistoryBuffer<Snapshot>) -> Vec<f32> {
        buffer.iter().map(timestamp).collect()
    }

    #[test]
    fn new_buffer_is_empty_with_requested_capacity() {
        let buffer = HistoryBuffer::<Snapshot>::new(10).expect("buffer");

        assert_eq!(buffer.capacity(), 10);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let error = HistoryBuffer::<Snapshot>::new(0).expect_err("zero capacity");
        assert_eq!(error, HistoryError::InvalidConfiguration { capacity: 0 });
    }

    #[test]
    fn len_never_exceeds_capacity() {
        for capacity in 1..6 {
            let mut buffer = HistoryBuffer::new(capacity).expect("buffer");
            for step in 0..20 {
                buffer.push(at(step as f32));
                assert!(buffer.len() <= capacity);
            }
            assert!(buffer.is_full());
        }
    }

    #[test]
    fn overflow_keeps_most_recent_entries_oldest_first() {
        let buffer = buffer_with(3, &[0.0, 1.0, 2.0, 3.0]);

        assert_eq!(buffer.len(), 3);
        assert_eq!(timestamps(&buffer), vec![1.0, 2.0, 3.0]);
        assert_eq!(buffer.oldest().expect("oldest").timestamp, 1.0);
        assert_eq!(buffer.newest().expect("newest").timestamp, 3.0);
    }

    #[test]
    fn wrapped_buffer_indexes_from_oldest() {
        let buffer = buffer_with(3, &[0.0, 1.0, 2.0, 3.0, 4.0]);

        assert_eq!(buffer.get(0).expect("index 0").timestamp, 2.0);
        assert_eq!(buffer.get(1).expect("index 1").timestamp, 3.0);
        assert_eq!(buffer.get(2).expect("index 2").timestamp, 4.0);
    }

    #[test]
    fn get_returns_entry_at_index() {
        let buffer = buffer_with(10, &[0.0, 1.0, 2.0]);
        let entry = buffer.get(1).expect("index 1");

        assert_eq!(entry.timestamp, 1.0);
        assert_eq!(entry.position, Vec3::ONE);
    }

    #[test]
    fn get_past_len_is_out_of_range() {
        let buffer = buffer_with(10, &[0.0]);
        assert_eq!(
            buffer.get(1),
            Err(HistoryError::IndexOutOfRange { index: 1, len: 1 })
        );
        assert_eq!(
            buffer.get(5),
            Err(HistoryError::IndexOutOfRange { index: 5, len: 1 })
        );

        let empty = HistoryBuffer::<Snapshot>::new(4).expect("buffer");
        assert_eq!(
            empty.get(0),
            Err(HistoryError::IndexOutOfRange { index: 0, len: 0 })
        );
    }

    #[test]
    fn empty_buffer_queries_fail() {
        let mut buffer = HistoryBuffer::<Snapshot>::new(4).expect("buffer");

        assert_eq!(buffer.oldest(), Err(HistoryError::EmptyBuffer));
        assert_eq!(buffer.newest(), Err(HistoryError::EmptyBuffer));
        assert_eq!(buffer.pop_newest(), Err(HistoryError::EmptyBuffer));
    }

    #[test]
    fn pop_newest_removes_exactly_one() {
        let mut buffer = buffer_with(10, &[0.0, 1.0, 2.0]);
        let popped = buffer.pop_newest().expect("pop");

        assert_eq!(popped.timestamp, 2.0);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.newest().expect("newest").timestamp, 1.0);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut buffer = buffer_with(5, &[0.0, 1.0, 2.0]);
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 5);
        buffer.push(at(9.0));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn trim_to_count_keeps_newest_entries() {
        let mut buffer = buffer_with(10, &[0.0, 1.0, 2.0, 3.0]);
        buffer.trim_to_count(2);

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.oldest().expect("oldest").timestamp, 2.0);
        assert_eq!(buffer.newest().expect("newest").timestamp, 3.0);
    }

    #[test]
    fn trim_to_count_at_or_above_len_is_noop() {
        let mut buffer = buffer_with(10, &[0.0, 1.0]);
        buffer.trim_to_count(2);
        buffer.trim_to_count(7);

        assert_eq!(timestamps(&buffer), vec![0.0, 1.0]);
    }

    #[test]
    fn trim_to_zero_empties_buffer() {
        let mut buffer = buffer_with(3, &[0.0, 1.0, 2.0]);
        buffer.trim_to_count(0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn find_closest_index_exact_and_between() {
        let buffer = buffer_with(10, &[0.0, 1.0, 2.0]);

        assert_eq!(buffer.find_closest_index(1.0, timestamp), Some(1));
        assert_eq!(buffer.find_closest_index(0.8, timestamp), Some(1));
        assert_eq!(buffer.find_closest_index(0.2, timestamp), Some(0));
        assert_eq!(buffer.find_closest_index(-3.0, timestamp), Some(0));
        assert_eq!(buffer.find_closest_index(9.0, timestamp), Some(2));
    }

    #[test]
    fn find_closest_index_breaks_ties_toward_newer() {
        let buffer = buffer_with(10, &[0.0, 1.0, 2.0]);
        assert_eq!(buffer.find_closest_index(0.5, timestamp), Some(1));
        assert_eq!(buffer.find_closest_index(1.5, timestamp), Some(2));
    }

    #[test]
    fn find_closest_index_on_empty_is_none() {
        let buffer = HistoryBuffer::<Snapshot>::new(3).expect("buffer");
        assert_eq!(buffer.find_closest_index(0.0, timestamp), None);
    }

    #[test]
    fn find_closest_index_uses_selected_key() {
        let mut buffer = HistoryBuffer::new(4).expect("buffer");
        for tick in [10_u32, 20, 30] {
            buffer.push(tick);
        }
        assert_eq!(buffer.find_closest_index(26.0, |tick| *tick as f32), Some(2));
    }

    #[test]
    fn interpolation_midway_returns_bracketing_pair() {
        let buffer = buffer_with(10, &[0.0, 1.0]);
        let states = buffer
            .interpolation_states(0.5, timestamp)
            .expect("interpolation");

        assert_eq!(states.before.timestamp, 0.0);
        assert_eq!(states.after.timestamp, 1.0);
        assert!((states.t - 0.5).abs() < 0.01);
    }

    #[test]
    fn interpolation_inside_longer_history_picks_adjacent_entries() {
        let buffer = buffer_with(10, &[0.0, 1.0, 2.0, 4.0]);
        let states = buffer
            .interpolation_states(3.0, timestamp)
            .expect("interpolation");

        assert_eq!(states.before.timestamp, 2.0);
        assert_eq!(states.after.timestamp, 4.0);
        assert!((states.t - 0.5).abs() < 1e-6);
    }

    #[test]
    fn interpolation_on_empty_is_none() {
        let buffer = HistoryBuffer::<Snapshot>::new(3).expect("buffer");
        assert!(buffer.interpolation_states(0.0, timestamp).is_none());
    }

    #[test]
    fn interpolation_at_nan_target_is_none() {
        let mut buffer = HistoryBuffer::new(4).expect("buffer");
        buffer.push(0.0_f32);
        buffer.push(1.0_f32);

        assert!(buffer.interpolation_states(f32::NAN, |key| *key).is_none());
    }

    #[test]
    fn interpolation_with_nan_keys_clamps_to_a_bracket() {
        let mut buffer = HistoryBuffer::new(4).expect("buffer");
        for key in [f32::NAN, 1.0, f32::NAN] {
            buffer.push(key);
        }

        let states = buffer
            .interpolation_states(0.5, |key| *key)
            .expect("interpolation");
        assert_eq!(states.t, 0.0);
        assert!(buffer.interpolation_states(2.0, |key| *key).is_some());
    }

    #[test]
    fn huge_capacity_does_not_preallocate() {
        let mut buffer = HistoryBuffer::new(usize::MAX).expect("buffer");
        buffer.push(1_u8);

        assert_eq!(buffer.capacity(), usize::MAX);
        assert_eq!(buffer.len(), 1);
        assert!(!buffer.is_full());
    }

    #[test]
    fn interpolation_single_entry_returns_same_entry() {
        let buffer = buffer_with(3, &[1.0]);
        let states = buffer
            .interpolation_states(7.0, timestamp)
            .expect("interpolation");

        assert_eq!(states.before.timestamp, states.after.timestamp);
        assert_eq!(states.t, 0.0);
    }

    #[test]
    fn interpolation_before_history_clamps_to_oldest() {
        let buffer = buffer_with(10, &[1.0, 2.0, 3.0]);
        let states = buffer
            .interpolation_states(-5.0, timestamp)
            .expect("interpolation");

        assert_eq!(states.before.timestamp, 1.0);
        assert_eq!(states.after.timestamp, 2.0);
        assert_eq!(states.t, 0.0);
    }

    #[test]
    fn interpolation_after_history_clamps_to_newest() {
        let buffer = buffer_with(10, &[0.0, 1.0, 2.0]);
        let states = buffer
            .interpolation_states(5.0, timestamp)
            .expect("interpolation");

        assert_eq!(states.before.timestamp, 2.0);
        assert_eq!(states.t, 0.0);
    }

    #[test]
    fn interpolation_t_stays_in_unit_range() {
        let buffer = buffer_with(64, &[0.0, 0.3, 0.7, 1.2, 2.0]);
        let mut target = -0.5;
        while target < 2.5 {
            let states = buffer
                .interpolation_states(target, timestamp)
                .expect("interpolation");
            assert!((0.0..=1.0).contains(&states.t), "t={} at {target}", states.t);
            assert!(states.before.timestamp <= states.after.timestamp);
            target += 0.05;
        }
    }
}
