// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/moisture-sim

//! Bounded per-device reading history

use std::collections::VecDeque;

use super::Reading;

/// Fixed-capacity FIFO of readings, oldest evicted first
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    readings: VecDeque<Reading>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            // Grows on demand, large capacities are rarely filled
            readings: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    pub fn push(&mut self, reading: Reading) {
        while self.readings.len() >= self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    /// Up to `limit` most recent readings, newest last
    pub fn tail(&self, limit: usize) -> Vec<Reading> {
        let skip = self.readings.len().saturating_sub(limit);
        self.readings.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
