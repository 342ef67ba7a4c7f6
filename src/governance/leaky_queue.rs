// Leaky Queue - Fixed-capacity queue keeping a running sum
use crate::types::Score;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Bounded FIFO of recent contributions
/// Pushing past capacity evicts the oldest value and subtracts it from the sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakyQueue {
    items: VecDeque<Score>,
    capacity: usize,
    sum: Score,
}

impl LeakyQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0,
        }
    }

    pub fn push(&mut self, value: Score) {
        if self.items.len() == self.capacity {
            if let Some(evicted) = self.items.pop_front() {
                self.sum -= evicted;
            }
        }
        self.items.push_back(value);
        self.sum += value;
    }

    pub fn sum(&self) -> Score {
        self.sum
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
