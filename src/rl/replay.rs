//! Experience replay - bounded FIFO of transitions with uniform sampling.

use std::collections::VecDeque;

use rand::Rng;

/// One experience record. Immutable once stored.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: Vec<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_state: Vec<f32>,
    pub terminal: bool,
}

/// Ring buffer of transitions: insertion past capacity evicts the oldest
/// entry, sampling is uniform with replacement.
#[derive(Debug)]
pub struct ReplayBuffer {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample<R: Rng>(&self, batch_size: usize, rng: &mut R) -> Vec<Transition> {
        let mut batch = Vec::with_capacity(batch_size);
        if self.buffer.is_empty() {
            return batch;
        }
        for _ in 0..batch_size {
            let index = rng.random_range(0..self.buffer.len());
            batch.push(self.buffer[index].clone());
        }
        batch
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }
}
