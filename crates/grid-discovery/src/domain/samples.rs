//! Per-neighbor RTT sample window.

use std::collections::VecDeque;

use super::value_objects::{Distance, DistanceMode};

/// Fixed-length FIFO of the most recent RTT samples for one neighbor.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl SampleWindow {
    /// A window of at least one sample.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sample, dropping the oldest one once full.
    pub fn push(&mut self, rtt_ms: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(rtt_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn samples(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    /// Collapse the window into a distance.
    ///
    /// `Unknown` until the window is full.
    pub fn distance(&self, mode: DistanceMode) -> Distance {
        if !self.is_full() {
            return Distance::Unknown;
        }
        let value = match mode {
            DistanceMode::Min => self.samples.iter().copied().fold(f64::INFINITY, f64::min),
            DistanceMode::Mean => self.samples.iter().sum::<f64>() / self.samples.len() as f64,
        };
        Distance::Millis(value)
    }
}
