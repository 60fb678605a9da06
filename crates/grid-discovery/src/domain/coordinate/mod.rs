//! # Vivaldi Network Coordinates
//!
//! Embeds nodes in a low-dimensional Euclidean space so that the distance
//! between two coordinates approximates their round-trip latency in
//! milliseconds.
//!
//! The update is the adaptive spring-relaxation step: each node keeps a
//! local error estimate in `[0, 1]`, and the step size shrinks as the
//! node grows more confident than the peer it measured.

mod vivaldi;

pub use vivaldi::{VivaldiParams, VivaldiState};

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Number of coordinate dimensions, fixed at build time.
pub const DIMENSIONS: usize = 3;

/// Largest RTT sample accepted by the update rule; larger samples are clamped.
pub const MAX_RTT_MS: f64 = 60_000.0;

/// Point in the latency embedding space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate([f64; DIMENSIONS]);

impl Coordinate {
    /// Every node starts here.
    pub const ORIGIN: Coordinate = Coordinate([0.0; DIMENSIONS]);

    pub fn new(components: [f64; DIMENSIONS]) -> Self {
        Self(components)
    }

    pub fn components(&self) -> [f64; DIMENSIONS] {
        self.0
    }

    /// Euclidean length.
    pub fn norm(&self) -> f64 {
        self.0.iter().map(|c| c * c).sum::<f64>().sqrt()
    }

    /// Predicted RTT to `other`, in milliseconds.
    pub fn distance(&self, other: &Coordinate) -> f64 {
        (*self - *other).norm()
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|c| c.is_finite())
    }

    /// Normalize `raw` to unit length.
    ///
    /// A zero or non-finite vector maps onto the first axis so callers
    /// always get a usable direction.
    pub fn unit(raw: [f64; DIMENSIONS]) -> Self {
        let v = Coordinate(raw);
        let len = v.norm();
        if len.is_finite() && len > f64::EPSILON {
            v * (1.0 / len)
        } else {
            let mut axis = [0.0; DIMENSIONS];
            axis[0] = 1.0;
            Coordinate(axis)
        }
    }
}

impl Add for Coordinate {
    type Output = Coordinate;

    fn add(self, rhs: Coordinate) -> Coordinate {
        let mut out = self.0;
        for (o, r) in out.iter_mut().zip(rhs.0) {
            *o += r;
        }
        Coordinate(out)
    }
}

impl Sub for Coordinate {
    type Output = Coordinate;

    fn sub(self, rhs: Coordinate) -> Coordinate {
        let mut out = self.0;
        for (o, r) in out.iter_mut().zip(rhs.0) {
            *o -= r;
        }
        Coordinate(out)
    }
}

impl Mul<f64> for Coordinate {
    type Output = Coordinate;

    fn mul(self, k: f64) -> Coordinate {
        Coordinate(self.0.map(|c| c * k))
    }
}
