//! Adaptive Vivaldi update rule.

use super::{Coordinate, MAX_RTT_MS};
use crate::domain::DiscoveryError;

/// Constants of the update rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VivaldiParams {
    /// Error-tracking gain (`c_e`).
    pub error_gain: f64,
    /// Coordinate gain (`c_c`).
    pub coordinate_gain: f64,
    /// Lower bound on the step fraction, so a confident node still moves.
    pub min_step: f64,
    /// Upper bound on the step fraction.
    pub max_step: f64,
}

impl Default for VivaldiParams {
    fn default() -> Self {
        Self {
            error_gain: 0.25,
            coordinate_gain: 0.25,
            min_step: 0.05,
            max_step: 0.25,
        }
    }
}

/// A node's coordinate together with its confidence.
///
/// `error` is the smoothed relative prediction error, in `[0, 1]`;
/// 1.0 means "no confidence at all".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VivaldiState {
    pub coordinate: Coordinate,
    pub error: f64,
}

impl Default for VivaldiState {
    fn default() -> Self {
        Self {
            coordinate: Coordinate::ORIGIN,
            error: 1.0,
        }
    }
}

impl VivaldiState {
    /// Apply one RTT sample against a remote node.
    ///
    /// `fallback_direction` is used only when both coordinates coincide;
    /// it is normalized before use. The result depends on nothing but the
    /// arguments and `self`, so replaying the same sample on the same
    /// state yields the same state.
    ///
    /// Returns the predicted distance after the update.
    pub fn apply_sample(
        &mut self,
        remote: &Coordinate,
        remote_error: f64,
        rtt_ms: f64,
        fallback_direction: [f64; super::DIMENSIONS],
        params: &VivaldiParams,
    ) -> Result<f64, DiscoveryError> {
        if !rtt_ms.is_finite() || rtt_ms < 0.0 {
            return Err(DiscoveryError::InvalidSample(format!("rtt {rtt_ms}")));
        }
        if !remote.is_finite() {
            return Err(DiscoveryError::InvalidSample(
                "remote coordinate is not finite".into(),
            ));
        }
        let remote_error = if remote_error.is_finite() {
            remote_error.clamp(0.0, 1.0)
        } else {
            1.0
        };
        let rtt = rtt_ms.min(MAX_RTT_MS);

        let local_error = self.error.clamp(0.0, 1.0);
        let weight = if local_error + remote_error > 0.0 {
            local_error / (local_error + remote_error)
        } else {
            0.5
        };

        let predicted = self.coordinate.distance(remote);
        let relative_error = (predicted - rtt).abs() / rtt.max(1.0);
        let blended = params.error_gain * weight;
        self.error = (relative_error * blended + local_error * (1.0 - blended)).clamp(0.0, 1.0);

        let step = (params.coordinate_gain * weight).clamp(params.min_step, params.max_step);
        let direction = if predicted > f64::EPSILON {
            (self.coordinate - *remote) * (1.0 / predicted)
        } else {
            Coordinate::unit(fallback_direction)
        };

        self.coordinate = self.coordinate + direction * (step * (rtt - predicted));
        Ok(self.coordinate.distance(remote))
    }
}
