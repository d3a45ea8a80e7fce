//! Tracking quality metrics: node-position error against ground truth.
//!
//! Only meaningful in simulation, where the true body is known; the node
//! ordering is fixed across the run, so estimated node `i` is compared
//! directly with true node `i`.

use serde::{Deserialize, Serialize};

use crate::types::Vec3;

/// Accumulated error statistics over a tracking run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrackingMetrics {
    /// Number of frames evaluated
    pub n_frames: u64,
    /// Total node comparisons accumulated
    pub n_nodes: u64,
    /// Sum of squared node position errors (for RMSE)
    pub sum_sq_err: f64,
    /// Worst single-node error seen (meters)
    pub max_err: f64,
}

impl TrackingMetrics {
    /// Root-mean-square node position error (meters).
    pub fn rmse(&self) -> f64 {
        if self.n_nodes == 0 {
            return 0.0;
        }
        (self.sum_sq_err / self.n_nodes as f64).sqrt()
    }

    /// Accumulate one frame: estimated vs true node positions, index-aligned.
    pub fn accumulate(&mut self, estimated: &[Vec3], truth: &[Vec3]) {
        debug_assert_eq!(estimated.len(), truth.len());
        self.n_frames += 1;
        for (e, t) in estimated.iter().zip(truth) {
            let err = (e - t).norm();
            self.sum_sq_err += err * err;
            self.max_err = self.max_err.max(err);
            self.n_nodes += 1;
        }
    }
}
