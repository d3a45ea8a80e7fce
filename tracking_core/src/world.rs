//! The physics boundary: two small traits the core sees the simulator through.
//!
//! The physics engine exclusively owns node positions, masses and contact
//! resolution. The tracking core only *reads* positions and visibility
//! geometry through [`NodeQuery`] and *writes* through [`ForceSink`] — apply
//! impulses, then advance one fixed sub-step. One writer, no locks. Any
//! backend (or a test mock) that implements both traits can be tracked.

use crate::types::Vec3;

/// Read access to the simulated body: node positions and occlusion geometry.
pub trait NodeQuery {
    /// Number of simulated nodes. Fixed for the lifetime of a run.
    fn node_count(&self) -> usize;

    /// Current position of node `i`. `i < node_count()`.
    fn node_position(&self, i: usize) -> Vec3;

    /// All node positions in index order.
    fn node_positions(&self) -> Vec<Vec3> {
        (0..self.node_count()).map(|i| self.node_position(i)).collect()
    }

    /// Whether the open segment `from → to` is blocked by any part of the
    /// simulated body other than node `skip_node` itself.
    ///
    /// Used for self-occlusion rays from a node toward the viewpoint.
    fn segment_occluded(&self, from: Vec3, to: Vec3, skip_node: usize) -> bool;
}

/// Write access to the simulated body: inject impulses and step time.
pub trait ForceSink {
    /// Queue a corrective impulse on node `node`, consumed by the next
    /// [`advance`](ForceSink::advance).
    fn apply_impulse(&mut self, node: usize, impulse: Vec3);

    /// Advance the simulation by `dt` seconds (one fixed sub-step).
    fn advance(&mut self, dt: f64);
}
