//! Impulse synthesis: turn a soft correspondence into corrective forces.
//!
//! Rather than relocating nodes directly (which would break physical
//! plausibility — penetration, infinite velocity), the model/observation
//! mismatch is expressed as a per-node impulse and handed to the physics
//! solver, which integrates it subject to mass, damping and collision.
//!
//! impulse_i = gain · Σ_j p_ij · (obs_j − model_i)
//!
//! Nodes with no retained correspondence entries get a zero impulse — no
//! spurious drift. The function is exactly linear in `gain`.

use crate::correspondence::SparseCorr;
use crate::types::Vec3;

/// Synthesize one corrective impulse per model node from the retained
/// correspondence. `gain` is the tracking stiffness: too high overshoots and
/// jitters, too low lags.
pub fn synthesize_impulses(
    model: &[Vec3],
    obs: &[Vec3],
    corr: &SparseCorr,
    gain: f64,
) -> Vec<Vec3> {
    debug_assert_eq!(model.len(), corr.n_nodes());
    debug_assert_eq!(obs.len(), corr.n_points());

    let mut impulses = vec![Vec3::zeros(); model.len()];
    for e in corr.entries() {
        impulses[e.node] += (obs[e.point] - model[e.node]) * e.prob;
    }
    for imp in &mut impulses {
        *imp *= gain;
    }
    impulses
}
