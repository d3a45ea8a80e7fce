//! Visibility estimation: per-node occlusion probability from the viewpoint.
//!
//! For each simulated node a ray is cast from the node toward the camera
//! through the body's own geometry. A node whose ray is blocked by another
//! part of the body gets a *low* visibility rather than exactly zero, so a
//! grazing node can still claim a little correspondence mass and blend back
//! in as it rotates into view.
//!
//! Embarrassingly parallel across nodes — no node depends on another's ray.

use crate::types::Vec3;
use crate::world::NodeQuery;
use rayon::prelude::*;

/// Rays shorter than this are degenerate (node sitting at the viewpoint) and
/// are treated as fully visible rather than handed to the occlusion query.
const MIN_RAY_LENGTH_SQ: f64 = 1e-12;

/// Estimate the visibility probability of every node from `viewpoint`.
///
/// Returns one value in `[0, 1]` per node: `1.0` for an unobstructed ray,
/// `occluded_visibility` when the body blocks the segment node → viewpoint.
/// Recomputed every inner iteration; never persisted across frames.
pub fn estimate_visibility<W>(world: &W, viewpoint: Vec3, occluded_visibility: f64) -> Vec<f64>
where
    W: NodeQuery + Sync,
{
    let n = world.node_count();
    (0..n)
        .into_par_iter()
        .map(|i| {
            let p = world.node_position(i);
            let ray = viewpoint - p;
            if ray.norm_squared() < MIN_RAY_LENGTH_SQ {
                // Degenerate ray: fully visible, never an error.
                return 1.0;
            }
            if world.segment_occluded(p, viewpoint, i) {
                occluded_visibility
            } else {
                1.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three collinear nodes on the x axis; a node is "occluded" when any
    /// other node lies strictly inside its segment to the viewpoint
    /// (projected within 0.1 of the line).
    struct Beads {
        positions: Vec<Vec3>,
    }

    impl NodeQuery for Beads {
        fn node_count(&self) -> usize {
            self.positions.len()
        }

        fn node_position(&self, i: usize) -> Vec3 {
            self.positions[i]
        }

        fn segment_occluded(&self, from: Vec3, to: Vec3, skip_node: usize) -> bool {
            let dir = to - from;
            let len_sq = dir.norm_squared();
            self.positions.iter().enumerate().any(|(k, p)| {
                if k == skip_node {
                    return false;
                }
                let t = (p - from).dot(&dir) / len_sq;
                if t <= 1e-6 || t >= 1.0 {
                    return false;
                }
                let closest = from + dir * t;
                (p - closest).norm() < 0.1
            })
        }
    }

    #[test]
    fn near_node_visible_far_node_occluded() {
        let beads = Beads {
            positions: vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0)],
        };
        let viewpoint = Vec3::new(0.0, 0.0, 0.0);
        let vis = estimate_visibility(&beads, viewpoint, 0.1);
        assert_eq!(vis[0], 1.0, "near node sees the camera directly");
        assert_eq!(vis[1], 0.1, "far node is behind the near node");
    }

    #[test]
    fn zero_length_ray_is_fully_visible() {
        let beads = Beads {
            positions: vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)],
        };
        // Viewpoint coincides with node 0.
        let vis = estimate_visibility(&beads, Vec3::zeros(), 0.1);
        assert_eq!(vis[0], 1.0);
    }

    #[test]
    fn empty_body_yields_empty_visibility() {
        let beads = Beads { positions: vec![] };
        let vis = estimate_visibility(&beads, Vec3::new(0.0, 0.0, 1.0), 0.1);
        assert!(vis.is_empty());
    }
}
