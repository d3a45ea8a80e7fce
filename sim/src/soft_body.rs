//! Mass-spring deformable body.
//!
//! A grid of point masses connected by structural and shear springs, under
//! gravity, with velocity damping and a ground plane with Coulomb-style
//! friction. Integration is semi-implicit Euler. Corrective impulses queued
//! through [`ForceSink::apply_impulse`] act as forces over the next sub-step
//! (dv = f·dt/m), which is the contract the tracking loop assumes: apply,
//! then advance.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracking_core::{ForceSink, NodeQuery, Vec3};

/// Material and environment parameters for a [`SoftBody`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SoftBodyParams {
    /// Mass of each node (kg)
    pub node_mass: f64,
    /// Spring stiffness (N/m)
    pub stiffness: f64,
    /// Spring damping along the spring axis (N·s/m)
    pub spring_damping: f64,
    /// Bulk velocity damping per second (air drag surrogate)
    pub drag: f64,
    /// Gravity acceleration along −z (m/s²)
    pub gravity: f64,
    /// Ground plane height (z)
    pub ground_height: f64,
    /// Tangential velocity retained per second while on the ground
    pub ground_friction: f64,
}

impl Default for SoftBodyParams {
    fn default() -> Self {
        Self {
            node_mass: 0.01,
            stiffness: 80.0,
            spring_damping: 0.2,
            drag: 0.4,
            gravity: 9.81,
            ground_height: 0.0,
            ground_friction: 8.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Spring {
    a: usize,
    b: usize,
    rest_len: f64,
}

/// A grid cloth / slab of point masses. Implements the tracking core's
/// physics boundary ([`NodeQuery`] + [`ForceSink`]).
#[derive(Clone, Debug)]
pub struct SoftBody {
    positions: Vec<Vec3>,
    velocities: Vec<Vec3>,
    /// Corrective forces queued by `apply_impulse`, consumed on the next step
    pending_forces: Vec<Vec3>,
    springs: Vec<Spring>,
    params: SoftBodyParams,
    /// Occlusion sphere radius per node (half the grid spacing)
    node_radius: f64,
}

impl SoftBody {
    /// Build a `rows × cols` cloth grid in the z = `corner.z` plane starting
    /// at `corner`, with spacing `dx` along x and `dy` along y. Structural
    /// springs connect 4-neighbors, shear springs the diagonals.
    pub fn grid(corner: Vec3, dx: f64, dy: f64, rows: usize, cols: usize, params: SoftBodyParams) -> Self {
        let mut positions = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                positions.push(corner + Vec3::new(c as f64 * dx, r as f64 * dy, 0.0));
            }
        }

        let idx = |r: usize, c: usize| r * cols + c;
        let mut springs = Vec::new();
        let mut connect = |a: usize, b: usize, positions: &[Vec3]| {
            springs.push(Spring {
                a,
                b,
                rest_len: (positions[a] - positions[b]).norm(),
            });
        };
        for r in 0..rows {
            for c in 0..cols {
                if c + 1 < cols {
                    connect(idx(r, c), idx(r, c + 1), &positions);
                }
                if r + 1 < rows {
                    connect(idx(r, c), idx(r + 1, c), &positions);
                }
                if r + 1 < rows && c + 1 < cols {
                    connect(idx(r, c), idx(r + 1, c + 1), &positions);
                    connect(idx(r, c + 1), idx(r + 1, c), &positions);
                }
            }
        }

        let n = positions.len();
        Self {
            positions,
            velocities: vec![Vec3::zeros(); n],
            pending_forces: vec![Vec3::zeros(); n],
            springs,
            params,
            node_radius: 0.5 * dx.min(dy),
        }
    }

    /// A copy of this body rigidly shifted by `offset` — used to build an
    /// initially wrong estimate body from the ground truth.
    pub fn translated(&self, offset: Vec3) -> Self {
        let mut out = self.clone();
        for p in &mut out.positions {
            *p += offset;
        }
        out
    }

    /// Add an instantaneous velocity to every node (used by scenarios).
    pub fn nudge_all(&mut self, velocity: Vec3) {
        for v in &mut self.velocities {
            *v += velocity;
        }
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }

    /// One semi-implicit Euler step.
    pub fn step(&mut self, dt: f64) {
        let p = &self.params;
        let inv_mass = 1.0 / p.node_mass;
        let n = self.positions.len();

        // Forces: queued corrective forces + gravity + springs (with axial
        // damping).
        let mut forces = vec![Vector3::new(0.0, 0.0, -p.gravity * p.node_mass); n];
        for (f, queued) in forces.iter_mut().zip(&mut self.pending_forces) {
            *f += *queued;
            *queued = Vec3::zeros();
        }
        for s in &self.springs {
            let delta = self.positions[s.b] - self.positions[s.a];
            let len = delta.norm();
            if len < 1e-12 {
                continue;
            }
            let dir = delta / len;
            let stretch = len - s.rest_len;
            let rel_vel = (self.velocities[s.b] - self.velocities[s.a]).dot(&dir);
            let f = dir * (p.stiffness * stretch + p.spring_damping * rel_vel);
            forces[s.a] += f;
            forces[s.b] -= f;
        }

        let drag_keep = (1.0 - p.drag * dt).max(0.0);
        for i in 0..n {
            let v = &mut self.velocities[i];
            *v += forces[i] * (inv_mass * dt);
            *v *= drag_keep;
            self.positions[i] += *v * dt;

            // Ground contact: clamp, kill downward velocity, rub off
            // tangential velocity.
            if self.positions[i].z < p.ground_height {
                self.positions[i].z = p.ground_height;
                if v.z < 0.0 {
                    v.z = 0.0;
                }
                let keep = (1.0 - p.ground_friction * dt).max(0.0);
                v.x *= keep;
                v.y *= keep;
            }
        }
    }
}

impl NodeQuery for SoftBody {
    fn node_count(&self) -> usize {
        self.positions.len()
    }

    fn node_position(&self, i: usize) -> Vec3 {
        self.positions[i]
    }

    /// Sphere-sweep occlusion: the segment is blocked if it passes through
    /// any node sphere other than the queried node's own (spheres that
    /// contain the segment origin are ignored, so a node is never occluded
    /// by its immediate surface neighborhood).
    fn segment_occluded(&self, from: Vec3, to: Vec3, skip_node: usize) -> bool {
        let dir = to - from;
        let len_sq = dir.norm_squared();
        if len_sq < 1e-12 {
            return false;
        }
        let r = self.node_radius;
        self.positions.iter().enumerate().any(|(k, p)| {
            if k == skip_node || (p - from).norm() <= r {
                return false;
            }
            let t = (p - from).dot(&dir) / len_sq;
            if t <= 0.0 || t >= 1.0 {
                return false;
            }
            let closest = from + dir * t;
            (p - closest).norm() < r
        })
    }
}

impl ForceSink for SoftBody {
    fn apply_impulse(&mut self, node: usize, impulse: Vec3) {
        self.pending_forces[node] += impulse;
    }

    fn advance(&mut self, dt: f64) {
        self.step(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cloth() -> SoftBody {
        SoftBody::grid(
            Vec3::new(0.0, 0.0, 0.5),
            0.1,
            0.1,
            4,
            4,
            SoftBodyParams::default(),
        )
    }

    #[test]
    fn grid_has_expected_nodes_and_springs() {
        let body = small_cloth();
        assert_eq!(body.node_count(), 16);
        // 4×4: structural 2·4·3 = 24, shear 2·3·3 = 18
        assert_eq!(body.springs.len(), 42);
    }

    #[test]
    fn cloth_falls_and_rests_on_ground() {
        let mut body = small_cloth();
        for _ in 0..2000 {
            body.step(0.005);
        }
        for p in body.positions() {
            assert!(p.z >= -1e-9, "node below ground: {}", p.z);
            assert!(p.z < 0.1, "node did not settle: {}", p.z);
        }
    }

    #[test]
    fn queued_impulse_moves_node_on_next_step() {
        let mut body = small_cloth();
        let before = body.node_position(5);
        body.apply_impulse(5, Vec3::new(0.1, 0.0, 0.0));
        body.advance(0.01);
        let after = body.node_position(5);
        assert!(after.x > before.x, "impulse should carry the node along +x");
    }

    #[test]
    fn settled_sheet_stays_bounded_after_a_rigid_shift() {
        // Ground impact of a cloth with internal spring stress is the worst
        // case for the explicit integrator. A settled sheet lifted a few
        // centimeters and dropped again must come back to rest, not blow up.
        let mut body = SoftBody::grid(
            Vec3::new(-0.2, -0.2, 0.02),
            0.05,
            0.05,
            9,
            9,
            SoftBodyParams::default(),
        );
        for _ in 0..1000 {
            body.step(0.005);
        }
        let mut moved = body.translated(Vec3::new(0.05, 0.0, 0.03));
        for _ in 0..600 {
            moved.step(0.005);
        }
        for (p, v) in moved.positions().iter().zip(moved.velocities()) {
            assert!(
                p.norm().is_finite() && p.norm() < 1.0,
                "node escaped the scene: {p:?}"
            );
            assert!(v.norm() < 0.1, "node still moving after re-settle: {v:?}");
        }
    }

    #[test]
    fn node_behind_the_sheet_is_occluded() {
        let body = small_cloth();
        // Camera straight above the sheet: interior nodes see it, a test
        // segment from below the sheet through a node does not.
        let camera = Vec3::new(0.1, 0.1, 2.0);
        let under = Vec3::new(0.1, 0.1, 0.3);
        assert!(
            body.segment_occluded(under, camera, usize::MAX),
            "segment through the sheet must be blocked"
        );
        // A top node's own ray to the camera is clear.
        assert!(!body.segment_occluded(body.node_position(5), camera, 5));
    }
}
