//! Synthetic point-cloud generation from a ground-truth body.
//!
//! Per frame, each truth node that the camera can actually see (range check
//! plus the body's own occlusion geometry) yields an observed point with
//! probability `p_detection`, perturbed by Gaussian position noise. A
//! Poisson-distributed handful of clutter points is mixed in. Everything is
//! deterministic given the seed.
//!
//! The simulator can also inject a stream desync at a configured frame —
//! the scene cloud "arrives" but the object cloud does not — to exercise the
//! tracker's fatal-abort path.

use camera_models::CameraParams;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracking_core::{
    CloudFrame, FrameId, FramePair, NodeQuery, ObservedPoint, TrackError, Vec3,
};

/// Generates observation frames from a ground-truth body.
pub struct CloudSimulator {
    pub camera: CameraParams,
    rng: ChaCha8Rng,
    next_frame: u64,
    desync_at: Option<u64>,
    /// Also emit the full scene cloud half of the pair
    include_scene: bool,
}

impl CloudSimulator {
    pub fn new(camera: CameraParams, seed: u64) -> Self {
        Self {
            camera,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_frame: 0,
            desync_at: None,
            include_scene: true,
        }
    }

    /// Drop the object cloud at frame `frame` while the scene cloud still
    /// arrives, producing a [`TrackError::StreamDesync`].
    pub fn with_desync_at(mut self, frame: u64) -> Self {
        self.desync_at = Some(frame);
        self
    }

    fn gaussian(&mut self, std: f64) -> f64 {
        // Box-Muller; one draw per call is plenty here.
        let u1: f64 = self.rng.gen::<f64>().max(1e-12);
        let u2: f64 = self.rng.gen::<f64>();
        std * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    fn poisson(&mut self, lambda: f64) -> usize {
        // Knuth inversion — lambda is small (a few clutter points per frame).
        if lambda <= 0.0 {
            return 0;
        }
        let threshold = (-lambda).exp();
        let mut n = 0usize;
        let mut prod = self.rng.gen::<f64>();
        while prod > threshold && n < 50 {
            prod *= self.rng.gen::<f64>();
            n += 1;
        }
        n
    }

    /// Observe the truth body once, producing the next frame pair.
    pub fn observe<W: NodeQuery>(&mut self, truth: &W, time: f64) -> Result<FramePair, TrackError> {
        let id = FrameId(self.next_frame);
        self.next_frame += 1;

        if self.desync_at == Some(id.0) {
            return Err(TrackError::StreamDesync { frame: id });
        }

        let viewpoint = self.camera.viewpoint();
        let mut points = Vec::new();

        for i in 0..truth.node_count() {
            let p = truth.node_position(i);
            if (p - viewpoint).norm() > self.camera.max_range {
                continue;
            }
            // The camera only sees the near surface.
            if truth.segment_occluded(p, viewpoint, i) {
                continue;
            }
            if self.rng.gen::<f64>() > self.camera.p_detection {
                continue;
            }
            let noisy = p
                + Vec3::new(
                    self.gaussian(self.camera.noise_std),
                    self.gaussian(self.camera.noise_std),
                    self.gaussian(self.camera.noise_std),
                );
            points.push(ObservedPoint::new(noisy.x, noisy.y, noisy.z));
        }

        // Clutter: segmentation spill and background, uniform in a cube
        // around the working volume.
        let n_clutter = self.poisson(self.camera.clutter_per_frame);
        let center = Vec3::new(
            self.camera.look_at[0],
            self.camera.look_at[1],
            self.camera.look_at[2],
        );
        let ext = self.camera.clutter_extent;
        for _ in 0..n_clutter {
            let offset = Vec3::new(
                (self.rng.gen::<f64>() * 2.0 - 1.0) * ext,
                (self.rng.gen::<f64>() * 2.0 - 1.0) * ext,
                self.rng.gen::<f64>() * ext,
            );
            let p = center + offset;
            points.push(ObservedPoint::new(p.x, p.y, p.z));
        }

        let object = CloudFrame { id, time, points };
        let scene = self.include_scene.then(|| CloudFrame {
            // The full camera cloud would be a superset; in simulation the
            // object cloud doubles as the scene half of the pair.
            id,
            time,
            points: object.points.clone(),
        });

        Ok(FramePair { object, scene })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft_body::{SoftBody, SoftBodyParams};

    fn sheet() -> SoftBody {
        SoftBody::grid(
            Vec3::new(-0.2, -0.2, 0.2),
            0.1,
            0.1,
            5,
            5,
            SoftBodyParams::default(),
        )
    }

    fn overhead_camera() -> CameraParams {
        CameraParams {
            position: [0.0, 0.0, 2.0],
            look_at: [0.0, 0.0, 0.2],
            clutter_per_frame: 0.0,
            p_detection: 1.0,
            noise_std: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn deterministic_given_seed() {
        let body = sheet();
        let mut a = CloudSimulator::new(CameraParams::default(), 7);
        let mut b = CloudSimulator::new(CameraParams::default(), 7);
        let fa = a.observe(&body, 0.0).unwrap();
        let fb = b.observe(&body, 0.0).unwrap();
        assert_eq!(fa.object.len(), fb.object.len());
        for (x, y) in fa.object.points.iter().zip(&fb.object.points) {
            assert_eq!(x.position, y.position);
        }
    }

    #[test]
    fn noiseless_overhead_view_sees_every_node() {
        let body = sheet();
        let mut sim = CloudSimulator::new(overhead_camera(), 1);
        let pair = sim.observe(&body, 0.0).unwrap();
        // A flat single-layer sheet has no self-occlusion from above.
        assert_eq!(pair.object.len(), 25);
        assert!(pair.scene.is_some());
    }

    #[test]
    fn desync_frame_errors_out() {
        let body = sheet();
        let mut sim = CloudSimulator::new(overhead_camera(), 1).with_desync_at(1);
        assert!(sim.observe(&body, 0.0).is_ok());
        let err = sim.observe(&body, 0.1).unwrap_err();
        assert!(matches!(err, TrackError::StreamDesync { frame } if frame == FrameId(1)));
    }

    #[test]
    fn frame_ids_are_sequential() {
        let body = sheet();
        let mut sim = CloudSimulator::new(overhead_camera(), 1);
        for expect in 0..4u64 {
            let pair = sim.observe(&body, expect as f64 * 0.1).unwrap();
            assert_eq!(pair.object.id, FrameId(expect));
        }
    }
}
