//! Scenario definitions.
//!
//! Each scenario pairs a ground-truth body with an initially wrong estimate
//! body (same topology, perturbed pose) and a camera. All scenarios are
//! deterministic given the same seed.

use camera_models::CameraParams;
use serde::{Deserialize, Serialize};
use tracking_core::Vec3;

use crate::soft_body::{SoftBody, SoftBodyParams};

/// Which pre-defined scenario to load.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// A cloth sheet dropped from rest onto the ground
    Drape,
    /// A sheet kicked upward in the middle of the run (fast deformation)
    Poke,
    /// A sheet sliding sideways across a low-friction ground
    Slide,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    /// Observation frames to generate
    pub frames: u64,
    /// Wall time between observation frames (s)
    pub frame_dt: f64,
    /// Truth-body sub-steps per observation frame
    pub truth_substeps: usize,
    pub truth: SoftBody,
    /// Same topology as `truth`, rigidly offset — the tracked body
    pub estimate: SoftBody,
    pub camera: CameraParams,
    /// Frame index at which `Poke` kicks the truth body (unused otherwise)
    pub poke_at: Option<u64>,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::Drape => Self::drape(seed),
            ScenarioKind::Poke => Self::poke(seed),
            ScenarioKind::Slide => Self::slide(seed),
        }
    }

    fn sheet(z: f64) -> SoftBody {
        SoftBody::grid(
            Vec3::new(-0.25, -0.25, z),
            0.05,
            0.05,
            11,
            11,
            SoftBodyParams::default(),
        )
    }

    // -----------------------------------------------------------------------
    // Scenario 1: Drape — free fall onto the ground, moderate dynamics
    // -----------------------------------------------------------------------
    fn drape(seed: u64) -> Self {
        let truth = Self::sheet(0.3);
        let estimate = truth.translated(Vec3::new(0.03, -0.02, 0.05));
        Self {
            name: "drape".into(),
            seed,
            frames: 60,
            frame_dt: 0.1,
            truth_substeps: 20,
            truth,
            estimate,
            camera: CameraParams::default(),
            poke_at: None,
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 2: Poke — an impulsive kick mid-run stresses tracking lag
    // -----------------------------------------------------------------------
    fn poke(seed: u64) -> Self {
        let truth = Self::sheet(0.05);
        let estimate = truth.translated(Vec3::new(0.02, 0.02, 0.02));
        Self {
            name: "poke".into(),
            seed,
            frames: 80,
            frame_dt: 0.1,
            truth_substeps: 20,
            truth,
            estimate,
            camera: CameraParams::default(),
            poke_at: Some(30),
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 3: Slide — lateral motion over a slick ground plane
    // -----------------------------------------------------------------------
    fn slide(seed: u64) -> Self {
        let params = SoftBodyParams {
            ground_friction: 0.5,
            ..Default::default()
        };
        let mut truth = SoftBody::grid(Vec3::new(-0.25, -0.25, 0.02), 0.05, 0.05, 11, 11, params);
        truth.nudge_all(Vec3::new(0.15, 0.0, 0.0));
        let estimate = truth.translated(Vec3::new(-0.03, 0.0, 0.03));
        Self {
            name: "slide".into(),
            seed,
            frames: 60,
            frame_dt: 0.1,
            truth_substeps: 20,
            truth,
            estimate,
            camera: CameraParams::default(),
            poke_at: None,
        }
    }

    /// Advance the truth body to the next observation frame, applying the
    /// scheduled poke when due.
    pub fn step_truth(&mut self, frame: u64) {
        if self.poke_at == Some(frame) {
            self.truth.nudge_all(Vec3::new(0.0, 0.1, 0.4));
        }
        let dt = self.frame_dt / self.truth_substeps as f64;
        for _ in 0..self.truth_substeps {
            self.truth.step(dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracking_core::NodeQuery;

    #[test]
    fn estimate_matches_truth_topology() {
        for kind in [ScenarioKind::Drape, ScenarioKind::Poke, ScenarioKind::Slide] {
            let s = Scenario::build(kind, 42);
            assert_eq!(s.truth.node_count(), s.estimate.node_count());
            assert!(s.frames > 0);
        }
    }

    #[test]
    fn estimate_starts_displaced() {
        let s = Scenario::build(ScenarioKind::Drape, 42);
        let d = (s.estimate.node_position(0) - s.truth.node_position(0)).norm();
        assert!(d > 0.01, "estimate must start wrong, offset {d}");
    }

    #[test]
    fn poke_kicks_the_truth_body() {
        let mut s = Scenario::build(ScenarioKind::Poke, 42);
        let before: f64 = s.truth.velocities().iter().map(|v| v.norm()).sum();
        s.step_truth(30);
        // Velocities right after the kick dwarf the settled state.
        let after: f64 = s.truth.velocities().iter().map(|v| v.norm()).sum();
        assert!(after > before);
    }
}
