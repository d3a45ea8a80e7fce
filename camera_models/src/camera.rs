//! Depth-camera parameters and extrinsics.

use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Physical configuration of the depth camera observing the body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CameraParams {
    /// Camera position (x, y, z) in world coordinates (meters)
    pub position: [f64; 3],
    /// Point in world coordinates the optical axis aims at
    pub look_at: [f64; 3],
    /// Maximum sensing range (meters)
    pub max_range: f64,
    /// Probability that a visible surface node yields an observed point
    pub p_detection: f64,
    /// Mean number of clutter points per frame (background, segmentation spill)
    pub clutter_per_frame: f64,
    /// Half-extent of the cube clutter is drawn from, centered on `look_at` (meters)
    pub clutter_extent: f64,
    /// Measurement noise: per-axis position standard deviation (meters)
    pub noise_std: f64,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            position: [0.0, -0.8, 0.9],
            look_at: [0.0, 0.0, 0.0],
            max_range: 4.0,          // short-range depth sensor
            p_detection: 0.9,
            clutter_per_frame: 2.0,
            clutter_extent: 0.5,
            noise_std: 0.005,        // 5 mm
        }
    }
}

impl CameraParams {
    /// Camera origin as a nalgebra vector.
    pub fn viewpoint(&self) -> Vector3<f64> {
        Vector3::new(self.position[0], self.position[1], self.position[2])
    }

    /// World-from-camera extrinsics for this pose.
    pub fn extrinsics(&self) -> CameraExtrinsics {
        CameraExtrinsics::looking_at(self.position, self.look_at)
    }
}

/// World-from-camera rigid transform.
///
/// The tracking core only needs the camera origin in world coordinates; the
/// full isometry is kept for recording and for transforming camera-frame
/// clouds into the world frame.
#[derive(Clone, Debug)]
pub struct CameraExtrinsics {
    pub world_from_camera: Isometry3<f64>,
}

impl CameraExtrinsics {
    /// Build extrinsics for a camera at `eye` looking at `target`, z-up.
    pub fn looking_at(eye: [f64; 3], target: [f64; 3]) -> Self {
        let eye = Point3::new(eye[0], eye[1], eye[2]);
        let target = Point3::new(target[0], target[1], target[2]);
        let up = Vector3::z();
        Self {
            world_from_camera: Isometry3::face_towards(&eye, &target, &up),
        }
    }

    /// Camera origin in world coordinates.
    pub fn origin(&self) -> Vector3<f64> {
        self.world_from_camera.translation.vector
    }

    /// Transform a camera-frame point into the world frame.
    pub fn to_world(&self, p_cam: Vector3<f64>) -> Vector3<f64> {
        self.world_from_camera.transform_point(&Point3::from(p_cam)).coords
    }
}
