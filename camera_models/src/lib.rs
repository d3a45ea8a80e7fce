//! `camera_models` — Depth-camera observation model: extrinsics and noise.

pub mod camera;

pub use camera::{CameraExtrinsics, CameraParams};
