//! Fundamental types used across the entire workspace.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Scalar type: f64 throughout — the estimation math is cheap, precision first.
// ---------------------------------------------------------------------------

/// 3D vector used for positions, rays and impulses.
pub type Vec3 = Vector3<f64>;

// ---------------------------------------------------------------------------
// Identifier types — newtype wrappers so IDs are never confused at compile time
// ---------------------------------------------------------------------------

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Observed points
// ---------------------------------------------------------------------------

/// A single 3D point observed by the depth camera.
///
/// Points are immutable once received; a new frame replaces the entire set.
/// Index within the frame is the point's identity for that frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObservedPoint {
    /// World-frame position [x, y, z] (meters)
    pub position: [f64; 3],
    /// Optional RGB color in [0,1] — carried for recording, unused by the core
    pub color: Option<[f32; 3]>,
}

impl ObservedPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: [x, y, z],
            color: None,
        }
    }

    /// Position as a nalgebra vector.
    pub fn pos(&self) -> Vec3 {
        Vec3::new(self.position[0], self.position[1], self.position[2])
    }
}

/// One observation frame: an ordered set of points at a given time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloudFrame {
    pub id: FrameId,
    /// Capture timestamp (simulation or sensor clock, seconds)
    pub time: f64,
    pub points: Vec<ObservedPoint>,
}

impl CloudFrame {
    /// Extract all point positions as nalgebra vectors.
    pub fn positions(&self) -> Vec<Vec3> {
        self.points.iter().map(ObservedPoint::pos).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ---------------------------------------------------------------------------
// FramePair — the object cloud plus the optional full scene cloud
// ---------------------------------------------------------------------------

/// The per-frame observation delivered to the tracking loop.
///
/// `object` is the segmented point set belonging to the tracked body and is
/// what correspondence runs against. `scene` is the full camera cloud when
/// the source provides one; it is carried for recording only. A source that
/// promises paired streams must deliver both every frame — a missing half is
/// a [`StreamDesync`](crate::error::TrackError::StreamDesync), not a skip.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FramePair {
    pub object: CloudFrame,
    pub scene: Option<CloudFrame>,
}
