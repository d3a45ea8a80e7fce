//! Replay: serialize/deserialize observation logs for offline re-tracking,
//! plus the JSON snapshot recorder the tracking loop writes through.

use camera_models::CameraParams;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracking_core::{FrameId, FramePair, ObservationSource, SnapshotSink, TrackError, Vec3};

/// A full recorded observation log: everything needed to re-run tracking
/// offline against the exact same input.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayLog {
    pub scenario_name: String,
    pub seed: u64,
    pub frame_dt: f64,
    pub camera: CameraParams,
    /// All observation frames in chronological order
    pub frames: Vec<FramePair>,
    /// Ground-truth node positions per frame (for metrics on replay)
    pub ground_truth: Vec<GroundTruthFrame>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroundTruthFrame {
    pub time: f64,
    pub nodes: Vec<[f64; 3]>,
}

impl GroundTruthFrame {
    pub fn positions(&self) -> Vec<Vec3> {
        self.nodes
            .iter()
            .map(|n| Vec3::new(n[0], n[1], n[2]))
            .collect()
    }
}

/// Save a replay log to a JSON file.
pub fn save_replay(log: &ReplayLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer(writer, log)?;
    Ok(())
}

/// Load a replay log from a JSON file.
pub fn load_replay(path: &Path) -> anyhow::Result<ReplayLog> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let log: ReplayLog = serde_json::from_reader(reader)?;
    Ok(log)
}

/// Feeds a recorded log back into the tracking loop as an
/// [`ObservationSource`].
pub struct ReplaySource {
    frames: std::vec::IntoIter<FramePair>,
    viewpoint: Vec3,
}

impl ReplaySource {
    pub fn new(log: &ReplayLog) -> Self {
        Self {
            frames: log.frames.clone().into_iter(),
            viewpoint: log.camera.viewpoint(),
        }
    }
}

impl ObservationSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<FramePair>, TrackError> {
        Ok(self.frames.next())
    }

    fn viewpoint(&self) -> Vec3 {
        self.viewpoint
    }
}

// ---------------------------------------------------------------------------
// Snapshot recording
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub frame: FrameId,
    pub iter: usize,
    pub nodes: Vec<[f64; 3]>,
}

/// Collects estimated node positions per the tracker's record mode and
/// writes them out as JSON.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SnapshotLog {
    pub snapshots: Vec<SnapshotEntry>,
}

impl SnapshotLog {
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }
}

impl SnapshotSink for SnapshotLog {
    fn snapshot(&mut self, frame: FrameId, iter: usize, nodes: &[Vec3]) {
        self.snapshots.push(SnapshotEntry {
            frame,
            iter,
            nodes: nodes.iter().map(|p| [p.x, p.y, p.z]).collect(),
        });
    }
}
