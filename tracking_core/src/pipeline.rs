//! Tracking loop orchestrator: the full estimation cycle for one observation
//! frame.
//!
//! # Processing steps per frame (per inner iteration, strictly sequential)
//! 1. Estimate per-node visibility from the viewpoint (self-occlusion rays)
//! 2. Estimate the sparse soft correspondence nodes ↔ observed points
//! 3. Synthesize one corrective impulse per node
//! 4. Apply impulses through the force sink
//! 5. Advance the physics by one fixed sub-step
//!
//! Iteration `k+1`'s visibility and correspondence depend on node positions
//! mutated by iteration `k`'s physics advance, so the inner loop never
//! reorders or parallelizes across iterations. Within one stage the work is
//! parallel across independent node / point indices.
//!
//! Frame-to-frame the loop is a small state machine: await the next frame
//! (the sole blocking point — end-of-stream is a clean stop), iterate, hand
//! control back to the liveness callback.

use crate::correspondence::estimate_correspondence;
use crate::error::TrackError;
use crate::forces::synthesize_impulses;
use crate::types::{FrameId, FramePair, Vec3};
use crate::visibility::estimate_visibility;
use crate::world::{ForceSink, NodeQuery};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// When to snapshot estimated node positions during the inner loop.
///
/// Both modes from the field-tested tool are preserved: snapshots fire after
/// the impulse application and physics advance of the iteration they belong
/// to, so `FinalIteration` captures exactly the state handed to the next
/// frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordMode {
    /// No snapshots.
    #[default]
    Off,
    /// One snapshot per frame, on iteration `n_iter − 1`.
    FinalIteration,
    /// One snapshot per inner iteration.
    EveryIteration,
}

/// Immutable configuration for a tracking run.
///
/// Set once before the loop starts; changing it mid-run requires a restart.
/// Defaults are the working parameters for a sponge-sized body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Gaussian matching bandwidth σ (world units). Must be > 0.
    pub bandwidth: f64,
    /// Inner iterations per observation frame. The useful range is ≥ 1;
    /// 0 is permitted and makes every frame a no-op.
    pub n_iter: usize,
    /// Prior outlier density per observed point. Must be > 0.
    pub outlier_param: f64,
    /// Sparsification budget: per observed point, the smallest correspondence
    /// entries are dropped while the dropped mass stays ≤ cutoff. Must lie
    /// in (0, 1).
    pub cutoff: f64,
    /// Tracking stiffness: scale on synthesized impulses. Must be ≥ 0.
    pub impulse_gain: f64,
    /// Physics sub-step per inner iteration (seconds). Must be > 0.
    pub sub_step_dt: f64,
    /// Visibility assigned to an occluded node — low but usually not 0, so
    /// grazing nodes can blend back in. Must lie in [0, 1].
    pub occluded_visibility: f64,
    /// Snapshot policy for the inner loop.
    pub record: RecordMode,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            bandwidth: 0.1,
            n_iter: 10,
            outlier_param: 0.01,
            cutoff: 0.01,
            impulse_gain: 10.0,
            sub_step_dt: 0.005,
            occluded_visibility: 0.1,
            record: RecordMode::Off,
        }
    }
}

impl TrackerConfig {
    /// Validate every parameter against its contract. Fatal at configuration
    /// time; the tracker never re-checks mid-run.
    pub fn validate(&self) -> Result<(), TrackError> {
        fn bad(name: &'static str, value: f64) -> TrackError {
            TrackError::InvalidParameter { name, value }
        }
        if !(self.bandwidth > 0.0) || !self.bandwidth.is_finite() {
            return Err(bad("bandwidth", self.bandwidth));
        }
        if !(self.outlier_param > 0.0) || !self.outlier_param.is_finite() {
            return Err(bad("outlier_param", self.outlier_param));
        }
        if !(self.cutoff > 0.0 && self.cutoff < 1.0) {
            return Err(bad("cutoff", self.cutoff));
        }
        if !(self.impulse_gain >= 0.0) || !self.impulse_gain.is_finite() {
            return Err(bad("impulse_gain", self.impulse_gain));
        }
        if !(self.sub_step_dt > 0.0) || !self.sub_step_dt.is_finite() {
            return Err(bad("sub_step_dt", self.sub_step_dt));
        }
        if !(0.0..=1.0).contains(&self.occluded_visibility) {
            return Err(bad("occluded_visibility", self.occluded_visibility));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Observation source & snapshot sink — the loop's external collaborators
// ---------------------------------------------------------------------------

/// Supplies observation frames and the per-frame viewpoint.
///
/// `next_frame` is the loop's only blocking operation and its sole
/// cancellation point: `Ok(None)` is clean end-of-stream, an `Err` (e.g. a
/// detected [`TrackError::StreamDesync`]) aborts the run. A source that
/// carries paired streams must surface a missing half as a desync rather
/// than silently skipping the frame.
pub trait ObservationSource {
    fn next_frame(&mut self) -> Result<Option<FramePair>, TrackError>;

    /// Camera origin in world coordinates for the current frame. Updated
    /// externally each frame.
    fn viewpoint(&self) -> Vec3;
}

/// Receives estimated node positions per [`RecordMode`].
pub trait SnapshotSink {
    fn snapshot(&mut self, frame: FrameId, iter: usize, nodes: &[Vec3]);
}

// ---------------------------------------------------------------------------
// Debug data
// ---------------------------------------------------------------------------

/// Intermediate quantities from one inner iteration.
#[derive(Clone, Debug, Default)]
pub struct IterationDebug {
    /// Retained (node, point) pairs after cutoff
    pub retained_pairs: usize,
    /// Σ_j (1 − Σ_i p_ij): total probability mass assigned to the outlier
    pub outlier_mass: f64,
    /// Mean per-node visibility this iteration
    pub mean_visibility: f64,
    /// Timings in microseconds
    pub timing_visibility_us: u64,
    pub timing_corr_us: u64,
    pub timing_forces_us: u64,
    pub timing_step_us: u64,
}

/// Output of processing one observation frame.
#[derive(Clone, Debug)]
pub struct StepOutput {
    pub frame: FrameId,
    /// Per-iteration debug data, `n_iter` entries
    pub iterations: Vec<IterationDebug>,
    /// Snapshots emitted this frame (0, 1 or `n_iter` depending on mode)
    pub snapshots: usize,
    /// Wall-clock time of the whole frame
    pub total_time_us: u64,
}

/// Totals for a whole tracking run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames: u64,
    pub iterations: u64,
    pub total_time_us: u64,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// The tracking loop. Owns nothing but the validated configuration —
/// node state lives in the physics world, observations in the source.
pub struct Tracker {
    config: TrackerConfig,
}

impl Tracker {
    /// Create a tracker, validating the configuration up front.
    pub fn new(config: TrackerConfig) -> Result<Self, TrackError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Run the inner loop for one observation frame: `n_iter` sequential
    /// rounds of visibility → correspondence → impulses → physics sub-step.
    pub fn process_frame<W>(
        &self,
        world: &mut W,
        frame: &FramePair,
        viewpoint: Vec3,
        mut recorder: Option<&mut (dyn SnapshotSink + '_)>,
    ) -> Result<StepOutput, TrackError>
    where
        W: NodeQuery + ForceSink + Sync,
    {
        let start_total = Instant::now();
        let cfg = &self.config;

        // Observed points are immutable for the whole frame.
        let obs = frame.object.positions();

        let mut iterations = Vec::with_capacity(cfg.n_iter);
        let mut snapshots = 0usize;

        for iter in 0..cfg.n_iter {
            let mut dbg = IterationDebug::default();

            // Step 1: visibility (parallel across nodes)
            let t0 = Instant::now();
            let visibility = estimate_visibility(world, viewpoint, cfg.occluded_visibility);
            dbg.timing_visibility_us = t0.elapsed().as_micros() as u64;
            dbg.mean_visibility = if visibility.is_empty() {
                0.0
            } else {
                visibility.iter().sum::<f64>() / visibility.len() as f64
            };

            // Step 2: soft correspondence (parallel across observed points)
            let t0 = Instant::now();
            let model = world.node_positions();
            let corr = estimate_correspondence(
                &model,
                &obs,
                &visibility,
                cfg.bandwidth,
                cfg.outlier_param,
                cfg.cutoff,
            )?;
            dbg.timing_corr_us = t0.elapsed().as_micros() as u64;
            dbg.retained_pairs = corr.len();
            dbg.outlier_mass = corr.total_outlier_mass();

            // Step 3-4: impulses, injected through the sink
            let t0 = Instant::now();
            let impulses = synthesize_impulses(&model, &obs, &corr, cfg.impulse_gain);
            for (i, imp) in impulses.iter().enumerate() {
                world.apply_impulse(i, *imp);
            }
            dbg.timing_forces_us = t0.elapsed().as_micros() as u64;

            // Step 5: one fixed physics sub-step
            let t0 = Instant::now();
            world.advance(cfg.sub_step_dt);
            dbg.timing_step_us = t0.elapsed().as_micros() as u64;

            let record_now = match cfg.record {
                RecordMode::Off => false,
                RecordMode::EveryIteration => true,
                RecordMode::FinalIteration => iter + 1 == cfg.n_iter,
            };
            if record_now {
                if let Some(rec) = recorder.as_deref_mut() {
                    rec.snapshot(frame.object.id, iter, &world.node_positions());
                    snapshots += 1;
                }
            }

            iterations.push(dbg);
        }

        let out = StepOutput {
            frame: frame.object.id,
            iterations,
            snapshots,
            total_time_us: start_total.elapsed().as_micros() as u64,
        };
        debug!(
            frame = %out.frame,
            iters = out.iterations.len(),
            pairs = out.iterations.last().map_or(0, |d| d.retained_pairs),
            us = out.total_time_us,
            "frame processed"
        );
        Ok(out)
    }
}

/// Drive a whole tracking run: pull frames from `source` until end-of-stream
/// or until `keep_going` goes false (the external viewer/consumer liveness
/// condition). Structural errors from the source or the estimators abort the
/// run immediately — no partial frame is processed against stale points.
pub fn track_stream<W, S, F>(
    tracker: &Tracker,
    world: &mut W,
    source: &mut S,
    mut keep_going: F,
    mut recorder: Option<&mut (dyn SnapshotSink + '_)>,
) -> Result<RunSummary, TrackError>
where
    W: NodeQuery + ForceSink + Sync,
    S: ObservationSource,
    F: FnMut() -> bool,
{
    let mut summary = RunSummary::default();
    while keep_going() {
        let Some(pair) = source.next_frame()? else {
            break; // clean end-of-stream
        };
        let viewpoint = source.viewpoint();
        let out = tracker.process_frame(world, &pair, viewpoint, recorder.as_deref_mut())?;
        summary.frames += 1;
        summary.iterations += out.iterations.len() as u64;
        summary.total_time_us += out.total_time_us;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CloudFrame, ObservedPoint};
    use std::collections::VecDeque;

    /// Physics stand-in: impulses accumulate and are consumed as straight
    /// displacements on the next advance. No occlusion.
    struct MockWorld {
        positions: Vec<Vec3>,
        pending: Vec<Vec3>,
        steps: usize,
        impulse_calls: usize,
    }

    impl MockWorld {
        fn new(positions: Vec<Vec3>) -> Self {
            let n = positions.len();
            Self {
                positions,
                pending: vec![Vec3::zeros(); n],
                steps: 0,
                impulse_calls: 0,
            }
        }
    }

    impl NodeQuery for MockWorld {
        fn node_count(&self) -> usize {
            self.positions.len()
        }
        fn node_position(&self, i: usize) -> Vec3 {
            self.positions[i]
        }
        fn segment_occluded(&self, _from: Vec3, _to: Vec3, _skip_node: usize) -> bool {
            false
        }
    }

    impl ForceSink for MockWorld {
        fn apply_impulse(&mut self, node: usize, impulse: Vec3) {
            self.pending[node] += impulse;
            self.impulse_calls += 1;
        }
        fn advance(&mut self, _dt: f64) {
            for (p, d) in self.positions.iter_mut().zip(&mut self.pending) {
                *p += *d;
                *d = Vec3::zeros();
            }
            self.steps += 1;
        }
    }

    struct VecSource {
        frames: VecDeque<FramePair>,
        desync_at: Option<FrameId>,
        viewpoint: Vec3,
    }

    impl ObservationSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<FramePair>, TrackError> {
            let Some(pair) = self.frames.pop_front() else {
                return Ok(None);
            };
            if self.desync_at == Some(pair.object.id) {
                return Err(TrackError::StreamDesync {
                    frame: pair.object.id,
                });
            }
            Ok(Some(pair))
        }
        fn viewpoint(&self) -> Vec3 {
            self.viewpoint
        }
    }

    #[derive(Default)]
    struct CollectSink {
        snaps: Vec<(FrameId, usize, Vec<Vec3>)>,
    }

    impl SnapshotSink for CollectSink {
        fn snapshot(&mut self, frame: FrameId, iter: usize, nodes: &[Vec3]) {
            self.snaps.push((frame, iter, nodes.to_vec()));
        }
    }

    fn frame(id: u64, pts: &[[f64; 3]]) -> FramePair {
        FramePair {
            object: CloudFrame {
                id: FrameId(id),
                time: id as f64 * 0.1,
                points: pts
                    .iter()
                    .map(|p| ObservedPoint::new(p[0], p[1], p[2]))
                    .collect(),
            },
            scene: None,
        }
    }

    fn test_config(n_iter: usize) -> TrackerConfig {
        TrackerConfig {
            bandwidth: 1.0,
            n_iter,
            outlier_param: 0.01,
            cutoff: 0.001,
            impulse_gain: 0.5,
            sub_step_dt: 0.01,
            occluded_visibility: 0.1,
            record: RecordMode::Off,
        }
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        let cases: Vec<(&str, TrackerConfig)> = vec![
            ("bandwidth", TrackerConfig { bandwidth: 0.0, ..Default::default() }),
            ("bandwidth", TrackerConfig { bandwidth: -1.0, ..Default::default() }),
            ("outlier_param", TrackerConfig { outlier_param: 0.0, ..Default::default() }),
            ("cutoff", TrackerConfig { cutoff: 0.0, ..Default::default() }),
            ("cutoff", TrackerConfig { cutoff: 1.0, ..Default::default() }),
            ("impulse_gain", TrackerConfig { impulse_gain: -0.1, ..Default::default() }),
            ("sub_step_dt", TrackerConfig { sub_step_dt: 0.0, ..Default::default() }),
            (
                "occluded_visibility",
                TrackerConfig { occluded_visibility: 1.5, ..Default::default() },
            ),
        ];
        for (name, cfg) in cases {
            match cfg.validate() {
                Err(TrackError::InvalidParameter { name: n, .. }) => assert_eq!(n, name),
                other => panic!("expected InvalidParameter({name}), got {other:?}"),
            }
        }
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn n_iter_zero_is_a_noop() {
        let tracker = Tracker::new(test_config(0)).unwrap();
        let mut world = MockWorld::new(vec![Vec3::zeros()]);
        let out = tracker
            .process_frame(&mut world, &frame(0, &[[1.0, 0.0, 0.0]]), Vec3::new(0.0, 0.0, 5.0), None)
            .unwrap();

        assert_eq!(out.iterations.len(), 0);
        assert_eq!(world.steps, 0, "no physics steps for n_iter=0");
        assert_eq!(world.impulse_calls, 0, "no force applications for n_iter=0");
    }

    #[test]
    fn estimate_is_pulled_toward_observation() {
        let tracker = Tracker::new(test_config(5)).unwrap();
        let mut world = MockWorld::new(vec![Vec3::zeros()]);
        let target = Vec3::new(1.0, 0.0, 0.0);
        let before = (world.positions[0] - target).norm();

        tracker
            .process_frame(&mut world, &frame(0, &[[1.0, 0.0, 0.0]]), Vec3::new(0.0, 0.0, 5.0), None)
            .unwrap();

        let after = (world.positions[0] - target).norm();
        assert!(after < before, "node should move toward the observed point");
        assert_eq!(world.steps, 5);
    }

    #[test]
    fn record_every_iteration_snapshots_each_step() {
        let mut cfg = test_config(4);
        cfg.record = RecordMode::EveryIteration;
        let tracker = Tracker::new(cfg).unwrap();
        let mut world = MockWorld::new(vec![Vec3::zeros()]);
        let mut sink = CollectSink::default();

        let out = tracker
            .process_frame(
                &mut world,
                &frame(3, &[[0.5, 0.0, 0.0]]),
                Vec3::new(0.0, 0.0, 5.0),
                Some(&mut sink),
            )
            .unwrap();

        assert_eq!(out.snapshots, 4);
        assert_eq!(sink.snaps.len(), 4);
        let iters: Vec<usize> = sink.snaps.iter().map(|s| s.1).collect();
        assert_eq!(iters, vec![0, 1, 2, 3]);
    }

    #[test]
    fn record_final_iteration_snapshots_once() {
        let mut cfg = test_config(4);
        cfg.record = RecordMode::FinalIteration;
        let tracker = Tracker::new(cfg).unwrap();
        let mut world = MockWorld::new(vec![Vec3::zeros()]);
        let mut sink = CollectSink::default();

        let out = tracker
            .process_frame(
                &mut world,
                &frame(7, &[[0.5, 0.0, 0.0]]),
                Vec3::new(0.0, 0.0, 5.0),
                Some(&mut sink),
            )
            .unwrap();

        assert_eq!(out.snapshots, 1);
        assert_eq!(sink.snaps.len(), 1);
        let (fid, iter, nodes) = &sink.snaps[0];
        assert_eq!(*fid, FrameId(7));
        assert_eq!(*iter, 3, "final-only mode fires on iteration n_iter-1");
        // The snapshot is the state handed to the next frame.
        assert_eq!(nodes[0], world.positions[0]);
    }

    #[test]
    fn desync_aborts_the_stream() {
        let tracker = Tracker::new(test_config(2)).unwrap();
        let mut world = MockWorld::new(vec![Vec3::zeros()]);
        let mut source = VecSource {
            frames: [
                frame(0, &[[0.1, 0.0, 0.0]]),
                frame(1, &[[0.2, 0.0, 0.0]]),
                frame(2, &[[0.3, 0.0, 0.0]]),
            ]
            .into_iter()
            .collect(),
            desync_at: Some(FrameId(1)),
            viewpoint: Vec3::new(0.0, 0.0, 5.0),
        };

        let err = track_stream(&tracker, &mut world, &mut source, || true, None).unwrap_err();
        assert!(matches!(err, TrackError::StreamDesync { frame } if frame == FrameId(1)));
        // Frame 0 ran; nothing after the desync did.
        assert_eq!(world.steps, 2, "only the pre-desync frame was processed");
    }

    #[test]
    fn end_of_stream_terminates_cleanly() {
        let tracker = Tracker::new(test_config(3)).unwrap();
        let mut world = MockWorld::new(vec![Vec3::zeros()]);
        let mut source = VecSource {
            frames: [frame(0, &[[0.1, 0.0, 0.0]]), frame(1, &[[0.2, 0.0, 0.0]])]
                .into_iter()
                .collect(),
            desync_at: None,
            viewpoint: Vec3::new(0.0, 0.0, 5.0),
        };

        let summary = track_stream(&tracker, &mut world, &mut source, || true, None).unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.iterations, 6);
        assert_eq!(world.steps, 6);
    }

    #[test]
    fn liveness_callback_stops_the_loop() {
        let tracker = Tracker::new(test_config(3)).unwrap();
        let mut world = MockWorld::new(vec![Vec3::zeros()]);
        let mut source = VecSource {
            frames: [frame(0, &[[0.1, 0.0, 0.0]])].into_iter().collect(),
            desync_at: None,
            viewpoint: Vec3::new(0.0, 0.0, 5.0),
        };

        let summary = track_stream(&tracker, &mut world, &mut source, || false, None).unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(world.steps, 0);
    }

    #[test]
    fn stream_recording_spans_frames() {
        // The recorder is reborrowed once per frame by the stream loop and
        // once per iteration inside it; snapshots from every frame land in
        // the same sink.
        let mut cfg = test_config(2);
        cfg.record = RecordMode::FinalIteration;
        let tracker = Tracker::new(cfg).unwrap();
        let mut world = MockWorld::new(vec![Vec3::zeros()]);
        let mut source = VecSource {
            frames: [frame(0, &[[0.1, 0.0, 0.0]]), frame(1, &[[0.2, 0.0, 0.0]])]
                .into_iter()
                .collect(),
            desync_at: None,
            viewpoint: Vec3::new(0.0, 0.0, 5.0),
        };
        let mut sink = CollectSink::default();

        let summary =
            track_stream(&tracker, &mut world, &mut source, || true, Some(&mut sink)).unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(sink.snaps.len(), 2);
        let ids: Vec<FrameId> = sink.snaps.iter().map(|s| s.0).collect();
        assert_eq!(ids, vec![FrameId(0), FrameId(1)]);
    }

    #[test]
    fn empty_observation_frame_is_benign() {
        let tracker = Tracker::new(test_config(2)).unwrap();
        let mut world = MockWorld::new(vec![Vec3::zeros()]);
        let out = tracker
            .process_frame(&mut world, &frame(0, &[]), Vec3::new(0.0, 0.0, 5.0), None)
            .unwrap();

        assert_eq!(out.iterations.len(), 2);
        assert_eq!(world.positions[0], Vec3::zeros(), "no observations, no drift");
        assert_eq!(world.steps, 2, "physics still advances");
    }
}
