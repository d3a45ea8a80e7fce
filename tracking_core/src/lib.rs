//! `tracking_core` — Deformable-object tracking core.
//!
//! Fuses a stream of noisy, partially-occluded 3D point observations with a
//! physically simulated model of the object. The simulation is the
//! regularized prior; per frame the loop nudges it toward the observations
//! with synthetic forces derived from a probabilistic correspondence.
//!
//! # Module layout
//! - [`types`]          — Fundamental types (IDs, observed points, frames)
//! - [`error`]          — Error taxonomy (invalid parameter, stream desync)
//! - [`world`]          — Physics boundary traits (`NodeQuery` / `ForceSink`)
//! - [`visibility`]     — Per-node occlusion probability from the viewpoint
//! - [`correspondence`] — Sparse soft node ↔ point assignment with outlier sink
//! - [`forces`]         — Correspondence → corrective impulse per node
//! - [`pipeline`]       — Tracking loop orchestrator, config, run driver
//! - [`metrics`]        — Node-error metrics against simulated ground truth

pub mod correspondence;
pub mod error;
pub mod forces;
pub mod metrics;
pub mod pipeline;
pub mod types;
pub mod visibility;
pub mod world;

pub use correspondence::{estimate_correspondence, CorrEntry, SparseCorr};
pub use error::TrackError;
pub use forces::synthesize_impulses;
pub use pipeline::{
    track_stream, ObservationSource, RecordMode, RunSummary, SnapshotSink, StepOutput, Tracker,
    TrackerConfig,
};
pub use types::{CloudFrame, FrameId, FramePair, ObservedPoint, Vec3};
pub use visibility::estimate_visibility;
pub use world::{ForceSink, NodeQuery};
