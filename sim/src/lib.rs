//! `sim` — Scenario simulator: deformable body, synthetic point clouds, replay.
//!
//! The mass-spring body here is a stand-in for the opaque physics engine the
//! tracking core is written against; it exists to exercise the loop, not to
//! be a physics engine.

pub mod cloud_sim;
pub mod replay;
pub mod scenarios;
pub mod soft_body;

pub use cloud_sim::CloudSimulator;
pub use replay::{load_replay, save_replay, ReplayLog, ReplaySource, SnapshotLog};
pub use scenarios::{Scenario, ScenarioKind};
pub use soft_body::{SoftBody, SoftBodyParams};
