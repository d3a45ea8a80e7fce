//! `deformtrack` CLI: batch scenario runs, replay re-tracking, recording.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use sim::cloud_sim::CloudSimulator;
use sim::replay::{save_replay, GroundTruthFrame, ReplayLog, ReplaySource, SnapshotLog};
use sim::scenarios::{Scenario, ScenarioKind};
use std::path::PathBuf;
use tracing::debug;
use tracking_core::metrics::TrackingMetrics;
use tracking_core::{track_stream, NodeQuery, RecordMode, Tracker, TrackerConfig};

#[derive(Parser)]
#[command(name = "deformtrack", about = "Deformable-object tracker CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named scenario in batch mode and output metrics.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Override the scenario's frame count
        #[arg(long)]
        frames: Option<u64>,
        /// Gaussian matching bandwidth σ
        #[arg(long, default_value_t = 0.1)]
        bandwidth: f64,
        /// Inner iterations per observation frame
        #[arg(long, default_value_t = 10)]
        n_iter: usize,
        /// Tracking stiffness (impulse gain)
        #[arg(long, default_value_t = 10.0)]
        gain: f64,
        /// Drop the object cloud at this frame (stream-desync drill)
        #[arg(long)]
        desync_at: Option<u64>,
        /// Record estimated node snapshots to a JSON file
        #[arg(long)]
        record_snapshots: Option<PathBuf>,
        /// Snapshot every inner iteration instead of only the final one
        #[arg(long, default_value_t = false)]
        record_every: bool,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save the full observation log for replay
        #[arg(long)]
        save_replay: Option<PathBuf>,
    },
    /// Re-track a previously recorded observation log.
    Replay {
        /// Path to replay JSON file
        input: PathBuf,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            frames,
            bandwidth,
            n_iter,
            gain,
            desync_at,
            record_snapshots,
            record_every,
            output,
            save_replay: save_path,
        } => run_scenario(RunArgs {
            kind: scenario,
            seed,
            frames,
            bandwidth,
            n_iter,
            gain,
            desync_at,
            record_snapshots,
            record_every,
            output,
            save_replay: save_path,
        }),
        Commands::Replay { input, output } => run_replay(&input, output.as_deref()),
    }
}

struct RunArgs {
    kind: ScenarioKind,
    seed: u64,
    frames: Option<u64>,
    bandwidth: f64,
    n_iter: usize,
    gain: f64,
    desync_at: Option<u64>,
    record_snapshots: Option<PathBuf>,
    record_every: bool,
    output: Option<PathBuf>,
    save_replay: Option<PathBuf>,
}

fn run_scenario(args: RunArgs) -> Result<()> {
    let mut scenario = Scenario::build(args.kind, args.seed);
    if let Some(frames) = args.frames {
        scenario.frames = frames;
    }

    let mut cloud_sim = CloudSimulator::new(scenario.camera.clone(), args.seed);
    if let Some(f) = args.desync_at {
        cloud_sim = cloud_sim.with_desync_at(f);
    }

    let record = if args.record_snapshots.is_none() {
        RecordMode::Off
    } else if args.record_every {
        RecordMode::EveryIteration
    } else {
        RecordMode::FinalIteration
    };
    let tracker = Tracker::new(TrackerConfig {
        bandwidth: args.bandwidth,
        n_iter: args.n_iter,
        impulse_gain: args.gain,
        record,
        ..Default::default()
    })?;

    let mut estimate = scenario.estimate.clone();
    let viewpoint = scenario.camera.viewpoint();
    let mut snapshot_log = SnapshotLog::default();
    let mut metrics = TrackingMetrics::default();
    let mut all_frames = Vec::new();
    let mut gt_frames = Vec::new();

    println!(
        "Running scenario '{}' (seed={}, {} frames, {} nodes)...",
        scenario.name,
        args.seed,
        scenario.frames,
        scenario.truth.node_count()
    );

    let start = std::time::Instant::now();
    let mut total_iterations = 0u64;

    for t in 0..scenario.frames {
        scenario.step_truth(t);
        let time = t as f64 * scenario.frame_dt;
        let pair = cloud_sim.observe(&scenario.truth, time)?;
        all_frames.push(pair.clone());
        gt_frames.push(GroundTruthFrame {
            time,
            nodes: scenario
                .truth
                .positions()
                .iter()
                .map(|p| [p.x, p.y, p.z])
                .collect(),
        });

        let recorder: Option<&mut dyn tracking_core::SnapshotSink> =
            if args.record_snapshots.is_some() {
                Some(&mut snapshot_log)
            } else {
                None
            };
        let out = tracker.process_frame(&mut estimate, &pair, viewpoint, recorder)?;
        total_iterations += out.iterations.len() as u64;

        metrics.accumulate(&estimate.node_positions(), scenario.truth.positions());
        debug!(
            frame = t,
            observed = pair.object.len(),
            rmse = metrics.rmse(),
            us = out.total_time_us,
            "frame tracked"
        );
    }

    let elapsed = start.elapsed();
    println!(
        "Done: {} frames, {} iterations, rmse={:.4} m, max_err={:.4} m, elapsed={:.2}s",
        metrics.n_frames,
        total_iterations,
        metrics.rmse(),
        metrics.max_err,
        elapsed.as_secs_f64(),
    );

    if let Some(path) = &args.record_snapshots {
        snapshot_log.save(path)?;
        println!(
            "Snapshots saved to {} ({} entries)",
            path.display(),
            snapshot_log.snapshots.len()
        );
    }

    if let Some(rpath) = &args.save_replay {
        let log = ReplayLog {
            scenario_name: scenario.name.clone(),
            seed: args.seed,
            frame_dt: scenario.frame_dt,
            camera: scenario.camera.clone(),
            frames: all_frames,
            ground_truth: gt_frames,
        };
        save_replay(&log, rpath)?;
        println!("Replay saved to {}", rpath.display());
    }

    if let Some(opath) = &args.output {
        let json = serde_json::json!({
            "scenario": scenario.name,
            "seed": args.seed,
            "elapsed_s": elapsed.as_secs_f64(),
            "frames": metrics.n_frames,
            "iterations": total_iterations,
            "rmse_m": metrics.rmse(),
            "max_err_m": metrics.max_err,
        });
        std::fs::write(opath, serde_json::to_string_pretty(&json)?)?;
        println!("Metrics saved to {}", opath.display());
    }

    Ok(())
}

fn run_replay(input: &std::path::Path, output_path: Option<&std::path::Path>) -> Result<()> {
    let log = sim::replay::load_replay(input)?;
    println!(
        "Re-tracking '{}' ({} frames)...",
        log.scenario_name,
        log.frames.len()
    );

    let kind = ScenarioKind::from_str(&log.scenario_name, true)
        .map_err(|e| anyhow::anyhow!("unknown scenario '{}': {e}", log.scenario_name))?;
    let mut estimate = Scenario::build(kind, log.seed).estimate;

    let tracker = Tracker::new(TrackerConfig::default())?;
    let mut source = ReplaySource::new(&log);

    let start = std::time::Instant::now();
    let summary = track_stream(&tracker, &mut estimate, &mut source, || true, None)?;
    let elapsed = start.elapsed();

    // Final-frame error against the recorded ground truth.
    let final_err = log.ground_truth.last().map(|gt| {
        let mut m = TrackingMetrics::default();
        m.accumulate(&estimate.node_positions(), &gt.positions());
        m.rmse()
    });

    println!(
        "Replay done: {} frames, {} iterations, elapsed={:.2}s{}",
        summary.frames,
        summary.iterations,
        elapsed.as_secs_f64(),
        final_err.map_or(String::new(), |e| format!(", final rmse={e:.4} m")),
    );

    if let Some(opath) = output_path {
        let json = serde_json::json!({
            "scenario": log.scenario_name,
            "seed": log.seed,
            "elapsed_s": elapsed.as_secs_f64(),
            "frames": summary.frames,
            "final_rmse_m": final_err,
        });
        std::fs::write(opath, serde_json::to_string_pretty(&json)?)?;
    }

    Ok(())
}
