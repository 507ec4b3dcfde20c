//! Demo binary that drives a simulated scene through the LOD scheduler.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p lodestar-demo` for the default scene.
//! Run with `cargo run -p lodestar-demo -- --entities 2000 --frame-budget-ms 0.5`
//! to watch work being deferred across frames.

mod population;

use std::time::Duration;

use clap::Parser;
use glam::Vec3;
use lodestar_config::{CliArgs, Config, DemoConfig, default_config_dir};
use lodestar_lod::{FrameReport, LodScheduler, MemoryBackend, MemoryScene, Observer, RemovalOutcome};
use tracing::{info, warn};

/// Frames between progress lines.
const REPORT_INTERVAL: u32 = 60;

/// Running totals over the simulated frames.
#[derive(Debug, Default)]
struct Totals {
    requests: usize,
    cancellations: usize,
    immediate_bakes: usize,
    budgeted_bakes: usize,
    max_deferred: usize,
    bake_time: Duration,
    worst_budgeted: Duration,
    reclaims: usize,
    violations: usize,
}

impl Totals {
    fn add(&mut self, report: &FrameReport) {
        self.requests += report.requests;
        self.cancellations += report.cancellations;
        self.immediate_bakes += report.immediate_bakes;
        self.budgeted_bakes += report.budgeted_bakes;
        self.max_deferred = self.max_deferred.max(report.deferred_combiners);
        self.bake_time += report.bake_time();
        self.worst_budgeted = self.worst_budgeted.max(report.budgeted_time);
        self.reclaims += usize::from(report.reclaimed);
        self.violations += report.integrity_violations;
    }
}

/// The walking camera: circles the field at eye height, looking at the center.
fn walker(frame: u32, config: &DemoConfig, fov_y: f32) -> Observer {
    let radius = config.spread.max(1.0) * 0.5;
    let angle = frame as f32 * config.observer_speed / radius;
    let position = Vec3::new(angle.cos() * radius, 2.0, angle.sin() * radius);
    Observer::perspective(position, fov_y).looking_at(Vec3::ZERO)
}

/// A close top-down inspection camera over the field's center.
fn inspector() -> Observer {
    Observer::orthographic(Vec3::new(0.0, 50.0, 0.0), 10.0).looking_at(Vec3::ZERO)
}

fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);
    if let Err(e) = config.validate() {
        eprintln!("Rejected command-line override: {e}, using default scheduler settings");
        config.scheduler = Default::default();
    }

    let log_dir = config_dir.join("logs");
    lodestar_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    info!("Lodestar LOD scheduler demo");
    info!(
        "Frame budget {} ms, check interval {} frames, {} frames to simulate",
        config.scheduler.frame_budget_ms, config.scheduler.check_interval_frames, config.demo.frames
    );

    let mut scene = MemoryScene::new();
    let prototypes = population::prototypes_for(&config.combiners);
    let mut scheduler = LodScheduler::new(
        &config.scheduler,
        prototypes,
        Box::new(MemoryBackend::default()),
    );
    let ids = population::populate(&mut scheduler, &mut scene, &config.demo);

    let fov_y = config.scheduler.default_fov_degrees.to_radians();
    let frames = config.demo.frames;
    let mut totals = Totals::default();

    for frame in 0..frames {
        let mut observers = vec![walker(frame, &config.demo, fov_y)];
        if frame % 200 >= 190 {
            observers.push(inspector());
        }
        let report = scheduler.tick(&observers, &mut scene);
        totals.add(&report);

        if frame == frames / 2 {
            let (mut disposed, mut deferred) = (0, 0);
            for &id in ids.iter().step_by(4) {
                match scheduler.remove_entity(id, &mut scene) {
                    Ok(RemovalOutcome::Disposed) => disposed += 1,
                    Ok(RemovalOutcome::Deferred) => deferred += 1,
                    Err(e) => warn!("Failed to remove entity: {e}"),
                }
            }
            info!("Removed entities: {disposed} disposed, {deferred} waiting for their combiner");
        }

        if frame % REPORT_INTERVAL == 0 {
            info!(
                "Frame {frame}: {} active proxies, {} requests, {}+{} bakes in {:?}, \
                 {} combiners deferred",
                scene.active_count(),
                report.requests,
                report.immediate_bakes,
                report.budgeted_bakes,
                report.bake_time(),
                report.deferred_combiners
            );
        }
    }

    info!(
        "Simulated {frames} frames: {} requests ({} cancelled), {} immediate and {} budgeted bakes",
        totals.requests, totals.cancellations, totals.immediate_bakes, totals.budgeted_bakes
    );
    info!(
        "Total bake time {:?}, worst budgeted frame {:?} (budget {:?}), \
         at most {} combiners deferred",
        totals.bake_time,
        totals.worst_budgeted,
        scheduler.frame_budget(),
        totals.max_deferred
    );
    info!("{} reclaim passes, {} integrity violations", totals.reclaims, totals.violations);

    scheduler.shutdown(&mut scene);
}
