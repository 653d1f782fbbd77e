//! Headless planet viewer.
//!
//! Flies a camera down to a planet's surface and back up, driving the
//! quadtree through a [`TreeScheduler`] the way a render loop would:
//! tick and poll every frame, then drain the render queue into a sink.
//! The sink here only keeps statistics.

mod config;
mod sink;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use planet_lod::{CameraState, Planet, TreeScheduler};
use tracing::info;
use tracing_subscriber::EnvFilter;
use web_time::Instant;

use config::ViewerConfig;
use sink::StatsSink;

/// Headless host for planet_lod.
#[derive(Parser, Debug)]
#[command(name = "planet_viewer")]
#[command(about = "Flies a camera over a procedural planet and reports LOD statistics")]
struct Args {
	/// Path to a configuration TOML file (defaults are used without one).
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Override the terrain flavour.
	#[arg(short, long)]
	terrain: Option<String>,

	/// Override the terrain seed.
	#[arg(short, long)]
	seed: Option<u32>,

	/// Override the number of descent frames.
	#[arg(short, long)]
	frames: Option<u32>,

	/// Log every cycle.
	#[arg(short, long)]
	verbose: bool,
}

fn main() -> Result<()> {
	let args = Args::parse();

	let filter = if args.verbose { "debug" } else { "info" };
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
		.init();

	let mut config = match &args.config {
		Some(path) => ViewerConfig::load(path)?,
		None => ViewerConfig::default(),
	};
	if let Some(terrain) = args.terrain {
		config.planet.terrain = terrain;
	}
	if let Some(seed) = args.seed {
		config.planet.seed = seed;
	}
	if let Some(frames) = args.frames {
		config.flight.frames = frames.max(1);
	}

	let planet_config = config.planet_config()?;
	let direction = config.flight_direction()?;
	info!(
		terrain = %config.planet.terrain,
		radius = planet_config.sphere_radius,
		depths = ?(planet_config.min_depth, planet_config.max_depth),
		"building planet"
	);

	let planet = Arc::new(Planet::with_terrain(planet_config)?);
	let mut scheduler = TreeScheduler::new(Arc::clone(&planet));
	let mut sink = StatsSink::default();

	let budget = match config.flight.transitions_per_frame {
		0 => usize::MAX,
		n => n,
	};
	let frame_time = Duration::from_millis(config.flight.frame_ms);
	let total_frames = 2 * config.flight.frames;
	let started = Instant::now();

	for frame in 0..=total_frames {
		let frame_start = Instant::now();
		let altitude = config.altitude_at(frame);
		let camera = CameraState::new(direction * (planet.config().sphere_radius + altitude));

		scheduler.tick(frame_start, &camera);
		if let Some(report) = scheduler.poll(Instant::now()) {
			tracing::debug!(
				frame,
				altitude,
				leaves = report.stats.leaves,
				max_depth = report.stats.max_depth,
				us = report.elapsed_us,
				"cycle"
			);
		}

		let applied = planet.render_queue().apply_budgeted(&mut sink, budget);
		scheduler.metrics_mut().record_apply(&applied);
		for error in &applied.errors {
			tracing::warn!(%error, "sink failure");
		}

		if frame % 60 == 0 {
			info!(
				frame,
				altitude = altitude.round(),
				leaves = planet.leaf_count(),
				max_depth = planet.max_depth(),
				visible = sink.visible_count(),
				triangles = sink.visible_triangles(),
				"flight"
			);
		}

		if let Some(rest) = frame_time.checked_sub(frame_start.elapsed()) {
			std::thread::sleep(rest);
		}
	}

	// Let the last cycle land before reporting.
	while scheduler.is_busy() {
		scheduler.poll(Instant::now());
		std::thread::sleep(Duration::from_millis(1));
	}
	planet.render_queue().apply(&mut sink);

	let metrics = scheduler.metrics();
	println!("\nFlight finished in {:.1}s", started.elapsed().as_secs_f64());
	println!("  cycles:        {}", metrics.cycles);
	println!("  avg cycle:     {:.0} us", metrics.avg_cycle_us());
	if let Some((min, max)) = metrics.cycle_timings.min_max() {
		println!("  cycle range:   {min}..{max} us (last {})", metrics.cycle_timings.len());
	}
	println!("  splits:        {}", metrics.total_splits);
	println!("  merges:        {}", metrics.total_merges);
	println!("  deferred:      {}", metrics.total_deferred);
	println!("  re-emitted:    {}", metrics.total_reemitted);
	println!("  sink failures: {}", metrics.total_sink_failures);
	println!(
		"  attached:      {} patches, peak {}, {} attaches",
		sink.attached_count(),
		sink.peak_attached,
		sink.total_attaches
	);
	println!(
		"  visible:       {} patches, {} triangles, {} vertices",
		sink.visible_count(),
		sink.visible_triangles(),
		sink.visible_vertices()
	);
	println!("  leaves/depth:");
	for (depth, count) in planet.leaves_per_depth().iter().enumerate() {
		if *count > 0 {
			println!("    {depth:>2}: {count}");
		}
	}

	planet.teardown();
	let report = planet.render_queue().apply(&mut sink);
	info!(destroyed = report.stats.destroyed, remaining = sink.attached_count(), "torn down");

	Ok(())
}
