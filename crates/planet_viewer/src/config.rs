//! Viewer configuration: planet settings plus the scripted flight.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use glam::DVec3;
use planet_lod::{PlanetConfig, TerrainKind};
use serde::Deserialize;

/// Root viewer configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
	pub planet: PlanetSection,
	pub flight: FlightSection,
}

/// Planet settings. Unset fields keep the library defaults.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlanetSection {
	pub radius: f64,
	pub min_depth: u8,
	pub max_depth: u8,
	pub face_resolution: usize,
	/// Terrain flavour name (`terrestrial`, `molten`, `frozen`, `rocky`, `dune`).
	pub terrain: String,
	pub seed: u32,
	pub amplitude: f64,
	pub frequency: f64,
	pub sea_level: f64,
	pub lod_quality: f64,
	pub merge_hysteresis: f64,
	pub tick_interval_ms: u64,
}

impl Default for PlanetSection {
	fn default() -> Self {
		let defaults = PlanetConfig::default();
		Self {
			radius: 6_000.0,
			min_depth: 2,
			max_depth: 10,
			face_resolution: defaults.face_resolution,
			terrain: defaults.terrain.name().to_string(),
			seed: defaults.seed,
			amplitude: 0.01,
			frequency: defaults.noise_frequency,
			sea_level: defaults.sea_level,
			lod_quality: defaults.lod_quality,
			merge_hysteresis: defaults.merge_hysteresis,
			tick_interval_ms: defaults.tick_interval.as_millis() as u64,
		}
	}
}

/// Straight-line descent and climb over one point of the planet.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FlightSection {
	/// Direction from the planet centre to the point flown over.
	pub direction: [f64; 3],
	/// Altitudes above the sea surface at the ends of the flight.
	pub high_altitude: f64,
	pub low_altitude: f64,
	/// Frames spent descending; the climb takes as many again.
	pub frames: u32,
	/// Simulated frame time.
	pub frame_ms: u64,
	/// Patches the render thread may transition per frame (0 = unlimited).
	pub transitions_per_frame: usize,
}

impl Default for FlightSection {
	fn default() -> Self {
		Self {
			direction: [0.3, 0.2, 1.0],
			high_altitude: 30_000.0,
			low_altitude: 50.0,
			frames: 300,
			frame_ms: 16,
			transitions_per_frame: 0,
		}
	}
}

impl ViewerConfig {
	/// Load configuration from a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {}", path.display()))?;
		let config: ViewerConfig =
			toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;

		if config.flight.frames == 0 {
			anyhow::bail!("flight.frames must be at least 1");
		}
		if config.flight.low_altitude > config.flight.high_altitude {
			anyhow::bail!(
				"flight.low_altitude {} exceeds high_altitude {}",
				config.flight.low_altitude,
				config.flight.high_altitude
			);
		}
		Ok(config)
	}

	/// Library configuration for the planet section.
	pub fn planet_config(&self) -> Result<PlanetConfig> {
		let p = &self.planet;
		let terrain = TerrainKind::from_name(&p.terrain)
			.with_context(|| format!("Unknown terrain flavour: {}", p.terrain))?;

		let mut config = PlanetConfig::default()
			.with_sphere_radius(p.radius)
			.with_depth_range(p.min_depth, p.max_depth)
			.with_face_resolution(p.face_resolution)
			.with_terrain(terrain, p.seed)
			.with_noise(p.amplitude, p.frequency)
			.with_sea_level(p.sea_level)
			.with_merge_hysteresis(p.merge_hysteresis)
			.with_tick_interval(Duration::from_millis(p.tick_interval_ms));
		config.lod_quality = p.lod_quality;

		config.validate().context("Invalid planet configuration")?;
		Ok(config)
	}

	/// Unit direction of the flight path.
	pub fn flight_direction(&self) -> Result<DVec3> {
		DVec3::from_array(self.flight.direction)
			.try_normalize()
			.context("flight.direction must be non-zero")
	}

	/// Camera altitude at `frame` of the descent-then-climb flight.
	pub fn altitude_at(&self, frame: u32) -> f64 {
		let f = &self.flight;
		let leg = frame.min(2 * f.frames);
		let t = if leg <= f.frames {
			leg as f64 / f.frames as f64
		} else {
			(2 * f.frames - leg) as f64 / f.frames as f64
		};
		// Geometric interpolation spends equal time per doubling of altitude.
		let ratio = f.low_altitude.max(1.0) / f.high_altitude.max(1.0);
		f.high_altitude.max(1.0) * ratio.powf(t)
	}
}
