//! Height-field samplers.
//!
//! A [`HeightFieldSampler`] maps a unit direction to a displaced point in
//! planet radii (a point at length 1.0 lies on the sea surface). The tree
//! scales the result by the sphere radius, and a patch gets sea geometry
//! when its land dips below that surface by more than the sea tolerance.
//!
//! [`TerrainSampler`] is the stock implementation: one of a closed set of
//! [`TerrainKind`] flavours built from `noise` generators once at planet
//! construction.

use glam::DVec3;
use noise::{Billow, Fbm, MultiFractal, NoiseFn, Perlin, RidgedMulti};

use crate::config::PlanetConfig;

/// Deterministic direction → displaced point function.
///
/// Implementations must be pure: the same direction always yields a
/// bit-identical point, and concurrent calls from worker threads are allowed.
pub trait HeightFieldSampler: Send + Sync {
  /// Displaced point for `direction` (unit length), in planet radii.
  fn sample(&self, direction: DVec3) -> DVec3;
}

/// Undisplaced sphere: every direction maps onto the sea surface.
#[derive(Clone, Copy, Debug, Default)]
pub struct SphereSampler;

impl HeightFieldSampler for SphereSampler {
  #[inline]
  fn sample(&self, direction: DVec3) -> DVec3 {
    direction
  }
}

/// Terrain flavours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TerrainKind {
  /// Continents above a sea level with ridged mountain ranges.
  #[default]
  Terrestrial,
  /// Cracked volcanic crust.
  Molten,
  /// Smooth billowed ice sheets with terraced plateaus.
  Frozen,
  /// Pitted, high-persistence rock.
  Rocky,
  /// Domain-warped dune ridges.
  Dune,
}

impl TerrainKind {
  pub const ALL: [TerrainKind; 5] = [
    TerrainKind::Terrestrial,
    TerrainKind::Molten,
    TerrainKind::Frozen,
    TerrainKind::Rocky,
    TerrainKind::Dune,
  ];

  pub fn name(self) -> &'static str {
    match self {
      TerrainKind::Terrestrial => "terrestrial",
      TerrainKind::Molten => "molten",
      TerrainKind::Frozen => "frozen",
      TerrainKind::Rocky => "rocky",
      TerrainKind::Dune => "dune",
    }
  }

  /// Parse a lowercase flavour name.
  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|k| k.name() == name)
  }
}

/// Noise generators backing one [`TerrainKind`].
#[derive(Clone)]
enum TerrainNoise {
  Terrestrial {
    continents: Fbm<Perlin>,
    mountains: RidgedMulti<Perlin>,
  },
  Molten {
    crust: Fbm<Perlin>,
    cracks: RidgedMulti<Perlin>,
  },
  Frozen {
    sheets: Billow<Perlin>,
    detail: Fbm<Perlin>,
  },
  Rocky {
    rock: Fbm<Perlin>,
    pits: Perlin,
  },
  Dune {
    warp: Fbm<Perlin>,
    ripples: Perlin,
  },
}

/// Seeded procedural terrain sampler.
#[derive(Clone)]
pub struct TerrainSampler {
  kind: TerrainKind,
  seed: u32,
  /// Displacement relative to the sphere radius.
  pub amplitude: f64,
  /// Elevation (`[-1, 1]`) that maps onto the sea surface.
  pub sea_level: f64,
  frequency: f64,
  noise: TerrainNoise,
}

impl TerrainSampler {
  pub fn new(kind: TerrainKind, seed: u32) -> Self {
    Self::with_params(kind, seed, 0.1, 1.0, 0.0)
  }

  /// Sampler configured from a planet's terrain settings.
  pub fn from_config(config: &PlanetConfig) -> Self {
    Self::with_params(
      config.terrain,
      config.seed,
      config.noise_amplitude,
      config.noise_frequency,
      config.sea_level,
    )
  }

  pub fn with_params(
    kind: TerrainKind,
    seed: u32,
    amplitude: f64,
    frequency: f64,
    sea_level: f64,
  ) -> Self {
    let noise = match kind {
      TerrainKind::Terrestrial => TerrainNoise::Terrestrial {
        continents: Fbm::<Perlin>::new(seed).set_octaves(6).set_frequency(1.2),
        mountains: RidgedMulti::<Perlin>::new(seed.wrapping_add(1))
          .set_octaves(5)
          .set_frequency(4.0),
      },
      TerrainKind::Molten => TerrainNoise::Molten {
        crust: Fbm::<Perlin>::new(seed).set_octaves(5).set_frequency(2.0),
        cracks: RidgedMulti::<Perlin>::new(seed.wrapping_add(1))
          .set_octaves(3)
          .set_frequency(6.0),
      },
      TerrainKind::Frozen => TerrainNoise::Frozen {
        sheets: Billow::<Perlin>::new(seed).set_octaves(4).set_frequency(1.5),
        detail: Fbm::<Perlin>::new(seed.wrapping_add(1))
          .set_octaves(4)
          .set_frequency(8.0),
      },
      TerrainKind::Rocky => TerrainNoise::Rocky {
        rock: Fbm::<Perlin>::new(seed)
          .set_octaves(8)
          .set_persistence(0.6)
          .set_frequency(2.5),
        pits: Perlin::new(seed.wrapping_add(1)),
      },
      TerrainKind::Dune => TerrainNoise::Dune {
        warp: Fbm::<Perlin>::new(seed).set_octaves(3).set_frequency(1.0),
        ripples: Perlin::new(seed.wrapping_add(1)),
      },
    };

    Self {
      kind,
      seed,
      amplitude,
      sea_level,
      frequency,
      noise,
    }
  }

  #[inline]
  pub fn kind(&self) -> TerrainKind {
    self.kind
  }

  #[inline]
  pub fn seed(&self) -> u32 {
    self.seed
  }

  /// Unscaled elevation above the sea surface at `direction`, roughly in
  /// `[-1, 1]`. Every flavour is shifted down by `sea_level`, so the
  /// configured level always lands on the undisplaced sphere and negative
  /// values are under water.
  pub fn elevation(&self, direction: DVec3) -> f64 {
    let p = (direction * self.frequency).to_array();
    let height = self.relief(direction, p) - self.sea_level;
    match &self.noise {
      TerrainNoise::Terrestrial { mountains, .. } if height >= 0.0 => {
        height + mountains.get(p).max(0.0) * height.min(1.0) * 0.6
      }
      // Flatten ocean floors.
      TerrainNoise::Terrestrial { .. } => height * 0.5,
      _ => height,
    }
  }

  /// Flavour relief before the sea level shift.
  fn relief(&self, direction: DVec3, p: [f64; 3]) -> f64 {
    match &self.noise {
      TerrainNoise::Terrestrial { continents, .. } => continents.get(p),
      TerrainNoise::Molten { crust, cracks } => {
        crust.get(p) * 0.5 - (1.0 - cracks.get(p)).max(0.0) * 0.4
      }
      TerrainNoise::Frozen { sheets, detail } => {
        let base = sheets.get(p);
        // Terraced plateaus.
        let terraced = (base * 4.0).round() / 4.0;
        terraced * 0.7 + base * 0.2 + detail.get(p) * 0.1
      }
      TerrainNoise::Rocky { rock, pits } => {
        let pit = pits.get((direction * self.frequency * 12.0).to_array()).abs();
        rock.get(p) - (0.15 - pit).max(0.0) * 2.0
      }
      TerrainNoise::Dune { warp, ripples } => {
        let w = warp.get(p);
        let band = ((p[0] + p[2] + w * 0.8) * 24.0).sin();
        band * 0.25 + ripples.get(p) * 0.3
      }
    }
  }
}

impl HeightFieldSampler for TerrainSampler {
  fn sample(&self, direction: DVec3) -> DVec3 {
    direction * (1.0 + self.elevation(direction) * self.amplitude)
  }
}

#[cfg(test)]
#[path = "sampler_test.rs"]
mod sampler_test;
