//! Noise-based procedural terrain generation

use glam::Vec2;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

/// Parameters controlling terrain generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    pub seed: u32,
    pub scale: f32,        // Horizontal scale (larger = smoother)
    pub height_scale: f32, // Vertical scale (max height)
    pub octaves: u32,      // FBM octaves (detail levels)
    pub persistence: f32,  // FBM persistence (0.5 typical)
    pub lacunarity: f32,   // FBM lacunarity (2.0 typical)
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 100.0,
            height_scale: 64.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Procedural terrain generator using fractal Brownian motion (FBM)
pub struct TerrainGenerator {
    params: TerrainParams,
    noise: Fbm<Perlin>,
}

impl TerrainGenerator {
    /// Create a new terrain generator with the given parameters
    pub fn new(params: TerrainParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        Self { params, noise }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Terrain height at world position `(x, z)`, in `[0, height_scale]`
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let nx = (x / self.params.scale) as f64;
        let nz = (z / self.params.scale) as f64;

        // Noise is roughly [-1, 1]
        let normalized = ((self.noise.get([nx, nz]) + 1.0) / 2.0).clamp(0.0, 1.0);
        (normalized * self.params.height_scale as f64) as f32
    }

    /// Approximate min/max height over a square region (corners and centre)
    pub fn height_bounds(&self, min: Vec2, max: Vec2) -> (f32, f32) {
        let mid = (min + max) * 0.5;
        let heights = [
            self.height_at(min.x, min.y),
            self.height_at(max.x, min.y),
            self.height_at(min.x, max.y),
            self.height_at(max.x, max.y),
            self.height_at(mid.x, mid.y),
        ];

        let min_h = heights.iter().copied().fold(f32::INFINITY, f32::min);
        let max_h = heights.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        (min_h, max_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terrain_params_default() {
        let params = TerrainParams::default();
        assert_eq!(params.seed, 12345);
        assert_eq!(params.scale, 100.0);
        assert_eq!(params.height_scale, 64.0);
        assert_eq!(params.octaves, 4);
        assert_eq!(params.persistence, 0.5);
        assert_eq!(params.lacunarity, 2.0);
    }

    #[test]
    fn test_params_deserialize_with_defaults() {
        let params: TerrainParams = serde_json::from_str(r#"{ "seed": 7 }"#).unwrap();
        assert_eq!(params.seed, 7);
        assert_eq!(params.height_scale, 64.0);
    }

    #[test]
    fn test_height_at_range_and_consistency() {
        let generator = TerrainGenerator::new(TerrainParams::default());
        let positions = [(0.0, 0.0), (50.0, 50.0), (100.0, 100.0), (-50.0, -50.0)];

        for (x, z) in positions {
            let h1 = generator.height_at(x, z);
            let h2 = generator.height_at(x, z);
            assert_eq!(h1, h2, "Height should be consistent at ({}, {})", x, z);
            assert!((0.0..=64.0).contains(&h1));
        }
    }

    #[test]
    fn test_different_seeds() {
        let gen1 = TerrainGenerator::new(TerrainParams { seed: 1, ..Default::default() });
        let gen2 = TerrainGenerator::new(TerrainParams { seed: 2, ..Default::default() });

        assert_ne!(gen1.height_at(50.3, 50.7), gen2.height_at(50.3, 50.7));
    }

    #[test]
    fn test_height_bounds() {
        let generator = TerrainGenerator::new(TerrainParams::default());

        let (min_h, max_h) = generator.height_bounds(Vec2::ZERO, Vec2::splat(10.0));
        assert!(min_h <= max_h);

        for (x, z) in [(0.0, 0.0), (10.0, 10.0), (5.0, 5.0)] {
            let h = generator.height_at(x, z);
            assert!(h >= min_h && h <= max_h);
        }
    }
}
