//! Scheduler configuration.

use std::path::Path;

use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

use super::chunk::ChunkConfig;
use crate::core::{Error, Result};

/// Construction-time configuration of a [`Quadtree`](super::Quadtree).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadtreeConfig {
    /// Number of `request_update` calls folded into one update pass.
    pub update_coalescing_threshold: u32,
    /// Retired payloads kept for reuse (0 = unbounded).
    pub cache_capacity: usize,
    /// Root chunks per side; the world starts as a `root_chunks²` grid.
    pub root_chunks: u32,
    /// Edge length of a root chunk in world units.
    pub root_gap: f32,
    /// World-space minimum corner of root chunk (0, 0).
    pub origin: Vec2,
    /// Deepest LOD a chunk may be split to, whatever the policy says.
    pub max_lod: u32,
}

impl Default for QuadtreeConfig {
    fn default() -> Self {
        Self {
            update_coalescing_threshold: 2,
            cache_capacity: 64,
            root_chunks: 1,
            root_gap: 1.0,
            origin: Vec2::ZERO,
            max_lod: 8,
        }
    }
}

impl QuadtreeConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.update_coalescing_threshold == 0 {
            return Err(Error::Config("update_coalescing_threshold must be >= 1".into()));
        }
        if self.root_chunks == 0 {
            return Err(Error::Config("root_chunks must be >= 1".into()));
        }
        if !(self.root_gap > 0.0 && self.root_gap.is_finite()) {
            return Err(Error::Config(format!("root_gap must be positive, got {}", self.root_gap)));
        }
        if !self.origin.is_finite() {
            return Err(Error::Config("origin must be finite".into()));
        }
        if self.root_chunks > i32::MAX as u32 {
            return Err(Error::Config(format!("root_chunks must be <= {}, got {}", i32::MAX, self.root_chunks)));
        }
        // Child indices double per level
        if self.max_lod > 30 {
            return Err(Error::Config(format!("max_lod must be <= 30, got {}", self.max_lod)));
        }
        // Deepest index is root_chunks * 2^max_lod - 1 and must fit an i32
        if (self.root_chunks as i64) << self.max_lod > i32::MAX as i64 + 1 {
            return Err(Error::Config(format!(
                "root_chunks {} at max_lod {} overflows chunk indices",
                self.root_chunks, self.max_lod
            )));
        }
        Ok(())
    }

    /// Configs of the root chunks, row by row.
    pub fn root_configs(&self) -> Vec<ChunkConfig> {
        let n = self.root_chunks as i32;
        (0..n)
            .flat_map(|y| (0..n).map(move |x| IVec2::new(x, y)))
            .map(|index| ChunkConfig::root(self.origin, index, self.root_gap))
            .collect()
    }
}
