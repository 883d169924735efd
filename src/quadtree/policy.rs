//! Split and merge decisions.
//!
//! The scheduler does not know what "close enough" means; it asks a
//! [`LodPolicy`]. [`DistanceLodPolicy`] is the stock viewer-distance policy,
//! [`FnPolicy`] wraps a pair of closures.

use serde::{Deserialize, Serialize};

use super::chunk::ChunkConfig;
use super::factory::ViewerHandle;
use crate::core::{Error, Result};

/// Decides whether a chunk needs more or less detail.
pub trait LodPolicy: Send + Sync {
    /// True if this leaf is too coarse for the current viewer position.
    fn should_split(&self, config: &ChunkConfig) -> bool;

    /// True if this child is fine enough to be folded back into its parent.
    ///
    /// A split node merges only when all four children agree. Implementations
    /// should leave a hysteresis margin against `should_split` of the parent,
    /// otherwise a viewer sitting on the boundary makes the tree thrash.
    fn should_merge(&self, config: &ChunkConfig) -> bool;
}

/// Policy built from two closures.
pub struct FnPolicy<S, M> {
    split: S,
    merge: M,
}

impl<S, M> FnPolicy<S, M>
where
    S: Fn(&ChunkConfig) -> bool + Send + Sync,
    M: Fn(&ChunkConfig) -> bool + Send + Sync,
{
    pub fn new(split: S, merge: M) -> Self {
        Self { split, merge }
    }
}

impl<S, M> LodPolicy for FnPolicy<S, M>
where
    S: Fn(&ChunkConfig) -> bool + Send + Sync,
    M: Fn(&ChunkConfig) -> bool + Send + Sync,
{
    fn should_split(&self, config: &ChunkConfig) -> bool {
        (self.split)(config)
    }

    fn should_merge(&self, config: &ChunkConfig) -> bool {
        (self.merge)(config)
    }
}

/// Distance thresholds for [`DistanceLodPolicy`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceLodConfig {
    /// Split range per LOD: a chunk at LOD `n` splits while the viewer is
    /// closer than `lod_ranges[n]`. Levels past the end never split.
    pub lod_ranges: Vec<f32>,
    /// Extra distance past the split range before children merge back.
    pub hysteresis_margin: f32,
}

impl Default for DistanceLodConfig {
    fn default() -> Self {
        Self {
            lod_ranges: vec![1750.0, 874.0, 386.0, 192.0, 100.0, 50.0],
            hysteresis_margin: 20.0,
        }
    }
}

impl DistanceLodConfig {
    /// Check ranges are non-negative and non-increasing with LOD.
    pub fn validate(&self) -> Result<()> {
        if self.hysteresis_margin < 0.0 || !self.hysteresis_margin.is_finite() {
            return Err(Error::Config(format!(
                "hysteresis_margin must be a finite value >= 0, got {}",
                self.hysteresis_margin
            )));
        }
        for (lod, &range) in self.lod_ranges.iter().enumerate() {
            if range < 0.0 || !range.is_finite() {
                return Err(Error::Config(format!("lod_ranges[{}] is invalid: {}", lod, range)));
            }
        }
        if self.lod_ranges.windows(2).any(|w| w[1] > w[0]) {
            return Err(Error::Config("lod_ranges must not increase with LOD".into()));
        }
        Ok(())
    }
}

/// Splits chunks near the viewer and merges them once it moves away.
///
/// Distances are measured to the nearest point of a chunk's tile. Since a
/// parent's distance is the minimum of its children's, children that all sit
/// past `range + margin` guarantee the parent will not split again until the
/// viewer actually comes back.
#[derive(Clone, Debug)]
pub struct DistanceLodPolicy {
    config: DistanceLodConfig,
    viewer: ViewerHandle,
}

impl DistanceLodPolicy {
    pub fn new(config: DistanceLodConfig, viewer: ViewerHandle) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, viewer })
    }

    pub fn config(&self) -> &DistanceLodConfig {
        &self.config
    }

    pub fn viewer(&self) -> &ViewerHandle {
        &self.viewer
    }
}

impl LodPolicy for DistanceLodPolicy {
    fn should_split(&self, config: &ChunkConfig) -> bool {
        match self.config.lod_ranges.get(config.lod as usize) {
            Some(&range) => config.distance_to(self.viewer.get()) < range,
            None => false,
        }
    }

    fn should_merge(&self, config: &ChunkConfig) -> bool {
        if config.lod == 0 {
            return false;
        }
        match self.config.lod_ranges.get(config.lod as usize - 1) {
            Some(&parent_range) => {
                config.distance_to(self.viewer.get()) >= parent_range + self.config.hysteresis_margin
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{IVec2, Vec2};

    fn policy(ranges: Vec<f32>, margin: f32) -> DistanceLodPolicy {
        let config = DistanceLodConfig {
            lod_ranges: ranges,
            hysteresis_margin: margin,
        };
        DistanceLodPolicy::new(config, ViewerHandle::default()).unwrap()
    }

    #[test]
    fn test_split_inside_range() {
        let policy = policy(vec![100.0, 50.0], 10.0);
        let root = ChunkConfig::new(0, Vec2::ZERO, IVec2::ZERO, 64.0);

        policy.viewer().set(Vec2::new(150.0, 32.0)); // 86 from the tile
        assert!(policy.should_split(&root));

        policy.viewer().set(Vec2::new(200.0, 32.0)); // 136 from the tile
        assert!(!policy.should_split(&root));
    }

    #[test]
    fn test_no_split_past_configured_levels() {
        let policy = policy(vec![100.0], 0.0);
        let deep = ChunkConfig::new(1, Vec2::ZERO, IVec2::ZERO, 1.0);
        assert!(!policy.should_split(&deep));
    }

    #[test]
    fn test_merge_requires_margin() {
        let policy = policy(vec![100.0, 50.0], 10.0);
        let child = ChunkConfig::new(1, Vec2::ZERO, IVec2::ZERO, 32.0);

        // Just past the parent's split range, still inside the margin
        policy.viewer().set(Vec2::new(32.0 + 105.0, 16.0));
        assert!(!policy.should_merge(&child));

        policy.viewer().set(Vec2::new(32.0 + 111.0, 16.0));
        assert!(policy.should_merge(&child));
    }

    #[test]
    fn test_roots_never_merge() {
        let policy = policy(vec![1.0], 0.0);
        policy.viewer().set(Vec2::splat(1.0e6));
        let root = ChunkConfig::new(0, Vec2::ZERO, IVec2::ZERO, 1.0);
        assert!(!policy.should_merge(&root));
    }

    #[test]
    fn test_fn_policy() {
        let policy = FnPolicy::new(|c: &ChunkConfig| c.lod < 2, |_: &ChunkConfig| false);
        let config = ChunkConfig::new(1, Vec2::ZERO, IVec2::ZERO, 1.0);
        assert!(policy.should_split(&config));
        assert!(!policy.should_merge(&config));
    }

    #[test]
    fn test_validate_rejects_increasing_ranges() {
        let config = DistanceLodConfig {
            lod_ranges: vec![10.0, 20.0],
            hysteresis_margin: 0.0,
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_negative_margin() {
        let config = DistanceLodConfig {
            hysteresis_margin: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(DistanceLodConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config: DistanceLodConfig = serde_json::from_str(r#"{ "hysteresis_margin": 5.0 }"#).unwrap();
        assert_eq!(config.hysteresis_margin, 5.0);
        assert_eq!(config.lod_ranges, DistanceLodConfig::default().lod_ranges);
    }
}
