//! Heightfield chunk payloads built from procedural terrain.
//!
//! Every chunk is sampled on the same `resolution × resolution` grid, so a
//! chunk's sample spacing is `gap / (resolution - 1)` and finer LODs carry
//! proportionally more detail. An optional byte budget caps live payload
//! memory; builds over budget fail with [`BuildError::ResourceExhausted`] and
//! the quadtree keeps the coarser chunk until memory is released.

use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec2;

use super::generator::{TerrainGenerator, TerrainParams};
use crate::core::{BuildError, Error, Result};
use crate::quadtree::{ChunkConfig, ChunkFactory};

/// Sampled terrain for one chunk.
#[derive(Clone, Debug)]
pub struct Heightfield {
    pub config: ChunkConfig,
    /// Samples per side
    pub resolution: u32,
    /// Row-major heights, `resolution²` samples
    pub heights: Vec<f32>,
    pub min_height: f32,
    pub max_height: f32,
}

impl Heightfield {
    /// Height of sample `(x, y)`, or `None` outside the grid.
    pub fn sample(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.resolution || y >= self.resolution {
            return None;
        }
        self.heights.get((y * self.resolution + x) as usize).copied()
    }

    /// Distance between adjacent samples in world units.
    pub fn spacing(&self) -> f32 {
        self.config.gap / (self.resolution - 1) as f32
    }

    /// Heap memory held by the samples.
    pub fn size_bytes(&self) -> usize {
        self.heights.len() * std::mem::size_of::<f32>()
    }
}

/// [`ChunkFactory`] producing [`Heightfield`] payloads.
pub struct HeightfieldFactory {
    generator: TerrainGenerator,
    resolution: u32,
    memory_budget: Option<usize>,
    live_bytes: AtomicUsize,
    live_chunks: AtomicUsize,
}

impl HeightfieldFactory {
    pub fn new(params: TerrainParams, resolution: u32) -> Result<Self> {
        if resolution < 2 {
            return Err(Error::Config(format!(
                "heightfield resolution must be >= 2, got {}",
                resolution
            )));
        }
        Ok(Self {
            generator: TerrainGenerator::new(params),
            resolution,
            memory_budget: None,
            live_bytes: AtomicUsize::new(0),
            live_chunks: AtomicUsize::new(0),
        })
    }

    /// Limit the memory held by live payloads.
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    pub fn generator(&self) -> &TerrainGenerator {
        &self.generator
    }

    /// Bytes held by payloads built and not yet destroyed.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Acquire)
    }

    /// Payloads built and not yet destroyed.
    pub fn live_chunks(&self) -> usize {
        self.live_chunks.load(Ordering::Acquire)
    }

    fn payload_bytes(&self) -> usize {
        (self.resolution * self.resolution) as usize * std::mem::size_of::<f32>()
    }

    /// Reserve memory for one payload against the budget.
    fn reserve(&self, bytes: usize) -> std::result::Result<(), BuildError> {
        let Some(budget) = self.memory_budget else {
            self.live_bytes.fetch_add(bytes, Ordering::AcqRel);
            return Ok(());
        };
        self.live_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                let total = live + bytes;
                (total <= budget).then_some(total)
            })
            .map(|_| ())
            .map_err(|live| {
                BuildError::ResourceExhausted(format!(
                    "heightfield budget {} bytes, {} live, {} requested",
                    budget, live, bytes
                ))
            })
    }
}

impl ChunkFactory for HeightfieldFactory {
    type Payload = Heightfield;

    fn build(&self, config: &ChunkConfig) -> std::result::Result<Heightfield, BuildError> {
        let bytes = self.payload_bytes();
        self.reserve(bytes)?;

        let n = self.resolution;
        let step = config.gap / (n - 1) as f32;
        let mut heights = Vec::with_capacity((n * n) as usize);
        let mut min_height = f32::INFINITY;
        let mut max_height = f32::NEG_INFINITY;
        for y in 0..n {
            for x in 0..n {
                let pos = config.location + Vec2::new(x as f32, y as f32) * step;
                let h = self.generator.height_at(pos.x, pos.y);
                min_height = min_height.min(h);
                max_height = max_height.max(h);
                heights.push(h);
            }
        }

        self.live_chunks.fetch_add(1, Ordering::AcqRel);
        log::trace!("Built heightfield {:?} ({} samples)", config.key(), heights.len());
        Ok(Heightfield {
            config: *config,
            resolution: n,
            heights,
            min_height,
            max_height,
        })
    }

    fn destroy(&self, payload: Heightfield) {
        self.live_bytes.fetch_sub(payload.size_bytes(), Ordering::AcqRel);
        self.live_chunks.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec2;

    fn factory(resolution: u32) -> HeightfieldFactory {
        HeightfieldFactory::new(TerrainParams::default(), resolution).unwrap()
    }

    fn root() -> ChunkConfig {
        ChunkConfig::root(Vec2::ZERO, IVec2::ZERO, 256.0)
    }

    #[test]
    fn test_rejects_degenerate_resolution() {
        assert!(HeightfieldFactory::new(TerrainParams::default(), 1).is_err());
    }

    #[test]
    fn test_build_samples_chunk_square() {
        let factory = factory(9);
        let config = root().child(3);
        let field = factory.build(&config).unwrap();

        assert_eq!(field.heights.len(), 81);
        assert_eq!(field.spacing(), 16.0);
        assert_eq!(field.sample(0, 0), Some(factory.generator().height_at(128.0, 128.0)));
        assert_eq!(field.sample(8, 8), Some(factory.generator().height_at(256.0, 256.0)));
        assert_eq!(field.sample(9, 0), None);
        assert!(field.min_height <= field.max_height);
    }

    #[test]
    fn test_children_share_parent_edges() {
        let factory = factory(5);
        let parent = factory.build(&root()).unwrap();
        let child = factory.build(&root().child(0)).unwrap();

        // Child corner (0,0) and (4,4) coincide with parent samples (0,0) and (2,2)
        assert_eq!(child.sample(0, 0), parent.sample(0, 0));
        assert_eq!(child.sample(4, 4), parent.sample(2, 2));
    }

    #[test]
    fn test_live_accounting() {
        let factory = factory(3);
        let a = factory.build(&root()).unwrap();
        let b = factory.build(&root().child(1)).unwrap();
        assert_eq!(factory.live_chunks(), 2);
        assert_eq!(factory.live_bytes(), 2 * 9 * 4);

        factory.destroy(a);
        factory.destroy(b);
        assert_eq!(factory.live_chunks(), 0);
        assert_eq!(factory.live_bytes(), 0);
    }

    #[test]
    fn test_memory_budget_exhausted() {
        let factory = factory(3).with_memory_budget(2 * 9 * 4);
        let a = factory.build(&root().child(0)).unwrap();
        let _b = factory.build(&root().child(1)).unwrap();

        let err = factory.build(&root().child(2)).unwrap_err();
        assert!(matches!(err, BuildError::ResourceExhausted(_)));
        assert_eq!(factory.live_chunks(), 2);

        // Releasing memory lets the next build through
        factory.destroy(a);
        assert!(factory.build(&root().child(2)).is_ok());
    }
}
