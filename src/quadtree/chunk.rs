//! Chunk identity and placement.
//!
//! A chunk is one square tile of the world surface at a given level of
//! detail. LOD 0 is the coarsest level (the roots); every split doubles the
//! resolution, so LOD `n + 1` tiles are half the size of LOD `n` tiles.

use glam::{IVec2, Vec2};

/// Quadrant offsets in child order: (-,-), (+,-), (-,+), (+,+).
pub const QUADRANT_OFFSETS: [IVec2; 4] = [
    IVec2::new(0, 0),
    IVec2::new(1, 0),
    IVec2::new(0, 1),
    IVec2::new(1, 1),
];

/// Logical identity of a chunk.
///
/// Two chunks with equal `lod` and `index` are the same chunk, regardless of
/// how their world-space placement was computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    /// Level of detail (0 = coarsest)
    pub lod: u32,
    /// Grid index at this LOD
    pub index: IVec2,
}

impl ChunkKey {
    pub fn new(lod: u32, index: IVec2) -> Self {
        Self { lod, index }
    }

    /// Key of the parent chunk, or `None` for a root.
    pub fn parent(&self) -> Option<Self> {
        if self.lod == 0 {
            return None;
        }
        Some(Self {
            lod: self.lod - 1,
            index: IVec2::new(self.index.x.div_euclid(2), self.index.y.div_euclid(2)),
        })
    }

    /// Key of the child in the given quadrant (0-3).
    pub fn child(&self, quadrant: usize) -> Self {
        Self {
            lod: self.lod + 1,
            index: self.index * 2 + QUADRANT_OFFSETS[quadrant],
        }
    }
}

/// Placement of a chunk in world space.
///
/// `location` is the minimum corner of the tile and `gap` its edge length.
/// Immutable once created; children are derived with [`ChunkConfig::child`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkConfig {
    /// Level of detail (0 = coarsest)
    pub lod: u32,
    /// World-space minimum corner
    pub location: Vec2,
    /// Grid index at this LOD
    pub index: IVec2,
    /// Edge length of the tile in world units
    pub gap: f32,
}

impl ChunkConfig {
    pub fn new(lod: u32, location: Vec2, index: IVec2, gap: f32) -> Self {
        Self { lod, location, index, gap }
    }

    /// Root chunk `index` of a grid of tiles with edge `gap` starting at `origin`.
    pub fn root(origin: Vec2, index: IVec2, gap: f32) -> Self {
        Self {
            lod: 0,
            location: origin + index.as_vec2() * gap,
            index,
            gap,
        }
    }

    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.lod, self.index)
    }

    /// Derive the child in the given quadrant (0-3).
    pub fn child(&self, quadrant: usize) -> Self {
        let offset = QUADRANT_OFFSETS[quadrant];
        let gap = self.gap * 0.5;
        Self {
            lod: self.lod + 1,
            location: self.location + offset.as_vec2() * gap,
            index: self.index * 2 + offset,
            gap,
        }
    }

    /// All four children in quadrant order.
    pub fn children(&self) -> [Self; 4] {
        std::array::from_fn(|quadrant| self.child(quadrant))
    }

    /// Maximum corner of the tile.
    pub fn max_corner(&self) -> Vec2 {
        self.location + Vec2::splat(self.gap)
    }

    pub fn center(&self) -> Vec2 {
        self.location + Vec2::splat(self.gap * 0.5)
    }

    /// Distance from `point` to the nearest point of the tile (0 inside).
    ///
    /// A parent's distance is the minimum of its children's distances, which
    /// is what keeps distance-based split and merge decisions consistent
    /// across levels.
    pub fn distance_to(&self, point: Vec2) -> f32 {
        let nearest = point.clamp(self.location, self.max_corner());
        point.distance(nearest)
    }
}
