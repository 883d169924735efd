//! Level-of-detail quadtree over a square world.
//!
//! Chunks near the viewer are split into finer children, distant ones merged
//! back into their parent. Chunk payloads come from a [`ChunkFactory`]; payloads
//! removed from the tree go into a bounded FIFO [`QuadtreeCache`] so moving back
//! and forth reuses them instead of rebuilding.
//!
//! Updates run on a background worker woken by [`Quadtree::request_update`].

pub mod cache;
pub mod chunk;
pub mod config;
pub mod factory;
pub mod node;
pub mod policy;
pub mod scheduler;
pub mod update;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::QuadtreeCache;
pub use chunk::{ChunkConfig, ChunkKey};
pub use config::QuadtreeConfig;
pub use factory::{ChunkFactory, ViewerHandle, WorldView};
pub use node::{NodeState, QuadtreeNode};
pub use policy::{DistanceLodConfig, DistanceLodPolicy, FnPolicy, LodPolicy};
pub use scheduler::{Quadtree, QuadtreeEvent};
pub use update::UpdateStats;
