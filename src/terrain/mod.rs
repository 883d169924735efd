//! Procedural heightfield terrain served through the quadtree

pub mod generator;
pub use generator::{TerrainGenerator, TerrainParams};

pub mod heightfield;
pub use heightfield::{Heightfield, HeightfieldFactory};
