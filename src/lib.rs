//! Quadlod - asynchronous level-of-detail quadtree for streamed terrain

pub mod core;
pub mod quadtree;
pub mod terrain;
