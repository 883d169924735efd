//! Capabilities the scheduler consumes from its host.

use std::sync::{Arc, Mutex, PoisonError};

use glam::Vec2;

use super::chunk::ChunkConfig;
use crate::core::BuildError;

/// Builds and destroys chunk payloads (meshes, textures, heightfields, ...).
///
/// Called from the thread running an update pass, and from construction and
/// teardown of the quadtree. `build` may be expensive; the scheduler never
/// holds the render-facing tree lock while calling it.
pub trait ChunkFactory: Send + Sync + 'static {
    /// Data attached to an active chunk.
    type Payload: Send + Sync + 'static;

    /// Build the payload for a chunk.
    fn build(&self, config: &ChunkConfig) -> Result<Self::Payload, BuildError>;

    /// Release a payload that will never be attached again.
    fn destroy(&self, payload: Self::Payload);
}

/// Source of viewer movement, polled by the driving loop once per frame.
pub trait WorldView {
    /// True if the viewer moved since the previous call.
    fn has_viewer_moved(&mut self) -> bool;

    /// Current viewer position projected onto the world surface.
    fn viewer_position(&self) -> Vec2;
}

/// Shared, cloneable viewer position.
///
/// Written by the driving loop, read by LOD policies during an update pass.
#[derive(Clone, Debug, Default)]
pub struct ViewerHandle {
    position: Arc<Mutex<Vec2>>,
}

impl ViewerHandle {
    pub fn new(position: Vec2) -> Self {
        Self {
            position: Arc::new(Mutex::new(position)),
        }
    }

    pub fn set(&self, position: Vec2) {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner) = position;
    }

    pub fn get(&self) -> Vec2 {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
