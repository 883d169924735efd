//! Error types for the quadtree scheduler

use thiserror::Error;

use crate::quadtree::ChunkKey;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Chunk build error for {key:?}: {source}")]
    Build {
        key: ChunkKey,
        #[source]
        source: BuildError,
    },

    #[error("Quadtree worker thread panicked")]
    WorkerPanicked,
}

/// Failure reported by a [`ChunkFactory`](crate::quadtree::ChunkFactory) while
/// building a chunk payload.
///
/// Always recoverable: the affected branch keeps its coarser chunk and the
/// build is retried on a later update pass.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("asset missing: {0}")]
    MissingAsset(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec2;

    #[test]
    fn test_build_error_display() {
        let err = BuildError::ResourceExhausted("gpu heap".into());
        assert_eq!(err.to_string(), "resources exhausted: gpu heap");
    }

    #[test]
    fn test_error_wraps_build_error() {
        let err = Error::Build {
            key: ChunkKey::new(2, IVec2::new(1, 3)),
            source: BuildError::MissingAsset("heightmap.png".into()),
        };
        let text = err.to_string();
        assert!(text.contains("asset missing: heightmap.png"));
        assert!(text.contains("lod: 2"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
