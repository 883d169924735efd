//! Test doubles shared by the quadtree unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::chunk::{ChunkConfig, ChunkKey};
use super::factory::ChunkFactory;
use crate::core::BuildError;

/// Payload that remembers which chunk it was built for.
#[derive(Debug, PartialEq, Eq)]
pub struct TestPayload {
    pub key: ChunkKey,
    pub serial: u64,
}

#[derive(Default)]
struct Counters {
    builds: Mutex<HashMap<ChunkKey, usize>>,
    failing: Mutex<HashSet<ChunkKey>>,
    destroyed: AtomicUsize,
    serial: AtomicU64,
}

/// Factory counting builds per key, with switchable failures.
///
/// Clones share counters, so a test can keep one clone while the scheduler
/// owns another.
#[derive(Clone, Default)]
pub struct CountingFactory {
    counters: Arc<Counters>,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build directly, bypassing failure injection.
    pub fn build_ok(&self, config: &ChunkConfig) -> TestPayload {
        *self.counters.builds.lock().unwrap().entry(config.key()).or_insert(0) += 1;
        TestPayload {
            key: config.key(),
            serial: self.counters.serial.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn fail_key(&self, key: ChunkKey) {
        self.counters.failing.lock().unwrap().insert(key);
    }

    pub fn clear_failures(&self) {
        self.counters.failing.lock().unwrap().clear();
    }

    pub fn builds_of(&self, key: ChunkKey) -> usize {
        self.counters.builds.lock().unwrap().get(&key).copied().unwrap_or(0)
    }

    pub fn total_builds(&self) -> usize {
        self.counters.builds.lock().unwrap().values().sum()
    }

    pub fn destroyed(&self) -> usize {
        self.counters.destroyed.load(Ordering::SeqCst)
    }
}

impl ChunkFactory for CountingFactory {
    type Payload = TestPayload;

    fn build(&self, config: &ChunkConfig) -> Result<TestPayload, BuildError> {
        if self.counters.failing.lock().unwrap().contains(&config.key()) {
            return Err(BuildError::ResourceExhausted(format!("{:?}", config.key())));
        }
        Ok(self.build_ok(config))
    }

    fn destroy(&self, _payload: TestPayload) {
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}
