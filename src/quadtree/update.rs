//! One top-down update pass over the quadtree.
//!
//! A pass runs in three phases so that readers never see a half-built
//! subdivision:
//!
//! 1. **Plan** (shared read lock): walk every root, collect the leaves that
//!    need splitting and the split nodes whose children all agree to merge.
//! 2. **Build** (no tree lock): acquire payloads for every planned
//!    transition, cache first, factory second. A failed build abandons that
//!    transition only.
//! 3. **Apply** (exclusive write lock): swap the prepared subtrees in. Once
//!    the write lock is released, every detached payload goes to the cache.
//!
//! Only one pass runs at a time, so nothing planned in phase 1 can change
//! before phase 3. Nodes created by a pass are evaluated on the next one.

use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Instant;

use super::cache::QuadtreeCache;
use super::chunk::{ChunkConfig, ChunkKey};
use super::factory::ChunkFactory;
use super::node::{NodeState, QuadtreeNode};
use super::policy::LodPolicy;
use crate::core::BuildError;

/// Statistics from one update pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateStats {
    /// Leaves replaced by four children
    pub splits: u32,
    /// Split nodes collapsed back into leaves
    pub merges: u32,
    /// Payloads served from the cache
    pub cache_hits: u32,
    /// Payloads requested from the factory
    pub builds: u32,
    /// Factory builds that failed
    pub failed_builds: u32,
    /// Cached payloads evicted and destroyed
    pub evictions: u32,
    /// Active leaves after the pass
    pub leaf_count: usize,
    /// Wall time of the pass (ms)
    pub duration_ms: f32,
}

/// Result of a pass: statistics plus every build failure it hit.
#[derive(Debug, Default)]
pub struct PassOutcome {
    pub stats: UpdateStats,
    pub failures: Vec<(ChunkKey, BuildError)>,
}

/// Location of a node: root slot plus quadrant path.
#[derive(Clone, Debug, PartialEq, Eq)]
struct NodePath {
    root: usize,
    quadrants: Vec<u8>,
}

#[derive(Debug)]
enum Planned {
    Split { path: NodePath, config: ChunkConfig },
    Merge { path: NodePath, config: ChunkConfig },
}

enum Prepared<P> {
    Split {
        path: NodePath,
        children: [QuadtreeNode<P>; 4],
    },
    Merge {
        path: NodePath,
        config: ChunkConfig,
        payload: P,
    },
}

/// Runs a single update pass. Callers must serialise passes.
pub struct UpdatePass<'a, F: ChunkFactory> {
    roots: &'a RwLock<Vec<QuadtreeNode<F::Payload>>>,
    cache: &'a Mutex<QuadtreeCache<F::Payload>>,
    factory: &'a F,
    policy: &'a dyn LodPolicy,
    max_lod: u32,
    outcome: PassOutcome,
}

impl<'a, F: ChunkFactory> UpdatePass<'a, F> {
    pub fn new(
        roots: &'a RwLock<Vec<QuadtreeNode<F::Payload>>>,
        cache: &'a Mutex<QuadtreeCache<F::Payload>>,
        factory: &'a F,
        policy: &'a dyn LodPolicy,
        max_lod: u32,
    ) -> Self {
        Self {
            roots,
            cache,
            factory,
            policy,
            max_lod,
            outcome: PassOutcome::default(),
        }
    }

    pub fn run(mut self) -> PassOutcome {
        let start = Instant::now();

        let planned = self.plan();
        let prepared: Vec<_> = planned
            .into_iter()
            .filter_map(|transition| self.prepare(transition))
            .collect();
        self.apply(prepared);

        self.outcome.stats.duration_ms = start.elapsed().as_secs_f32() * 1000.0;
        self.outcome
    }

    fn plan(&self) -> Vec<Planned> {
        let roots_lock = self.roots;
        let roots = roots_lock.read().unwrap_or_else(PoisonError::into_inner);
        let mut planned = Vec::new();
        let mut quadrants = Vec::new();
        for (root, node) in roots.iter().enumerate() {
            self.plan_node(node, root, &mut quadrants, &mut planned);
        }
        planned
    }

    fn plan_node(
        &self,
        node: &QuadtreeNode<F::Payload>,
        root: usize,
        quadrants: &mut Vec<u8>,
        planned: &mut Vec<Planned>,
    ) {
        let config = *node.config();

        match (node.state(), node.children()) {
            (NodeState::Leaf, _) => {
                if config.lod < self.max_lod && self.policy.should_split(&config) {
                    planned.push(Planned::Split {
                        path: NodePath { root, quadrants: quadrants.clone() },
                        config,
                    });
                }
            }
            (NodeState::Split, Some(children)) => {
                let merge = children.iter().all(|c| self.policy.should_merge(c.config()));
                if merge {
                    if config.lod < self.max_lod && self.policy.should_split(&config) {
                        // Split wins: keep the children and look deeper
                        log::debug!("Chunk {:?} eligible to split and merge, keeping split", config.key());
                    } else {
                        planned.push(Planned::Merge {
                            path: NodePath { root, quadrants: quadrants.clone() },
                            config,
                        });
                        return;
                    }
                }
                for (quadrant, child) in children.iter().enumerate() {
                    quadrants.push(quadrant as u8);
                    self.plan_node(child, root, quadrants, planned);
                    quadrants.pop();
                }
            }
            (state, _) => {
                debug_assert!(false, "published node {:?} in state {:?}", config.key(), state);
            }
        }
    }

    fn prepare(&mut self, transition: Planned) -> Option<Prepared<F::Payload>> {
        match transition {
            Planned::Split { path, config } => {
                let mut acquired: Vec<(ChunkConfig, F::Payload)> = Vec::with_capacity(4);
                for child in config.children() {
                    match self.acquire(&child) {
                        Ok(payload) => acquired.push((child, payload)),
                        Err(error) => {
                            log::warn!(
                                "Split of {:?} abandoned, child {:?} failed to build: {}",
                                config.key(),
                                child.key(),
                                error
                            );
                            self.record_failure(child.key(), error);
                            let unused = acquired.into_iter().map(|(c, p)| (c.key(), p)).collect();
                            self.retire(unused);
                            return None;
                        }
                    }
                }

                let nodes: Vec<_> = acquired
                    .into_iter()
                    .map(|(c, p)| QuadtreeNode::leaf(c, p))
                    .collect();
                match <[QuadtreeNode<F::Payload>; 4]>::try_from(nodes) {
                    Ok(children) => Some(Prepared::Split { path, children }),
                    Err(nodes) => unreachable!("split acquired {} children", nodes.len()),
                }
            }
            Planned::Merge { path, config } => match self.acquire(&config) {
                Ok(payload) => Some(Prepared::Merge { path, config, payload }),
                Err(error) => {
                    log::warn!("Merge of {:?} abandoned, failed to build: {}", config.key(), error);
                    self.record_failure(config.key(), error);
                    None
                }
            },
        }
    }

    /// Take a payload from the cache, or build a new one.
    fn acquire(&mut self, config: &ChunkConfig) -> Result<F::Payload, BuildError> {
        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take_if_present(config.key());
        if let Some(payload) = cached {
            self.outcome.stats.cache_hits += 1;
            return Ok(payload);
        }
        self.outcome.stats.builds += 1;
        self.factory.build(config)
    }

    fn record_failure(&mut self, key: ChunkKey, error: BuildError) {
        self.outcome.stats.failed_builds += 1;
        self.outcome.failures.push((key, error));
    }

    fn apply(&mut self, prepared: Vec<Prepared<F::Payload>>) {
        // Lock order: tree, then cache. The tree lock is released before the
        // cache is touched, so readers holding the tree may still query the cache.
        let (cache_lock, roots_lock) = (self.cache, self.roots);
        let mut retired = Vec::new();
        {
            let mut roots = roots_lock.write().unwrap_or_else(PoisonError::into_inner);
            for transition in prepared {
                match transition {
                    Prepared::Split { path, children } => {
                        let target = roots
                            .get_mut(path.root)
                            .and_then(|root| root.descendant_mut(&path.quadrants))
                            .filter(|node| node.is_leaf());
                        match target {
                            Some(node) => {
                                let key = node.key();
                                if let Some(payload) = node.split(children) {
                                    retired.push((key, payload));
                                }
                                self.outcome.stats.splits += 1;
                            }
                            None => {
                                debug_assert!(false, "split target {:?} vanished", path);
                                for child in children {
                                    child.into_payloads(&mut retired);
                                }
                            }
                        }
                    }
                    Prepared::Merge { path, config, payload } => {
                        let target = roots
                            .get_mut(path.root)
                            .and_then(|root| root.descendant_mut(&path.quadrants))
                            .filter(|node| node.state() == NodeState::Split);
                        match target {
                            Some(node) => {
                                node.merge(payload, &mut retired);
                                self.outcome.stats.merges += 1;
                            }
                            None => {
                                debug_assert!(false, "merge target {:?} vanished", path);
                                retired.push((config.key(), payload));
                            }
                        }
                    }
                }
            }
            self.outcome.stats.leaf_count = roots.iter().map(|r| r.leaf_count()).sum();
        }
        let mut cache = cache_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.retire_into(&mut cache, retired);
    }

    fn retire(&mut self, payloads: Vec<(ChunkKey, F::Payload)>) {
        let cache_lock = self.cache;
        let mut cache = cache_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.retire_into(&mut cache, payloads);
    }

    /// Cache detached payloads, destroying whatever the cache evicts.
    fn retire_into(&mut self, cache: &mut QuadtreeCache<F::Payload>, payloads: Vec<(ChunkKey, F::Payload)>) {
        for (key, payload) in payloads {
            for (_, evicted) in cache.put(key, payload) {
                self.factory.destroy(evicted);
                self.outcome.stats.evictions += 1;
            }
        }
    }
}
