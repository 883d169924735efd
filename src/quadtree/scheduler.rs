//! Quadtree - owns the tree, the cache and the background update worker.
//!
//! # Usage
//!
//! ```ignore
//! let viewer = ViewerHandle::new(camera_xz);
//! let policy = DistanceLodPolicy::new(DistanceLodConfig::default(), viewer.clone())?;
//! let quadtree = Quadtree::new(QuadtreeConfig::default(), factory, policy)?;
//! quadtree.start()?;
//!
//! // Every frame
//! quadtree.drive(&mut world_view, &viewer);
//! quadtree.visit_leaves(|config, payload| draw(config, payload));
//! for event in quadtree.poll_events() { ... }
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::cache::QuadtreeCache;
use super::chunk::{ChunkConfig, ChunkKey};
use super::config::QuadtreeConfig;
use super::factory::{ChunkFactory, ViewerHandle, WorldView};
use super::node::QuadtreeNode;
use super::policy::LodPolicy;
use super::update::{UpdatePass, UpdateStats};
use crate::core::{BuildError, Error, Result};

/// Events older than this are dropped if nobody polls.
const MAX_PENDING_EVENTS: usize = 256;

/// Status reported by update passes.
#[derive(Clone, Debug, PartialEq)]
pub enum QuadtreeEvent {
    /// A pass finished
    PassCompleted(UpdateStats),
    /// A chunk could not be built; the coarser chunk stays active
    BuildFailed { key: ChunkKey, error: BuildError },
}

/// Handshake between `request_update` and the worker.
#[derive(Debug, Default)]
struct WakeState {
    /// Worker is parked waiting for a wake
    idle: bool,
    /// A wake was delivered to the parked worker
    wake: bool,
    /// Worker must exit
    stop: bool,
    /// Completed passes (worker and synchronous)
    passes: u64,
}

struct Shared<F: ChunkFactory> {
    config: QuadtreeConfig,
    factory: F,
    policy: Box<dyn LodPolicy>,
    roots: RwLock<Vec<QuadtreeNode<F::Payload>>>,
    cache: Mutex<QuadtreeCache<F::Payload>>,
    /// Serialises passes: one structural mutation in flight
    pass_lock: Mutex<()>,
    update_counter: AtomicU32,
    running: AtomicBool,
    wake: Mutex<WakeState>,
    wake_cvar: Condvar,
    idle_cvar: Condvar,
    events: Mutex<VecDeque<QuadtreeEvent>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<F: ChunkFactory> Shared<F> {
    fn run_pass(&self) -> UpdateStats {
        let _pass = lock(&self.pass_lock);
        let outcome = UpdatePass::new(
            &self.roots,
            &self.cache,
            &self.factory,
            self.policy.as_ref(),
            self.config.max_lod,
        )
        .run();

        let stats = outcome.stats;
        log::debug!(
            "Quadtree pass: {} splits, {} merges, {} builds, {} cache hits, {} failed, {} leaves, {:.2}ms",
            stats.splits,
            stats.merges,
            stats.builds,
            stats.cache_hits,
            stats.failed_builds,
            stats.leaf_count,
            stats.duration_ms
        );

        let mut events = lock(&self.events);
        for (key, error) in outcome.failures {
            events.push_back(QuadtreeEvent::BuildFailed { key, error });
        }
        events.push_back(QuadtreeEvent::PassCompleted(stats.clone()));
        while events.len() > MAX_PENDING_EVENTS {
            events.pop_front();
        }
        stats
    }

    /// Deliver a wake if the worker is parked; otherwise drop it.
    fn signal(&self) {
        let mut state = lock(&self.wake);
        if state.idle {
            state.wake = true;
            self.wake_cvar.notify_one();
        } else {
            log::trace!("Quadtree worker busy, dropping wake");
        }
    }
}

fn worker_loop<F: ChunkFactory>(shared: Arc<Shared<F>>) {
    log::info!("Quadtree worker started");
    let mut ran_pass = false;
    loop {
        {
            let mut state = lock(&shared.wake);
            if ran_pass {
                state.passes += 1;
            }
            state.idle = true;
            shared.idle_cvar.notify_all();

            while !state.wake && !state.stop {
                state = shared
                    .wake_cvar
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            state.idle = false;
            state.wake = false;
            if state.stop {
                break;
            }
        }
        shared.run_pass();
        ran_pass = true;
    }
    log::info!("Quadtree worker stopped");
}

/// Asynchronous LOD quadtree.
///
/// The tree and cache are mutated only by update passes, which run on one
/// dedicated worker thread (or synchronously through [`Quadtree::update_now`]).
/// Any thread may read the tree while a pass runs; a pass publishes each
/// split or merge atomically.
pub struct Quadtree<F: ChunkFactory> {
    shared: Arc<Shared<F>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<F: ChunkFactory> Quadtree<F> {
    /// Create the tree with one leaf per root chunk.
    ///
    /// Root payloads are built immediately; if any fails, those already
    /// built are destroyed and the error returned.
    pub fn new(config: QuadtreeConfig, factory: F, policy: impl LodPolicy + 'static) -> Result<Self> {
        config.validate()?;

        let mut roots = Vec::new();
        for root in config.root_configs() {
            match factory.build(&root) {
                Ok(payload) => roots.push(QuadtreeNode::leaf(root, payload)),
                Err(source) => {
                    let mut built = Vec::new();
                    for node in roots {
                        node.into_payloads(&mut built);
                    }
                    for (_, payload) in built {
                        factory.destroy(payload);
                    }
                    return Err(Error::Build { key: root.key(), source });
                }
            }
        }
        log::info!(
            "Quadtree created: {} roots, coalescing threshold {}, cache capacity {}",
            roots.len(),
            config.update_coalescing_threshold,
            config.cache_capacity
        );

        let cache = QuadtreeCache::new(config.cache_capacity);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                factory,
                policy: Box::new(policy),
                roots: RwLock::new(roots),
                cache: Mutex::new(cache),
                pass_lock: Mutex::new(()),
                update_counter: AtomicU32::new(0),
                running: AtomicBool::new(false),
                wake: Mutex::new(WakeState::default()),
                wake_cvar: Condvar::new(),
                idle_cvar: Condvar::new(),
                events: Mutex::new(VecDeque::new()),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Spawn the update worker. Does nothing if it is already running.
    ///
    /// Returns once the worker is parked and ready for its first wake.
    pub fn start(&self) -> Result<()> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            log::debug!("Quadtree worker already running");
            return Ok(());
        }

        {
            let mut state = lock(&self.shared.wake);
            state.idle = false;
            state.wake = false;
            state.stop = false;
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("quadtree-update".into())
            .spawn(move || worker_loop(shared))?;
        *worker = Some(handle);

        let mut state = lock(&self.shared.wake);
        while !state.idle {
            state = self
                .shared
                .idle_cvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(state);

        self.shared.update_counter.store(0, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// A pass in progress is completed first. Does nothing if not running.
    pub fn stop(&self) -> Result<()> {
        // Held until the join so a concurrent start cannot clear the stop flag
        let mut worker = lock(&self.worker);
        let Some(handle) = worker.take() else {
            return Ok(());
        };
        self.shared.running.store(false, Ordering::Release);
        {
            let mut state = lock(&self.shared.wake);
            state.stop = true;
            self.shared.wake_cvar.notify_all();
        }
        handle.join().map_err(|_| Error::WorkerPanicked)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Note that the viewer moved. Never blocks on the worker.
    ///
    /// Every `update_coalescing_threshold`-th call wakes the worker for one
    /// pass. Calls while the worker is stopped are ignored.
    pub fn request_update(&self) {
        if !self.shared.running.load(Ordering::Acquire) {
            return;
        }
        let count = self.shared.update_counter.fetch_add(1, Ordering::AcqRel) + 1;
        if count < self.shared.config.update_coalescing_threshold {
            return;
        }
        self.shared.update_counter.store(0, Ordering::Release);
        self.shared.signal();
    }

    /// Poll the view once; on movement publish the new viewer position and
    /// request an update.
    ///
    /// Returns whether the viewer moved.
    pub fn drive<V: WorldView>(&self, view: &mut V, viewer: &ViewerHandle) -> bool {
        if !view.has_viewer_moved() {
            return false;
        }
        viewer.set(view.viewer_position());
        self.request_update();
        true
    }

    /// Run one pass on the calling thread, waiting for any worker pass to finish first.
    pub fn update_now(&self) -> UpdateStats {
        let stats = self.shared.run_pass();
        let mut state = lock(&self.shared.wake);
        state.passes += 1;
        self.shared.idle_cvar.notify_all();
        stats
    }

    /// Number of completed passes.
    pub fn passes_completed(&self) -> u64 {
        lock(&self.shared.wake).passes
    }

    /// Block until at least `passes` passes completed, or `timeout` elapsed.
    ///
    /// Returns true if the count was reached.
    pub fn wait_for_passes(&self, passes: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.shared.wake);
        while state.passes < passes {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .idle_cvar
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Drain status events reported since the last poll.
    pub fn poll_events(&self) -> Vec<QuadtreeEvent> {
        lock(&self.shared.events).drain(..).collect()
    }

    /// Read access to the root nodes.
    ///
    /// `f` runs under the tree read lock. It may call the cache accessors
    /// ([`Quadtree::cache_len`], [`Quadtree::cached_keys`]) but must not call
    /// anything else that reads or mutates the tree, such as another
    /// `with_roots`, [`Quadtree::update_now`] or [`Quadtree::shutdown`].
    pub fn with_roots<R>(&self, f: impl FnOnce(&[QuadtreeNode<F::Payload>]) -> R) -> R {
        let roots = self.shared.roots.read().unwrap_or_else(PoisonError::into_inner);
        f(&roots)
    }

    /// Call `f` for every active chunk.
    ///
    /// Same restrictions on `f` as [`Quadtree::with_roots`].
    pub fn visit_leaves(&self, mut f: impl FnMut(&ChunkConfig, &F::Payload)) {
        self.with_roots(|roots| {
            for root in roots {
                root.visit_leaves(&mut f);
            }
        });
    }

    /// Keys of every active chunk.
    pub fn leaf_keys(&self) -> Vec<ChunkKey> {
        let mut keys = Vec::new();
        self.visit_leaves(|config, _| keys.push(config.key()));
        keys
    }

    pub fn leaf_count(&self) -> usize {
        self.with_roots(|roots| roots.iter().map(|r| r.leaf_count()).sum())
    }

    /// Keys of every cached payload.
    pub fn cached_keys(&self) -> Vec<ChunkKey> {
        lock(&self.shared.cache).keys().copied().collect()
    }

    pub fn cache_len(&self) -> usize {
        lock(&self.shared.cache).len()
    }

    /// Verify the node shape and payload ownership invariants.
    ///
    /// Every node must be a leaf with a payload or a split node with four
    /// children, and no chunk may be both active and cached.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        // Tree, then cache. While the tree is held the cache only loses
        // entries or gains ones already detached from the tree.
        let roots = self.shared.roots.read().unwrap_or_else(PoisonError::into_inner);
        let cache = lock(&self.shared.cache);

        let mut active = HashSet::new();
        for root in roots.iter() {
            root.validate_shape()
                .map_err(|key| format!("malformed node {:?}", key))?;
            let mut duplicate = None;
            root.visit_leaves(&mut |config, _| {
                if !active.insert(config.key()) {
                    duplicate = Some(config.key());
                }
            });
            if let Some(key) = duplicate {
                return Err(format!("chunk {:?} is active twice", key));
            }
        }
        match cache.keys().find(|key| active.contains(*key)) {
            Some(key) => Err(format!("chunk {:?} is both active and cached", key)),
            None => Ok(()),
        }
    }

    pub fn config(&self) -> &QuadtreeConfig {
        &self.shared.config
    }

    pub fn factory(&self) -> &F {
        &self.shared.factory
    }

    /// Stop the worker and destroy every active and cached payload.
    ///
    /// The tree is empty afterwards. Also run on drop.
    pub fn shutdown(&self) -> Result<()> {
        let stopped = self.stop();

        let _pass = lock(&self.shared.pass_lock);
        let roots = std::mem::take(
            &mut *self.shared.roots.write().unwrap_or_else(PoisonError::into_inner),
        );
        let cached = lock(&self.shared.cache).evict_all(&self.shared.factory);

        let mut payloads = Vec::new();
        for root in roots {
            root.into_payloads(&mut payloads);
        }
        let active = payloads.len();
        for (_, payload) in payloads {
            self.shared.factory.destroy(payload);
        }
        if cached + active > 0 {
            log::info!("Quadtree released {} active and {} cached chunks", active, cached);
        }
        stopped
    }
}

impl<F: ChunkFactory> Drop for Quadtree<F> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Quadtree shutdown failed: {}", e);
        }
    }
}
