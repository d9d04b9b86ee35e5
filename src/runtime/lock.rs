//! Per-Module Locks with Deadlock Detection
//!
//! Every module name gets its own re-entrant lock, handed out by a
//! `LockRegistry`. The registry also keeps the *blocking-on graph*: for each
//! thread, the locks it is currently waiting to acquire.
//!
//! # Deadlock Detection
//!
//! Before a thread blocks on a lock, it records the lock in its own entry of
//! the blocking-on graph and walks the graph starting from the lock's
//! current owner:
//!
//! ```text
//! requester ──waits on──▶ lock(A) ──owned by──▶ T2 ──waits on──▶ lock(B) ──owned by──▶ ...
//! ```
//!
//! If the walk reaches the requester again, granting the wait would leave
//! every participant blocked forever, so `acquire` fails fast with
//! `DeadlockError` instead of blocking.
//!
//! Each thread only ever mutates its own graph entry; the walk copies other
//! threads' entries out of the map (copy-on-read) and reads lock owners from
//! atomics, so detection never takes another lock's state mutex.
//!
//! # Lifetime
//!
//! The registry holds locks weakly. When the last handle to a lock is
//! dropped, the lock evicts its own registry entry, so locks for modules
//! that are no longer being imported do not accumulate.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::error::{DeadlockError, LockError};

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: ThreadToken = ThreadToken::allocate();
}

/// Process-unique identity of a thread, cheap to store in an atomic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadToken(NonZeroU64);

impl ThreadToken {
    /// Token of the calling thread.
    pub fn current() -> Self {
        THREAD_TOKEN.with(|t| *t)
    }

    fn allocate() -> Self {
        let raw = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
        // Starts at 1 and a u64 counter will not wrap in practice.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    fn raw(self) -> u64 {
        self.0.get()
    }
}

type LockTable = Mutex<HashMap<String, Weak<ModuleLock>>>;
type WaitList = SmallVec<[Arc<ModuleLock>; 2]>;

#[derive(Debug, Default)]
struct LockState {
    /// Re-entrant acquisition depth of the owner.
    count: usize,
    /// Threads parked on `wakeup`.
    waiters: usize,
}

/// A re-entrant lock guarding the import of one module name.
pub struct ModuleLock {
    name: Arc<str>,

    /// Owning thread token, 0 when free. Atomic so cycle detection can read
    /// it without taking `state`.
    owner: AtomicU64,

    state: Mutex<LockState>,
    wakeup: Condvar,

    graph: Arc<BlockingGraph>,
    table: Weak<LockTable>,
}

impl ModuleLock {
    fn new(name: &str, graph: Arc<BlockingGraph>, table: Weak<LockTable>) -> Self {
        Self {
            name: Arc::from(name),
            owner: AtomicU64::new(0),
            state: Mutex::new(LockState::default()),
            wakeup: Condvar::new(),
            graph,
            table,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current owner, if any.
    pub fn owner(&self) -> Option<ThreadToken> {
        ThreadToken::from_raw(self.owner.load(Ordering::Acquire))
    }

    /// True if the calling thread owns this lock.
    pub fn is_owned_by_current(&self) -> bool {
        self.owner() == Some(ThreadToken::current())
    }

    /// Re-entrant depth held by the owner.
    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    /// Number of threads currently parked waiting for this lock.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters
    }

    /// Block until the calling thread owns the lock.
    ///
    /// Succeeds immediately if the calling thread already owns it. Fails
    /// with `DeadlockError`, without blocking, if waiting would close a cycle
    /// in the blocking-on graph.
    pub fn acquire(self: &Arc<Self>) -> Result<(), DeadlockError> {
        let me = ThreadToken::current();
        // Registered before any wait so other threads' detection can see us.
        let _blocking = self.graph.register(me, Arc::clone(self));
        let mut state = self.state.lock();
        loop {
            let owner = self.owner();
            if state.count == 0 || owner == Some(me) {
                self.owner.store(me.raw(), Ordering::Release);
                state.count += 1;
                trace!(module = %self.name, depth = state.count, "module lock acquired");
                return Ok(());
            }
            if self.graph.has_deadlock(me, owner) {
                return Err(DeadlockError {
                    name: self.name.to_string(),
                });
            }
            state.waiters += 1;
            self.wakeup.wait(&mut state);
            state.waiters -= 1;
        }
    }

    /// Drop one level of ownership; at zero, clear the owner and wake one
    /// waiter.
    pub fn release(&self) -> Result<(), LockError> {
        let me = ThreadToken::current();
        let mut state = self.state.lock();
        if self.owner() != Some(me) || state.count == 0 {
            return Err(LockError::NotOwner(self.name.to_string()));
        }
        state.count -= 1;
        if state.count == 0 {
            self.owner.store(0, Ordering::Release);
            if state.waiters > 0 {
                self.wakeup.notify_one();
            }
            trace!(module = %self.name, "module lock released");
        }
        Ok(())
    }
}

impl Drop for ModuleLock {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut table = table.lock();
        // A newer lock may already have replaced this entry.
        if table
            .get(&*self.name)
            .map_or(false, |entry| entry.strong_count() == 0)
        {
            table.remove(&*self.name);
        }
    }
}

impl fmt::Debug for ModuleLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLock")
            .field("name", &self.name)
            .field("owner", &self.owner())
            .finish_non_exhaustive()
    }
}

/// Thread → locks-it-waits-on, sharded by thread.
#[derive(Default)]
struct BlockingGraph {
    edges: DashMap<ThreadToken, WaitList>,
}

impl BlockingGraph {
    fn register(&self, me: ThreadToken, lock: Arc<ModuleLock>) -> BlockingOn<'_> {
        self.edges.entry(me).or_default().push(Arc::clone(&lock));
        BlockingOn {
            graph: self,
            me,
            lock,
        }
    }

    /// Copy of a thread's wait list.
    fn snapshot(&self, tid: ThreadToken) -> Option<WaitList> {
        self.edges.get(&tid).map(|entry| entry.value().clone())
    }

    fn has_deadlock(&self, target: ThreadToken, owner: Option<ThreadToken>) -> bool {
        let candidates: SmallVec<[ThreadToken; 4]> = owner.into_iter().collect();
        self.has_deadlocked(target, &candidates, &mut HashSet::new())
    }

    fn has_deadlocked(
        &self,
        target: ThreadToken,
        candidates: &[ThreadToken],
        seen: &mut HashSet<ThreadToken>,
    ) -> bool {
        if candidates.contains(&target) {
            return true;
        }
        for &tid in candidates {
            // A thread with no record is not waiting (or already stopped
            // waiting), so no cycle runs through it.
            let waits = match self.snapshot(tid) {
                Some(waits) if !waits.is_empty() => waits,
                _ => continue,
            };
            if !seen.insert(tid) {
                // A cycle that does not involve `target`; not ours to report.
                return false;
            }
            let next: SmallVec<[ThreadToken; 4]> =
                waits.iter().filter_map(|lock| lock.owner()).collect();
            if self.has_deadlocked(target, &next, seen) {
                return true;
            }
        }
        false
    }
}

/// Removes a wait-list entry when the waiting thread stops waiting.
struct BlockingOn<'a> {
    graph: &'a BlockingGraph,
    me: ThreadToken,
    lock: Arc<ModuleLock>,
}

impl Drop for BlockingOn<'_> {
    fn drop(&mut self) {
        let removed = self.graph.edges.get_mut(&self.me).and_then(|mut waits| {
            let idx = waits.iter().rposition(|l| Arc::ptr_eq(l, &self.lock))?;
            Some(waits.remove(idx))
        });
        let emptied = self
            .graph
            .edges
            .remove_if(&self.me, |_, waits| waits.is_empty());
        // Locks are dropped only after every shard guard is released.
        drop(removed);
        drop(emptied);
    }
}

/// Process-wide table of module locks plus the blocking-on graph.
pub struct LockRegistry {
    table: Arc<LockTable>,
    graph: Arc<BlockingGraph>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            graph: Arc::new(BlockingGraph::default()),
        }
    }

    /// Get or create the lock for `name`.
    pub fn get(&self, name: &str) -> Arc<ModuleLock> {
        let mut table = self.table.lock();
        if let Some(lock) = table.get(name).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(ModuleLock::new(
            name,
            Arc::clone(&self.graph),
            Arc::downgrade(&self.table),
        ));
        table.insert(name.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Acquire the lock for `name`, returning a guard that releases it.
    pub fn acquire(&self, name: &str) -> Result<ModuleLockGuard, DeadlockError> {
        let lock = self.get(name);
        lock.acquire()?;
        Ok(ModuleLockGuard { lock })
    }

    /// Wait until no other thread is initializing `name`.
    ///
    /// Acquires and immediately releases the module lock. A deadlock here
    /// means the caller is part of a cross-thread circular import; it is
    /// tolerated and the caller proceeds with the partially initialized
    /// module.
    pub fn lock_unlock(&self, name: &str) {
        let lock = self.get(name);
        match lock.acquire() {
            Ok(()) => {
                if let Err(err) = lock.release() {
                    warn!(module = name, error = %err, "module lock release failed");
                }
            }
            Err(err) => {
                debug!(
                    module = name,
                    error = %err,
                    "circular import across threads; using partially initialized module"
                );
            }
        }
    }

    /// Number of live locks.
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .values()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the locks a thread is currently waiting on.
    pub fn blocked_on(&self, tid: ThreadToken) -> Vec<String> {
        self.graph
            .snapshot(tid)
            .map(|waits| waits.iter().map(|l| l.name().to_string()).collect())
            .unwrap_or_default()
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRegistry")
            .field("live_locks", &self.len())
            .field("blocked_threads", &self.graph.edges.len())
            .finish()
    }
}

/// Owned guard for a held module lock; releases on drop.
pub struct ModuleLockGuard {
    lock: Arc<ModuleLock>,
}

impl ModuleLockGuard {
    pub fn lock(&self) -> &Arc<ModuleLock> {
        &self.lock
    }
}

impl Drop for ModuleLockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.lock.release() {
            warn!(module = %self.lock.name(), error = %err, "module lock release failed");
        }
    }
}
