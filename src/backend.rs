//! SimpleBackend: the coordinator that owns the index, the ActiveEntries
//! table and the PendingDoom table, and serializes open, create and doom
//! per entry hash.
//!
//! Rules the coordinator maintains:
//! - At most one live `Entry` per hash is reachable through ActiveEntries.
//! - A hash is never both active and pending doom.
//! - Operations on a hash whose doom is in flight are queued and replayed,
//!   in arrival order, once the files are gone.
//!
//! Every continuation that outlives a call holds a `Weak<BackendInner>`;
//! after the backend is dropped they do nothing, and async wrappers report
//! `CacheError::Aborted`.

use crate::active_entries::{ActiveEntries, EntryId};
use crate::completion::{resolve, run_operation_and_callback, Barrier, Completion, CompletionCallback};
use crate::config::{BackendConfig, OperationsMode};
use crate::disk::{self, DiskStat, ScannedEntry, DEFAULT_MAX_SIZE};
use crate::entry::{Entry, EntryImpl};
use crate::entry_hash::{EntryHash, EntryHasher, Sha256Hasher};
use crate::error::{CacheError, Result};
use crate::index::{ready_result, SimpleIndex};
use crate::iterator::CacheIterator;
use crate::pending_doom::{PendingDoom, PostDoomWaiter};
use crate::worker_pool::{post_to_sequence, WorkerPool};
use core::cell::{Cell, RefCell};
use hashbrown::HashSet;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::time::SystemTime;
use tracing::{debug, error, info, trace, warn};

/// Per-file limit is `max_size / MAX_FILE_RATIO`.
const MAX_FILE_RATIO: u64 = 8;

/// Bound on doom-and-retry rounds when active entries keep colliding on a
/// hash with a different key.
const MAX_COLLISION_RETRIES: usize = 8;

/// Owned by an active entry; erases the entry's ActiveEntries slot when the
/// entry is closed or doomed.
pub(crate) struct ActiveEntryProxy {
    id: EntryId,
    backend: Weak<BackendInner>,
}

impl ActiveEntryProxy {
    fn new(id: EntryId, backend: &Rc<BackendInner>) -> Self {
        Self {
            id,
            backend: Rc::downgrade(backend),
        }
    }
}

impl Drop for ActiveEntryProxy {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.upgrade() {
            let removed = backend.active_entries.borrow_mut().remove(self.id);
            if let Some((hash, _)) = removed {
                trace!(hash = %hash, "entry left active table");
            }
        }
    }
}

fn effective_max_size(max_size: u64) -> u64 {
    if max_size == 0 {
        DEFAULT_MAX_SIZE
    } else {
        max_size
    }
}

enum Lookup {
    PendingDoom,
    Active(Entry),
    Absent,
}

pub(crate) struct BackendInner {
    pub(crate) path: PathBuf,
    pub(crate) mode: OperationsMode,
    pub(crate) worker_pool: WorkerPool,
    pub(crate) index: RefCell<SimpleIndex>,
    hasher: Box<dyn EntryHasher>,
    orig_max_size: Cell<u64>,
    active_entries: RefCell<ActiveEntries<Weak<EntryImpl>>>,
    pending_doom: RefCell<PendingDoom>,
}

/// Handle to an open cache. Must be created and used on a tokio `LocalSet`.
pub struct SimpleBackend {
    inner: Rc<BackendInner>,
}

impl SimpleBackend {
    /// Backend using the process-wide worker pool, or a private pool when
    /// `config.worker_threads` is set, and SHA-256 key hashing.
    pub fn new(config: BackendConfig) -> Self {
        let pool = match config.worker_threads {
            Some(threads) => WorkerPool::new(threads),
            None => WorkerPool::shared(),
        };
        Self::with_parts(config, pool, Sha256Hasher)
    }

    pub fn with_parts<H>(config: BackendConfig, worker_pool: WorkerPool, hasher: H) -> Self
    where
        H: EntryHasher + 'static,
    {
        let orig_max_size = config.initial_max_size();
        Self {
            inner: Rc::new(BackendInner {
                path: config.path,
                mode: config.cache_type.operations_mode(),
                worker_pool,
                index: RefCell::new(SimpleIndex::new(effective_max_size(orig_max_size))),
                hasher: Box::new(hasher),
                orig_max_size: Cell::new(orig_max_size),
                active_entries: RefCell::new(ActiveEntries::new()),
                pending_doom: RefCell::new(PendingDoom::default()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn operations_mode(&self) -> OperationsMode {
        self.inner.mode
    }

    /// Prepare the cache directory and start loading the index. The
    /// callback reports the directory check; the index finishes loading in
    /// the background.
    pub fn init(&self, callback: CompletionCallback<()>) -> Completion<()> {
        self.inner.init(callback)
    }

    /// Change the size budget. Negative sizes are rejected; zero selects
    /// `DEFAULT_MAX_SIZE`.
    pub fn set_max_size(&self, max_size: i64) -> bool {
        if max_size < 0 {
            return false;
        }
        let max_size = max_size as u64;
        self.inner.orig_max_size.set(max_size);
        let needs_eviction = self
            .inner
            .index
            .borrow_mut()
            .set_max_size(effective_max_size(max_size));
        if needs_eviction {
            self.inner.maybe_evict();
        }
        true
    }

    pub fn max_size(&self) -> u64 {
        self.inner.index.borrow().max_size()
    }

    pub fn max_file_size(&self) -> u64 {
        self.inner.max_file_size()
    }

    pub fn entry_count(&self) -> usize {
        self.inner.index.borrow().entry_count()
    }

    pub fn open_entry(&self, key: &str, callback: CompletionCallback<Entry>) -> Completion<Entry> {
        self.inner.open_entry(key, callback)
    }

    pub fn create_entry(&self, key: &str, callback: CompletionCallback<Entry>) -> Completion<Entry> {
        self.inner.create_entry(key, callback)
    }

    pub fn doom_entry(&self, key: &str, callback: CompletionCallback<()>) -> Completion<()> {
        self.inner.doom_entry(key, callback)
    }

    /// Doom every hash in `hashes`. The callback sees success only if every
    /// doom succeeded; otherwise the first error.
    pub fn doom_entries(&self, hashes: Vec<EntryHash>, callback: CompletionCallback<()>) -> Completion<()> {
        if let Some(err) = self.inner.index_failure() {
            return Completion::Ready(Err(err));
        }
        self.inner.doom_entries(hashes, callback);
        Completion::Pending
    }

    pub fn doom_all_entries(&self, callback: CompletionCallback<()>) -> Completion<()> {
        self.inner.doom_entries_between(None, None, callback)
    }

    pub fn doom_entries_between(
        &self,
        initial_time: SystemTime,
        end_time: SystemTime,
        callback: CompletionCallback<()>,
    ) -> Completion<()> {
        self.inner
            .doom_entries_between(Some(initial_time), Some(end_time), callback)
    }

    pub fn doom_entries_since(&self, initial_time: SystemTime, callback: CompletionCallback<()>) -> Completion<()> {
        self.inner.doom_entries_between(Some(initial_time), None, callback)
    }

    pub fn calculate_size_of_all_entries(&self, callback: CompletionCallback<u64>) -> Completion<u64> {
        self.inner.calculate_size_between(None, None, callback)
    }

    pub fn calculate_size_of_entries_between(
        &self,
        initial_time: SystemTime,
        end_time: SystemTime,
        callback: CompletionCallback<u64>,
    ) -> Completion<u64> {
        self.inner
            .calculate_size_between(Some(initial_time), Some(end_time), callback)
    }

    pub fn create_iterator(&self) -> CacheIterator {
        CacheIterator::new(Rc::downgrade(&self.inner))
    }

    /// Another cache layer served `key`; refresh its recency.
    pub fn on_external_cache_hit(&self, key: &str) {
        let hash = self.inner.hasher.hash_key(key);
        self.inner.index.borrow_mut().use_if_exists(hash);
    }

    pub fn get_entry_in_memory_data(&self, key: &str) -> u8 {
        let hash = self.inner.hasher.hash_key(key);
        self.inner.index.borrow().get_entry_in_memory_data(hash)
    }

    pub fn set_entry_in_memory_data(&self, key: &str, data: u8) {
        let hash = self.inner.hasher.hash_key(key);
        self.inner.index.borrow_mut().set_entry_in_memory_data(hash, data);
    }

    pub fn hash_key(&self, key: &str) -> EntryHash {
        self.inner.hasher.hash_key(key)
    }

    pub fn active_entry_count(&self) -> usize {
        self.inner.active_entries.borrow().len()
    }

    pub fn has_active_entry(&self, key: &str) -> bool {
        let hash = self.inner.hasher.hash_key(key);
        self.inner.active_entries.borrow().contains(hash)
    }

    pub fn has_pending_doom(&self, key: &str) -> bool {
        let hash = self.inner.hasher.hash_key(key);
        self.inner.pending_doom.borrow().contains(hash)
    }

    pub fn pending_doom_count(&self) -> usize {
        self.inner.pending_doom.borrow().len()
    }

    pub async fn initialize(&self) -> Result<()> {
        resolve(|cb| self.init(cb)).await
    }

    pub async fn open(&self, key: &str) -> Result<Entry> {
        resolve(|cb| self.open_entry(key, cb)).await
    }

    pub async fn create(&self, key: &str) -> Result<Entry> {
        resolve(|cb| self.create_entry(key, cb)).await
    }

    pub async fn doom(&self, key: &str) -> Result<()> {
        resolve(|cb| self.doom_entry(key, cb)).await
    }

    pub async fn doom_all(&self) -> Result<()> {
        resolve(|cb| self.doom_all_entries(cb)).await
    }

    pub async fn calculate_size(&self) -> Result<u64> {
        resolve(|cb| self.calculate_size_of_all_entries(cb)).await
    }
}

impl Drop for SimpleBackend {
    fn drop(&mut self) {
        debug!(
            path = %self.inner.path.display(),
            active = self.inner.active_entries.borrow().len(),
            pending_doom = self.inner.pending_doom.borrow().len(),
            "backend shutting down"
        );
    }
}

impl BackendInner {
    pub(crate) fn max_file_size(&self) -> u64 {
        self.index.borrow().max_size() / MAX_FILE_RATIO
    }

    fn init(self: &Rc<Self>, callback: CompletionCallback<()>) -> Completion<()> {
        let dir = self.path.clone();
        let suggested = self.orig_max_size.get();
        let weak = Rc::downgrade(self);
        self.worker_pool.post_task_and_reply(
            move || disk::init_cache_structure(&dir, suggested),
            move |result| {
                if let Some(backend) = weak.upgrade() {
                    backend.initialize_index(result, callback);
                }
            },
        );
        Completion::Pending
    }

    fn initialize_index(self: &Rc<Self>, result: Result<DiskStat>, callback: CompletionCallback<()>) {
        let stat = match result {
            Ok(stat) => stat,
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "cache init failed");
                self.index.borrow_mut().fail(err.clone());
                callback(Err(err));
                return;
            }
        };
        // set_max_size may have run while the directory check was in flight.
        let max_size = effective_max_size(self.orig_max_size.get());
        info!(
            path = %self.path.display(),
            max_size,
            suggested_max_size = stat.max_size,
            mtime = ?stat.cache_dir_mtime,
            "cache directory ready"
        );
        if self.index.borrow_mut().set_max_size(max_size) {
            self.maybe_evict();
        }

        let dir = self.path.clone();
        let weak = Rc::downgrade(self);
        self.worker_pool.post_task_and_reply(
            move || disk::scan_cache_directory(&dir),
            move |result| {
                if let Some(backend) = weak.upgrade() {
                    backend.index_loaded(result);
                }
            },
        );
        callback(Ok(()));
    }

    fn index_loaded(self: &Rc<Self>, result: Result<Vec<ScannedEntry>>) {
        match result {
            Ok(scanned) => {
                self.index.borrow_mut().initialize(scanned);
                self.maybe_evict();
            }
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "index load failed");
                self.index
                    .borrow_mut()
                    .fail(CacheError::InitFailed(err.to_string()));
            }
        }
    }

    /// Record the new size of `hash` and start an eviction if it pushed the
    /// cache over budget.
    pub(crate) fn update_entry_size(self: &Rc<Self>, hash: EntryHash, size: u64) {
        let needs_eviction = self.index.borrow_mut().update_entry_size(hash, size);
        if needs_eviction {
            self.maybe_evict();
        }
    }

    fn maybe_evict(self: &Rc<Self>) {
        let victims = self.index.borrow_mut().start_eviction();
        let Some(victims) = victims else {
            return;
        };
        info!(count = victims.len(), "evicting least recently used entries");
        let weak = Rc::downgrade(self);
        self.doom_entries(
            victims,
            Box::new(move |result| {
                if let Err(err) = &result {
                    warn!(error = %err, "eviction incomplete");
                }
                if let Some(backend) = weak.upgrade() {
                    backend.index.borrow_mut().eviction_done();
                }
            }),
        );
    }

    fn index_failure(&self) -> Option<CacheError> {
        match ready_result(&self.index.borrow()) {
            Some(Err(err)) => Some(err),
            _ => None,
        }
    }

    fn active_entry(&self, hash: EntryHash) -> Option<Entry> {
        let entries = self.active_entries.borrow();
        entries
            .get_by_hash(hash)
            .and_then(Weak::upgrade)
            .map(Entry::from_inner)
    }

    fn is_tracked(&self, hash: EntryHash) -> bool {
        self.active_entries.borrow().contains(hash) || self.pending_doom.borrow().contains(hash)
    }

    /// Queue `run` behind the doom in flight for `hash`.
    fn queue_post_doom<F>(&self, hash: EntryHash, run: F)
    where
        F: FnOnce() + 'static,
    {
        let queued = self
            .pending_doom
            .borrow_mut()
            .push_waiter(hash, PostDoomWaiter::new(run));
        if let Err(waiter) = queued {
            post_to_sequence(waiter.run_post_doom);
        }
    }

    fn activate(self: &Rc<Self>, hash: EntryHash, key: &str) -> Result<Entry> {
        let entry = Entry::new(self, hash);
        entry.set_key(key.to_owned());
        self.register_active(hash, &entry)?;
        Ok(entry)
    }

    fn register_active(self: &Rc<Self>, hash: EntryHash, entry: &Entry) -> Result<()> {
        let inserted = self
            .active_entries
            .borrow_mut()
            .insert(hash, entry.downgrade());
        match inserted {
            Ok(id) => {
                entry.set_active_entry_proxy(ActiveEntryProxy::new(id, self));
                Ok(())
            }
            Err(_) => {
                error!(hash = %hash, "active table already holds this hash");
                Err(CacheError::Failed)
            }
        }
    }

    /// Find what currently owns `hash`, dooming active entries that belong
    /// to a different key. With `create`, an absent hash gets a fresh
    /// active entry for `key`.
    fn lookup(self: &Rc<Self>, hash: EntryHash, key: &str, create: bool) -> Result<Lookup> {
        for _ in 0..MAX_COLLISION_RETRIES {
            if self.pending_doom.borrow().contains(hash) {
                return Ok(Lookup::PendingDoom);
            }
            let entry = match self.active_entry(hash) {
                Some(entry) => entry,
                None if create => return self.activate(hash, key).map(Lookup::Active),
                None => return Ok(Lookup::Absent),
            };
            if entry.key_matches(key) {
                return Ok(Lookup::Active(entry));
            }
            debug!(hash = %hash, "hash collision with active entry, dooming it");
            let _ = entry.doom_with(None);
            debug_assert!(!self.active_entries.borrow().contains(hash));
            debug_assert!(self.pending_doom.borrow().contains(hash));
        }
        error!(hash = %hash, "gave up resolving repeated hash collisions");
        Err(CacheError::Failed)
    }

    fn open_entry(self: &Rc<Self>, key: &str, callback: CompletionCallback<Entry>) -> Completion<Entry> {
        if let Some(err) = self.index_failure() {
            return Completion::Ready(Err(err));
        }
        let hash = self.hasher.hash_key(key);
        match self.lookup(hash, key, true) {
            Err(err) => Completion::Ready(Err(err)),
            Ok(Lookup::Active(entry)) => entry.open(callback),
            Ok(Lookup::PendingDoom) => {
                let queued = self.pending_doom.borrow().waiter_count(hash).unwrap_or(0);
                if queued == 0 && self.mode == OperationsMode::Optimistic {
                    trace!(hash = %hash, "open fails fast: entry is being doomed");
                    return Completion::Ready(Err(CacheError::NotFound));
                }
                let weak = Rc::downgrade(self);
                let key = key.to_owned();
                self.queue_post_doom(hash, move || {
                    if let Some(backend) = weak.upgrade() {
                        run_operation_and_callback(|cb| backend.open_entry(&key, cb), callback);
                    }
                });
                Completion::Pending
            }
            Ok(Lookup::Absent) => Completion::Ready(Err(CacheError::Failed)),
        }
    }

    fn create_entry(self: &Rc<Self>, key: &str, callback: CompletionCallback<Entry>) -> Completion<Entry> {
        if key.is_empty() {
            return Completion::Ready(Err(CacheError::EmptyKey));
        }
        if let Some(err) = self.index_failure() {
            return Completion::Ready(Err(err));
        }
        let hash = self.hasher.hash_key(key);
        match self.lookup(hash, key, true) {
            Err(err) => Completion::Ready(Err(err)),
            Ok(Lookup::Active(entry)) => entry.create(callback),
            Ok(Lookup::PendingDoom) => {
                let weak = Rc::downgrade(self);
                let key = key.to_owned();
                self.queue_post_doom(hash, move || {
                    if let Some(backend) = weak.upgrade() {
                        run_operation_and_callback(|cb| backend.create_entry(&key, cb), callback);
                    }
                });
                Completion::Pending
            }
            Ok(Lookup::Absent) => Completion::Ready(Err(CacheError::Failed)),
        }
    }

    fn doom_entry(self: &Rc<Self>, key: &str, callback: CompletionCallback<()>) -> Completion<()> {
        if let Some(err) = self.index_failure() {
            return Completion::Ready(Err(err));
        }
        let hash = self.hasher.hash_key(key);
        match self.lookup(hash, key, false) {
            Err(err) => Completion::Ready(Err(err)),
            Ok(Lookup::Active(entry)) => entry.doom_with(Some(callback)),
            Ok(Lookup::PendingDoom) => {
                let weak = Rc::downgrade(self);
                let key = key.to_owned();
                self.queue_post_doom(hash, move || {
                    if let Some(backend) = weak.upgrade() {
                        run_operation_and_callback(|cb| backend.doom_entry(&key, cb), callback);
                    }
                });
                Completion::Pending
            }
            Ok(Lookup::Absent) => {
                self.doom_entries(vec![hash], callback);
                Completion::Pending
            }
        }
    }

    /// Open whatever entry is stored under `hash`, key unknown. Used by
    /// iteration.
    pub(crate) fn open_entry_from_hash(
        self: &Rc<Self>,
        hash: EntryHash,
        callback: CompletionCallback<Entry>,
    ) -> Completion<Entry> {
        if self.pending_doom.borrow().contains(hash) {
            let weak = Rc::downgrade(self);
            self.queue_post_doom(hash, move || {
                if let Some(backend) = weak.upgrade() {
                    run_operation_and_callback(|cb| backend.open_entry_from_hash(hash, cb), callback);
                }
            });
            return Completion::Pending;
        }

        if let Some(active) = self.active_entry(hash) {
            return match active.key() {
                Some(key) => self.open_entry(&key, callback),
                None => active.open(callback),
            };
        }

        let entry = Entry::new(self, hash);
        let weak = Rc::downgrade(self);
        entry.open(Box::new(move |result| {
            if let Some(backend) = weak.upgrade() {
                backend.on_entry_opened_from_hash(hash, result, callback);
            }
        }))
    }

    /// The entry opened by hash may have lost a race: a doom may have begun
    /// or another entry for the hash may have become active meanwhile.
    fn on_entry_opened_from_hash(
        self: &Rc<Self>,
        hash: EntryHash,
        result: Result<Entry>,
        callback: CompletionCallback<Entry>,
    ) {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                callback(Err(err));
                return;
            }
        };
        if self.pending_doom.borrow().contains(hash) {
            // The open re-inserted the hash the doom had already removed.
            self.index.borrow_mut().remove(hash);
            drop(entry);
            callback(Err(CacheError::NotFound));
            return;
        }
        if let Some(active) = self.active_entry(hash) {
            entry.close();
            run_operation_and_callback(|cb| active.open(cb), callback);
            return;
        }
        match self.register_active(hash, &entry) {
            Ok(()) => callback(Ok(entry)),
            Err(err) => callback(Err(err)),
        }
    }

    fn doom_entry_from_hash(self: &Rc<Self>, hash: EntryHash, callback: CompletionCallback<()>) -> Completion<()> {
        if self.pending_doom.borrow().contains(hash) {
            let weak = Rc::downgrade(self);
            self.queue_post_doom(hash, move || {
                if let Some(backend) = weak.upgrade() {
                    run_operation_and_callback(|cb| backend.doom_entry_from_hash(hash, cb), callback);
                }
            });
            return Completion::Pending;
        }
        if let Some(active) = self.active_entry(hash) {
            return active.doom_with(Some(callback));
        }
        self.doom_entries(vec![hash], callback);
        Completion::Pending
    }

    /// Mass doom. Hashes already tracked (active or being doomed) go through
    /// the per-hash path; the rest are removed in a single worker task.
    pub(crate) fn doom_entries(self: &Rc<Self>, hashes: Vec<EntryHash>, callback: CompletionCallback<()>) {
        let mut seen = HashSet::with_capacity(hashes.len());
        let (contended, free): (Vec<EntryHash>, Vec<EntryHash>) = hashes
            .into_iter()
            .filter(|hash| seen.insert(*hash))
            .partition(|hash| self.is_tracked(*hash));
        debug!(
            contended = contended.len(),
            free = free.len(),
            "dooming entry set"
        );

        let barrier = Barrier::new(contended.len() + 1, callback);
        for hash in contended {
            run_operation_and_callback(|cb| self.doom_entry_from_hash(hash, cb), barrier.callback());
            self.index.borrow_mut().remove(hash);
        }

        {
            let mut index = self.index.borrow_mut();
            let mut pending = self.pending_doom.borrow_mut();
            for &hash in &free {
                index.remove(hash);
                pending.on_doom_start(hash);
            }
        }

        let dir = self.path.clone();
        let to_delete = free.clone();
        let done = barrier.callback();
        let weak = Rc::downgrade(self);
        self.worker_pool.post_task_and_reply(
            move || disk::delete_entry_set_files(&dir, &to_delete),
            move |result| {
                if let Some(backend) = weak.upgrade() {
                    backend.doom_entries_complete(free, result, done);
                }
            },
        );
    }

    fn doom_entries_complete(self: &Rc<Self>, hashes: Vec<EntryHash>, result: Result<()>, callback: CompletionCallback<()>) {
        for hash in hashes {
            self.on_doom_complete(hash);
        }
        callback(result);
    }

    pub(crate) fn on_doom_start(&self, hash: EntryHash) {
        self.pending_doom.borrow_mut().on_doom_start(hash);
    }

    /// Clear the pending doom of `hash` and replay its waiters in order.
    pub(crate) fn on_doom_complete(self: &Rc<Self>, hash: EntryHash) {
        let waiters = self.pending_doom.borrow_mut().on_doom_complete(hash);
        trace!(hash = %hash, waiters = waiters.len(), "doom complete");
        for waiter in waiters {
            trace!(hash = %hash, queued_for = ?waiter.time_queued.elapsed(), "replaying post-doom operation");
            (waiter.run_post_doom)();
        }
    }

    fn doom_entries_between(
        self: &Rc<Self>,
        initial_time: Option<SystemTime>,
        end_time: Option<SystemTime>,
        callback: CompletionCallback<()>,
    ) -> Completion<()> {
        let weak = Rc::downgrade(self);
        self.index.borrow_mut().execute_when_ready(Box::new(move |ready| {
            let Some(backend) = weak.upgrade() else {
                return;
            };
            if let Err(err) = ready {
                callback(Err(err));
                return;
            }
            let hashes = backend.index.borrow().entries_between(initial_time, end_time);
            backend.doom_entries(hashes, callback);
        }));
        Completion::Pending
    }

    fn calculate_size_between(
        self: &Rc<Self>,
        initial_time: Option<SystemTime>,
        end_time: Option<SystemTime>,
        callback: CompletionCallback<u64>,
    ) -> Completion<u64> {
        let weak = Rc::downgrade(self);
        self.index.borrow_mut().execute_when_ready(Box::new(move |ready| {
            let Some(backend) = weak.upgrade() else {
                return;
            };
            let size = ready.map(|()| {
                let index = backend.index.borrow();
                match (initial_time, end_time) {
                    (None, None) => index.cache_size(),
                    _ => index.cache_size_between(initial_time, end_time),
                }
            });
            callback(size);
        }));
        Completion::Pending
    }
}
