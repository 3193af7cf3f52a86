//! Entries: reference-counted handles to one cache record.
//!
//! An `Entry` is a cheap clone of an `Rc<EntryImpl>`. The backend's
//! ActiveEntries table only holds a `Weak` to it, so the record leaves the
//! table when the last handle is dropped: the entry owns an
//! `ActiveEntryProxy` whose `Drop` erases the slot. Dooming an entry
//! releases the proxy early, so a doomed entry can outlive its slot while
//! callers finish with it.
//!
//! Operations on one entry run strictly one at a time, in arrival order.
//! File work goes to the worker pool; results and client callbacks are
//! delivered on the backend's sequence.

use crate::backend::{ActiveEntryProxy, BackendInner};
use crate::completion::{resolve, Completion, CompletionCallback};
use crate::config::OperationsMode;
use crate::disk::{self, EntryStat};
use crate::entry_hash::EntryHash;
use crate::error::{CacheError, Result};
use crate::worker_pool::{post_to_sequence, WorkerPool};
use core::cell::RefCell;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::time::SystemTime;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Ready,
    Failure,
}

enum Operation {
    Open(CompletionCallback<Entry>),
    /// `None` when the create was already reported as successful.
    Create(Option<CompletionCallback<Entry>>),
    Doom(Option<CompletionCallback<()>>),
    Read(CompletionCallback<Vec<u8>>),
    Write(Vec<u8>, CompletionCallback<u64>),
}

enum Step {
    Done,
    Async,
}

struct EntryState {
    key: Option<String>,
    phase: Phase,
    doomed: bool,
    executing: bool,
    pending: VecDeque<Operation>,
    data_size: u64,
    last_used: Option<SystemTime>,
    proxy: Option<ActiveEntryProxy>,
}

pub(crate) struct EntryImpl {
    backend: Weak<BackendInner>,
    hash: EntryHash,
    dir: PathBuf,
    worker_pool: WorkerPool,
    mode: OperationsMode,
    state: RefCell<EntryState>,
}

impl Drop for EntryImpl {
    fn drop(&mut self) {
        trace!(hash = %self.hash, "entry released");
    }
}

/// Handle to a cache entry. Clones share the same record; dropping the last
/// handle closes it.
#[derive(Clone)]
pub struct Entry {
    inner: Rc<EntryImpl>,
}

fn post_result<T: 'static>(callback: CompletionCallback<T>, result: Result<T>) {
    post_to_sequence(move || callback(result));
}

impl Entry {
    pub(crate) fn new(backend: &Rc<BackendInner>, hash: EntryHash) -> Self {
        Self {
            inner: Rc::new(EntryImpl {
                backend: Rc::downgrade(backend),
                hash,
                dir: backend.path.clone(),
                worker_pool: backend.worker_pool.clone(),
                mode: backend.mode,
                state: RefCell::new(EntryState {
                    key: None,
                    phase: Phase::Uninitialized,
                    doomed: false,
                    executing: false,
                    pending: VecDeque::new(),
                    data_size: 0,
                    last_used: None,
                    proxy: None,
                }),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<EntryImpl>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<EntryImpl> {
        Rc::downgrade(&self.inner)
    }

    pub fn entry_hash(&self) -> EntryHash {
        self.inner.hash
    }

    /// The entry's key; unknown only for an entry opened by hash whose
    /// open has not completed.
    pub fn key(&self) -> Option<String> {
        self.inner.state.borrow().key.clone()
    }

    pub(crate) fn key_matches(&self, key: &str) -> bool {
        self.inner.state.borrow().key.as_deref() == Some(key)
    }

    pub(crate) fn set_key(&self, key: String) {
        self.inner.state.borrow_mut().key = Some(key);
    }

    pub(crate) fn set_active_entry_proxy(&self, proxy: ActiveEntryProxy) {
        let previous = self.inner.state.borrow_mut().proxy.replace(proxy);
        debug_assert!(previous.is_none(), "entry already had a proxy");
        drop(previous);
    }

    pub fn data_size(&self) -> u64 {
        self.inner.state.borrow().data_size
    }

    pub fn last_used(&self) -> Option<SystemTime> {
        self.inner.state.borrow().last_used
    }

    pub fn is_doomed(&self) -> bool {
        self.inner.state.borrow().doomed
    }

    /// Give up this handle. The record closes once every handle is gone.
    pub fn close(self) {
        drop(self);
    }

    pub(crate) fn open(&self, callback: CompletionCallback<Entry>) -> Completion<Entry> {
        if self.known_absent() {
            trace!(hash = %self.inner.hash, "open fails fast: hash not in index");
            return Completion::Ready(Err(CacheError::NotFound));
        }
        self.enqueue(Operation::Open(callback));
        Completion::Pending
    }

    pub(crate) fn create(&self, callback: CompletionCallback<Entry>) -> Completion<Entry> {
        let optimistic = {
            let st = self.inner.state.borrow();
            if st.phase == Phase::Uninitialized && !st.doomed {
                if let Some(backend) = self.inner.backend.upgrade() {
                    backend.index.borrow_mut().insert(self.inner.hash);
                }
            }
            self.inner.mode == OperationsMode::Optimistic
                && st.phase == Phase::Uninitialized
                && !st.doomed
                && !st.executing
                && st.pending.is_empty()
        };
        if optimistic {
            self.enqueue(Operation::Create(None));
            return Completion::Ready(Ok(self.clone()));
        }
        self.enqueue(Operation::Create(Some(callback)));
        Completion::Pending
    }

    /// Doom this entry: it leaves the index and the active table at once,
    /// and its files are removed after the operations queued before it.
    pub(crate) fn doom_with(&self, callback: Option<CompletionCallback<()>>) -> Completion<()> {
        if self.is_doomed() {
            return Completion::Ready(Ok(()));
        }
        self.mark_as_doomed();
        if let Some(backend) = self.inner.backend.upgrade() {
            backend.on_doom_start(self.inner.hash);
        }
        self.enqueue(Operation::Doom(callback));
        Completion::Pending
    }

    pub fn read_data(&self, callback: CompletionCallback<Vec<u8>>) -> Completion<Vec<u8>> {
        self.enqueue(Operation::Read(callback));
        Completion::Pending
    }

    /// Replace the entry's payload. Payloads larger than the backend's
    /// per-file limit are refused and doom the entry.
    pub fn write_data(&self, data: Vec<u8>, callback: CompletionCallback<u64>) -> Completion<u64> {
        if let Some(backend) = self.inner.backend.upgrade() {
            let limit = backend.max_file_size();
            if data.len() as u64 > limit {
                warn!(hash = %self.inner.hash, len = data.len(), limit, "write exceeds max file size");
                let _ = self.doom_with(None);
                return Completion::Ready(Err(CacheError::Failed));
            }
        }
        self.enqueue(Operation::Write(data, callback));
        Completion::Pending
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        resolve(|cb| self.read_data(cb)).await
    }

    pub async fn write(&self, data: Vec<u8>) -> Result<u64> {
        resolve(|cb| self.write_data(data, cb)).await
    }

    /// Doom this entry and wait for its files to be removed. Dooming an
    /// already doomed entry succeeds at once.
    pub async fn doom(&self) -> Result<()> {
        resolve(|cb| self.doom_with(Some(cb))).await
    }

    fn known_absent(&self) -> bool {
        if self.inner.state.borrow().phase == Phase::Ready {
            return false;
        }
        match self.inner.backend.upgrade() {
            Some(backend) => !backend.index.borrow().has(self.inner.hash),
            None => false,
        }
    }

    /// Leave the index and the active table. The proxy is dropped outside
    /// the state borrow since releasing it touches the backend.
    fn mark_as_doomed(&self) {
        let proxy = {
            let mut st = self.inner.state.borrow_mut();
            st.doomed = true;
            st.proxy.take()
        };
        if let Some(backend) = self.inner.backend.upgrade() {
            backend.index.borrow_mut().remove(self.inner.hash);
        }
        drop(proxy);
    }

    fn enqueue(&self, op: Operation) {
        self.inner.state.borrow_mut().pending.push_back(op);
        self.run_next_operations();
    }

    fn run_next_operations(&self) {
        loop {
            let op = {
                let mut st = self.inner.state.borrow_mut();
                if st.executing {
                    return;
                }
                match st.pending.pop_front() {
                    Some(op) => {
                        st.executing = true;
                        op
                    }
                    None => return,
                }
            };
            let step = match op {
                Operation::Open(cb) => self.open_internal(cb),
                Operation::Create(cb) => self.create_internal(cb),
                Operation::Doom(cb) => self.doom_internal(cb),
                Operation::Read(cb) => self.read_internal(cb),
                Operation::Write(data, cb) => self.write_internal(data, cb),
            };
            match step {
                Step::Async => return,
                Step::Done => self.inner.state.borrow_mut().executing = false,
            }
        }
    }

    fn operation_complete(&self) {
        self.inner.state.borrow_mut().executing = false;
        self.run_next_operations();
    }

    fn open_internal(&self, callback: CompletionCallback<Entry>) -> Step {
        let (phase, key) = {
            let st = self.inner.state.borrow();
            (st.phase, st.key.clone())
        };
        match phase {
            Phase::Ready => {
                post_result(callback, Ok(self.clone()));
                Step::Done
            }
            Phase::Failure => {
                post_result(callback, Err(CacheError::Failed));
                Step::Done
            }
            Phase::Uninitialized => {
                let dir = self.inner.dir.clone();
                let hash = self.inner.hash;
                let entry = self.clone();
                self.inner.worker_pool.post_task_and_reply(
                    move || disk::open_entry_file(&dir, hash, key.as_deref()),
                    move |result| entry.open_complete(result, callback),
                );
                Step::Async
            }
        }
    }

    fn open_complete(&self, result: Result<EntryStat>, callback: CompletionCallback<Entry>) {
        let reply = match result {
            Ok(stat) => {
                let doomed = {
                    let mut st = self.inner.state.borrow_mut();
                    st.phase = Phase::Ready;
                    st.data_size = stat.data_size;
                    st.last_used = Some(stat.last_used);
                    if st.key.is_none() {
                        st.key = Some(stat.key);
                    }
                    st.doomed
                };
                if !doomed {
                    if let Some(backend) = self.inner.backend.upgrade() {
                        let mut index = backend.index.borrow_mut();
                        index.insert(self.inner.hash);
                        index.use_if_exists(self.inner.hash);
                    }
                }
                Ok(self.clone())
            }
            Err(err) => {
                debug!(hash = %self.inner.hash, error = %err, "open failed");
                Err(err)
            }
        };
        post_result(callback, reply);
        self.operation_complete();
    }

    fn create_internal(&self, callback: Option<CompletionCallback<Entry>>) -> Step {
        let (phase, doomed, key) = {
            let st = self.inner.state.borrow();
            (st.phase, st.doomed, st.key.clone())
        };
        let result = match (phase, key) {
            (Phase::Ready, _) if !doomed => Ok(self.clone()),
            (Phase::Uninitialized, Some(key)) if !doomed => {
                let dir = self.inner.dir.clone();
                let hash = self.inner.hash;
                let entry = self.clone();
                self.inner.worker_pool.post_task_and_reply(
                    move || disk::create_entry_file(&dir, hash, &key),
                    move |result| entry.create_complete(result, callback),
                );
                return Step::Async;
            }
            _ => Err(CacheError::Failed),
        };
        if let Some(cb) = callback {
            post_result(cb, result);
        }
        Step::Done
    }

    fn create_complete(&self, result: Result<EntryStat>, callback: Option<CompletionCallback<Entry>>) {
        let reply = match result {
            Ok(stat) => {
                let doomed = {
                    let mut st = self.inner.state.borrow_mut();
                    st.phase = Phase::Ready;
                    st.data_size = 0;
                    st.last_used = Some(stat.last_used);
                    st.doomed
                };
                if !doomed {
                    if let Some(backend) = self.inner.backend.upgrade() {
                        backend.update_entry_size(self.inner.hash, disk::file_size_for(&stat.key, 0));
                    }
                }
                Ok(self.clone())
            }
            Err(err) => {
                warn!(hash = %self.inner.hash, error = %err, "create failed");
                self.inner.state.borrow_mut().phase = Phase::Failure;
                self.mark_as_doomed();
                Err(err)
            }
        };
        if let Some(cb) = callback {
            post_result(cb, reply);
        }
        self.operation_complete();
    }

    fn doom_internal(&self, callback: Option<CompletionCallback<()>>) -> Step {
        let dir = self.inner.dir.clone();
        let hash = self.inner.hash;
        let entry = self.clone();
        self.inner.worker_pool.post_task_and_reply(
            move || disk::delete_entry_files(&dir, hash),
            move |result| entry.doom_complete(result, callback),
        );
        Step::Async
    }

    fn doom_complete(&self, result: Result<()>, callback: Option<CompletionCallback<()>>) {
        debug!(hash = %self.inner.hash, ok = result.is_ok(), "entry doom complete");
        if let Some(cb) = callback {
            post_result(cb, result);
        }
        if let Some(backend) = self.inner.backend.upgrade() {
            backend.on_doom_complete(self.inner.hash);
        }
        self.operation_complete();
    }

    fn usable(&self) -> Option<String> {
        let st = self.inner.state.borrow();
        match (st.phase, st.doomed) {
            (Phase::Ready, false) => st.key.clone(),
            _ => None,
        }
    }

    fn read_internal(&self, callback: CompletionCallback<Vec<u8>>) -> Step {
        if self.usable().is_none() {
            post_result(callback, Err(CacheError::Failed));
            return Step::Done;
        }
        let dir = self.inner.dir.clone();
        let hash = self.inner.hash;
        let entry = self.clone();
        self.inner.worker_pool.post_task_and_reply(
            move || disk::read_entry_data(&dir, hash),
            move |result| entry.read_complete(result, callback),
        );
        Step::Async
    }

    fn read_complete(&self, result: Result<Vec<u8>>, callback: CompletionCallback<Vec<u8>>) {
        if result.is_ok() {
            self.inner.state.borrow_mut().last_used = Some(SystemTime::now());
            if let Some(backend) = self.inner.backend.upgrade() {
                backend.index.borrow_mut().use_if_exists(self.inner.hash);
            }
        }
        post_result(callback, result);
        self.operation_complete();
    }

    fn write_internal(&self, data: Vec<u8>, callback: CompletionCallback<u64>) -> Step {
        let Some(key) = self.usable() else {
            post_result(callback, Err(CacheError::Failed));
            return Step::Done;
        };
        let dir = self.inner.dir.clone();
        let hash = self.inner.hash;
        let entry = self.clone();
        self.inner.worker_pool.post_task_and_reply(
            move || {
                disk::write_entry_data(&dir, hash, &key, &data)
                    .map(|written| (written, disk::file_size_for(&key, written)))
            },
            move |result| entry.write_complete(result, callback),
        );
        Step::Async
    }

    fn write_complete(&self, result: Result<(u64, u64)>, callback: CompletionCallback<u64>) {
        let reply = match result {
            Ok((written, file_size)) => {
                let doomed = {
                    let mut st = self.inner.state.borrow_mut();
                    st.data_size = written;
                    st.last_used = Some(SystemTime::now());
                    st.doomed
                };
                if !doomed {
                    if let Some(backend) = self.inner.backend.upgrade() {
                        backend.update_entry_size(self.inner.hash, file_size);
                    }
                }
                Ok(written)
            }
            Err(err) => {
                warn!(hash = %self.inner.hash, error = %err, "write failed");
                self.inner.state.borrow_mut().phase = Phase::Failure;
                self.mark_as_doomed();
                Err(err)
            }
        };
        post_result(callback, reply);
        self.operation_complete();
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.inner.state.borrow();
        f.debug_struct("Entry")
            .field("hash", &self.inner.hash)
            .field("key", &st.key)
            .field("phase", &st.phase)
            .field("doomed", &st.doomed)
            .finish()
    }
}

/// Handles compare by identity: two handles are equal iff they refer to
/// the same entry record.
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Entry {}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.inner) as usize).hash(state);
    }
}
