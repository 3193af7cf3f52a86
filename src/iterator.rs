//! Enumeration of every entry in the cache.
//!
//! The iterator snapshots the index's hashes on first use and opens them one
//! at a time by hash. Hashes that vanished since the snapshot, or that fail
//! to open, are skipped. Exhaustion is reported as `CacheError::Failed`.

use crate::backend::BackendInner;
use crate::completion::{resolve, Completion, CompletionCallback, SharedCallback};
use crate::entry::Entry;
use crate::entry_hash::EntryHash;
use crate::error::{CacheError, Result};
use core::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::trace;

#[derive(Default)]
struct IteratorState {
    hashes_to_enumerate: Option<Vec<EntryHash>>,
}

pub struct CacheIterator {
    backend: Weak<BackendInner>,
    state: Rc<RefCell<IteratorState>>,
}

impl CacheIterator {
    pub(crate) fn new(backend: Weak<BackendInner>) -> Self {
        Self {
            backend,
            state: Rc::new(RefCell::new(IteratorState::default())),
        }
    }

    /// Open the next entry. Dropping the iterator cancels any call in
    /// flight: its callback never runs.
    pub fn open_next_entry(&self, callback: CompletionCallback<Entry>) -> Completion<Entry> {
        open_next(self.backend.clone(), Rc::downgrade(&self.state), callback)
    }

    pub async fn next_entry(&self) -> Result<Entry> {
        resolve(|cb| self.open_next_entry(cb)).await
    }
}

fn open_next(
    backend: Weak<BackendInner>,
    state: Weak<RefCell<IteratorState>>,
    callback: CompletionCallback<Entry>,
) -> Completion<Entry> {
    let Some(strong) = backend.upgrade() else {
        return Completion::Ready(Err(CacheError::Failed));
    };
    strong
        .index
        .borrow_mut()
        .execute_when_ready(Box::new(move |ready| {
            open_next_when_ready(backend, state, callback, ready)
        }));
    Completion::Pending
}

fn open_next_when_ready(
    backend: Weak<BackendInner>,
    state: Weak<RefCell<IteratorState>>,
    callback: CompletionCallback<Entry>,
    ready: Result<()>,
) {
    let Some(iter_state) = state.upgrade() else {
        return;
    };
    let Some(strong) = backend.upgrade() else {
        callback(Err(CacheError::Failed));
        return;
    };
    if let Err(err) = ready {
        callback(Err(err));
        return;
    }

    let shared = SharedCallback::new(callback);
    loop {
        let next = {
            let mut st = iter_state.borrow_mut();
            let hashes = st
                .hashes_to_enumerate
                .get_or_insert_with(|| strong.index.borrow().all_hashes());
            hashes.pop()
        };
        let Some(hash) = next else {
            break;
        };
        if !strong.index.borrow().has(hash) {
            continue;
        }
        let continuation = {
            let backend = backend.clone();
            let state = state.clone();
            let shared = shared.clone();
            Box::new(move |result| check_iteration_result(backend, state, shared, result))
        };
        match strong.open_entry_from_hash(hash, continuation) {
            Completion::Pending => return,
            Completion::Ready(Err(err)) if err.is_skippable() => {
                trace!(hash = %hash, error = %err, "iterator skipping entry");
            }
            Completion::Ready(result) => {
                shared.run(result);
                return;
            }
        }
    }
    shared.run(Err(CacheError::Failed));
}

fn check_iteration_result(
    backend: Weak<BackendInner>,
    state: Weak<RefCell<IteratorState>>,
    shared: SharedCallback<Entry>,
    result: Result<Entry>,
) {
    if state.strong_count() == 0 {
        return;
    }
    match result {
        Err(err) if err.is_skippable() => {
            if let Completion::Ready(result) = open_next(backend, state, shared.forwarder()) {
                shared.run(result);
            }
        }
        result => shared.run(result),
    }
}
