//! In-memory index of every entry known to be on disk.
//!
//! The index is loaded from a directory scan after `init`; until then it
//! is "not ready", queries that need the full picture are deferred with
//! `execute_when_ready`, and `has` answers optimistically. Removals that
//! happen while the scan is in flight are remembered so the scan cannot
//! resurrect them.

use crate::completion::CompletionCallback;
use crate::disk::ScannedEntry;
use crate::entry_hash::EntryHash;
use crate::error::{CacheError, Result};
use crate::worker_pool::post_to_sequence;
use hashbrown::{HashMap, HashSet};
use std::time::SystemTime;
use tracing::{debug, info};

/// Eviction stops once the total drops to `max_size - max_size / EVICTION_MARGIN_DIVISOR`.
const EVICTION_MARGIN_DIVISOR: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    pub last_used: SystemTime,
    pub size: u64,
    pub in_memory_data: u8,
}

impl EntryMetadata {
    fn new(last_used: SystemTime, size: u64) -> Self {
        Self {
            last_used,
            size,
            in_memory_data: 0,
        }
    }
}

enum Readiness {
    Loading(Vec<CompletionCallback<()>>),
    Ready,
    Failed(CacheError),
}

pub struct SimpleIndex {
    entries: HashMap<EntryHash, EntryMetadata>,
    removed_while_loading: HashSet<EntryHash>,
    readiness: Readiness,
    cache_size: u64,
    max_size: u64,
    eviction_in_progress: bool,
}

impl SimpleIndex {
    pub fn new(max_size: u64) -> Self {
        Self {
            entries: HashMap::new(),
            removed_while_loading: HashSet::new(),
            readiness: Readiness::Loading(Vec::new()),
            cache_size: 0,
            max_size,
            eviction_in_progress: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.readiness, Readiness::Ready)
    }

    /// Run `callback` once the index has loaded, or with the load error.
    /// Delivery is always deferred to a later turn of the sequence.
    pub fn execute_when_ready(&mut self, callback: CompletionCallback<()>) {
        match &mut self.readiness {
            Readiness::Loading(waiting) => waiting.push(callback),
            Readiness::Ready => post_to_sequence(move || callback(Ok(()))),
            Readiness::Failed(err) => {
                let err = err.clone();
                post_to_sequence(move || callback(Err(err)));
            }
        }
    }

    /// Merge a directory scan and become ready.
    pub(crate) fn initialize(&mut self, scanned: Vec<ScannedEntry>) {
        let removed = std::mem::take(&mut self.removed_while_loading);
        for found in scanned {
            if removed.contains(&found.hash) || self.entries.contains_key(&found.hash) {
                continue;
            }
            self.cache_size += found.size;
            self.entries
                .insert(found.hash, EntryMetadata::new(found.last_used, found.size));
        }
        info!(
            entries = self.entries.len(),
            cache_size = self.cache_size,
            "index loaded"
        );
        self.finish_loading(Readiness::Ready);
    }

    /// Loading failed; every current and future waiter sees `err`.
    pub(crate) fn fail(&mut self, err: CacheError) {
        self.finish_loading(Readiness::Failed(err));
    }

    fn finish_loading(&mut self, next: Readiness) {
        let waiting = match std::mem::replace(&mut self.readiness, next) {
            Readiness::Loading(waiting) => waiting,
            _ => Vec::new(),
        };
        for callback in waiting {
            self.execute_when_ready(callback);
        }
    }

    pub fn insert(&mut self, hash: EntryHash) {
        if !self.entries.contains_key(&hash) {
            self.entries
                .insert(hash, EntryMetadata::new(SystemTime::now(), 0));
        }
        self.removed_while_loading.remove(&hash);
    }

    pub fn remove(&mut self, hash: EntryHash) {
        if let Some(meta) = self.entries.remove(&hash) {
            self.cache_size -= meta.size;
        }
        if !self.is_ready() {
            self.removed_while_loading.insert(hash);
        }
    }

    /// True when the entry is present, or when the index cannot tell yet.
    pub fn has(&self, hash: EntryHash) -> bool {
        !self.is_ready() || self.entries.contains_key(&hash)
    }

    /// Bump last-used time; returns whether the entry was known.
    pub fn use_if_exists(&mut self, hash: EntryHash) -> bool {
        match self.entries.get_mut(&hash) {
            Some(meta) => {
                meta.last_used = SystemTime::now();
                true
            }
            None => !self.is_ready(),
        }
    }

    /// Record a new size. Returns true when the cache is now over budget and
    /// an eviction should be started.
    pub fn update_entry_size(&mut self, hash: EntryHash, size: u64) -> bool {
        let meta = self
            .entries
            .entry(hash)
            .or_insert_with(|| EntryMetadata::new(SystemTime::now(), 0));
        self.cache_size = self.cache_size - meta.size + size;
        meta.size = size;
        meta.last_used = SystemTime::now();
        self.needs_eviction()
    }

    pub fn set_max_size(&mut self, max_size: u64) -> bool {
        self.max_size = max_size;
        self.needs_eviction()
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    fn needs_eviction(&self) -> bool {
        self.is_ready() && !self.eviction_in_progress && self.cache_size > self.max_size
    }

    /// Pick the least recently used entries whose removal brings the total
    /// down to the low watermark, and mark an eviction as running. `None`
    /// when no eviction is needed or one is already running.
    pub(crate) fn start_eviction(&mut self) -> Option<Vec<EntryHash>> {
        if !self.needs_eviction() {
            return None;
        }
        let low_watermark = self.max_size - self.max_size / EVICTION_MARGIN_DIVISOR;
        let mut by_age: Vec<(SystemTime, EntryHash, u64)> = self
            .entries
            .iter()
            .map(|(hash, meta)| (meta.last_used, *hash, meta.size))
            .collect();
        by_age.sort();

        let mut remaining = self.cache_size;
        let mut victims = Vec::new();
        for (_, hash, size) in by_age {
            if remaining <= low_watermark {
                break;
            }
            remaining -= size;
            victims.push(hash);
        }
        debug!(
            victims = victims.len(),
            cache_size = self.cache_size,
            max_size = self.max_size,
            "starting eviction"
        );
        self.eviction_in_progress = true;
        Some(victims)
    }

    pub(crate) fn eviction_done(&mut self) {
        self.eviction_in_progress = false;
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn all_hashes(&self) -> Vec<EntryHash> {
        self.entries.keys().copied().collect()
    }

    /// Hashes last used in `[initial, end)`. `None` leaves that side open.
    pub fn entries_between(
        &self,
        initial: Option<SystemTime>,
        end: Option<SystemTime>,
    ) -> Vec<EntryHash> {
        self.entries
            .iter()
            .filter(|(_, meta)| in_window(meta.last_used, initial, end))
            .map(|(hash, _)| *hash)
            .collect()
    }

    pub fn cache_size(&self) -> u64 {
        self.cache_size
    }

    pub fn cache_size_between(&self, initial: Option<SystemTime>, end: Option<SystemTime>) -> u64 {
        self.entries
            .values()
            .filter(|meta| in_window(meta.last_used, initial, end))
            .map(|meta| meta.size)
            .sum()
    }

    pub fn get_entry_in_memory_data(&self, hash: EntryHash) -> u8 {
        self.entries
            .get(&hash)
            .map(|meta| meta.in_memory_data)
            .unwrap_or(0)
    }

    pub fn set_entry_in_memory_data(&mut self, hash: EntryHash, data: u8) {
        if let Some(meta) = self.entries.get_mut(&hash) {
            meta.in_memory_data = data;
        }
    }

    pub fn metadata(&self, hash: EntryHash) -> Option<EntryMetadata> {
        self.entries.get(&hash).copied()
    }
}

fn in_window(t: SystemTime, initial: Option<SystemTime>, end: Option<SystemTime>) -> bool {
    initial.map_or(true, |lo| t >= lo) && end.map_or(true, |hi| t < hi)
}

/// Convenience for code that only wants the readiness outcome.
pub(crate) fn ready_result(index: &SimpleIndex) -> Option<Result<()>> {
    match &index.readiness {
        Readiness::Loading(_) => None,
        Readiness::Ready => Some(Ok(())),
        Readiness::Failed(err) => Some(Err(err.clone())),
    }
}
