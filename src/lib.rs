//! simple-diskcache: an on-disk blob cache whose coordinator serializes
//! open, create and doom per entry hash.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: keep every entry hash owned by at most one thing at a time, an
//!   active entry or an in-flight doom, while file work runs off the
//!   caller's sequence.
//! - Layers:
//!   - ActiveEntries: hash-keyed table of live entries with generational
//!     slot ids, so an entry can erase its own slot and nothing newer.
//!   - PendingDoom: hashes whose files are being removed, each with a
//!     FIFO of operations that arrived meanwhile.
//!   - SimpleIndex: in-memory view of what is on disk (sizes, recency);
//!     drives time-window dooms, size queries, iteration and eviction.
//!   - Entry: reference-counted record with its own FIFO operation queue.
//!   - SimpleBackend: the coordinator tying the above together.
//!
//! Constraints
//! - Single-threaded: the backend and entries are `!Send` and live on a
//!   tokio `LocalSet` (the "sequence"). Blocking file work goes to a
//!   bounded `WorkerPool` and its replies come back on the sequence.
//! - A hash is never both active and pending doom.
//! - Collisions (two keys, one hash) are detected by key comparison; the
//!   active entry for the other key is doomed and the lookup retried a
//!   bounded number of times.
//! - Post-doom waiters for one hash run in arrival order.
//!
//! Completion contract
//! - Operations take a boxed one-shot callback and return a `Completion`.
//!   `Ready(r)` means the callback is dropped unused; `Pending` means it
//!   runs later on the sequence, or never if the backend goes away first.
//! - Callbacks never run re-entrantly inside the call that scheduled them.
//! - Async wrappers (`SimpleBackend::open` and friends) resolve to
//!   `CacheError::Aborted` when the callback is dropped unrun.
//!
//! Borrowing discipline
//! - Backend state sits in `RefCell`s. No borrow is held while a callback
//!   runs or while an `Entry` handle is dropped, since dropping the last
//!   handle erases the ActiveEntries slot.
//!
//! Lifetime
//! - Entries and continuations hold `Weak` references to the backend.
//!   After teardown, replies still drain but touch nothing.
//!
//! Notes and non-goals
//! - One stream per entry, read and written as a whole blob.
//! - The index is rebuilt from a directory scan on every `init`; nothing
//!   is persisted besides the entry files and a version marker.

mod active_entries;
mod backend;
mod completion;
mod config;
mod disk;
mod entry;
mod entry_hash;
mod error;
mod index;
mod iterator;
mod pending_doom;
mod worker_pool;

// Public surface
pub use backend::SimpleBackend;
pub use completion::{Completion, CompletionCallback};
pub use config::{BackendConfig, CacheType, OperationsMode};
pub use disk::DEFAULT_MAX_SIZE;
pub use entry::Entry;
pub use entry_hash::{EntryHash, EntryHasher, Sha256Hasher};
pub use error::{CacheError, Result};
pub use index::{EntryMetadata, SimpleIndex};
pub use iterator::CacheIterator;
pub use worker_pool::{WorkerPool, DEFAULT_MAX_CONCURRENCY};
