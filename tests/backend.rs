//! Coordinator tests for SimpleBackend.
//!
//! Invariants exercised:
//! - At most one live entry per hash; repeated open/create share it.
//! - Operations on a hash being doomed wait for the doom and run in
//!   arrival order.
//! - Collisions doom the other key's entry and never return it.
//! - Mass doom reports once: success, or the first failure.
//! - Teardown turns pending completions into no-ops.

use simple_diskcache::{
    BackendConfig, CacheError, CacheType, Completion, CompletionCallback, Entry, EntryHash,
    SimpleBackend, WorkerPool,
};
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn run_local<F: Future<Output = ()>>(f: F) {
    init_tracing();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    tokio::task::LocalSet::new().block_on(&rt, f);
}

fn backend_in(dir: &tempfile::TempDir, cache_type: CacheType) -> SimpleBackend {
    let config = BackendConfig::new(dir.path().join("cache")).with_cache_type(cache_type);
    SimpleBackend::new(config)
}

fn colliding_backend(dir: &tempfile::TempDir) -> SimpleBackend {
    let config = BackendConfig::new(dir.path().join("cache"));
    SimpleBackend::with_parts(config, WorkerPool::new(2), |_: &str| EntryHash(42))
}

/// A callback that forwards into a oneshot, for driving the callback API.
fn channel<T: 'static>() -> (CompletionCallback<T>, oneshot::Receiver<simple_diskcache::Result<T>>) {
    let (tx, rx) = oneshot::channel();
    (
        Box::new(move |r| {
            let _ = tx.send(r);
        }),
        rx,
    )
}

async fn settle<T>(completion: Completion<T>, rx: oneshot::Receiver<simple_diskcache::Result<T>>) -> simple_diskcache::Result<T> {
    match completion {
        Completion::Ready(r) => r,
        Completion::Pending => rx.await.unwrap_or(Err(CacheError::Aborted)),
    }
}

async fn populated(backend: &SimpleBackend, key: &str, data: &[u8]) {
    let entry = backend.create(key).await.unwrap();
    entry.write(data.to_vec()).await.unwrap();
    entry.close();
}

/// Invariant: create then open of the same key while the first handle is
/// alive yields the same entry and a single active slot.
#[test]
fn open_after_create_shares_entry() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();

        let created = backend.create("foo").await.unwrap();
        let opened = backend.open("foo").await.unwrap();
        assert_eq!(created, opened);
        let again = backend.create("foo").await.unwrap();
        assert_eq!(created, again);
        assert_eq!(backend.active_entry_count(), 1);
        assert_eq!(created.key().as_deref(), Some("foo"));
    });
}

/// Invariant: dropping the last handle erases the active slot.
#[test]
fn closing_last_handle_releases_slot() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();

        let entry = backend.create("foo").await.unwrap();
        entry.write(b"abc".to_vec()).await.unwrap();
        let second = entry.clone();
        entry.close();
        assert!(backend.has_active_entry("foo"));
        second.close();
        assert!(!backend.has_active_entry("foo"));
        assert_eq!(backend.active_entry_count(), 0);
    });
}

#[test]
fn data_survives_reopen() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::App);
        backend.initialize().await.unwrap();
        populated(&backend, "foo", b"hello").await;

        let entry = backend.open("foo").await.unwrap();
        assert_eq!(entry.data_size(), 5);
        assert_eq!(entry.read().await.unwrap(), b"hello");
    });
}

#[test]
fn entries_survive_a_new_backend() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = backend_in(&dir, CacheType::Disk);
            backend.initialize().await.unwrap();
            populated(&backend, "foo", b"persisted").await;
        }
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        assert!(backend.calculate_size().await.unwrap() > 0);
        assert_eq!(backend.entry_count(), 1);
        let entry = backend.open("foo").await.unwrap();
        assert_eq!(entry.read().await.unwrap(), b"persisted");
    });
}

/// Invariant: a create arriving during a doom waits for it and sees a
/// fresh entry, not the doomed data.
#[test]
fn create_during_doom_waits_for_doom() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        populated(&backend, "foo", b"old data").await;
        let old = backend.open("foo").await.unwrap();

        let (doom_cb, doom_rx) = channel();
        let doom = backend.doom_entry("foo", doom_cb);
        assert!(backend.has_pending_doom("foo"));
        assert!(!backend.has_active_entry("foo"));

        let (create_cb, create_rx) = channel();
        let create = backend.create_entry("foo", create_cb);
        assert!(create.is_pending());

        settle(doom, doom_rx).await.unwrap();
        let fresh = settle(create, create_rx).await.unwrap();
        assert_ne!(fresh, old);
        assert!(old.is_doomed());
        assert!(!backend.has_pending_doom("foo"));
        assert!(fresh.read().await.unwrap().is_empty());
    });
}

/// Invariant: waiters queued behind one doom run in arrival order.
#[test]
fn post_doom_waiters_run_fifo() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::App);
        backend.initialize().await.unwrap();
        populated(&backend, "foo", b"x").await;

        let order = Rc::new(RefCell::new(Vec::new()));
        let (doom_cb, doom_rx) = channel();
        let doom = backend.doom_entry("foo", doom_cb);

        let (tx1, rx1) = oneshot::channel();
        let log = order.clone();
        let first = backend.create_entry(
            "foo",
            Box::new(move |r: simple_diskcache::Result<Entry>| {
                log.borrow_mut().push("create");
                let _ = tx1.send(r);
            }),
        );
        let (tx2, rx2) = oneshot::channel();
        let log = order.clone();
        let second = backend.open_entry(
            "foo",
            Box::new(move |r: simple_diskcache::Result<Entry>| {
                log.borrow_mut().push("open");
                let _ = tx2.send(r);
            }),
        );
        assert!(first.is_pending());
        assert!(second.is_pending());

        settle(doom, doom_rx).await.unwrap();
        let created = rx1.await.unwrap().unwrap();
        let opened = rx2.await.unwrap().unwrap();
        assert_eq!(created, opened);
        assert_eq!(*order.borrow(), vec!["create", "open"]);
    });
}

/// Invariant: in optimistic mode an open against a doom with no queued
/// waiters fails synchronously with NotFound.
#[test]
fn optimistic_open_during_doom_fails_fast() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        populated(&backend, "foo", b"x").await;

        let (doom_cb, doom_rx) = channel();
        let doom = backend.doom_entry("foo", doom_cb);
        let (open_cb, _open_rx) = channel();
        match backend.open_entry("foo", open_cb) {
            Completion::Ready(Err(CacheError::NotFound)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        settle(doom, doom_rx).await.unwrap();
    });
}

#[test]
fn non_optimistic_open_during_doom_waits() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::App);
        backend.initialize().await.unwrap();
        populated(&backend, "foo", b"x").await;

        let (doom_cb, doom_rx) = channel();
        let doom = backend.doom_entry("foo", doom_cb);
        let (open_cb, open_rx) = channel();
        let open = backend.open_entry("foo", open_cb);
        assert!(open.is_pending());
        settle(doom, doom_rx).await.unwrap();
        assert!(matches!(settle(open, open_rx).await, Err(CacheError::NotFound)));
    });
}

/// Invariant: once the index is loaded, opening an unknown key fails
/// synchronously and leaves no active slot behind.
#[test]
fn open_of_unknown_key_fails_fast_once_index_is_ready() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        backend.calculate_size().await.unwrap();

        let (cb, _rx) = channel();
        match backend.open_entry("missing", cb) {
            Completion::Ready(Err(CacheError::NotFound)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(backend.active_entry_count(), 0);
    });
}

#[test]
fn create_rejects_empty_key() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        assert!(matches!(backend.create("").await, Err(CacheError::EmptyKey)));
    });
}

/// Invariant: a collision dooms the other key's entry and the new key
/// becomes the sole active entry for the hash.
#[test]
fn collision_dooms_other_key() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = colliding_backend(&dir);
        backend.initialize().await.unwrap();

        let first = backend.create("k1").await.unwrap();
        first.write(b"one".to_vec()).await.unwrap();
        let second = backend.create("k2").await.unwrap();
        assert_ne!(first, second);
        assert!(first.is_doomed());
        assert_eq!(second.key().as_deref(), Some("k2"));
        assert_eq!(backend.active_entry_count(), 1);

        let reopened = backend.open("k2").await.unwrap();
        assert_eq!(reopened, second);
        drop(first);
        assert!(second.read().await.unwrap().is_empty());
    });
}

#[test]
fn open_of_colliding_key_on_disk_is_not_found() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = colliding_backend(&dir);
        backend.initialize().await.unwrap();
        populated(&backend, "k1", b"one").await;
        assert!(matches!(backend.open("k2").await, Err(CacheError::NotFound)));
        let stored = backend.open("k1").await.unwrap();
        assert_eq!(stored.read().await.unwrap(), b"one");
    });
}

/// Invariant: DoomEntries over an active, a pending-doom and an untracked
/// hash completes once with success and removes every file.
#[test]
fn mass_doom_mixes_tracked_and_untracked() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        populated(&backend, "active", b"a").await;
        populated(&backend, "dooming", b"b").await;
        populated(&backend, "untracked", b"c").await;

        let active = backend.open("active").await.unwrap();
        let (doom_cb, doom_rx) = channel();
        let doom = backend.doom_entry("dooming", doom_cb);
        assert!(backend.has_pending_doom("dooming"));

        let hashes = ["active", "dooming", "untracked"]
            .iter()
            .map(|k| backend.hash_key(k))
            .collect();
        let calls = Rc::new(RefCell::new(0));
        let (tx, rx) = oneshot::channel();
        let count = calls.clone();
        let mass = backend.doom_entries(
            hashes,
            Box::new(move |r| {
                *count.borrow_mut() += 1;
                let _ = tx.send(r);
            }),
        );
        assert!(mass.is_pending());
        rx.await.unwrap().unwrap();
        settle(doom, doom_rx).await.unwrap();
        assert_eq!(*calls.borrow(), 1);
        assert!(active.is_doomed());

        for key in ["active", "dooming", "untracked"] {
            assert!(matches!(backend.open(key).await, Err(CacheError::NotFound)));
        }
        assert_eq!(backend.entry_count(), 0);
    });
}

/// Invariant: a failing sub-doom is reported, and the other deletions
/// still happen.
#[test]
fn mass_doom_reports_first_failure() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        populated(&backend, "keep-going", b"a").await;

        let stuck = EntryHash(0xdead_beef);
        std::fs::create_dir(dir.path().join("cache").join(stuck.file_name(0))).unwrap();

        let (cb, rx) = channel();
        let mass = backend.doom_entries(vec![stuck, backend.hash_key("keep-going")], cb);
        assert!(settle(mass, rx).await.is_err());
        assert!(matches!(backend.open("keep-going").await, Err(CacheError::NotFound)));
        assert!(!backend.has_pending_doom("keep-going"));
    });
}

/// Invariant: a failing per-entry doom and a bulk delete in the same batch
/// report once, with the failure, and the bulk files are still removed.
#[test]
fn mass_doom_reports_failed_active_doom_once() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        let held = backend.create("held").await.unwrap();
        held.write(b"a".to_vec()).await.unwrap();
        populated(&backend, "loose-1", b"b").await;
        populated(&backend, "loose-2", b"c").await;

        let held_path = dir.path().join("cache").join(backend.hash_key("held").file_name(0));
        std::fs::remove_file(&held_path).unwrap();
        std::fs::create_dir(&held_path).unwrap();

        let calls = Rc::new(RefCell::new(Vec::new()));
        let (tx, rx) = oneshot::channel();
        let sink = calls.clone();
        let mut tx = Some(tx);
        let cb: CompletionCallback<()> = Box::new(move |result| {
            sink.borrow_mut().push(result.is_ok());
            if let Some(tx) = tx.take() {
                let _ = tx.send(());
            }
        });
        let hashes = ["held", "loose-1", "loose-2"]
            .iter()
            .map(|key| backend.hash_key(key))
            .collect();
        assert!(backend.doom_entries(hashes, cb).is_pending());
        rx.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*calls.borrow(), vec![false]);
        assert!(held.is_doomed());
        for key in ["loose-1", "loose-2"] {
            assert!(!dir.path().join("cache").join(backend.hash_key(key).file_name(0)).exists());
            assert!(matches!(backend.open(key).await, Err(CacheError::NotFound)));
        }
        assert_eq!(backend.pending_doom_count(), 0);
    });
}

/// Invariant: dooming through the entry handle removes the entry; a second
/// doom of the same handle succeeds at once.
#[test]
fn entry_doom_removes_the_entry() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        let entry = backend.create("gone").await.unwrap();
        entry.write(b"data".to_vec()).await.unwrap();

        entry.doom().await.unwrap();
        assert!(entry.is_doomed());
        assert!(!backend.has_active_entry("gone"));
        assert!(!backend.has_pending_doom("gone"));
        entry.doom().await.unwrap();
        assert!(matches!(backend.open("gone").await, Err(CacheError::NotFound)));
    });
}

#[test]
fn empty_mass_doom_succeeds() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        let (cb, rx) = channel();
        let mass = backend.doom_entries(Vec::new(), cb);
        settle(mass, rx).await.unwrap();
        assert_eq!(backend.pending_doom_count(), 0);
    });
}

#[test]
fn doom_of_unknown_key_succeeds() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        backend.doom("never-created").await.unwrap();
    });
}

#[test]
fn doom_all_empties_cache() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        for key in ["a", "b", "c"] {
            populated(&backend, key, b"payload").await;
        }
        assert_eq!(backend.entry_count(), 3);
        backend.doom_all().await.unwrap();
        assert_eq!(backend.entry_count(), 0);
        assert_eq!(backend.calculate_size().await.unwrap(), 0);
    });
}

#[test]
fn doom_since_only_touches_recent_entries() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        populated(&backend, "old", b"x").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let cutoff = SystemTime::now();
        populated(&backend, "new", b"y").await;

        let (cb, rx) = channel();
        let doom = backend.doom_entries_since(cutoff, cb);
        settle(doom, rx).await.unwrap();
        assert!(backend.open("old").await.is_ok());
        assert!(matches!(backend.open("new").await, Err(CacheError::NotFound)));
    });
}

#[test]
fn sizes_track_written_files() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        populated(&backend, "a", &[0u8; 10]).await;
        populated(&backend, "b", &[0u8; 20]).await;

        // Each file is a 16-byte header, the key, then the payload.
        let expected = (16 + 1 + 10) + (16 + 1 + 20);
        assert_eq!(backend.calculate_size().await.unwrap(), expected);

        let (cb, rx) = channel();
        let window = backend.calculate_size_of_entries_between(
            SystemTime::UNIX_EPOCH,
            SystemTime::now() + Duration::from_secs(3600),
            cb,
        );
        assert_eq!(settle(window, rx).await.unwrap(), expected);
        let (cb, rx) = channel();
        let empty = backend.calculate_size_of_entries_between(
            SystemTime::UNIX_EPOCH,
            SystemTime::UNIX_EPOCH + Duration::from_secs(1),
            cb,
        );
        assert_eq!(settle(empty, rx).await.unwrap(), 0);
    });
}

/// Invariant: negative sizes are rejected and leave the budget alone.
#[test]
fn set_max_size_rejects_negative() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        assert!(backend.set_max_size(4096));
        assert_eq!(backend.max_size(), 4096);
        assert!(!backend.set_max_size(-1));
        assert_eq!(backend.max_size(), 4096);
        assert_eq!(backend.max_file_size(), 512);
    });
}

/// Invariant: a max size set while init is in flight survives init.
#[test]
fn set_max_size_during_init_is_kept() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        let (cb, rx) = channel();
        let init = backend.init(cb);
        assert!(backend.set_max_size(4096));
        settle(init, rx).await.unwrap();
        assert_eq!(backend.max_size(), 4096);
        assert_eq!(backend.max_file_size(), 512);
        backend.calculate_size().await.unwrap();
        assert_eq!(backend.max_size(), 4096);
    });
}

#[test]
fn oversized_write_fails_and_dooms() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        assert!(backend.set_max_size(800));

        let entry = backend.create("big").await.unwrap();
        assert!(entry.write(vec![0u8; 100]).await.is_ok());
        assert!(matches!(entry.write(vec![0u8; 101]).await, Err(CacheError::Failed)));
        assert!(entry.is_doomed());
        assert!(!backend.has_active_entry("big"));
    });
}

#[test]
fn eviction_brings_cache_under_budget() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        backend.calculate_size().await.unwrap();
        assert!(backend.set_max_size(1000));

        for i in 0..10 {
            populated(&backend, &format!("key-{}", i), &[7u8; 100]).await;
        }
        let mut size = backend.calculate_size().await.unwrap();
        for _ in 0..100 {
            if size <= 1000 && backend.pending_doom_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            size = backend.calculate_size().await.unwrap();
        }
        assert!(size <= 1000, "cache still over budget: {}", size);
        assert!(backend.entry_count() < 10);
        assert!(backend.open("key-9").await.is_ok());
    });
}

#[test]
fn in_memory_data_round_trips_through_index() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        populated(&backend, "foo", b"x").await;
        backend.set_entry_in_memory_data("foo", 0x5a);
        assert_eq!(backend.get_entry_in_memory_data("foo"), 0x5a);
        assert_eq!(backend.get_entry_in_memory_data("bar"), 0);
        backend.on_external_cache_hit("foo");
        assert_eq!(backend.get_entry_in_memory_data("foo"), 0x5a);
    });
}

/// Invariant: an unusable cache directory fails init and every later
/// entry operation.
#[test]
fn init_failure_is_fatal() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join("index"), b"not a cache marker").unwrap();

        let backend = backend_in(&dir, CacheType::Disk);
        assert!(matches!(backend.initialize().await, Err(CacheError::InitFailed(_))));
        assert!(matches!(backend.create("foo").await, Err(CacheError::InitFailed(_))));
        assert!(matches!(backend.open("foo").await, Err(CacheError::InitFailed(_))));
        assert!(matches!(backend.calculate_size().await, Err(CacheError::InitFailed(_))));
    });
}

/// Invariant: after init fails, dooms are refused and leave the directory
/// untouched.
#[test]
fn doom_after_init_failure_is_refused() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join("index"), b"not a cache marker").unwrap();

        let backend = backend_in(&dir, CacheType::Disk);
        assert!(matches!(backend.initialize().await, Err(CacheError::InitFailed(_))));

        let stray = cache.join(backend.hash_key("foo").file_name(0));
        std::fs::write(&stray, b"someone else's file").unwrap();
        assert!(matches!(backend.doom("foo").await, Err(CacheError::InitFailed(_))));
        assert!(stray.exists());

        let (cb, rx) = channel();
        let mass = backend.doom_entries(vec![backend.hash_key("foo")], cb);
        assert!(matches!(mass, Completion::Ready(Err(CacheError::InitFailed(_)))));
        assert!(matches!(settle(mass, rx).await, Err(CacheError::InitFailed(_))));
        assert!(stray.exists());
        assert_eq!(backend.pending_doom_count(), 0);
    });
}

/// Invariant: dropping the backend turns pending completions into no-ops;
/// their callbacks never run.
#[test]
fn teardown_drops_pending_callbacks() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        let (cb, rx) = channel();
        let pending = backend.doom_all_entries(cb);
        assert!(pending.is_pending());
        drop(backend);
        assert!(rx.await.is_err());
    });
}

#[test]
fn entries_outlive_backend() {
    run_local(async {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend_in(&dir, CacheType::Disk);
        backend.initialize().await.unwrap();
        let entry = backend.create("foo").await.unwrap();
        entry.write(b"abc".to_vec()).await.unwrap();
        drop(backend);
        assert_eq!(entry.read().await.unwrap(), b"abc");
        entry.close();
    });
}
