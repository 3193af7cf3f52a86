//! Hashes whose files are being removed, each with the operations queued
//! behind that removal.

use crate::entry_hash::EntryHash;
use hashbrown::HashMap;
use std::collections::VecDeque;
use std::time::Instant;

/// An operation deferred until the doom of its hash completes.
pub(crate) struct PostDoomWaiter {
    pub(crate) time_queued: Instant,
    pub(crate) run_post_doom: Box<dyn FnOnce()>,
}

impl PostDoomWaiter {
    pub(crate) fn new<F>(run_post_doom: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            time_queued: Instant::now(),
            run_post_doom: Box::new(run_post_doom),
        }
    }
}

#[derive(Default)]
pub(crate) struct PendingDoom {
    table: HashMap<EntryHash, VecDeque<PostDoomWaiter>>,
}

impl PendingDoom {
    pub(crate) fn contains(&self, hash: EntryHash) -> bool {
        self.table.contains_key(&hash)
    }

    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }

    /// Number of operations queued behind the doom of `hash`, or `None`
    /// when no doom is in flight.
    pub(crate) fn waiter_count(&self, hash: EntryHash) -> Option<usize> {
        self.table.get(&hash).map(VecDeque::len)
    }

    pub(crate) fn on_doom_start(&mut self, hash: EntryHash) {
        debug_assert!(!self.contains(hash), "doom already pending for {}", hash);
        self.table.insert(hash, VecDeque::new());
    }

    /// Queue `waiter` behind the in-flight doom. Returns the waiter back if
    /// no doom is pending for `hash`.
    pub(crate) fn push_waiter(
        &mut self,
        hash: EntryHash,
        waiter: PostDoomWaiter,
    ) -> Result<(), PostDoomWaiter> {
        match self.table.get_mut(&hash) {
            Some(queue) => {
                queue.push_back(waiter);
                Ok(())
            }
            None => Err(waiter),
        }
    }

    /// Clear `hash` and hand back its waiters in arrival order.
    pub(crate) fn on_doom_complete(&mut self, hash: EntryHash) -> VecDeque<PostDoomWaiter> {
        debug_assert!(self.contains(hash), "no doom pending for {}", hash);
        self.table.remove(&hash).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn waiters_come_back_in_fifo_order() {
        let mut pending = PendingDoom::default();
        let order = Rc::new(RefCell::new(Vec::new()));
        pending.on_doom_start(EntryHash(1));
        for i in 0..3 {
            let order = order.clone();
            assert!(pending
                .push_waiter(EntryHash(1), PostDoomWaiter::new(move || order.borrow_mut().push(i)))
                .is_ok());
        }
        assert_eq!(pending.waiter_count(EntryHash(1)), Some(3));
        let waiters = pending.on_doom_complete(EntryHash(1));
        assert!(!pending.contains(EntryHash(1)));
        for w in waiters {
            (w.run_post_doom)();
        }
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn push_without_doom_is_refused() {
        let mut pending = PendingDoom::default();
        assert!(pending
            .push_waiter(EntryHash(5), PostDoomWaiter::new(|| {}))
            .is_err());
        assert_eq!(pending.waiter_count(EntryHash(5)), None);
        assert_eq!(pending.len(), 0);
    }
}
