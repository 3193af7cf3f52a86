//! Completion plumbing: synchronous-or-pending results, shared one-shot
//! callbacks, and the barrier used by mass dooms.
//!
//! Every public operation takes a `CompletionCallback<T>` and returns a
//! `Completion<T>`. `Ready` means the operation finished synchronously and
//! the callback will never run; `Pending` means the callback runs later on
//! the backend's sequence (or never, if the backend is torn down first).

use crate::error::{CacheError, Result};
use core::cell::{Cell, RefCell};
use std::rc::Rc;
use tokio::sync::oneshot;

pub type CompletionCallback<T> = Box<dyn FnOnce(Result<T>)>;

#[must_use]
#[derive(Debug)]
pub enum Completion<T> {
    Ready(Result<T>),
    Pending,
}

impl<T> Completion<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Completion::Pending)
    }

    /// Unwrap a synchronous result; `None` when still pending.
    pub fn ready(self) -> Option<Result<T>> {
        match self {
            Completion::Ready(r) => Some(r),
            Completion::Pending => None,
        }
    }
}

/// A callback that may be handed to an operation and, if the operation
/// completes synchronously, still be run by the caller. Whoever takes it
/// first runs it; the other side sees an empty slot.
pub(crate) struct SharedCallback<T> {
    slot: Rc<Cell<Option<CompletionCallback<T>>>>,
}

impl<T: 'static> SharedCallback<T> {
    pub(crate) fn new(callback: CompletionCallback<T>) -> Self {
        Self {
            slot: Rc::new(Cell::new(Some(callback))),
        }
    }

    pub(crate) fn run(&self, result: Result<T>) {
        if let Some(cb) = self.slot.take() {
            cb(result);
        }
    }

    /// A boxed forwarder into this slot.
    pub(crate) fn forwarder(&self) -> CompletionCallback<T> {
        let slot = self.slot.clone();
        Box::new(move |result| {
            if let Some(cb) = slot.take() {
                cb(result);
            }
        })
    }
}

impl<T> Clone for SharedCallback<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

/// Run `operation` and make sure `callback` fires exactly once, whether the
/// operation completes synchronously or later.
pub(crate) fn run_operation_and_callback<T, F>(operation: F, callback: CompletionCallback<T>)
where
    T: 'static,
    F: FnOnce(CompletionCallback<T>) -> Completion<T>,
{
    let shared = SharedCallback::new(callback);
    if let Completion::Ready(result) = operation(shared.forwarder()) {
        shared.run(result);
    }
}

struct BarrierContext {
    expected: usize,
    count: usize,
    had_error: bool,
    final_callback: Option<CompletionCallback<()>>,
}

/// Waits for `expected` successful results before running the final
/// callback. The first error is forwarded immediately and every later
/// result is ignored.
pub(crate) struct Barrier {
    context: Rc<RefCell<BarrierContext>>,
}

impl Barrier {
    pub(crate) fn new(expected: usize, final_callback: CompletionCallback<()>) -> Self {
        debug_assert!(expected > 0);
        Self {
            context: Rc::new(RefCell::new(BarrierContext {
                expected,
                count: 0,
                had_error: false,
                final_callback: Some(final_callback),
            })),
        }
    }

    /// Mint one sub-operation callback.
    pub(crate) fn callback(&self) -> CompletionCallback<()> {
        let context = self.context.clone();
        Box::new(move |result| Self::complete(&context, result))
    }

    fn complete(context: &Rc<RefCell<BarrierContext>>, result: Result<()>) {
        let fire = {
            let mut ctx = context.borrow_mut();
            debug_assert!(ctx.expected > ctx.count);
            if ctx.had_error {
                return;
            }
            match result {
                Err(err) => {
                    ctx.had_error = true;
                    ctx.final_callback.take().map(|cb| (cb, Err(err)))
                }
                Ok(()) => {
                    ctx.count += 1;
                    if ctx.count == ctx.expected {
                        ctx.final_callback.take().map(|cb| (cb, Ok(())))
                    } else {
                        None
                    }
                }
            }
        };
        if let Some((cb, result)) = fire {
            cb(result);
        }
    }
}

/// Bridge a callback-style operation into a future. If the operation's
/// callback is dropped without running (backend teardown) the future
/// resolves to `Aborted`.
pub(crate) async fn resolve<T, F>(operation: F) -> Result<T>
where
    T: 'static,
    F: FnOnce(CompletionCallback<T>) -> Completion<T>,
{
    let (tx, rx) = oneshot::channel();
    let callback: CompletionCallback<T> = Box::new(move |result| {
        let _ = tx.send(result);
    });
    match operation(callback) {
        Completion::Ready(result) => result,
        Completion::Pending => rx.await.unwrap_or(Err(CacheError::Aborted)),
    }
}
