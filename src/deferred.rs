use std::{
    collections::{HashMap, HashSet},
    fmt::{self, Debug, Formatter},
    future::Future,
    mem,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    thread,
};

use futures::future::TryFuture;

use crate::{
    accumulator::{BatchAccumulator, Outcome, Resolution, State},
    error::ResolveError,
    loader::Loader,
    record::{Record, RecordKey},
    waiters::Token,
};

/// The relation value for one parent registered with a
/// [`BatchAccumulator`], available once the batch resolves.
///
/// Awaiting (forcing) a `DeferredValue` is what triggers the batch: the first
/// one polled freezes its accumulator and drives the loads for every parent
/// registered so far. A `DeferredValue` that is never polled never causes a
/// load.
///
/// Forcing is idempotent. Clones share the same record and observe the same
/// resolution, and polling a `DeferredValue` again after it completed returns
/// the same result again rather than loading anything.
pub struct DeferredValue<P, L: Loader<P>> {
    batch: Arc<BatchAccumulator<P, L>>,
    key: RecordKey,
    waiter: Option<Token>,
}

impl<P, L: Loader<P>> DeferredValue<P, L> {
    pub(crate) fn new(batch: Arc<BatchAccumulator<P, L>>, key: RecordKey) -> Self {
        Self {
            batch,
            key,
            waiter: None,
        }
    }

    /// The identity of the parent this value belongs to.
    #[inline]
    pub fn record_key(&self) -> &RecordKey {
        &self.key
    }
}

impl<P: Record, L: Loader<P>> DeferredValue<P, L> {
    /// True if polling this value would complete immediately.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.batch.is_resolved()
    }
}

fn lookup<V: Clone, E: Clone>(
    outcome: &Outcome<V, E>,
    key: &RecordKey,
) -> Result<V, ResolveError<E>> {
    match outcome {
        Ok(values) => values
            .get(key)
            .cloned()
            .ok_or_else(|| ResolveError::Missing(key.clone())),
        Err(err) => Err(err.clone()),
    }
}

// How the polling value gets hold of the joined loader future.
enum Drive<P, F: TryFuture> {
    Dispatch(HashMap<RecordKey, P>),
    Resume(Resolution<F>),
}

/// Armed while a value runs loader code. If that code panics, the batch is
/// abandoned instead of being left in flight with nobody to drive it.
struct DriveGuard<'a, P: Record, L: Loader<P>> {
    batch: &'a BatchAccumulator<P, L>,
}

impl<P: Record, L: Loader<P>> Drop for DriveGuard<'_, P, L> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.batch.abandon();
        }
    }
}

impl<P: Record, L: Loader<P>> Future for DeferredValue<P, L> {
    type Output = Result<L::Value, ResolveError<L::Error>>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let unpinned = Pin::into_inner(self);

        // Fast path: the batch already completed, possibly driven by some
        // other value.
        if let Some(outcome) = unpinned.batch.outcome() {
            return Poll::Ready(lookup(&outcome, &unpinned.key));
        }

        let current = thread::current().id();
        let mut guard = unpinned.batch.state.lock().unwrap();

        // Figure out whether we get to drive the batch. If we do, we leave the
        // lock holding the joined loader future (or the parents to start it).
        let drive = match *guard {
            State::Collecting { ref mut parents } => {
                let parents = mem::take(parents);
                let registered: HashSet<RecordKey> = parents.keys().cloned().collect();

                *guard = State::Resolving {
                    registered,
                    resolution: None,
                    polling: Some(current),
                    waiters: Default::default(),
                };
                drop(guard);
                Drive::Dispatch(parents)
            }
            State::Resolving {
                ref mut resolution,
                ref mut polling,
                ref mut waiters,
                ..
            } => match resolution.take() {
                Some(resolution) => {
                    *polling = Some(current);
                    drop(guard);
                    Drive::Resume(resolution)
                }
                None if *polling == Some(current) => {
                    drop(guard);
                    panic!("re-entrant batch resolution: a loader forced a value from its own batch");
                }
                None => {
                    // Another thread is polling the loaders right now. It
                    // will wake us when the batch completes.
                    waiters.wait(&mut unpinned.waiter, ctx.waker());
                    return Poll::Pending;
                }
            },
            State::Resolved { .. } => {
                drop(guard);
                return match unpinned.batch.outcome() {
                    Some(outcome) => Poll::Ready(lookup(&outcome, &unpinned.key)),
                    None => unreachable!("resolved batch has no outcome"),
                };
            }
            State::Panicked { .. } => {
                drop(guard);
                panic!("batch loader panicked; this batch can never resolve");
            }
        };

        let _unwinding = DriveGuard {
            batch: &*unpinned.batch,
        };

        let mut resolution = match drive {
            Drive::Dispatch(parents) => unpinned.batch.dispatch(parents),
            Drive::Resume(resolution) => resolution,
        };

        let polled = resolution.as_mut().poll(ctx);

        match polled {
            Poll::Pending => {
                // Put the loader future back, and make ourselves the driver:
                // our waker is the one the loader futures are holding.
                let mut guard = unpinned.batch.state.lock().unwrap();
                match *guard {
                    State::Resolving {
                        resolution: ref mut slot,
                        ref mut polling,
                        ref mut waiters,
                        ..
                    } => {
                        *slot = Some(resolution);
                        *polling = None;
                        waiters.drive(&mut unpinned.waiter, ctx.waker());
                    }
                    _ => {
                        drop(guard);
                        unreachable!("batch left the Resolving state while it was being polled");
                    }
                }
                Poll::Pending
            }
            Poll::Ready(result) => {
                drop(resolution);
                let outcome = unpinned.batch.complete(result, &mut unpinned.waiter);
                Poll::Ready(lookup(&outcome, &unpinned.key))
            }
        }
    }
}

impl<P, L: Loader<P>> Clone for DeferredValue<P, L> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.batch), self.key.clone())
    }
}

impl<P, L: Loader<P>> Debug for DeferredValue<P, L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredValue")
            .field("key", &self.key)
            .field("waiting", &self.waiter.is_some())
            .finish()
    }
}

impl<P, L: Loader<P>> Drop for DeferredValue<P, L> {
    fn drop(&mut self) {
        // Only a value that's waiting on an in-flight batch has anything to
        // clean up. If it was the driver, leave() hands the job to another
        // waiter. We skip cleanup entirely if the mutex is poisoned.
        if let Some(token) = self.waiter.take() {
            if let Ok(mut guard) = self.batch.state.lock() {
                if let State::Resolving {
                    ref mut waiters, ..
                } = *guard
                {
                    waiters.leave(token);
                }
            }
        }
    }
}
