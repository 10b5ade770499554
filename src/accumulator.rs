use std::{
    collections::{
        hash_map::{Entry, HashMap},
        BTreeMap, HashSet,
    },
    fmt::{self, Debug, Formatter},
    mem,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    thread::ThreadId,
};

use arc_swap::ArcSwapOption;
use futures::future::{try_join_all, TryFuture, TryJoinAll};
use tracing::{debug, trace, warn};

use crate::{
    deferred::DeferredValue,
    error::{RegisterError, ResolveError},
    loader::Loader,
    record::{Record, RecordKey},
    waiters::{Token, Waiters},
};

pub(crate) type Outcome<V, E> = Result<HashMap<RecordKey, V>, ResolveError<E>>;

pub(crate) type Resolution<F> = Pin<Box<TryJoinAll<F>>>;

// Design notes:
//
// A batch moves through three states: Collecting -> Resolving -> Resolved.
// The first DeferredValue to be polled moves it out of Collecting and becomes
// the driver. Loader code (load, the loader futures, extract) is never run
// with the state mutex held: the driver takes the joined future out of the
// state, polls it unlocked, and puts it back if it's still pending. While
// the future is out, `polling` records which thread has it, so that a
// DeferredValue polled from inside the loader on that same thread can be
// told apart from an ordinary concurrent waiter. If loader code panics while
// a value is driving, the batch moves to Panicked, which is terminal.
pub(crate) enum State<P, F: TryFuture> {
    Collecting {
        parents: HashMap<RecordKey, P>,
    },
    Resolving {
        registered: HashSet<RecordKey>,
        resolution: Option<Resolution<F>>,
        polling: Option<ThreadId>,
        waiters: Waiters,
    },
    Resolved {
        registered: HashSet<RecordKey>,
    },
    Panicked {
        registered: HashSet<RecordKey>,
    },
}

impl<P, F: TryFuture> Debug for State<P, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            State::Collecting { parents } => f
                .debug_struct("Collecting")
                .field("parents", &parents.len())
                .finish(),
            State::Resolving {
                registered,
                resolution,
                polling,
                waiters,
            } => f
                .debug_struct("Resolving")
                .field("registered", &registered.len())
                .field("in_flight", &resolution.is_none())
                .field("polling", polling)
                .field("waiters", &waiters.len())
                .finish(),
            State::Resolved { registered } => f
                .debug_struct("Resolved")
                .field("registered", &registered.len())
                .finish(),
            State::Panicked { registered } => f
                .debug_struct("Panicked")
                .field("registered", &registered.len())
                .finish(),
        }
    }
}

/// Collects the parent records that want the same relation at the same
/// position in the response tree, and loads that relation for all of them at
/// once.
///
/// Parents are added with [`register`][BatchAccumulator::register], which
/// returns a [`DeferredValue`] for that parent's relation. Nothing is loaded
/// until one of those values is first polled. At that point the accumulator
/// freezes, splits its parents into groups by [`Record::concrete_type`],
/// calls [`Loader::load`] once per group, and publishes every parent's
/// relation, extracted with [`Loader::extract`]. Every `DeferredValue`, no
/// matter when or in which order it's polled, observes that single
/// resolution.
///
/// If any group fails to load, the whole batch fails, and every
/// `DeferredValue` for it yields the same [`ResolveError`].
pub struct BatchAccumulator<P, L: Loader<P>> {
    loader: L,
    pub(crate) state: Mutex<State<P, L::Future>>,

    // Written exactly once, on completion, so resolved reads don't need the
    // state mutex.
    outcome: ArcSwapOption<Outcome<L::Value, L::Error>>,
}

impl<P, L> BatchAccumulator<P, L>
where
    P: Record,
    L: Loader<P>,
{
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            state: Mutex::new(State::Collecting {
                parents: HashMap::new(),
            }),
            outcome: ArcSwapOption::empty(),
        }
    }

    /// Add a parent to this batch and get a handle to its eventual relation
    /// value. Registering the same logical record more than once is fine;
    /// the first instance is the one that gets loaded, and every handle
    /// yields the same value.
    ///
    /// Once the batch has started resolving it's frozen: records that were
    /// already registered still get a working handle, but new records are
    /// rejected with [`RegisterError::Frozen`].
    pub fn register(self: &Arc<Self>, parent: P) -> Result<DeferredValue<P, L>, RegisterError> {
        let key = RecordKey::build(&parent)?;
        let mut state = self.state.lock().unwrap();

        match *state {
            State::Collecting { ref mut parents } => match parents.entry(key.clone()) {
                Entry::Vacant(entry) => {
                    trace!(record = %key, "registered parent");
                    entry.insert(parent);
                }
                Entry::Occupied(..) => trace!(record = %key, "parent already registered"),
            },
            State::Resolving {
                ref registered, ..
            }
            | State::Resolved { ref registered }
            | State::Panicked { ref registered } => {
                if !registered.contains(&key) {
                    return Err(RegisterError::Frozen { record: key });
                }
            }
        }

        drop(state);
        Ok(DeferredValue::new(Arc::clone(self), key))
    }

    /// True once the batch has completed, successfully or not.
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.outcome.load().is_some()
    }

    /// The number of distinct parents registered with this batch.
    pub fn len(&self) -> usize {
        match *self.state.lock().unwrap() {
            State::Collecting { ref parents } => parents.len(),
            State::Resolving { ref registered, .. }
            | State::Resolved { ref registered }
            | State::Panicked { ref registered } => registered.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub(crate) fn outcome(&self) -> Option<Arc<Outcome<L::Value, L::Error>>> {
        self.outcome.load_full()
    }

    /// Split the frozen parents into concrete type groups and start one load
    /// per group. Groups are loaded in ascending concrete type order.
    pub(crate) fn dispatch(&self, parents: HashMap<RecordKey, P>) -> Resolution<L::Future> {
        let count = parents.len();
        let mut groups: BTreeMap<String, Vec<P>> = BTreeMap::new();

        for parent in parents.into_values() {
            groups
                .entry(parent.concrete_type().to_owned())
                .or_default()
                .push(parent);
        }

        debug!(parents = count, groups = groups.len(), "resolving batch");

        Box::pin(try_join_all(
            groups
                .into_iter()
                .map(|(concrete_type, group)| self.loader.load(&concrete_type, group)),
        ))
    }

    /// Publish the result of the joined loader future and wake every waiter
    /// except `finisher`.
    pub(crate) fn complete(
        &self,
        result: Result<Vec<Vec<P>>, L::Error>,
        finisher: &mut Option<Token>,
    ) -> Arc<Outcome<L::Value, L::Error>> {
        let extracted = result
            .map(|groups| {
                groups
                    .into_iter()
                    .flatten()
                    .filter_map(|parent| {
                        // A record without a key can't be matched to anyone;
                        // it surfaces below as a missing result.
                        let key = RecordKey::build(&parent).ok()?;
                        let value = self.loader.extract(&parent);
                        Some((key, value))
                    })
                    .collect::<HashMap<_, _>>()
            })
            .map_err(ResolveError::Load);

        let mut state = self.state.lock().unwrap();
        let previous = mem::replace(
            &mut *state,
            State::Resolved {
                registered: HashSet::new(),
            },
        );

        let (registered, waiters) = match previous {
            State::Resolving {
                registered,
                waiters,
                ..
            } => (registered, waiters),
            other => {
                drop(state);
                panic!("batch completed from invalid state {:?}", other);
            }
        };

        let outcome = extracted.and_then(|values| {
            match registered.iter().find(|key| !values.contains_key(*key)) {
                Some(missing) => Err(ResolveError::Missing(missing.clone())),
                None => Ok(values),
            }
        });

        debug!(
            parents = registered.len(),
            ok = outcome.is_ok(),
            "batch resolved"
        );

        let outcome = Arc::new(outcome);
        self.outcome.store(Some(Arc::clone(&outcome)));
        *state = State::Resolved { registered };
        drop(state);

        waiters.finish(finisher.take());
        outcome
    }

    /// Loader code panicked while a value was driving this batch. The batch
    /// can never complete, so wake every waiter to find that out.
    pub(crate) fn abandon(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = mem::replace(
            &mut *state,
            State::Panicked {
                registered: HashSet::new(),
            },
        );

        match previous {
            State::Resolving {
                registered,
                waiters,
                ..
            } => {
                warn!(parents = registered.len(), "batch loader panicked");
                *state = State::Panicked { registered };
                drop(state);
                waiters.finish(None);
            }
            other => *state = other,
        }
    }
}

impl<P, L: Loader<P>> Debug for BatchAccumulator<P, L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("BatchAccumulator");
        debug.field("loader", &"<loader>");

        match self.state.try_lock() {
            Ok(state) => debug.field("state", &*state),
            Err(..) => debug.field("state", &"<locked>"),
        };

        debug.finish()
    }
}
