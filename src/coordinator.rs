use std::{
    any::{type_name, Any},
    collections::hash_map::{Entry, HashMap},
    fmt::{self, Debug, Formatter},
    mem,
    ops::Deref,
    sync::{Arc, Mutex},
};

use tracing::debug;

use crate::{
    accumulator::BatchAccumulator,
    error::CoordinatorError,
    loader::Loader,
    path::{PathKey, PathSegment},
    record::Record,
};

type Instance = Arc<dyn Any + Send + Sync>;

/// The registry of batches for one logical request.
///
/// A `BatchCoordinator` maps each [`PathKey`] to exactly one batch instance
/// (usually a [`BatchAccumulator`]), constructed on first use. It's an
/// ordinary value: create one per request, pass it down to every field
/// resolver, and reset or drop it once the request is finished, so that no
/// batch outlives the request that created it. [`scope`][Self::scope] makes
/// the reset automatic.
///
/// All methods take `&self`; the coordinator can be shared by reference
/// between threads resolving sibling fields concurrently.
#[derive(Default)]
pub struct BatchCoordinator {
    instances: Mutex<HashMap<PathKey, Instance>>,
}

impl BatchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the instance for `key`, calling `factory` to create it if there
    /// isn't one yet. The lookup and insert are a single atomic step, so
    /// `factory` runs at most once per key until the next
    /// [`reset_all`][Self::reset_all], even when several threads ask for the
    /// same key at the same time. Every call for the same key gets the same
    /// instance.
    ///
    /// `factory` runs while the registry is locked; it must not call back
    /// into this coordinator.
    ///
    /// Returns an error if the instance stored under `key` isn't a `T`.
    pub fn instance_for<T, F>(&self, key: &PathKey, factory: F) -> Result<Arc<T>, CoordinatorError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut instances = self.instances.lock().unwrap();

        let instance = match instances.entry(key.clone()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                debug!(path = %key, instance = type_name::<T>(), "creating batch instance");
                let instance: Instance = Arc::new(factory());
                Arc::clone(entry.insert(instance))
            }
        };

        drop(instances);

        instance
            .downcast::<T>()
            .map_err(|_| CoordinatorError::TypeMismatch {
                path: key.clone(),
                expected: type_name::<T>(),
            })
    }

    /// Get the accumulator responsible for the relation at `path`. Paths that
    /// differ only by list indexes share an accumulator.
    pub fn accumulator_for<P, L, F>(
        &self,
        path: &[PathSegment],
        loader: F,
    ) -> Result<Arc<BatchAccumulator<P, L>>, CoordinatorError>
    where
        P: Record + Send + 'static,
        L: Loader<P> + Send + Sync + 'static,
        BatchAccumulator<P, L>: Send + Sync,
        F: FnOnce() -> L,
    {
        let key = PathKey::derive(path);
        self.instance_for(&key, move || BatchAccumulator::new(loader()))
    }

    /// Forget every instance. Must be called once the whole request,
    /// including any follow-up batched passes, is finished, whether or not
    /// it succeeded.
    pub fn reset_all(&self) {
        let instances = mem::take(&mut *self.instances.lock().unwrap());
        debug!(dropped = instances.len(), "reset batch coordinator");

        // Dropped here, outside the lock: instances may own arbitrary loaders.
        drop(instances);
    }

    /// Get a guard that calls [`reset_all`][Self::reset_all] when it goes out
    /// of scope, whichever way the request ends.
    pub fn scope(&self) -> RequestScope<'_> {
        RequestScope { coordinator: self }
    }

    pub fn contains(&self, key: &PathKey) -> bool {
        self.instances.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.instances.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for BatchCoordinator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("BatchCoordinator");

        match self.instances.try_lock() {
            Ok(instances) => {
                let mut keys: Vec<&PathKey> = instances.keys().collect();
                keys.sort();
                debug.field("keys", &keys)
            }
            Err(..) => debug.field("keys", &"<locked>"),
        };

        debug.finish()
    }
}

/// Resets its [`BatchCoordinator`] when dropped. Derefs to the coordinator.
#[derive(Debug)]
#[must_use = "the coordinator is reset as soon as the scope is dropped"]
pub struct RequestScope<'a> {
    coordinator: &'a BatchCoordinator,
}

impl Deref for RequestScope<'_> {
    type Target = BatchCoordinator;

    fn deref(&self) -> &BatchCoordinator {
        self.coordinator
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        self.coordinator.reset_all();
    }
}
