use thiserror::Error;

use crate::{path::PathKey, record::RecordKey};

/// Errors raised while registering a parent record with a
/// [`BatchAccumulator`][crate::BatchAccumulator]. These are caller errors,
/// reported immediately rather than at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// The record has no primary key yet (for instance, it hasn't been
    /// persisted). Unidentified records can't be matched to their results.
    #[error("cannot batch an unidentified `{concrete_type}` record")]
    Unidentified { concrete_type: String },

    /// The accumulator has already started resolving, and this record wasn't
    /// part of the batch.
    #[error("batch already dispatched; record `{record}` was never registered")]
    Frozen { record: RecordKey },
}

/// The outcome of a failed batch, delivered to every [`DeferredValue`]
/// waiting on it. There's no partial success: if any concrete type group
/// fails, the whole batch fails.
///
/// [`DeferredValue`]: crate::DeferredValue
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError<E> {
    #[error("batch enrichment failed")]
    Load(#[source] E),

    /// The loader didn't hand back one of the records it was given.
    #[error("loader did not return record `{0}`")]
    Missing(RecordKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("batch instance for path `{path}` is not a `{expected}`")]
    TypeMismatch {
        path: PathKey,
        expected: &'static str,
    },
}
