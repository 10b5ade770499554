use std::error::Error;
use std::future::Future;

/// The enrichment collaborator: the seam to whatever storage layer actually
/// knows how to fetch a relation.
///
/// A [`BatchAccumulator`][crate::BatchAccumulator] never fetches anything
/// itself. When it resolves, it splits its parents into concrete type groups
/// and hands each group to [`load`][Loader::load], then reads each parent's
/// relation back out with [`extract`][Loader::extract].
pub trait Loader<P> {
    /// The relation value produced for a single parent.
    type Value: Clone;

    /// Cloned into every waiting [`DeferredValue`][crate::DeferredValue] if
    /// the batch fails.
    type Error: Error + Clone + 'static;

    type Future: Future<Output = Result<Vec<P>, Self::Error>>;

    /// Load the relation for every record in `group`, all of which have the
    /// concrete type `concrete_type`. The group is handed over by value; the
    /// returned future must hand back every one of those records, enriched
    /// with the loaded relation. Order doesn't matter.
    fn load(&self, concrete_type: &str, group: Vec<P>) -> Self::Future;

    /// Read the loaded relation off of one enriched record.
    fn extract(&self, parent: &P) -> Self::Value;
}
