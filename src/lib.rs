//! Relbatch collapses the many independent "load relation R for parent P"
//! requests made while resolving a tree-shaped response (such as a GraphQL
//! query) into one grouped fetch per relation, per position in the tree, per
//! concrete parent type. It's the [dataloader pattern], adapted to field
//! resolvers that can't see their siblings: each resolver registers its
//! parent and gets back a [`DeferredValue`], and the first of those values to
//! be awaited loads the relation for every parent registered so far.
//!
//! Relbatch knows nothing about SQL, HTTP, or schemas. It only knows about
//! parent [`Record`]s, [`PathKey`]s, and a [`Loader`] that can enrich a group
//! of records of one concrete type.
//!
//! ## Overview
//!
//! Suppose each `User` in a response wants its post count, and your storage
//! layer can count posts for many users in a single query. First, describe
//! your parent records, and adapt that query to the [`Loader`] trait:
//!
//! ```
//! use std::convert::Infallible;
//! use futures::future::{ready, Ready};
//! use relbatch::{Loader, PrimaryKey, Record};
//!
//! #[derive(Debug, Clone)]
//! struct User {
//!     id: u64,
//!     post_count: Option<usize>,
//! }
//!
//! impl Record for User {
//!     fn concrete_type(&self) -> &str {
//!         "User"
//!     }
//!
//!     fn primary_key(&self) -> Option<PrimaryKey> {
//!         Some(self.id.into())
//!     }
//! }
//!
//! struct PostCounts;
//!
//! impl Loader<User> for PostCounts {
//!     type Value = usize;
//!     type Error = Infallible;
//!     type Future = Ready<Result<Vec<User>, Infallible>>;
//!
//!     fn load(&self, _concrete_type: &str, mut users: Vec<User>) -> Self::Future {
//!         // One query for the whole group goes here
//!         for user in &mut users {
//!             user.post_count = Some(user.id as usize * 2);
//!         }
//!         ready(Ok(users))
//!     }
//!
//!     fn extract(&self, user: &User) -> usize {
//!         user.post_count.unwrap_or(0)
//!     }
//! }
//! ```
//!
//! `load` is handed a whole group of records of one concrete type, and hands
//! them back enriched; `extract` then reads each parent's value back out.
//!
//! Next, create a [`BatchCoordinator`] for the request. It owns one
//! [`BatchAccumulator`] per [`PathKey`]. A path key is the response path with
//! its list indexes removed, so `users.0.postCount` and `users.1.postCount`
//! share an accumulator, while `users.0.comments` gets its own. Each resolver
//! registers its parent with the accumulator for its path:
//!
//! ```
//! # use std::convert::Infallible;
//! # use futures::future::{ready, Ready};
//! # use relbatch::{Loader, PrimaryKey, Record};
//! # #[derive(Debug, Clone)] struct User { id: u64, post_count: Option<usize> }
//! # impl Record for User {
//! #     fn concrete_type(&self) -> &str { "User" }
//! #     fn primary_key(&self) -> Option<PrimaryKey> { Some(self.id.into()) }
//! # }
//! # struct PostCounts;
//! # impl Loader<User> for PostCounts {
//! #     type Value = usize;
//! #     type Error = Infallible;
//! #     type Future = Ready<Result<Vec<User>, Infallible>>;
//! #     fn load(&self, _: &str, mut users: Vec<User>) -> Self::Future {
//! #         for user in &mut users { user.post_count = Some(user.id as usize * 2); }
//! #         ready(Ok(users))
//! #     }
//! #     fn extract(&self, user: &User) -> usize { user.post_count.unwrap_or(0) }
//! # }
//! use std::sync::Arc;
//! use futures::{executor, future};
//! use relbatch::{BatchAccumulator, BatchCoordinator, PathSegment};
//!
//! let coordinator = BatchCoordinator::new();
//!
//! // The coordinator is reset when the scope is dropped
//! let request = coordinator.scope();
//!
//! let values: Vec<_> = (0..3usize)
//!     .map(|index| {
//!         let path: Vec<PathSegment> = vec!["users".into(), index.into(), "postCount".into()];
//!         let batch: Arc<BatchAccumulator<User, PostCounts>> =
//!             request.accumulator_for(&path, || PostCounts).unwrap();
//!
//!         let user = User { id: index as u64 + 1, post_count: None };
//!         batch.register(user).unwrap()
//!     })
//!     .collect();
//!
//! // Awaiting any of these values loads all three users at once.
//! let counts = executor::block_on(future::try_join_all(values)).unwrap();
//! assert_eq!(counts, [2, 4, 6]);
//! ```
//!
//! ## Design notes
//!
//! ### Request scope
//!
//! A [`BatchCoordinator`] is a plain value, owned by whoever handles the
//! request and passed down explicitly. Nothing is global, and nothing is
//! cached across requests: once [`BatchCoordinator::reset_all`] runs (or the
//! coordinator is dropped), every accumulator it handed out is forgotten.
//!
//! ### Concrete type groups
//!
//! Parents of a polymorphic relation may have different concrete types, and
//! a storage layer typically needs one query per concrete type. When an
//! accumulator resolves, it splits its parents by [`Record::concrete_type`]
//! and calls [`Loader::load`] once per group. The groups load concurrently;
//! if any of them fails, the whole batch fails.
//!
//! ### Poll-driven design
//!
//! As with any Rust future, nothing happens in the background. The loads are
//! driven by polling the [`DeferredValue`]s, and only a single waiting task
//! drives them at a time; the others are woken once the batch completes (or
//! when the driving value is dropped, so that another can take over). Values
//! that are never polled never cause a load.
//!
//! [dataloader pattern]: https://github.com/graphql/dataloader

mod accumulator;
mod coordinator;
mod deferred;
mod error;
mod loader;
mod path;
mod record;
mod waiters;

pub use accumulator::BatchAccumulator;
pub use coordinator::{BatchCoordinator, RequestScope};
pub use deferred::DeferredValue;
pub use error::{CoordinatorError, RegisterError, ResolveError};
pub use loader::Loader;
pub use path::{PathKey, PathSegment};
pub use record::{PrimaryKey, Record, RecordKey};
