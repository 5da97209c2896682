//! Primary/replica routing for the relational backend.
//!
//! # Responsibility
//! - Carry the read target of one call chain as an explicit value.
//! - Scope route changes to the unit of work that declared them.
//! - Map the current route to an independent connection pool.
//!
//! # Invariants
//! - Route state is passed by `&mut RouteContext`; there is no ambient or
//!   thread-local route, so concurrent call chains cannot observe each other.
//! - A top-level call chain starts and ends on `Route::Primary`.

pub mod context;
pub mod health;
pub mod interceptor;
pub mod router;

pub use context::{Route, RouteContext, RouteState};
pub use interceptor::{intercept, RouteScope, TransactionDescriptor};
pub use router::{ConnectionRouter, ReplicaPolicy, RoutedConnection};
