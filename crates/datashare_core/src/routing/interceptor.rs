//! Explicit transaction scopes over a `RouteContext`.
//!
//! # Responsibility
//! - Translate a `TransactionDescriptor` into a route for the wrapped work.
//! - Restore the previous route state when the scope exits.
//!
//! # Invariants
//! - Read-write scopes always route to the primary, even when nested inside a
//!   read-only scope.
//! - Read-only scopes route to the replica unless an enclosing consistent
//!   read pinned the primary.
//! - Restoration happens in `Drop`, so it also runs on early return and
//!   panic unwinding, and it restores the exact prior state rather than a
//!   default one.

use super::context::{RouteContext, RouteState};
use log::{debug, warn};
use std::ops::{Deref, DerefMut};

/// Declared intent of one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionDescriptor {
    pub read_only: bool,
    /// Read-only work that must observe the latest primary writes.
    pub consistent: bool,
    /// Operation name used in log events.
    pub label: &'static str,
}

impl TransactionDescriptor {
    pub const fn read_write(label: &'static str) -> Self {
        Self {
            read_only: false,
            consistent: false,
            label,
        }
    }

    pub const fn read_only(label: &'static str) -> Self {
        Self {
            read_only: true,
            consistent: false,
            label,
        }
    }

    pub const fn consistent_read(label: &'static str) -> Self {
        Self {
            read_only: true,
            consistent: true,
            label,
        }
    }
}

/// Guard that owns the route for the duration of one scope.
///
/// Dereferences to the context so nested calls keep passing it down.
pub struct RouteScope<'a> {
    ctx: &'a mut RouteContext,
    previous: RouteState,
    label: &'static str,
}

impl<'a> RouteScope<'a> {
    pub fn enter(ctx: &'a mut RouteContext, descriptor: TransactionDescriptor) -> Self {
        let previous = ctx.snapshot();
        ctx.enter_scope();
        match (descriptor.read_only, descriptor.consistent) {
            (false, _) => ctx.set_primary(),
            (true, true) => ctx.pin_primary(),
            (true, false) => ctx.set_replica(),
        }

        debug!(
            "event=route_scope module=routing status=enter op={} route={} previous={} depth={}",
            descriptor.label,
            ctx.current(),
            previous.route,
            ctx.depth()
        );

        Self {
            ctx,
            previous,
            label: descriptor.label,
        }
    }
}

impl Deref for RouteScope<'_> {
    type Target = RouteContext;

    fn deref(&self) -> &RouteContext {
        self.ctx
    }
}

impl DerefMut for RouteScope<'_> {
    fn deref_mut(&mut self) -> &mut RouteContext {
        self.ctx
    }
}

impl Drop for RouteScope<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!(
                "event=route_scope module=routing status=unwound op={} restored={}",
                self.label, self.previous.route
            );
        }
        self.ctx.restore(self.previous);
        debug!(
            "event=route_scope module=routing status=exit op={} route={} depth={}",
            self.label,
            self.ctx.current(),
            self.ctx.depth()
        );
    }
}

/// Runs `work` inside a scope described by `descriptor`.
///
/// The outcome of `work` is returned unchanged; the route state in `ctx` is
/// the same after the call as before it, whatever way `work` exits.
pub fn intercept<R, F>(ctx: &mut RouteContext, descriptor: TransactionDescriptor, work: F) -> R
where
    F: FnOnce(&mut RouteContext) -> R,
{
    let mut scope = RouteScope::enter(ctx, descriptor);
    work(&mut scope)
}

#[cfg(test)]
mod tests {
    use super::{intercept, TransactionDescriptor};
    use crate::routing::context::{Route, RouteContext};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn read_only_scope_uses_replica_and_restores_primary() {
        let mut ctx = RouteContext::new();
        let observed = intercept(&mut ctx, TransactionDescriptor::read_only("find"), |ctx| {
            (ctx.current(), ctx.depth())
        });
        assert_eq!(observed, (Route::Replica, 1));
        assert_eq!(ctx.current(), Route::Primary);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn nested_read_inside_write_restores_primary() {
        let mut ctx = RouteContext::new();
        let trace = intercept(&mut ctx, TransactionDescriptor::read_write("save"), |ctx| {
            let before = ctx.current();
            let inner = intercept(ctx, TransactionDescriptor::read_only("lookup"), |ctx| {
                ctx.current()
            });
            let after = ctx.current();
            vec![before, inner, after]
        });
        assert_eq!(trace, vec![Route::Primary, Route::Replica, Route::Primary]);
        assert_eq!(ctx.current(), Route::Primary);
    }

    #[test]
    fn write_nested_in_read_scope_routes_to_primary() {
        let mut ctx = RouteContext::new();
        let trace = intercept(&mut ctx, TransactionDescriptor::read_only("report"), |ctx| {
            let inner = intercept(ctx, TransactionDescriptor::read_write("audit"), |ctx| {
                ctx.current()
            });
            (inner, ctx.current())
        });
        assert_eq!(trace, (Route::Primary, Route::Replica));
    }

    #[test]
    fn consistent_read_pins_primary_for_nested_reads() {
        let mut ctx = RouteContext::new();
        let inner = intercept(
            &mut ctx,
            TransactionDescriptor::consistent_read("checkout"),
            |ctx| intercept(ctx, TransactionDescriptor::read_only("find"), |ctx| ctx.current()),
        );
        assert_eq!(inner, Route::Primary);
        assert!(!ctx.is_primary_pinned());
    }

    #[test]
    fn error_outcome_is_propagated_and_route_restored() {
        let mut ctx = RouteContext::new();
        ctx.set_replica();
        let result: Result<(), &str> =
            intercept(&mut ctx, TransactionDescriptor::read_write("save"), |_| {
                Err("constraint violated")
            });
        assert_eq!(result, Err("constraint violated"));
        assert_eq!(ctx.current(), Route::Replica);
    }

    #[test]
    fn panic_inside_scope_still_restores_route() {
        let mut ctx = RouteContext::new();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            intercept(&mut ctx, TransactionDescriptor::read_only("find"), |_| {
                panic!("worker cancelled");
            })
        }));
        assert!(outcome.is_err());
        assert_eq!(ctx.current(), Route::Primary);
        assert_eq!(ctx.depth(), 0);
    }
}
