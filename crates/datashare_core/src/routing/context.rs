//! Per-call-chain route state.
//!
//! # Responsibility
//! - Hold the connection target (primary or replica) for one call chain.
//! - Expose snapshots so scopes can restore exactly what they replaced.
//!
//! # Invariants
//! - A `RouteContext` is owned by one call chain and passed down by `&mut`;
//!   it is never shared, cached or pooled.
//! - A fresh or cleared context routes to `Route::Primary`.
//! - While pinned to primary, replica requests are ignored.

use std::fmt::{Display, Formatter};

/// Physical pool within the relational backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Route {
    #[default]
    Primary,
    Replica,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Replica => "replica",
        }
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete restorable state of a `RouteContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteState {
    pub route: Route,
    pub primary_pinned: bool,
    pub depth: u32,
}

/// Route holder for one logical call chain.
#[derive(Debug, Default)]
pub struct RouteContext {
    state: RouteState,
}

impl RouteContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Route {
        self.state.route
    }

    pub fn is_primary_pinned(&self) -> bool {
        self.state.primary_pinned
    }

    /// Number of interceptor scopes currently open on this chain.
    pub fn depth(&self) -> u32 {
        self.state.depth
    }

    /// Routes to the replica unless an enclosing scope pinned the primary.
    pub fn set_replica(&mut self) {
        if !self.state.primary_pinned {
            self.state.route = Route::Replica;
        }
    }

    pub fn set_primary(&mut self) {
        self.state.route = Route::Primary;
    }

    /// Routes to the primary and ignores replica requests until restored.
    pub fn pin_primary(&mut self) {
        self.state.route = Route::Primary;
        self.state.primary_pinned = true;
    }

    /// Resets route and pin. Scope depth is left untouched.
    pub fn clear(&mut self) {
        self.state.route = Route::Primary;
        self.state.primary_pinned = false;
    }

    pub fn snapshot(&self) -> RouteState {
        self.state
    }

    pub fn restore(&mut self, state: RouteState) {
        self.state = state;
    }

    pub(crate) fn enter_scope(&mut self) {
        self.state.depth += 1;
    }
}
