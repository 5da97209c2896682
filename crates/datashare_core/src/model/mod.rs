//! Domain records persisted by the repository layer.
//!
//! # Responsibility
//! - Define the records shared by every storage backend.
//! - Bind each record type to exactly one `RepositoryKind`.
//!
//! # Invariants
//! - Every record is identified by a stable, non-empty string id.
//! - Records are validated before any backend write.

pub mod account;
pub mod entity;
pub mod external_service;
pub mod offer;
pub mod search_request;
