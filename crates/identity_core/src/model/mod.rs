//! Domain model for contact identity reconciliation.
//!
//! # Responsibility
//! - Define the persisted contact record and its identity-graph role.
//! - Define the validated identify request and the consolidated response.
//!
//! # Invariants
//! - Every contact is identified by a store-assigned, monotonic `ContactId`.
//! - Deletion is represented by soft-delete markers, not hard delete.

pub mod contact;
pub mod identity;
pub mod request;
