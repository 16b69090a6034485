//! Contact store contract and persistence implementations.
//!
//! # Responsibility
//! - Define the six gateway primitives the resolver needs.
//! - Isolate SQLite query details from resolver orchestration.
//!
//! # Invariants
//! - Every read sees only live (`deleted_at IS NULL`) contacts.
//! - Read paths reject rows that fail `Contact::validate()`.
//! - Store errors carry the failing operation and, where known, the contact id.

pub mod contact_repo;
