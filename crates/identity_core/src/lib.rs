//! Identity reconciliation core.
//!
//! Resolves (email, phone) observations into consolidated identity groups
//! over a durable contact store. This crate owns the identity-graph
//! invariants; transports call into `IdentityService`.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging};
pub use model::contact::{Contact, ContactId, ContactValidationError, LinkPrecedence, NewContact};
pub use model::identity::{ConsolidatedIdentity, IdentifyResponse};
pub use model::request::{IdentifyInput, IdentifyRequest, RequestError};
pub use repo::contact_repo::{
    ContactStore, SqliteContactStore, StoreError, StoreOperation, StoreResult,
};
pub use service::consolidation::project;
pub use service::identity_service::{
    IdentityError, IdentityService, InconsistentState, Resolution,
};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
