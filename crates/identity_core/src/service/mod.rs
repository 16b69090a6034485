//! Identity resolution use-case services.
//!
//! # Responsibility
//! - Orchestrate contact store calls into the identify use case.
//! - Project resolved groups into the consolidated response shape.

pub mod consolidation;
pub mod identity_service;
