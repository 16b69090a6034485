//! Externally visible consolidated identity shape.
//!
//! Serialized with camelCase field names to match the identify wire contract.

use crate::model::contact::ContactId;
use serde::Serialize;

/// One identity group as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedIdentity {
    pub primary_contact_id: ContactId,
    /// Primary's email first, then other members' in ascending id order.
    pub emails: Vec<String>,
    /// Primary's phone first, then other members' in ascending id order.
    pub phone_numbers: Vec<String>,
    /// Every member except the primary, ascending.
    pub secondary_contact_ids: Vec<ContactId>,
}

/// Response envelope: `{"contact": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifyResponse {
    pub contact: ConsolidatedIdentity,
}

impl From<ConsolidatedIdentity> for IdentifyResponse {
    fn from(contact: ConsolidatedIdentity) -> Self {
        Self { contact }
    }
}
