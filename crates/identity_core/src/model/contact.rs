//! Contact domain model.
//!
//! # Responsibility
//! - Define the canonical contact row shared by the store and the resolver.
//! - Check the star-topology invariants a single row can carry.
//!
//! # Invariants
//! - `linked_id` is `None` iff `link_precedence == Primary`.
//! - At least one of `email` / `phone_number` is present.
//! - `created_at` never changes after insertion.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned contact identifier, increasing in creation order.
pub type ContactId = i64;

/// Role of a contact inside its identity group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkPrecedence {
    /// Canonical representative of the group.
    Primary,
    /// Folded into a group; points at the primary via `linked_id`.
    Secondary,
}

impl LinkPrecedence {
    /// Storage representation used in `contacts.link_precedence`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    /// Parses the storage representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            _ => None,
        }
    }
}

/// One observed (email, phone) pairing plus its identity-graph role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Owning primary. `None` for primaries.
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
    /// Soft-delete marker in epoch milliseconds.
    pub deleted_at: Option<i64>,
}

/// Row-level invariant violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactValidationError {
    /// Neither email nor phone number is present.
    MissingContactField(ContactId),
    /// A primary carries a `linked_id`.
    PrimaryWithLink {
        id: ContactId,
        linked_id: ContactId,
    },
    /// A secondary has no `linked_id`.
    SecondaryWithoutLink(ContactId),
    /// A contact links to itself.
    SelfLink(ContactId),
}

impl Display for ContactValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingContactField(id) => {
                write!(f, "contact {id} has neither email nor phone number")
            }
            Self::PrimaryWithLink { id, linked_id } => {
                write!(f, "primary contact {id} must not link to {linked_id}")
            }
            Self::SecondaryWithoutLink(id) => {
                write!(f, "secondary contact {id} has no linked primary")
            }
            Self::SelfLink(id) => write!(f, "contact {id} links to itself"),
        }
    }
}

impl Error for ContactValidationError {}

impl Contact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    /// Ordering key for surviving-primary selection: oldest first, id breaks ties.
    pub fn seniority_key(&self) -> (i64, ContactId) {
        (self.created_at, self.id)
    }

    /// Checks the invariants one row can violate on its own.
    ///
    /// Cross-row invariants (linked contact is itself a primary) are checked
    /// by the resolver during group expansion.
    pub fn validate(&self) -> Result<(), ContactValidationError> {
        if self.email.is_none() && self.phone_number.is_none() {
            return Err(ContactValidationError::MissingContactField(self.id));
        }

        match (self.link_precedence, self.linked_id) {
            (LinkPrecedence::Primary, Some(linked_id)) => {
                Err(ContactValidationError::PrimaryWithLink {
                    id: self.id,
                    linked_id,
                })
            }
            (LinkPrecedence::Secondary, None) => {
                Err(ContactValidationError::SecondaryWithoutLink(self.id))
            }
            (LinkPrecedence::Secondary, Some(linked_id)) if linked_id == self.id => {
                Err(ContactValidationError::SelfLink(self.id))
            }
            _ => Ok(()),
        }
    }
}

/// Insert payload; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
}

impl NewContact {
    /// New group root carrying the observed values.
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
        }
    }

    /// New member of the group rooted at `primary_id`.
    pub fn secondary(
        email: Option<String>,
        phone_number: Option<String>,
        primary_id: ContactId,
    ) -> Self {
        Self {
            email,
            phone_number,
            linked_id: Some(primary_id),
            link_precedence: LinkPrecedence::Secondary,
        }
    }
}
