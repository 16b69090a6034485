//! Identity graph resolution use case.
//!
//! # Responsibility
//! - Match an identify request against stored contacts.
//! - Expand matches into their full identity group, merge groups bridged by
//!   the request, and record genuinely new contact information.
//!
//! # Invariants
//! - Groups are stars: one primary, every other member links to it directly.
//! - The surviving primary is the oldest primary involved (`created_at`,
//!   then `id`).
//! - Merges relink a demoted primary's secondaries before demoting it.
//! - All reads and writes of one call run inside one store write scope.
//! - A request whose values are already in its group writes nothing.

use crate::model::contact::{Contact, ContactId, NewContact};
use crate::model::identity::ConsolidatedIdentity;
use crate::model::request::{IdentifyInput, IdentifyRequest, RequestError};
use crate::repo::contact_repo::{ContactStore, StoreError, StoreResult};
use crate::service::consolidation::project;
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Errors that abort an identify call.
#[derive(Debug)]
pub enum IdentityError {
    /// Request carried no usable contact field; the store was not touched.
    InvalidRequest(RequestError),
    /// Contact store failed; the call's mutations were rolled back.
    Store(StoreError),
}

impl Display for IdentityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest(err) => write!(f, "invalid identify request: {err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IdentityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidRequest(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<RequestError> for IdentityError {
    fn from(value: RequestError) -> Self {
        Self::InvalidRequest(value)
    }
}

impl From<StoreError> for IdentityError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Broken group links found during expansion.
///
/// Not fatal: the offending secondary is left out of the group and
/// resolution continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InconsistentState {
    /// `linked_id` points at no live contact.
    DanglingLink {
        contact_id: ContactId,
        linked_id: ContactId,
    },
    /// `linked_id` points at another secondary.
    ChainedLink {
        contact_id: ContactId,
        linked_id: ContactId,
    },
}

impl InconsistentState {
    pub fn contact_id(&self) -> ContactId {
        match self {
            Self::DanglingLink { contact_id, .. } | Self::ChainedLink { contact_id, .. } => {
                *contact_id
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::DanglingLink { .. } => "dangling_link",
            Self::ChainedLink { .. } => "chained_link",
        }
    }

    pub fn linked_id(&self) -> ContactId {
        match self {
            Self::DanglingLink { linked_id, .. } | Self::ChainedLink { linked_id, .. } => {
                *linked_id
            }
        }
    }
}

impl Display for InconsistentState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingLink {
                contact_id,
                linked_id,
            } => write!(
                f,
                "contact {contact_id} links to {linked_id}, which is missing or deleted"
            ),
            Self::ChainedLink {
                contact_id,
                linked_id,
            } => write!(
                f,
                "contact {contact_id} links to {linked_id}, which is not a primary"
            ),
        }
    }
}

impl Error for InconsistentState {}

/// Result of one identify call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Consolidated view of the resolved group.
    pub identity: ConsolidatedIdentity,
    /// Contact inserted by this call (new primary or new secondary).
    pub created_contact_id: Option<ContactId>,
    /// Former primaries demoted by a merge, oldest first.
    pub demoted_primary_ids: Vec<ContactId>,
    /// Broken links skipped while expanding the group.
    pub anomalies: Vec<InconsistentState>,
}

impl Resolution {
    /// Returns whether this call wrote to the contact store.
    pub fn changed_store(&self) -> bool {
        self.created_contact_id.is_some() || !self.demoted_primary_ids.is_empty()
    }

    fn outcome(&self) -> &'static str {
        match (
            self.created_contact_id,
            self.demoted_primary_ids.is_empty(),
        ) {
            (Some(id), true) if id == self.identity.primary_contact_id => "created_primary",
            (Some(_), true) => "linked_secondary",
            (_, false) => "merged",
            (None, true) => "matched",
        }
    }
}

/// Identity resolution service over an injected contact store.
pub struct IdentityService<S: ContactStore> {
    store: S,
}

impl<S: ContactStore> IdentityService<S> {
    /// Creates a service using the provided store implementation.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Validates raw transport input, then resolves it.
    ///
    /// # Errors
    /// - `InvalidRequest` before any store access when validation fails.
    /// - `Store` when the contact store fails.
    pub fn identify_input(&self, input: &IdentifyInput) -> Result<Resolution, IdentityError> {
        let request = IdentifyRequest::try_from(input).map_err(|err| {
            info!("event=identify module=service status=rejected reason={err}");
            IdentityError::from(err)
        })?;
        self.identify(&request)
    }

    /// Resolves one observation into its consolidated identity.
    ///
    /// `IdentifyRequest` guarantees at least one of email / phone number.
    ///
    /// # Side effects
    /// - May insert one contact and demote primaries, atomically.
    /// - Emits `identify` logging events with metadata only (ids, counts).
    pub fn identify(&self, request: &IdentifyRequest) -> Result<Resolution, IdentityError> {
        let started_at = Instant::now();
        let result = self
            .store
            .with_write_scope(|store| resolve(store, request).map_err(IdentityError::from));

        match &result {
            Ok(resolution) => {
                for anomaly in &resolution.anomalies {
                    warn!(
                        "event=identify_anomaly module=service kind={} contact_id={} linked_id={}",
                        anomaly.kind(),
                        anomaly.contact_id(),
                        anomaly.linked_id()
                    );
                }
                info!(
                    "event=identify module=service status=ok outcome={} primary_contact_id={} secondary_count={} demoted_count={} duration_ms={}",
                    resolution.outcome(),
                    resolution.identity.primary_contact_id,
                    resolution.identity.secondary_contact_ids.len(),
                    resolution.demoted_primary_ids.len(),
                    started_at.elapsed().as_millis()
                );
            }
            Err(err) => {
                error!(
                    "event=identify module=service status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
            }
        }
        result
    }
}

/// Members of one identity group keyed by contact id.
struct Group {
    members: BTreeMap<ContactId, Contact>,
    anomalies: Vec<InconsistentState>,
}

impl Group {
    /// Primaries ordered oldest first.
    fn primaries_by_seniority(&self) -> Vec<Contact> {
        let mut primaries: Vec<Contact> = self
            .members
            .values()
            .filter(|contact| contact.is_primary())
            .cloned()
            .collect();
        primaries.sort_by_key(Contact::seniority_key);
        primaries
    }

    fn contains_email(&self, email: &str) -> bool {
        self.members
            .values()
            .any(|contact| contact.email.as_deref() == Some(email))
    }

    fn contains_phone_number(&self, phone_number: &str) -> bool {
        self.members
            .values()
            .any(|contact| contact.phone_number.as_deref() == Some(phone_number))
    }
}

fn resolve<S: ContactStore>(store: &S, request: &IdentifyRequest) -> StoreResult<Resolution> {
    let matched = store.find_by_email_or_phone(request.email(), request.phone_number())?;
    let mut group = expand_group(store, matched)?;
    let mut anomalies = std::mem::take(&mut group.anomalies);

    let primaries = group.primaries_by_seniority();
    let Some((oldest, younger)) = primaries.split_first() else {
        let created = store.insert(&NewContact::primary(
            request.email().map(str::to_string),
            request.phone_number().map(str::to_string),
        ))?;
        return Ok(Resolution {
            identity: project(&created, [&created]),
            created_contact_id: Some(created.id),
            demoted_primary_ids: Vec::new(),
            anomalies,
        });
    };

    let mut survivor = oldest.clone();
    let mut demoted_primary_ids = Vec::with_capacity(younger.len());
    if !younger.is_empty() {
        for demoted in younger {
            store.relink_secondaries(demoted.id, survivor.id)?;
            store.demote_to_secondary(demoted.id, survivor.id)?;
            demoted_primary_ids.push(demoted.id);
        }

        if let Some(refreshed) = store.find_by_id(survivor.id)? {
            survivor = refreshed;
        }
        group = expand_group(store, vec![survivor.clone()])?;
        anomalies.append(&mut group.anomalies);
    }

    let has_new_email = request
        .email()
        .is_some_and(|email| !group.contains_email(email));
    let has_new_phone_number = request
        .phone_number()
        .is_some_and(|phone_number| !group.contains_phone_number(phone_number));

    let mut created_contact_id = None;
    if has_new_email || has_new_phone_number {
        let created = store.insert(&NewContact::secondary(
            request.email().map(str::to_string),
            request.phone_number().map(str::to_string),
            survivor.id,
        ))?;
        created_contact_id = Some(created.id);
        group.members.insert(created.id, created);
    }

    Ok(Resolution {
        identity: project(&survivor, group.members.values()),
        created_contact_id,
        demoted_primary_ids,
        anomalies,
    })
}

/// Closes `seeds` over the star topology.
///
/// Pulls in the primary of every seeded secondary, then the secondaries of
/// every primary present, including primaries reached only through a link.
/// Secondaries whose link is broken are dropped and reported.
fn expand_group<S: ContactStore>(store: &S, seeds: Vec<Contact>) -> StoreResult<Group> {
    let mut members: BTreeMap<ContactId, Contact> = seeds
        .into_iter()
        .map(|contact| (contact.id, contact))
        .collect();
    let mut anomalies = Vec::new();

    let links: Vec<(ContactId, ContactId)> = members
        .values()
        .filter_map(|contact| contact.linked_id.map(|linked_id| (contact.id, linked_id)))
        .collect();
    for (contact_id, linked_id) in links {
        let owner = match members.get(&linked_id) {
            Some(known) => Some(known.clone()),
            None => store.find_by_id(linked_id)?,
        };

        match owner {
            Some(owner) if owner.is_primary() => {
                members.entry(owner.id).or_insert(owner);
            }
            Some(_) => {
                members.remove(&contact_id);
                anomalies.push(InconsistentState::ChainedLink {
                    contact_id,
                    linked_id,
                });
            }
            None => {
                members.remove(&contact_id);
                anomalies.push(InconsistentState::DanglingLink {
                    contact_id,
                    linked_id,
                });
            }
        }
    }

    let primary_ids: Vec<ContactId> = members
        .values()
        .filter(|contact| contact.is_primary())
        .map(|contact| contact.id)
        .collect();
    for primary_id in primary_ids {
        for secondary in store.find_secondaries_of(primary_id)? {
            members.insert(secondary.id, secondary);
        }
    }

    Ok(Group { members, anomalies })
}
