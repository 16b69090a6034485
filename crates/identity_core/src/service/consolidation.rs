//! Projection of a resolved identity group into its consolidated view.
//!
//! # Invariants
//! - Each distinct email / phone number appears once, primary's value first,
//!   the rest in ascending member id order.
//! - `secondary_contact_ids` never contains the primary and is ascending.

use crate::model::contact::Contact;
use crate::model::identity::ConsolidatedIdentity;
use std::collections::HashSet;

/// Builds the consolidated identity for `primary` and its group members.
///
/// `members` may or may not include `primary` itself; order is irrelevant.
pub fn project<'a, I>(primary: &Contact, members: I) -> ConsolidatedIdentity
where
    I: IntoIterator<Item = &'a Contact>,
{
    let mut others: Vec<&Contact> = members
        .into_iter()
        .filter(|contact| contact.id != primary.id)
        .collect();
    others.sort_by_key(|contact| contact.id);
    others.dedup_by_key(|contact| contact.id);

    let ordered = || std::iter::once(primary).chain(others.iter().copied());

    ConsolidatedIdentity {
        primary_contact_id: primary.id,
        emails: distinct_in_order(ordered().filter_map(|c| c.email.as_deref())),
        phone_numbers: distinct_in_order(ordered().filter_map(|c| c.phone_number.as_deref())),
        secondary_contact_ids: others.iter().map(|contact| contact.id).collect(),
    }
}

fn distinct_in_order<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|value| seen.insert(*value))
        .map(str::to_string)
        .collect()
}
