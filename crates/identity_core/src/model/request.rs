//! Identify request normalization and validation.
//!
//! # Responsibility
//! - Turn raw `{email, phoneNumber}` input into a validated request.
//! - Reject requests carrying no contact field before any store access.
//!
//! # Invariants
//! - A constructed `IdentifyRequest` always has at least one field.
//! - Emails are trimmed and lower-cased; phone numbers are trimmed digits.
//! - Blank input is treated the same as absent input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const MAX_PHONE_NUMBER_LEN: usize = 20;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern must compile")
});
static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+$").expect("phone pattern must compile"));

/// Raw identify input as received from a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyInput {
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

/// Reasons an identify request is rejected before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Neither email nor phone number was supplied.
    MissingContactField,
    /// Email is not shaped like `local@domain.tld`.
    InvalidEmail,
    /// Phone number is not 1..=20 ASCII digits.
    InvalidPhoneNumber,
}

impl Display for RequestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingContactField => write!(f, "email or phoneNumber is required"),
            Self::InvalidEmail => write!(f, "email must be a valid email address"),
            Self::InvalidPhoneNumber => write!(
                f,
                "phoneNumber must contain only digits and be 1 to {MAX_PHONE_NUMBER_LEN} characters"
            ),
        }
    }
}

impl Error for RequestError {}

/// Validated identify request. At least one field is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyRequest {
    email: Option<String>,
    phone_number: Option<String>,
}

impl IdentifyRequest {
    /// Normalizes and validates raw request fields.
    ///
    /// # Errors
    /// - `MissingContactField` when both fields are absent or blank.
    /// - `InvalidEmail` / `InvalidPhoneNumber` when a present field is malformed.
    pub fn new(
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Self, RequestError> {
        let email = non_blank(email).map(normalize_email).transpose()?;
        let phone_number = non_blank(phone_number)
            .map(normalize_phone_number)
            .transpose()?;

        if email.is_none() && phone_number.is_none() {
            return Err(RequestError::MissingContactField);
        }

        Ok(Self {
            email,
            phone_number,
        })
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }
}

impl TryFrom<&IdentifyInput> for IdentifyRequest {
    type Error = RequestError;

    fn try_from(input: &IdentifyInput) -> Result<Self, Self::Error> {
        Self::new(input.email.as_deref(), input.phone_number.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn normalize_email(value: &str) -> Result<String, RequestError> {
    let lowered = value.to_lowercase();
    if !EMAIL_PATTERN.is_match(&lowered) {
        return Err(RequestError::InvalidEmail);
    }
    Ok(lowered)
}

fn normalize_phone_number(value: &str) -> Result<String, RequestError> {
    if value.len() > MAX_PHONE_NUMBER_LEN || !PHONE_PATTERN.is_match(value) {
        return Err(RequestError::InvalidPhoneNumber);
    }
    Ok(value.to_string())
}
