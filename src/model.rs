//! User records and client-side form validation.
//!
//! [`UserDraft`] holds raw form input (every field a string, age unparsed).
//! [`UserDraft::validate`] checks the required/format/range rules and turns a
//! draft into a typed [`NewUser`] payload, so invalid input is rejected
//! before any network call is made.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, FieldError, FieldErrors};

/// A user record as returned by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Server-assigned identifier. The backend also serves this as `_id`.
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub age: u8,
    pub occupation: String,
    /// Server-assigned creation timestamp.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Raw form input for creating or replacing a user.
///
/// All fields are strings as captured from a form; `age` is parsed during
/// validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDraft {
    pub name: String,
    pub email: String,
    pub age: String,
    pub occupation: String,
}

impl UserDraft {
    /// Validates the draft and produces a typed request payload.
    ///
    /// Rules:
    /// - name: required, at least 2 characters after trimming
    /// - email: required, `local@domain.tld` shaped, no whitespace
    /// - age: required, integer in `[1, 120]`
    /// - occupation: required
    ///
    /// All failing fields are reported together in a single
    /// [`Error::Validation`].
    pub fn validate(&self) -> Result<NewUser, Error> {
        let mut errors = Vec::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        } else if name.chars().count() < 2 {
            errors.push(FieldError::new("name", "Name must be at least 2 characters"));
        }

        let email = self.email.trim();
        if email.is_empty() {
            errors.push(FieldError::new("email", "Email is required"));
        } else if !is_valid_email(email) {
            errors.push(FieldError::new("email", "Email is invalid"));
        }

        let mut age = 0u8;
        let raw_age = self.age.trim();
        if raw_age.is_empty() {
            errors.push(FieldError::new("age", "Age is required"));
        } else {
            match raw_age.parse::<u8>() {
                Ok(n) if (1..=120).contains(&n) => age = n,
                _ => errors.push(FieldError::new("age", "Age must be between 1 and 120")),
            }
        }

        let occupation = self.occupation.trim();
        if occupation.is_empty() {
            errors.push(FieldError::new("occupation", "Occupation is required"));
        }

        if !errors.is_empty() {
            return Err(Error::Validation(FieldErrors(errors)));
        }

        Ok(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            age,
            occupation: occupation.to_string(),
        })
    }
}

/// A validated request payload for POST /users and PUT /users/:id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub age: u8,
    pub occupation: String,
}

/// Input for the update mutation: which record to replace, and with what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUpdate {
    pub id: String,
    pub draft: UserDraft,
}

// Mirrors the original form's check: non-empty local part and domain, a dot
// somewhere in the domain, no whitespace anywhere.
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}
