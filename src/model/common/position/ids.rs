use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

use super::USERNAME_MAX_LEN;

/// Reject blank input and strip surrounding whitespace.
fn non_blank(value: String, what: &str) -> Result<String, Error> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{what} must not be empty")));
    }
    if trimmed.len() == value.len() {
        Ok(value)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Generates the string-newtype plumbing shared by all opaque identifiers.
macro_rules! string_id {
    ($name:ident) => {
        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.to_string().try_into()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<$name> for Bson {
            fn from(id: $name) -> Self {
                Bson::String(id.0)
            }
        }
    };
}

/// Opaque identifier of a meeting owned by the meeting service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MeetingId(String);

impl TryFrom<String> for MeetingId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        non_blank(value, "meeting_id").map(Self)
    }
}

string_id!(MeetingId);

/// Opaque identifier of a poll owned by the voting service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PollId(String);

impl TryFrom<String> for PollId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        non_blank(value, "poll_id").map(Self)
    }
}

string_id!(PollId);

impl PollId {
    /// A fresh random poll ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// A candidate's username or handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl TryFrom<String> for Username {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = non_blank(value, "username")?;
        let len = value.chars().count();
        if len > USERNAME_MAX_LEN {
            return Err(Error::Validation(format!(
                "username must be at most {USERNAME_MAX_LEN} characters, got {len}"
            )));
        }
        Ok(Self(value))
    }
}

string_id!(Username);
