use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, Document};
use serde::{Deserialize, Serialize};

use crate::model::common::position::{PositionId, Username};

/// A candidate's nomination for a position, as stored in the database.
///
/// The pair `(position_id, username)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nomination {
    pub position_id: PositionId,
    pub username: Username,
    /// Whether the nominee has agreed to stand.
    pub accepted: bool,
    /// Creation order within the position.
    pub seq: u64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub nominated_at: DateTime<Utc>,
}

impl Nomination {
    /// A fresh, unaccepted nomination.
    pub fn new(position_id: PositionId, username: Username, seq: u64) -> Self {
        Self {
            position_id,
            username,
            accepted: false,
            seq,
            nominated_at: Utc::now(),
        }
    }

    /// Filter matching exactly this nomination.
    pub fn key(position_id: PositionId, username: &Username) -> Document {
        doc! {
            "position_id": position_id,
            "username": username,
        }
    }
}


#[cfg(test)]
mod tests {
    use mongodb::bson;

    use super::*;

    #[test]
    fn new_nominations_are_unaccepted() {
        let nomination = Nomination::example();
        assert!(!nomination.accepted);
        assert_eq!(nomination.username, Username::alice());
    }

    #[test]
    fn key_matches_stored_fields() {
        let nomination = Nomination::example();
        let stored = bson::to_document(&nomination).unwrap();
        let key = Nomination::key(nomination.position_id, &nomination.username);
        assert_eq!(key.len(), 2);
        assert!(stored.contains_key("position_id"));
        assert_eq!(
            stored.get_str("username").unwrap(),
            key.get_str("username").unwrap()
        );
        assert!(!stored.get_bool("accepted").unwrap());
        assert!(stored.get_datetime("nominated_at").is_ok());
    }
}
