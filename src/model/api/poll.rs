use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::common::position::{MeetingId, PollId, Username};
use crate::model::db::position::Position;

/// How voters choose among the options.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollType {
    /// Exactly one option per voter.
    Single,
}

/// A request to the voting service to open a poll over a set of candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRequest {
    pub meeting_id: MeetingId,
    pub poll_id: PollId,
    #[serde(rename = "pollType")]
    pub poll_type: PollType,
    /// Candidate usernames, in nomination order.
    pub options: Vec<Username>,
}

impl PollRequest {
    /// A single-choice poll.
    pub fn single(meeting_id: MeetingId, poll_id: PollId, options: Vec<Username>) -> Self {
        Self {
            meeting_id,
            poll_id,
            poll_type: PollType::Single,
            options,
        }
    }
}

/// Versioned envelope wrapping every event this service emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T> {
    pub event_type: String,
    pub event_version: u32,
    pub event_id: Uuid,
    pub timestamp: String,
    pub producer: String,
    pub data: T,
}

impl<T> Event<T> {
    pub fn new(event_type: &str, producer: &str, data: T) -> Self {
        Self::at(event_type, producer, data, Utc::now())
    }

    fn at(event_type: &str, producer: &str, data: T, now: DateTime<Utc>) -> Self {
        Self {
            event_type: event_type.to_string(),
            event_version: 1,
            event_id: Uuid::new_v4(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Micros, false),
            producer: producer.to_string(),
            data,
        }
    }
}

/// Payload of a `voting.create` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCreated {
    pub vote: PollRequest,
}

/// The `voting.create` event type.
pub const VOTING_CREATE: &str = "voting.create";

impl Event<VoteCreated> {
    pub fn voting_create(producer: &str, request: PollRequest) -> Self {
        Self::new(VOTING_CREATE, producer, VoteCreated { vote: request })
    }
}

/// Outcome of opening a poll for a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedPoll {
    /// The position, now bound to its poll.
    pub position: Position,
    /// The accepted candidates handed to the voting service.
    pub candidates: Vec<Username>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn poll_ids_are_unique_uuids() {
        let a = PollId::generate();
        let b = PollId::generate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());

        let request = PollRequest::single(MeetingId::example(), a.clone(), vec![]);
        assert_eq!(request.poll_id, a);
        assert_eq!(request.poll_type, PollType::Single);
    }

    #[test]
    fn voting_create_envelope() {
        let request = PollRequest::single(
            MeetingId::example(),
            "poll-123".parse().unwrap(),
            vec![Username::alice(), Username::bob()],
        );
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let event = Event::at(
            VOTING_CREATE,
            "election-service",
            VoteCreated { vote: request },
            now,
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "voting.create");
        assert_eq!(value["event_version"], 1);
        assert_eq!(value["producer"], "election-service");
        assert_eq!(value["timestamp"], "2024-05-01T12:30:00.000000+00:00");
        assert!(matches!(value["event_id"], Value::String(_)));
        assert_eq!(
            value["data"],
            json!({
                "vote": {
                    "meeting_id": "meeting-1",
                    "poll_id": "poll-123",
                    "pollType": "single",
                    "options": ["alice", "bob"],
                }
            })
        );
    }
}
