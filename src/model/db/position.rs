use chrono::{DateTime, Duration, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, to_bson, Bson};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::position::PositionSpec,
    common::position::{AgendaItemId, MeetingId, PollId, PositionId, PositionState, Username},
};

/// A poll this service has committed to creating, recorded before the
/// voting service is asked for it.
///
/// Once a claim exists the candidate list is fixed: every attempt to create
/// the poll sends the same ID and the same options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPoll {
    pub poll_id: PollId,
    /// Accepted candidates at the time of the claim, in nomination order.
    pub candidates: Vec<Username>,
    /// When the current attempt started. Attempts older than the claim
    /// timeout are presumed dead and may be taken over.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub claimed_at: DateTime<Utc>,
}

impl PendingPoll {
    pub fn new(candidates: Vec<Username>, now: DateTime<Utc>) -> Self {
        Self {
            poll_id: PollId::generate(),
            candidates,
            claimed_at: now,
        }
    }

    /// Whether another attempt may be started.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.claimed_at >= timeout
    }
}

impl From<&PendingPoll> for Bson {
    fn from(pending: &PendingPoll) -> Self {
        to_bson(pending).expect("Serialisation is infallible")
    }
}

/// A position, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Unique ID.
    #[serde(rename = "_id")]
    pub id: PositionId,
    /// Owning meeting. Immutable.
    pub meeting_id: MeetingId,
    /// Disambiguates several elections within one meeting.
    pub agenda_item_id: Option<AgendaItemId>,
    /// Human-readable name, e.g. "Chair".
    pub position_name: String,
    pub description: Option<String>,
    /// Whether nominations are still accepted.
    pub is_open: bool,
    /// Reference to the poll in the voting service, once bound.
    pub poll_id: Option<PollId>,
    /// Poll being created, between closing and binding.
    #[serde(default)]
    pub pending_poll: Option<PendingPoll>,
    /// Bumped by every transaction that mutates this position or its nominations.
    pub revision: u64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Position {
    /// Create a new open position.
    pub fn new(id: PositionId, spec: PositionSpec) -> Self {
        Self {
            id,
            meeting_id: spec.meeting_id,
            agenda_item_id: spec.agenda_item_id,
            position_name: spec.position_name,
            description: spec.description,
            is_open: true,
            poll_id: None,
            pending_poll: None,
            revision: 0,
            created_at: Utc::now(),
        }
    }

    /// The lifecycle state. Fails if the stored columns contradict each other.
    pub fn state(&self) -> Result<PositionState> {
        PositionState::from_columns(self.is_open, self.poll_id.is_some()).ok_or_else(|| {
            Error::Integrity(format!(
                "Position {} is open but has poll {:?}",
                self.id, self.poll_id
            ))
        })
    }

    /// Fail unless nominations can still change.
    pub fn ensure_open(&self, action: &str) -> Result<()> {
        match self.state()? {
            PositionState::Open => Ok(()),
            state => Err(Error::InvalidState(format!(
                "Cannot {action}: position {} is {state}",
                self.id
            ))),
        }
    }

    /// Fail if a candidate can no longer withdraw: once a poll is bound, or
    /// once its creation has been claimed.
    pub fn ensure_withdrawable(&self) -> Result<()> {
        let state = self.state()?;
        if !state.allows_withdrawal() {
            return Err(Error::InvalidState(format!(
                "Cannot withdraw: position {} is {state}",
                self.id
            )));
        }
        if let Some(pending) = &self.pending_poll {
            return Err(Error::InvalidState(format!(
                "Cannot withdraw: poll {} is being created for position {}",
                pending.poll_id, self.id
            )));
        }
        Ok(())
    }

    /// Freeze nominations: `Open` -> `ClosedPending`.
    pub fn close(&mut self) -> Result<()> {
        match self.state()? {
            PositionState::Open => {
                self.is_open = false;
                Ok(())
            }
            _ => Err(Error::InvalidState(format!(
                "Position {} is already closed",
                self.id
            ))),
        }
    }

    /// Claim the right to create a poll for this closed position.
    ///
    /// A fresh claim held by someone else is a conflict. A stale claim is
    /// taken over, keeping its poll ID and candidates. Without any claim,
    /// `candidates` supplies the snapshot for a new one.
    pub fn claim_poll(
        &mut self,
        candidates: impl FnOnce() -> Vec<Username>,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<PendingPoll> {
        match self.state()? {
            PositionState::Open => {
                return Err(Error::InvalidState(format!(
                    "Position {} must be closed before a poll is created",
                    self.id
                )))
            }
            PositionState::ClosedWithPoll => {
                return Err(Error::Conflict(format!(
                    "Position {} already has a poll",
                    self.id
                )))
            }
            PositionState::ClosedPending => {}
        }

        let pending = match self.pending_poll.take() {
            Some(pending) if !pending.is_stale(now, timeout) => {
                let err = Error::Conflict(format!(
                    "Poll {} is already being created for position {}",
                    pending.poll_id, self.id
                ));
                self.pending_poll = Some(pending);
                return Err(err);
            }
            Some(pending) => PendingPoll {
                claimed_at: now,
                ..pending
            },
            None => PendingPoll::new(candidates(), now),
        };
        self.pending_poll = Some(pending.clone());
        Ok(pending)
    }

    /// Record the poll reference: `ClosedPending` -> `ClosedWithPoll`.
    /// The reference is immutable once set, and must match any pending claim.
    pub fn bind_poll(&mut self, poll_id: PollId) -> Result<()> {
        match self.state()? {
            PositionState::Open => Err(Error::InvalidState(format!(
                "Position {} must be closed before a poll is bound",
                self.id
            ))),
            PositionState::ClosedWithPoll => Err(Error::Conflict(format!(
                "Position {} is already bound to poll {}",
                self.id,
                self.poll_id.as_deref().unwrap_or_default()
            ))),
            PositionState::ClosedPending => {
                if let Some(pending) = &self.pending_poll {
                    if pending.poll_id != poll_id {
                        return Err(Error::Conflict(format!(
                            "Position {} is awaiting poll {}, not {poll_id}",
                            self.id, pending.poll_id
                        )));
                    }
                }
                self.poll_id = Some(poll_id);
                self.pending_poll = None;
                Ok(())
            }
        }
    }
}
