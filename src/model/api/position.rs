use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::common::position::{
    AgendaItemId, MeetingId, PositionState, POSITION_NAME_MAX_LEN,
};
use crate::model::db::position::Position;

/// A position specification as supplied by a caller, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnvalidatedPositionSpec {
    pub meeting_id: Option<String>,
    pub position_name: Option<String>,
    pub description: Option<String>,
    pub agenda_item_id: Option<String>,
}

/// A validated position specification, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSpec {
    pub meeting_id: MeetingId,
    pub position_name: String,
    pub description: Option<String>,
    pub agenda_item_id: Option<AgendaItemId>,
}

impl PositionSpec {
    /// Build and validate a specification in one step.
    pub fn new(
        meeting_id: impl Into<String>,
        position_name: impl Into<String>,
        description: Option<String>,
        agenda_item_id: Option<String>,
    ) -> Result<Self> {
        UnvalidatedPositionSpec {
            meeting_id: Some(meeting_id.into()),
            position_name: Some(position_name.into()),
            description,
            agenda_item_id,
        }
        .try_into()
    }
}

/// Blank optional text is treated as absent.
fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TryFrom<UnvalidatedPositionSpec> for PositionSpec {
    type Error = Error;

    fn try_from(spec: UnvalidatedPositionSpec) -> Result<Self> {
        let UnvalidatedPositionSpec {
            meeting_id,
            position_name,
            description,
            agenda_item_id,
        } = spec;

        let meeting_id: MeetingId = meeting_id
            .ok_or_else(|| Error::Validation("meeting_id is required".to_string()))?
            .try_into()?;

        let position_name = optional_text(position_name)
            .ok_or_else(|| Error::Validation("position_name is required".to_string()))?;
        let len = position_name.chars().count();
        if len > POSITION_NAME_MAX_LEN {
            return Err(Error::Validation(format!(
                "position_name must be at most {POSITION_NAME_MAX_LEN} characters, got {len}"
            )));
        }

        Ok(Self {
            meeting_id,
            position_name,
            description: optional_text(description),
            agenda_item_id: optional_text(agenda_item_id),
        })
    }
}

/// A position as presented to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDescription {
    pub position_id: u32,
    pub meeting_id: String,
    pub agenda_item_id: Option<String>,
    pub position_name: String,
    pub description: Option<String>,
    pub is_open: bool,
    pub poll_id: Option<String>,
    pub state: Option<PositionState>,
}

impl From<Position> for PositionDescription {
    fn from(position: Position) -> Self {
        let state = position.state().ok();
        Self {
            position_id: position.id,
            meeting_id: position.meeting_id.into(),
            agenda_item_id: position.agenda_item_id,
            position_name: position.position_name,
            description: position.description,
            is_open: position.is_open,
            poll_id: position.poll_id.map(Into::into),
            state,
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl PositionSpec {
        pub fn example() -> Self {
            Self::new("meeting-1", "Chair", None, None).unwrap()
        }

        pub fn treasurer_example() -> Self {
            Self::new(
                "meeting-1",
                "Treasurer",
                Some("Keeps the books".to_string()),
                Some("item-4".to_string()),
            )
            .unwrap()
        }
    }
}
