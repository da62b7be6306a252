use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// States in the position lifecycle.
///
/// The only path is `Open` -> `ClosedPending` -> `ClosedWithPoll`.
/// The state is not stored directly: it is derived from the `is_open`
/// flag and the presence of a poll reference.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    /// Accepting nominations and acceptances.
    Open,
    /// Nominations frozen, no poll bound yet.
    ClosedPending,
    /// Poll reference recorded. Terminal.
    ClosedWithPoll,
}

impl PositionState {
    /// Derive the state from the stored columns.
    /// Returns `None` for the forbidden combination of an open position with a poll.
    pub fn from_columns(is_open: bool, has_poll: bool) -> Option<Self> {
        match (is_open, has_poll) {
            (true, false) => Some(Self::Open),
            (false, false) => Some(Self::ClosedPending),
            (false, true) => Some(Self::ClosedWithPoll),
            (true, true) => None,
        }
    }

    /// Can a candidate still withdraw in this state?
    pub fn allows_withdrawal(self) -> bool {
        self != Self::ClosedWithPoll
    }
}

impl Display for PositionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::ClosedPending => "closed (awaiting poll)",
            Self::ClosedWithPoll => "closed (poll bound)",
        };
        f.write_str(name)
    }
}
