mod ids;
mod state;

pub use ids::{MeetingId, PollId, Username};
pub use state::PositionState;

/// Our position IDs are auto-incremented integers.
pub type PositionId = u32;
/// Agenda item references are free-form and never interpreted.
pub type AgendaItemId = String;

/// Upper bound on a position name, in characters.
pub const POSITION_NAME_MAX_LEN: usize = 300;
/// Upper bound on a candidate username, in characters.
pub const USERNAME_MAX_LEN: usize = 100;
