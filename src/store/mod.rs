//! Persistent operations on positions and nominations.
//!
//! Every mutating operation runs in a single transaction whose first write
//! bumps the position's `revision`. That write takes a document lock, so two
//! transactions touching the same position can never both commit; the loser
//! fails with a transient write conflict and may be retried by the caller.
//! An early return drops the session, which aborts its transaction.

mod nominations;
mod polls;
mod positions;

use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Client, ClientSession, Database,
};

use crate::error::{Error, Result};
use crate::model::{
    common::position::PositionId,
    db::{nomination::Nomination, position::Position},
    mongodb::{u32_id_filter, Coll, Counter},
};

pub use nominations::NominationLedger;
pub use polls::{PollCoordinator, PollSettings};
pub use positions::{PositionQuery, PositionStore};

/// Handles shared by all stores.
#[derive(Clone)]
pub(crate) struct Collections {
    client: Client,
    positions: Coll<Position>,
    nominations: Coll<Nomination>,
    counters: Coll<Counter>,
}

impl Collections {
    pub fn from_db(db: &Database) -> Self {
        Self {
            client: db.client().clone(),
            positions: Coll::from_db(db),
            nominations: Coll::from_db(db),
            counters: Coll::from_db(db),
        }
    }

    /// Start a session with an open transaction.
    async fn begin(&self) -> Result<ClientSession> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        Ok(session)
    }

    /// Bump the position's revision inside the session's transaction and
    /// return the updated position. This must be the first write of every
    /// transaction on a position.
    async fn lock_position(
        &self,
        position_id: PositionId,
        session: &mut ClientSession,
    ) -> Result<Position> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        self.positions
            .find_one_and_update_with_session(
                u32_id_filter(position_id),
                doc! { "$inc": { "revision": 1_i64 } },
                options,
                session,
            )
            .await?
            .ok_or_else(|| position_not_found(position_id))
    }

    /// Fetch a position outside any transaction.
    async fn get_position(&self, position_id: PositionId) -> Result<Position> {
        self.positions
            .find_one(u32_id_filter(position_id), None)
            .await?
            .ok_or_else(|| position_not_found(position_id))
    }
}

fn position_not_found(position_id: PositionId) -> Error {
    Error::not_found(format!("Position {position_id}"))
}
