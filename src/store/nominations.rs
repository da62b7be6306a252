use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use mongodb::{bson::doc, options::FindOptions};

use crate::error::{Error, Result};
use crate::logging::OperationId;
use crate::model::{
    common::position::{PositionId, Username},
    db::nomination::Nomination,
    mongodb::is_duplicate_key_error,
};

use super::Collections;

/// Candidates nominated for positions.
#[derive(Clone)]
pub struct NominationLedger {
    db: Collections,
}

fn nomination_not_found(position_id: PositionId, username: &Username) -> Error {
    Error::not_found(format!("Nomination of {username} for position {position_id}"))
}

impl NominationLedger {
    pub(crate) fn new(db: Collections) -> Self {
        Self { db }
    }

    /// Nominate a candidate for an open position.
    pub async fn nominate(&self, position_id: PositionId, username: &str) -> Result<Nomination> {
        let op = OperationId::begin("nominate", format_args!("{position_id} {username:?}"));
        let result = match username.parse::<Username>() {
            Ok(username) => self.nominate_inner(position_id, username).await,
            Err(err) => Err(err),
        };
        op.finish("nominate", result)
    }

    async fn nominate_inner(
        &self,
        position_id: PositionId,
        username: Username,
    ) -> Result<Nomination> {
        let mut session = self.db.begin().await?;
        let position = self.db.lock_position(position_id, &mut session).await?;
        position.ensure_open("nominate")?;

        let nomination = Nomination::new(position_id, username, position.revision);
        let inserted = self
            .db
            .nominations
            .insert_one_with_session(&nomination, None, &mut session)
            .await;
        match inserted {
            Ok(_) => {}
            Err(err) if is_duplicate_key_error(&err) => {
                return Err(Error::Conflict(format!(
                    "{} is already nominated for position {position_id}",
                    nomination.username
                )));
            }
            Err(err) => return Err(err.into()),
        }

        session.commit_transaction().await?;
        Ok(nomination)
    }

    /// Record that the nominee agrees to stand. Only while the position is open.
    pub async fn accept(&self, position_id: PositionId, username: &str) -> Result<Nomination> {
        let op = OperationId::begin(
            "accept_nomination",
            format_args!("{position_id} {username:?}"),
        );
        let result = match username.parse::<Username>() {
            Ok(username) => self.accept_inner(position_id, username).await,
            Err(err) => Err(err),
        };
        op.finish("accept_nomination", result)
    }

    async fn accept_inner(
        &self,
        position_id: PositionId,
        username: Username,
    ) -> Result<Nomination> {
        let mut session = self.db.begin().await?;
        let position = self.db.lock_position(position_id, &mut session).await?;
        position.ensure_open("accept a nomination")?;

        let key = Nomination::key(position_id, &username);
        let mut nomination = self
            .db
            .nominations
            .find_one_with_session(key.clone(), None, &mut session)
            .await?
            .ok_or_else(|| nomination_not_found(position_id, &username))?;

        if !nomination.accepted {
            self.db
                .nominations
                .update_one_with_session(
                    key,
                    doc! { "$set": { "accepted": true } },
                    None,
                    &mut session,
                )
                .await?;
            nomination.accepted = true;
        }

        session.commit_transaction().await?;
        Ok(nomination)
    }

    /// Remove a nomination, until a poll has been bound.
    pub async fn withdraw(&self, position_id: PositionId, username: &str) -> Result<()> {
        let op = OperationId::begin(
            "withdraw_nomination",
            format_args!("{position_id} {username:?}"),
        );
        let result = match username.parse::<Username>() {
            Ok(username) => self.withdraw_inner(position_id, username).await,
            Err(err) => Err(err),
        };
        op.finish("withdraw_nomination", result)
    }

    async fn withdraw_inner(&self, position_id: PositionId, username: Username) -> Result<()> {
        let mut session = self.db.begin().await?;
        let position = self.db.lock_position(position_id, &mut session).await?;
        position.ensure_withdrawable()?;

        let result = self
            .db
            .nominations
            .delete_one_with_session(Nomination::key(position_id, &username), None, &mut session)
            .await?;
        if result.deleted_count == 0 {
            return Err(nomination_not_found(position_id, &username));
        }

        session.commit_transaction().await?;
        Ok(())
    }

    /// One candidate's nomination status.
    pub async fn get(&self, position_id: PositionId, username: &str) -> Result<Nomination> {
        let username: Username = username.parse()?;
        self.db
            .nominations
            .find_one(Nomination::key(position_id, &username), None)
            .await?
            .ok_or_else(|| nomination_not_found(position_id, &username))
    }

    /// Lazily stream a position's nominations in creation order.
    ///
    /// Fails with `NotFound` if the position does not exist. Each call runs
    /// the query afresh.
    pub async fn list(
        &self,
        position_id: PositionId,
        accepted_only: bool,
    ) -> Result<BoxStream<'static, Result<Nomination>>> {
        self.db.get_position(position_id).await?;

        let mut filter = doc! { "position_id": position_id };
        if accepted_only {
            filter.insert("accepted", true);
        }
        let options = FindOptions::builder().sort(doc! { "seq": 1 }).build();
        let cursor = self.db.nominations.find(filter, options).await?;
        Ok(cursor.map_err(Error::from).boxed())
    }

    /// Accepted candidates of a position, in nomination order.
    pub(super) async fn accepted_candidates(
        &self,
        position_id: PositionId,
    ) -> Result<Vec<Username>> {
        self.list(position_id, true)
            .await?
            .map_ok(|nomination| nomination.username)
            .try_collect()
            .await
    }
}
