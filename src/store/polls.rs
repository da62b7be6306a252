use std::sync::Arc;

use chrono::{Duration, Utc};
use mongodb::{
    bson::{doc, DateTime},
    options::FindOptions,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::OperationId;
use crate::model::{
    api::poll::{OpenedPoll, PollRequest},
    common::position::{PollId, PositionId, PositionState, Username},
    db::position::{PendingPoll, Position},
    mongodb::u32_id_filter,
};
use crate::remote::VotingService;

use super::{Collections, NominationLedger, PositionStore};

/// Rules for opening polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Accepted candidates required before a poll is opened.
    pub min_candidates: u32,
    /// How long a poll creation attempt holds its claim before another
    /// attempt may take over.
    pub claim_timeout: Duration,
}

impl PollSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_candidates: config.min_poll_candidates(),
            claim_timeout: config.poll_claim_timeout(),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            min_candidates: 2,
            claim_timeout: Duration::seconds(60),
        }
    }
}

/// Closes positions and hands their candidates to the voting service.
#[derive(Clone)]
pub struct PollCoordinator {
    db: Collections,
    positions: PositionStore,
    nominations: NominationLedger,
    voting: Arc<dyn VotingService>,
    settings: PollSettings,
}

impl PollCoordinator {
    pub(crate) fn new(
        db: Collections,
        positions: PositionStore,
        nominations: NominationLedger,
        voting: Arc<dyn VotingService>,
        settings: PollSettings,
    ) -> Self {
        Self {
            db,
            positions,
            nominations,
            voting,
            settings,
        }
    }

    /// Close the position if it is still open, create a poll over its
    /// accepted candidates, and bind the poll to the position.
    ///
    /// The poll ID and candidates are claimed on the position before the
    /// voting service is called. While the claim is held, other calls fail
    /// with `Conflict` and candidates cannot withdraw. If the voting service
    /// fails, the next call may proceed at once and sends the same poll.
    pub async fn open_poll(&self, position_id: PositionId) -> Result<OpenedPoll> {
        let op = OperationId::begin("open_poll", position_id);
        op.finish("open_poll", self.open_poll_inner(position_id).await)
    }

    async fn open_poll_inner(&self, position_id: PositionId) -> Result<OpenedPoll> {
        let (position, pending) = self.claim(position_id).await?;

        let request = PollRequest::single(
            position.meeting_id.clone(),
            pending.poll_id.clone(),
            pending.candidates.clone(),
        );
        info!(
            "Requesting poll {} for position {} with {} candidates",
            request.poll_id,
            position.id,
            pending.candidates.len()
        );
        let poll_id = match self.voting.create_poll(&request).await {
            Ok(poll_id) => poll_id,
            Err(err) => {
                warn!("Position {position_id} left without a poll: {err}");
                if let Err(release_err) = self.release(position_id, &pending.poll_id).await {
                    warn!("Poll claim on position {position_id} held until timeout: {release_err}");
                }
                return Err(err);
            }
        };

        let position = self.positions.bind_poll_inner(position_id, poll_id).await?;
        Ok(OpenedPoll {
            position,
            candidates: pending.candidates,
        })
    }

    /// Close the position if needed and claim its poll, snapshotting the
    /// accepted candidates. A stale claim is taken over unchanged.
    async fn claim(&self, position_id: PositionId) -> Result<(Position, PendingPoll)> {
        let mut session = self.db.begin().await?;
        let mut position = self.db.lock_position(position_id, &mut session).await?;

        let state = position.state()?;
        if state == PositionState::ClosedWithPoll {
            return Err(Error::Conflict(format!(
                "Position {position_id} already has a poll"
            )));
        }

        let mut snapshot = Vec::new();
        if position.pending_poll.is_none() {
            let filter = doc! { "position_id": position_id, "accepted": true };
            let options = FindOptions::builder().sort(doc! { "seq": 1 }).build();
            let mut cursor = self
                .db
                .nominations
                .find_with_session(filter, options, &mut session)
                .await?;
            while let Some(nomination) = cursor.next(&mut session).await {
                snapshot.push(nomination?.username);
            }

            let min = self.settings.min_candidates as usize;
            if snapshot.len() < min {
                return Err(Error::InvalidState(format!(
                    "Position {position_id} has {} accepted candidates, \
                     at least {min} are needed for a poll",
                    snapshot.len()
                )));
            }
        } else {
            debug!("Taking over the poll claim on position {position_id}");
        }

        if state == PositionState::Open {
            position.close()?;
        }
        let pending = position.claim_poll(|| snapshot, Utc::now(), self.settings.claim_timeout)?;
        self.db
            .positions
            .update_one_with_session(
                u32_id_filter(position_id),
                doc! { "$set": { "is_open": false, "pending_poll": &pending } },
                None,
                &mut session,
            )
            .await?;

        session.commit_transaction().await?;
        Ok((position, pending))
    }

    /// Let the next attempt proceed immediately. The claim itself stays, so
    /// the next attempt reuses its poll ID and candidates.
    async fn release(&self, position_id: PositionId, poll_id: &PollId) -> Result<()> {
        let mut session = self.db.begin().await?;
        let position = self.db.lock_position(position_id, &mut session).await?;
        let ours = matches!(&position.pending_poll, Some(pending) if &pending.poll_id == poll_id);
        if !ours {
            return Ok(());
        }

        let released = DateTime::from_millis(0);
        self.db
            .positions
            .update_one_with_session(
                u32_id_filter(position_id),
                doc! { "$set": { "pending_poll.claimed_at": released } },
                None,
                &mut session,
            )
            .await?;
        session.commit_transaction().await?;
        Ok(())
    }

    /// The accepted candidates a poll would currently be created with.
    pub async fn candidates(&self, position_id: PositionId) -> Result<Vec<Username>> {
        self.nominations.accepted_candidates(position_id).await
    }
}
