use std::sync::Arc;

use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use mongodb::{
    bson::{doc, Bson, Document},
    options::FindOptions,
};

use crate::error::{Error, Result};
use crate::logging::OperationId;
use crate::model::{
    api::position::PositionSpec,
    common::position::{AgendaItemId, MeetingId, PollId, PositionId},
    db::position::Position,
    mongodb::{u32_id_filter, Counter, POSITION_ID_COUNTER_ID},
};
use crate::remote::MeetingDirectory;

use super::Collections;

/// Which positions to list. Always scoped to one meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionQuery {
    meeting_id: MeetingId,
    agenda_item_id: Option<AgendaItemId>,
    open_only: bool,
}

impl PositionQuery {
    /// All positions of a meeting.
    pub fn meeting(meeting_id: MeetingId) -> Self {
        Self {
            meeting_id,
            agenda_item_id: None,
            open_only: false,
        }
    }

    /// Only positions attached to the given agenda item. The ID is trimmed
    /// like stored ones, and a blank ID selects positions without an item.
    pub fn agenda_item(mut self, agenda_item_id: impl Into<AgendaItemId>) -> Self {
        self.agenda_item_id = Some(agenda_item_id.into().trim().to_string());
        self
    }

    /// Only positions still accepting nominations.
    pub fn open_only(mut self) -> Self {
        self.open_only = true;
        self
    }

    fn filter(&self) -> Document {
        let mut filter = doc! { "meeting_id": &self.meeting_id };
        match self.agenda_item_id.as_deref() {
            Some("") => {
                filter.insert("agenda_item_id", Bson::Null);
            }
            Some(agenda_item_id) => {
                filter.insert("agenda_item_id", agenda_item_id);
            }
            None => {}
        }
        if self.open_only {
            filter.insert("is_open", true);
        }
        filter
    }
}

/// Positions and their lifecycle.
#[derive(Clone)]
pub struct PositionStore {
    db: Collections,
    meetings: Arc<dyn MeetingDirectory>,
}

impl PositionStore {
    pub(crate) fn new(db: Collections, meetings: Arc<dyn MeetingDirectory>) -> Self {
        Self { db, meetings }
    }

    /// Create a new open position in a meeting the directory knows about.
    pub async fn create(&self, spec: PositionSpec) -> Result<Position> {
        let op = OperationId::begin("create_position", &spec.meeting_id);
        op.finish("create_position", self.create_inner(spec).await)
    }

    async fn create_inner(&self, spec: PositionSpec) -> Result<Position> {
        if !self.meetings.meeting_exists(&spec.meeting_id).await? {
            return Err(Error::not_found(format!("Meeting {}", spec.meeting_id)));
        }

        let next = Counter::next(&self.db.counters, POSITION_ID_COUNTER_ID).await?;
        let id = PositionId::try_from(next)
            .map_err(|_| Error::Integrity(format!("Position ID {next} is out of range")))?;

        let position = Position::new(id, spec);
        self.db.positions.insert_one(&position, None).await?;
        debug!(
            "Created position {} ({}) in meeting {}",
            position.id, position.position_name, position.meeting_id
        );
        Ok(position)
    }

    /// Resolve a meeting join code, then create the position in that meeting.
    pub async fn create_for_meeting_code(
        &self,
        meeting_code: &str,
        position_name: &str,
        description: Option<String>,
        agenda_item_id: Option<String>,
    ) -> Result<Position> {
        let meeting_code = meeting_code.trim();
        if meeting_code.is_empty() {
            return Err(Error::Validation("meeting_code must not be empty".to_string()));
        }
        let meeting_id = self
            .meetings
            .resolve_code(meeting_code)
            .await?
            .ok_or_else(|| Error::not_found(format!("Meeting with code {meeting_code}")))?;
        let spec = PositionSpec::new(meeting_id, position_name, description, agenda_item_id)?;
        self.create(spec).await
    }

    pub async fn get(&self, position_id: PositionId) -> Result<Position> {
        self.db.get_position(position_id).await
    }

    /// Lazily stream matching positions in creation order.
    ///
    /// Each call runs the query afresh, so a listing can be restarted by
    /// calling this again.
    pub async fn list(
        &self,
        query: &PositionQuery,
    ) -> Result<BoxStream<'static, Result<Position>>> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self.db.positions.find(query.filter(), options).await?;
        Ok(cursor.map_err(Error::from).boxed())
    }

    /// Stop accepting nominations: `Open` -> `ClosedPending`.
    pub async fn close(&self, position_id: PositionId) -> Result<Position> {
        let op = OperationId::begin("close_position", position_id);
        op.finish("close_position", self.close_inner(position_id).await)
    }

    async fn close_inner(&self, position_id: PositionId) -> Result<Position> {
        let mut session = self.db.begin().await?;
        let mut position = self.db.lock_position(position_id, &mut session).await?;
        position.close()?;
        self.db
            .positions
            .update_one_with_session(
                u32_id_filter(position_id),
                doc! { "$set": { "is_open": false } },
                None,
                &mut session,
            )
            .await?;
        session.commit_transaction().await?;
        Ok(position)
    }

    /// Record the external poll: `ClosedPending` -> `ClosedWithPoll`.
    pub async fn bind_poll(&self, position_id: PositionId, poll_id: &str) -> Result<Position> {
        let op = OperationId::begin("bind_poll", format_args!("{position_id} {poll_id:?}"));
        let result = match poll_id.parse::<PollId>() {
            Ok(poll_id) => self.bind_poll_inner(position_id, poll_id).await,
            Err(err) => Err(err),
        };
        op.finish("bind_poll", result)
    }

    pub(super) async fn bind_poll_inner(
        &self,
        position_id: PositionId,
        poll_id: PollId,
    ) -> Result<Position> {
        let mut session = self.db.begin().await?;
        let mut position = self.db.lock_position(position_id, &mut session).await?;
        position.bind_poll(poll_id.clone())?;
        // Only a closed, unbound position may gain a poll.
        let filter = doc! {
            "_id": position_id,
            "is_open": false,
            "poll_id": null,
        };
        let result = self
            .db
            .positions
            .update_one_with_session(
                filter,
                doc! { "$set": { "poll_id": &poll_id, "pending_poll": null } },
                None,
                &mut session,
            )
            .await?;
        if result.modified_count != 1 {
            return Err(Error::Integrity(format!(
                "Position {position_id} changed while binding poll {poll_id}"
            )));
        }
        session.commit_transaction().await?;
        Ok(position)
    }

    /// Delete a position and all of its nominations.
    pub async fn delete(&self, position_id: PositionId) -> Result<()> {
        let op = OperationId::begin("delete_position", position_id);
        op.finish("delete_position", self.delete_inner(position_id).await)
    }

    async fn delete_inner(&self, position_id: PositionId) -> Result<()> {
        let mut session = self.db.begin().await?;
        self.db.lock_position(position_id, &mut session).await?;

        let nominations = self
            .db
            .nominations
            .delete_many_with_session(
                doc! { "position_id": position_id },
                None,
                &mut session,
            )
            .await?;
        self.db
            .positions
            .delete_one_with_session(u32_id_filter(position_id), None, &mut session)
            .await?;

        session.commit_transaction().await?;
        debug!(
            "Deleted position {position_id} with {} nominations",
            nominations.deleted_count
        );
        Ok(())
    }

    /// Delete every position of a meeting, and their nominations.
    /// Returns how many positions were removed.
    pub async fn delete_meeting_positions(&self, meeting_id: &MeetingId) -> Result<u64> {
        let op = OperationId::begin("delete_meeting_positions", meeting_id);
        op.finish(
            "delete_meeting_positions",
            self.delete_meeting_positions_inner(meeting_id).await,
        )
    }

    async fn delete_meeting_positions_inner(&self, meeting_id: &MeetingId) -> Result<u64> {
        let mut session = self.db.begin().await?;
        let in_meeting = doc! { "meeting_id": meeting_id };

        // Lock every position of the meeting before touching nominations.
        self.db
            .positions
            .update_many_with_session(
                in_meeting.clone(),
                doc! { "$inc": { "revision": 1_i64 } },
                None,
                &mut session,
            )
            .await?;
        let position_ids = self
            .db
            .positions
            .distinct_with_session("_id", in_meeting.clone(), None, &mut session)
            .await?;

        self.db
            .nominations
            .delete_many_with_session(
                doc! { "position_id": { "$in": position_ids } },
                None,
                &mut session,
            )
            .await?;
        let deleted = self
            .db
            .positions
            .delete_many_with_session(in_meeting, None, &mut session)
            .await?
            .deleted_count;

        session.commit_transaction().await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use mongodb::Database;

    use super::*;
    use crate::model::{
        common::position::{PositionState, Username},
        db::nomination::Nomination,
        mongodb::Coll,
    };
    use crate::ElectionService;

    #[test]
    fn query_filters() {
        let query = PositionQuery::meeting(MeetingId::example());
        assert_eq!(query.filter(), doc! { "meeting_id": "meeting-1" });

        let query = query.agenda_item("item-4").open_only();
        assert_eq!(
            query.filter(),
            doc! { "meeting_id": "meeting-1", "agenda_item_id": "item-4", "is_open": true }
        );
    }

    #[test]
    fn agenda_item_filter_is_normalised() {
        let query = PositionQuery::meeting(MeetingId::example()).agenda_item(" item-4 ");
        assert_eq!(
            query.filter(),
            doc! { "meeting_id": "meeting-1", "agenda_item_id": "item-4" }
        );

        let query = PositionQuery::meeting(MeetingId::example()).agenda_item("  ");
        assert_eq!(
            query.filter(),
            doc! { "meeting_id": "meeting-1", "agenda_item_id": null }
        );
    }

    async fn collect(service: &ElectionService, query: &PositionQuery) -> Vec<Position> {
        service
            .positions
            .list(query)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[backend_test]
    async fn create_and_get(service: ElectionService) {
        let created = service
            .positions
            .create(PositionSpec::example())
            .await
            .unwrap();
        assert!(created.is_open);
        assert_eq!(created.poll_id, None);
        assert_eq!(created.position_name, "Chair");

        let fetched = service.positions.get(created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.state().unwrap(), PositionState::Open);
    }

    #[backend_test]
    async fn ids_increase(service: ElectionService) {
        let first = service
            .positions
            .create(PositionSpec::example())
            .await
            .unwrap();
        let second = service
            .positions
            .create(PositionSpec::treasurer_example())
            .await
            .unwrap();
        assert!(second.id > first.id);
    }

    #[backend_test]
    async fn unknown_meeting(service: ElectionService) {
        let spec = PositionSpec::new("meeting-404", "Chair", None, None).unwrap();
        let result = service.positions.create(spec).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[backend_test]
    async fn get_missing(service: ElectionService) {
        let result = service.positions.get(999).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[backend_test]
    async fn create_by_meeting_code(service: ElectionService) {
        let position = service
            .positions
            .create_for_meeting_code("ABC123", "President", None, None)
            .await
            .unwrap();
        assert_eq!(position.meeting_id, MeetingId::example());

        let unknown = service
            .positions
            .create_for_meeting_code("ZZZ999", "President", None, None)
            .await;
        assert!(matches!(unknown, Err(Error::NotFound(_))));

        let blank = service
            .positions
            .create_for_meeting_code(" ", "President", None, None)
            .await;
        assert!(matches!(blank, Err(Error::Validation(_))));

        let blank_name = service
            .positions
            .create_for_meeting_code("ABC123", "", None, None)
            .await;
        assert!(matches!(blank_name, Err(Error::Validation(_))));
    }

    #[backend_test]
    async fn list_in_creation_order(service: ElectionService) {
        let chair = service
            .positions
            .create(PositionSpec::example())
            .await
            .unwrap();
        let treasurer = service
            .positions
            .create(PositionSpec::treasurer_example())
            .await
            .unwrap();
        let elsewhere = PositionSpec::new("meeting-2", "Secretary", None, None).unwrap();
        service.positions.create(elsewhere).await.unwrap();
        service.positions.close(chair.id).await.unwrap();

        let query = PositionQuery::meeting(MeetingId::example());
        let ids: Vec<_> = collect(&service, &query)
            .await
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![chair.id, treasurer.id]);

        // Listing again restarts from the beginning.
        assert_eq!(collect(&service, &query).await.len(), 2);

        let by_item = query.clone().agenda_item("item-4");
        let listed = collect(&service, &by_item).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, treasurer.id);
        let padded = collect(&service, &query.clone().agenda_item(" item-4 ")).await;
        assert_eq!(padded, listed);
        let without_item = collect(&service, &query.clone().agenda_item("")).await;
        assert_eq!(without_item.len(), 1);
        assert_eq!(without_item[0].id, chair.id);

        let open = collect(&service, &query.open_only()).await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, treasurer.id);
    }

    #[backend_test]
    async fn list_is_empty_for_unknown_meeting(service: ElectionService) {
        let query = PositionQuery::meeting("meeting-404".parse().unwrap());
        assert!(collect(&service, &query).await.is_empty());
    }

    #[backend_test]
    async fn close_then_bind(service: ElectionService) {
        let position = service
            .positions
            .create(PositionSpec::example())
            .await
            .unwrap();

        let closed = service.positions.close(position.id).await.unwrap();
        assert!(!closed.is_open);
        assert_eq!(closed.poll_id, None);

        let again = service.positions.close(position.id).await;
        assert!(matches!(again, Err(Error::InvalidState(_))));

        let bound = service
            .positions
            .bind_poll(position.id, "poll-123")
            .await
            .unwrap();
        assert_eq!(bound.state().unwrap(), PositionState::ClosedWithPoll);

        let stored = service.positions.get(position.id).await.unwrap();
        assert_eq!(stored.poll_id, Some("poll-123".parse().unwrap()));
        assert!(!stored.is_open);
    }

    #[backend_test]
    async fn bind_rules(service: ElectionService) {
        let position = service
            .positions
            .create(PositionSpec::example())
            .await
            .unwrap();

        let while_open = service.positions.bind_poll(position.id, "poll-123").await;
        assert!(matches!(while_open, Err(Error::InvalidState(_))));

        service.positions.close(position.id).await.unwrap();
        let blank = service.positions.bind_poll(position.id, "").await;
        assert!(matches!(blank, Err(Error::Validation(_))));

        service
            .positions
            .bind_poll(position.id, "poll-123")
            .await
            .unwrap();
        let rebind = service.positions.bind_poll(position.id, "poll-999").await;
        assert!(matches!(rebind, Err(Error::Conflict(_))));

        let stored = service.positions.get(position.id).await.unwrap();
        assert_eq!(stored.poll_id, Some("poll-123".parse().unwrap()));

        let missing = service.positions.bind_poll(999, "poll-123").await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[backend_test]
    async fn delete_cascades(service: ElectionService, nominations: Coll<Nomination>) {
        let position = service
            .positions
            .create(PositionSpec::example())
            .await
            .unwrap();
        service
            .nominations
            .nominate(position.id, "alice")
            .await
            .unwrap();
        service.nominations.nominate(position.id, "bob").await.unwrap();

        service.positions.delete(position.id).await.unwrap();

        let get = service.positions.get(position.id).await;
        assert!(matches!(get, Err(Error::NotFound(_))));
        let orphans = nominations
            .count_documents(doc! { "position_id": position.id }, None)
            .await
            .unwrap();
        assert_eq!(orphans, 0);

        let again = service.positions.delete(position.id).await;
        assert!(matches!(again, Err(Error::NotFound(_))));
    }

    #[backend_test]
    async fn meeting_cascade(service: ElectionService, db: Database) {
        let chair = service
            .positions
            .create(PositionSpec::example())
            .await
            .unwrap();
        let treasurer = service
            .positions
            .create(PositionSpec::treasurer_example())
            .await
            .unwrap();
        let other_meeting = PositionSpec::new("meeting-2", "Chair", None, None).unwrap();
        let survivor = service.positions.create(other_meeting).await.unwrap();

        for position in [&chair, &treasurer, &survivor] {
            service
                .nominations
                .nominate(position.id, "alice")
                .await
                .unwrap();
        }
        service
            .nominations
            .nominate(treasurer.id, "carol")
            .await
            .unwrap();

        let removed = service
            .positions
            .delete_meeting_positions(&MeetingId::example())
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let nominations = Coll::<Nomination>::from_db(&db);
        let remaining: Vec<Nomination> = nominations
            .find(None, None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].position_id, survivor.id);
        assert_eq!(remaining[0].username, Username::alice());
        assert!(service.positions.get(survivor.id).await.is_ok());

        // Nothing left to remove.
        let removed = service
            .positions
            .delete_meeting_positions(&MeetingId::example())
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }
}
