#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use std::sync::Arc;

use mongodb::{Client, Database};

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod remote;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};

use model::mongodb::{ensure_indexes_exist, ensure_position_id_counter_exists, Coll};
use remote::{HttpMeetingDirectory, HttpVotingService, MeetingDirectory, VotingService};
use store::{Collections, NominationLedger, PollCoordinator, PollSettings, PositionStore};

/// Everything the election service offers, wired to one database.
#[derive(Clone)]
pub struct ElectionService {
    pub positions: PositionStore,
    pub nominations: NominationLedger,
    pub polls: PollCoordinator,
}

impl ElectionService {
    /// Connect to the configured database, prepare it, and talk to the
    /// configured meeting and voting services over HTTP.
    pub async fn connect(config: &Config) -> Result<Self> {
        info!("Connecting to database {}", config.database());
        let client = Client::with_uri_str(config.db_uri()).await?;
        let db = client.database(config.database());
        bootstrap(&db).await?;

        let meetings = Arc::new(HttpMeetingDirectory::from_config(config)?);
        let voting = Arc::new(HttpVotingService::from_config(config)?);
        Ok(Self::from_parts(
            &db,
            meetings,
            voting,
            PollSettings::from_config(config),
        ))
    }

    /// Assemble the service from an already-prepared database and any
    /// collaborators.
    pub fn from_parts(
        db: &Database,
        meetings: Arc<dyn MeetingDirectory>,
        voting: Arc<dyn VotingService>,
        poll_settings: PollSettings,
    ) -> Self {
        let collections = Collections::from_db(db);
        let positions = PositionStore::new(collections.clone(), meetings);
        let nominations = NominationLedger::new(collections.clone());
        let polls = PollCoordinator::new(
            collections,
            positions.clone(),
            nominations.clone(),
            voting,
            poll_settings,
        );
        Self {
            positions,
            nominations,
            polls,
        }
    }
}

/// Create the indexes and counters the stores rely on.
///
/// This operation is idempotent.
pub async fn bootstrap(db: &Database) -> Result<()> {
    ensure_indexes_exist(db).await?;
    ensure_position_id_counter_exists(&Coll::from_db(db)).await?;
    Ok(())
}
