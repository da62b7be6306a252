use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::config::Config;
use crate::error::Result;
use crate::model::api::poll::{Event, PollRequest};
use crate::model::common::position::PollId;

use super::{base_url, endpoint, http_client, unexpected};

const SERVICE: &str = "voting service";

/// The service that owns polls and tallies votes.
#[async_trait]
pub trait VotingService: Send + Sync {
    /// Ask for a poll to be opened, returning its ID once it is accepted.
    async fn create_poll(&self, request: &PollRequest) -> Result<PollId>;
}

/// The voting service, over HTTP.
pub struct HttpVotingService {
    client: Client,
    base: Url,
    producer: String,
}

impl HttpVotingService {
    pub fn new(base: &str, timeout: Duration, producer: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base: base_url(base, SERVICE)?,
            producer: producer.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.voting_service_url(),
            config.service_timeout(),
            config.producer(),
        )
    }
}

#[async_trait]
impl VotingService for HttpVotingService {
    async fn create_poll(&self, request: &PollRequest) -> Result<PollId> {
        let event = Event::voting_create(&self.producer, request.clone());
        debug!(
            "Publishing {} event {} for poll {}",
            event.event_type, event.event_id, request.poll_id
        );

        let url = endpoint(&self.base, &["polls", ""]);
        let response = self.client.post(url).json(&event).send().await?;
        if !response.status().is_success() {
            return Err(unexpected(SERVICE, &response));
        }
        Ok(request.poll_id.clone())
    }
}
