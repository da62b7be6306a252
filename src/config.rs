use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

/// Default location of the configuration file.
pub const CONFIG_FILE: &str = "Election.toml";

/// Prefix for environment variable overrides, e.g. `ELECTION_DB_URI`.
pub const ENV_PREFIX: &str = "ELECTION_";

/// Service configuration, derived from `Election.toml` and `ELECTION_*`
/// environment variables, with the environment taking precedence.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // secrets
    db_uri: String,
    // non-secrets
    #[serde(default = "default_database")]
    database: String,
    meeting_service_url: String,
    voting_service_url: String,
    #[serde(default = "default_service_timeout")]
    service_timeout: u64,
    #[serde(default = "default_producer")]
    producer: String,
    #[serde(default = "default_min_poll_candidates")]
    min_poll_candidates: u32,
    #[serde(default = "default_poll_claim_timeout")]
    poll_claim_timeout: u32,
}

fn default_database() -> String {
    "elections".to_string()
}

fn default_service_timeout() -> u64 {
    5
}

fn default_producer() -> String {
    "election-service".to_string()
}

fn default_min_poll_candidates() -> u32 {
    2
}

fn default_poll_claim_timeout() -> u32 {
    60
}

impl Config {
    /// Load from the default file and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load from the given TOML file and the environment.
    /// A missing file is not an error; the environment may supply everything.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// MongoDB connection string. Transactions require a replica set.
    pub fn db_uri(&self) -> &str {
        &self.db_uri
    }

    /// Name of the database holding positions and nominations.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Base URL of the meeting service.
    pub fn meeting_service_url(&self) -> &str {
        self.meeting_service_url.trim_end_matches('/')
    }

    /// Base URL of the voting service.
    pub fn voting_service_url(&self) -> &str {
        self.voting_service_url.trim_end_matches('/')
    }

    /// Upper bound on any single call to a remote service.
    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout)
    }

    /// Name stamped on outgoing events.
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Accepted candidates required before a poll is opened.
    pub fn min_poll_candidates(&self) -> u32 {
        self.min_poll_candidates
    }

    /// How long an unfinished poll creation blocks further attempts.
    pub fn poll_claim_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.poll_claim_timeout))
    }
}
