//! Clients for the services this one depends on but does not own.

mod meetings;
mod voting;

use reqwest::{Client, Response, Url};

use crate::error::{Error, Result};

pub use meetings::{HttpMeetingDirectory, MeetingDirectory};
pub use voting::{HttpVotingService, VotingService};

#[cfg(test)]
pub(crate) use meetings::stubs::StaticMeetingDirectory;
#[cfg(test)]
pub(crate) use voting::stubs::RecordingVotingService;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Parse and check a configured service base URL.
fn base_url(raw: &str, service: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|err| Error::Validation(format!("Invalid {service} URL {raw:?}: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(Error::Validation(format!(
            "Invalid {service} URL {raw:?}: not a base URL"
        )));
    }
    Ok(url)
}

/// Append percent-encoded path segments to a base URL.
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    // Base URLs are checked in `base_url`, so this always succeeds.
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn http_client(timeout: std::time::Duration) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

/// Turn an unexpected status into an upstream failure.
fn unexpected(service: &str, response: &Response) -> Error {
    Error::Upstream(format!(
        "{service} returned {} for {}",
        response.status(),
        response.url()
    ))
}
