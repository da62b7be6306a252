use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::common::position::MeetingId;

use super::{base_url, endpoint, http_client, unexpected};

const SERVICE: &str = "meeting service";

/// Where meetings live. Positions may only be created for meetings it knows.
#[async_trait]
pub trait MeetingDirectory: Send + Sync {
    /// Does the meeting exist?
    async fn meeting_exists(&self, meeting_id: &MeetingId) -> Result<bool>;

    /// Look up the meeting a join code refers to, if any.
    async fn resolve_code(&self, code: &str) -> Result<Option<MeetingId>>;
}

/// The meeting service, over HTTP.
pub struct HttpMeetingDirectory {
    client: Client,
    base: Url,
}

impl HttpMeetingDirectory {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base: base_url(base, SERVICE)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.meeting_service_url(), config.service_timeout())
    }
}

/// The meeting service has returned IDs both as numbers and as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMeetingId {
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct CodeLookup {
    meeting_id: Option<RawMeetingId>,
}

#[async_trait]
impl MeetingDirectory for HttpMeetingDirectory {
    async fn meeting_exists(&self, meeting_id: &MeetingId) -> Result<bool> {
        let url = endpoint(&self.base, &["meetings", &**meeting_id]);
        let response = self.client.get(url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(unexpected(SERVICE, &response)),
        }
    }

    async fn resolve_code(&self, code: &str) -> Result<Option<MeetingId>> {
        let url = endpoint(&self.base, &["code", code]);
        let response = self.client.get(url).send().await?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Ok(None),
            _ => return Err(unexpected(SERVICE, &response)),
        }

        let lookup: CodeLookup = response.json().await?;
        let raw = match lookup.meeting_id {
            Some(RawMeetingId::Number(n)) => n.to_string(),
            Some(RawMeetingId::Text(s)) => s,
            None => return Ok(None),
        };
        MeetingId::try_from(raw).map(Some).map_err(|_| {
            Error::Upstream(format!("{SERVICE} returned a blank meeting ID for code {code}"))
        })
    }
}


#[cfg(test)]
mod tests {
    use super::super::test_server::serve_once;
    use super::*;

    fn directory(url: &str) -> HttpMeetingDirectory {
        HttpMeetingDirectory::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn existing_meeting() {
        let (url, request) = serve_once(200, r#"{"meeting_id": "meeting-1"}"#).await;
        assert!(directory(&url)
            .meeting_exists(&MeetingId::example())
            .await
            .unwrap());
        assert!(request.await.unwrap().starts_with("GET /meetings/meeting-1 "));
    }

    #[tokio::test]
    async fn missing_meeting() {
        let (url, _request) = serve_once(404, "{}").await;
        assert!(!directory(&url)
            .meeting_exists(&MeetingId::example())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn server_error_is_upstream() {
        let (url, _request) = serve_once(503, "{}").await;
        let result = directory(&url).meeting_exists(&MeetingId::example()).await;
        assert!(matches!(result, Err(Error::Upstream(_))));
    }

    #[tokio::test]
    async fn numeric_meeting_code() {
        let (url, request) =
            serve_once(200, r#"{"meeting_id": 123, "meeting_code": "ABC123"}"#).await;
        let meeting = directory(&url).resolve_code("ABC123").await.unwrap();
        assert_eq!(meeting, Some("123".parse().unwrap()));
        assert!(request.await.unwrap().starts_with("GET /code/ABC123 "));
    }

    #[tokio::test]
    async fn textual_meeting_code() {
        let (url, _request) = serve_once(200, r#"{"meeting_id": "m-9"}"#).await;
        let meeting = directory(&url).resolve_code("XYZ").await.unwrap();
        assert_eq!(meeting, Some("m-9".parse().unwrap()));
    }

    #[tokio::test]
    async fn unknown_meeting_code() {
        let (url, _request) = serve_once(404, "{}").await;
        assert_eq!(directory(&url).resolve_code("NOPE").await.unwrap(), None);

        let (url, _request) = serve_once(200, r#"{"meeting_code": "NOPE"}"#).await;
        assert_eq!(directory(&url).resolve_code("NOPE").await.unwrap(), None);
    }

    #[tokio::test]
    async fn static_directory() {
        let directory = stubs::StaticMeetingDirectory::example();
        assert!(directory
            .meeting_exists(&MeetingId::example2())
            .await
            .unwrap());
        assert!(!directory
            .meeting_exists(&"meeting-3".parse().unwrap())
            .await
            .unwrap());
        assert_eq!(
            directory.resolve_code("ABC123").await.unwrap(),
            Some(MeetingId::example())
        );
    }
}
