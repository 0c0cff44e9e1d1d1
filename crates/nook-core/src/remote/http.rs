//! REST client for a hosted document store.
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `PUT    v1/users/{uid}/{collection}/{id}` merge-write a record
//! - `DELETE v1/users/{uid}/{collection}/{id}` delete a record (404 is fine)
//! - `GET    v1/users/{uid}/{collection}` list `{"documents": [...]}`
//! - `PUT    v1/users/{uid}/settings` merge-write settings
//! - `GET    v1/users/{uid}/settings` fetch settings (404 means none yet)
//!
//! Change feeds are emulated by polling the list endpoints and diffing
//! snapshots. A failed poll keeps the last good snapshot, so the next
//! successful one still reports documents deleted in between as `Removed`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::{
    Change, ChangeStream, FeedMessage, FeedTarget, RemoteDocument, RemoteError, RemoteResult,
    RemoteStore, RemoteWrite,
};
use crate::models::{Collection, RecordId};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const HTTP_TIMEOUT_SECS: u64 = 15;

#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: Url,
    auth_token: Option<String>,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteStore")
            .field("base_url", &self.base_url.as_str())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteBody<'a> {
    fields: &'a Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<i64>,
}

#[derive(Deserialize)]
struct DocumentList {
    #[serde(default)]
    documents: Vec<RemoteDocument>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        poll_interval: Duration,
    ) -> RemoteResult<Self> {
        let base_url = normalize_text_option(Some(base_url.into())).ok_or_else(|| {
            RemoteError::InvalidConfiguration("remote URL must not be empty".to_string())
        })?;
        if !is_http_url(&base_url) {
            return Err(RemoteError::InvalidConfiguration(
                "remote URL must include http:// or https://".to_string(),
            ));
        }
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|error| RemoteError::InvalidConfiguration(error.to_string()))?;
        if poll_interval.is_zero() {
            return Err(RemoteError::InvalidConfiguration(
                "poll interval must be positive".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            auth_token: normalize_text_option(auth_token),
            poll_interval,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
                .build()?,
        })
    }

    fn url(&self, uid: &str, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RemoteError::InvalidConfiguration("remote URL cannot be a base".to_string())
            })?
            .pop_if_empty()
            .extend(["v1", "users", uid])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let request = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn write(&self, url: Url, body: &WriteBody<'_>) -> RemoteResult<RemoteDocument> {
        let response = self
            .request(reqwest::Method::PUT, url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        response
            .json::<RemoteDocument>()
            .await
            .map_err(|error| RemoteError::InvalidPayload(error.to_string()))
    }

    /// Current state of a feed target
    async fn fetch(&self, uid: &str, target: FeedTarget) -> RemoteResult<Vec<RemoteDocument>> {
        let url = self.url(uid, &[target.name()])?;
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(transport_error)?;

        match target {
            FeedTarget::Settings if response.status() == StatusCode::NOT_FOUND => Ok(Vec::new()),
            FeedTarget::Settings => {
                let response = check_status(response).await?;
                let document = response
                    .json::<RemoteDocument>()
                    .await
                    .map_err(|error| RemoteError::InvalidPayload(error.to_string()))?;
                Ok(vec![document])
            }
            FeedTarget::Collection(_) => {
                let response = check_status(response).await?;
                let list = response
                    .json::<DocumentList>()
                    .await
                    .map_err(|error| RemoteError::InvalidPayload(error.to_string()))?;
                Ok(list.documents)
            }
        }
    }

    async fn poll_feed(
        self,
        uid: String,
        target: FeedTarget,
        sender: mpsc::UnboundedSender<FeedMessage>,
    ) {
        let mut known = BTreeMap::new();
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if sender.is_closed() {
                break;
            }

            let message = match self.fetch(&uid, target).await {
                Ok(documents) => {
                    let changes = diff_snapshot(&mut known, documents);
                    if changes.is_empty() {
                        continue;
                    }
                    Ok(changes)
                }
                Err(error) => {
                    tracing::warn!("Polling {} feed failed: {}", target, error);
                    Err(error)
                }
            };

            if sender.send(message).is_err() {
                break;
            }
        }
        tracing::debug!("Stopped polling {} feed", target);
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn upsert(
        &self,
        uid: &str,
        collection: Collection,
        write: RemoteWrite,
    ) -> RemoteResult<RemoteDocument> {
        let id = write.id.as_str();
        let url = self.url(uid, &[collection.remote_name(), &id])?;
        self.write(
            url,
            &WriteBody {
                fields: &write.fields,
                created_at: write.created_at,
            },
        )
        .await
    }

    async fn delete(&self, uid: &str, collection: Collection, id: &RecordId) -> RemoteResult<()> {
        let id = id.as_str();
        let url = self.url(uid, &[collection.remote_name(), &id])?;
        let response = self
            .request(reqwest::Method::DELETE, url)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }

    async fn upsert_settings(
        &self,
        uid: &str,
        fields: Map<String, Value>,
    ) -> RemoteResult<RemoteDocument> {
        let url = self.url(uid, &[FeedTarget::Settings.name()])?;
        self.write(
            url,
            &WriteBody {
                fields: &fields,
                created_at: None,
            },
        )
        .await
    }

    async fn snapshot(&self, uid: &str, target: FeedTarget) -> RemoteResult<Vec<RemoteDocument>> {
        self.fetch(uid, target).await
    }

    async fn subscribe(&self, uid: &str, target: FeedTarget) -> RemoteResult<ChangeStream> {
        let (sender, stream) = ChangeStream::channel();
        let poller = tokio::spawn(self.clone().poll_feed(uid.to_string(), target, sender));
        Ok(stream.with_poller(poller))
    }
}

/// Compare a fresh snapshot with the previously seen one
fn diff_snapshot(
    known: &mut BTreeMap<String, RemoteDocument>,
    documents: Vec<RemoteDocument>,
) -> Vec<Change> {
    let mut seen: BTreeMap<String, RemoteDocument> = documents
        .into_iter()
        .map(|document| (document.id.clone(), document))
        .collect();

    let mut changes: Vec<Change> = known
        .keys()
        .filter(|id| !seen.contains_key(*id))
        .map(|id| Change::Removed(id.clone()))
        .collect();

    for (id, document) in &seen {
        match known.get(id) {
            None => changes.push(Change::Added(document.clone())),
            Some(previous) if previous != document => {
                changes.push(Change::Modified(document.clone()));
            }
            Some(_) => {}
        }
    }

    std::mem::swap(known, &mut seen);
    changes
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_connect() || error.is_timeout() {
        RemoteError::Offline
    } else {
        RemoteError::Transport(error)
    }
}

async fn check_status(response: reqwest::Response) -> RemoteResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Http {
        status: status.as_u16(),
        message: parse_api_error(status, &body),
    })
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed
    }
}
