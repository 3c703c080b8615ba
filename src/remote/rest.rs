use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use super::{sort_snapshot, RemoteError, RemoteStore, Snapshot, Subscription};

/// Initial backoff delay on connection failure
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Maximum backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(300);
/// Whole-request limit for document calls. Live queries have none.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Consecutive failed connection attempts before a live query gives up
const MAX_FAILED_CONNECTS: u32 = 8;

/// Client for a JSON document service.
///
/// Documents live under `{base}/collections/{name}/documents[/{id}]`; live
/// queries are server-sent events at `{base}/collections/{name}/listen`, one
/// `snapshot` event per change carrying the full collection.
pub struct RestRemoteStore {
    client: Client,
    /// Live queries stay open indefinitely, so this client only bounds connecting
    listen_client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct CreatedResponse {
    id: String,
}

impl RestRemoteStore {
    pub fn new(base_url: String, token: Option<String>) -> Result<Self, RemoteError> {
        Self::with_request_timeout(base_url, token, REQUEST_TIMEOUT)
    }

    /// Like [`RestRemoteStore::new`] with a custom limit for document calls
    pub fn with_request_timeout(
        base_url: String,
        token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, RemoteError> {
        // Normalize URL - ensure no trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(RemoteError::Validation(
                "URL must start with http:// or https://".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let listen_client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        Ok(Self {
            client,
            listen_client,
            base_url,
            token,
        })
    }

    fn documents_url(&self, collection: &str) -> String {
        format!("{}/collections/{}/documents", self.base_url, collection)
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.documents_url(collection), id)
    }

    fn listen_url(&self, collection: &str) -> String {
        format!("{}/collections/{}/listen", self.base_url, collection)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response, what: &str) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, what, body))
    }
}

fn status_error(status: StatusCode, what: &str, body: String) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RemoteError::Connectivity(format!("unauthorized for {}", what))
        }
        StatusCode::NOT_FOUND => RemoteError::NotFound(what.to_string()),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            RemoteError::Validation(format!("{}: {}", what, body))
        }
        status => RemoteError::Connectivity(format!("{} - {}: {}", status.as_u16(), what, body)),
    }
}

/// Decode the data of one `snapshot` event
fn parse_snapshot(data: &str, order_key: &str) -> Result<Snapshot, serde_json::Error> {
    let mut snapshot: Snapshot = serde_json::from_str(data)?;
    sort_snapshot(&mut snapshot, order_key);
    Ok(snapshot)
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn create(&self, collection: &str, fields: Value) -> Result<String, RemoteError> {
        let request = self.client.post(self.documents_url(collection)).json(&fields);
        let response = self.authorize(request).send().await?;
        let response = Self::check(response, collection).await?;
        let created: CreatedResponse = response.json().await?;
        Ok(created.id)
    }

    async fn update(&self, collection: &str, id: &str, partial: Value) -> Result<(), RemoteError> {
        let request = self
            .client
            .patch(self.document_url(collection, id))
            .json(&partial);
        let response = self.authorize(request).send().await?;
        Self::check(response, &format!("{}/{}", collection, id)).await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        let request = self.client.delete(self.document_url(collection, id));
        let response = self.authorize(request).send().await?;
        Self::check(response, &format!("{}/{}", collection, id)).await?;
        Ok(())
    }

    async fn subscribe(&self, collection: &str, order_key: &str) -> Result<Subscription, RemoteError> {
        let request = self
            .listen_client
            .get(self.listen_url(collection))
            .query(&[("orderBy", order_key)]);
        let request = self.authorize(request);

        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        tokio::spawn(listen_loop(
            collection.to_string(),
            order_key.to_string(),
            request,
            snapshot_tx,
            cancel_rx,
        ));

        Ok(Subscription::with_cancel(snapshot_rx, cancel_tx))
    }
}

async fn listen_loop(
    collection: String,
    order_key: String,
    request: RequestBuilder,
    snapshots: mpsc::UnboundedSender<Snapshot>,
    mut cancel: oneshot::Receiver<()>,
) {
    use reqwest_eventsource::{Event, EventSource};

    let mut backoff = INITIAL_BACKOFF;
    let mut failed_connects = 0u32;

    loop {
        let Some(attempt) = request.try_clone() else {
            log::error!("listen: request for '{}' cannot be retried", collection);
            return;
        };

        let mut es = match EventSource::new(attempt) {
            Ok(es) => es,
            Err(e) => {
                log::error!("listen: failed to create EventSource for '{}': {}", collection, e);
                return;
            }
        };

        let mut connection_opened = false;

        loop {
            tokio::select! {
                event = es.next() => {
                    match event {
                        Some(Ok(Event::Open)) => {
                            log::info!("listen: live query opened for '{}'", collection);
                            connection_opened = true;
                            failed_connects = 0;
                            backoff = INITIAL_BACKOFF;
                        }
                        Some(Ok(Event::Message(msg))) if msg.event == "snapshot" => {
                            match parse_snapshot(&msg.data, &order_key) {
                                Ok(snapshot) => {
                                    if snapshots.send(snapshot).is_err() {
                                        log::debug!("listen: subscriber for '{}' went away", collection);
                                        es.close();
                                        return;
                                    }
                                }
                                Err(e) => {
                                    log::warn!("listen: undecodable snapshot for '{}': {}", collection, e);
                                }
                            }
                        }
                        Some(Ok(Event::Message(msg))) => {
                            log::debug!("listen: ignoring '{}' event for '{}'", msg.event, collection);
                        }
                        Some(Err(e)) => {
                            log::warn!("listen: stream error for '{}': {}; will reconnect", collection, e);
                            es.close();
                            break;
                        }
                        None => {
                            log::info!("listen: stream for '{}' ended; will reconnect", collection);
                            break;
                        }
                    }
                }
                _ = &mut cancel => {
                    log::info!("listen: cancelled live query for '{}'", collection);
                    es.close();
                    return;
                }
            }
        }

        let reconnect_delay = if connection_opened {
            INITIAL_BACKOFF
        } else {
            failed_connects += 1;
            if failed_connects >= MAX_FAILED_CONNECTS {
                log::error!(
                    "listen: giving up on '{}' after {} failed connects",
                    collection,
                    failed_connects
                );
                return;
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
            backoff
        };

        log::info!("listen: reconnecting '{}' in {:?}", collection, reconnect_delay);

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = &mut cancel => {
                log::info!("listen: cancelled during reconnect delay for '{}'", collection);
                return;
            }
        }
    }
}
