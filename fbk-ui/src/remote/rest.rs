//! HTTP remote store
//!
//! Talks to a PostgREST-style row API:
//! - `POST   {base}/rest/v1/{table}` with `Prefer: return=representation`
//! - `GET    {base}/rest/v1/{table}?select=*&id=eq.{id}`
//! - `GET    {base}/rest/v1/{table}?select=*&order=created_at.desc`
//!
//! and to a Server-Sent Events change feed at `{base}/{changes_path}` whose
//! `INSERT` / `UPDATE` / `DELETE` events are change notices. Heartbeat
//! comments and `ConnectionStatus` events are ignored.
//!
//! Every request carries the API key both as `apikey` and as a bearer token.

use super::{ChangeNotice, ChangeSubscription, RemoteStore};
use async_trait::async_trait;
use fbk_common::config::BackendConfig;
use fbk_common::events::ChangeKind;
use fbk_common::sse::SseDecoder;
use fbk_common::{Error, NewRecord, Record, RecordId, Result};
use futures::stream::StreamExt;
use reqwest::{header, Client, RequestBuilder, Response, Url};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connect timeout for all requests (the change feed itself has no overall timeout)
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// REST + SSE backend client
pub struct RestRemoteStore {
    http_client: Client,
    rows_url: Url,
    changes_url: Url,
    api_key: Option<String>,
    request_timeout: Duration,
}

impl RestRemoteStore {
    /// Build a client from backend configuration
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        let rows_url = parse_url(&format!("{}/rest/v1/{}", base, config.table.trim()))?;
        let changes_url = parse_url(&format!(
            "{}/{}",
            base,
            config.changes_path.trim_start_matches('/')
        ))?;

        let http_client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("fbk-ui/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!(rows = %rows_url, changes = %changes_url, "REST remote store configured");

        Ok(Self {
            http_client,
            rows_url,
            changes_url,
            api_key: config.api_key.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    async fn get_rows(&self, query: &[(&str, String)]) -> Result<Vec<Record>> {
        let request = self
            .http_client
            .get(self.rows_url.clone())
            .query(query)
            .timeout(self.request_timeout);

        let response = self.authorize(request).send().await?;
        read_rows(response).await
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::Config(format!("invalid backend URL `{}`: {}", raw, e)))
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown").to_string()
    } else {
        body
    };
    Err(Error::Backend {
        status: status.as_u16(),
        message,
    })
}

async fn read_rows(response: Response) -> Result<Vec<Record>> {
    let response = ensure_success(response).await?;
    let body = response.bytes().await?;
    serde_json::from_slice(&body)
        .map_err(|e| Error::Decode(format!("Failed to parse record rows: {}", e)))
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn insert_record(&self, record: &NewRecord) -> Result<Record> {
        let request = self
            .http_client
            .post(self.rows_url.clone())
            .header("Prefer", "return=representation")
            .timeout(self.request_timeout)
            .json(record);

        let response = self.authorize(request).send().await?;
        let row = read_rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Decode("insert returned no rows".to_string()))?;

        debug!(record_id = %row.id, "Record inserted");
        Ok(row)
    }

    async fn fetch_record(&self, id: RecordId) -> Result<Option<Record>> {
        let rows = self
            .get_rows(&[("select", "*".to_string()), ("id", format!("eq.{}", id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_all(&self) -> Result<Vec<Record>> {
        self.get_rows(&[
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ])
        .await
    }

    async fn subscribe(&self) -> Result<ChangeSubscription> {
        let request = self
            .http_client
            .get(self.changes_url.clone())
            .header(header::ACCEPT, "text/event-stream");

        let response = ensure_success(self.authorize(request).send().await?).await?;
        info!(url = %self.changes_url, "Change feed connected");

        let mut body = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, "Change feed read failed");
                        break;
                    }
                };
                for frame in decoder.push(&chunk) {
                    match ChangeKind::from_event_name(frame.event_name()) {
                        Some(kind) if kind.invalidates_view() => yield ChangeNotice { kind },
                        _ => debug!(event = frame.event_name(), "Ignoring change feed event"),
                    }
                }
            }
            debug!("Change feed body ended");
        };

        Ok(ChangeSubscription::new("rest", stream))
    }
}
