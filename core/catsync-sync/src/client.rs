//! HTTP client for the catalog service.

use crate::auth::SessionManager;
use crate::config::SyncConfig;
use crate::engine::SyncPass;
use crate::error::{SyncError, SyncResult};
use crate::stream::RecordStream;
use catsync_model::Schema;
use catsync_store::values::format_timestamp;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, error};

/// How a response body is consumed. Documents are read whole and get a
/// total request timeout; streams are only bounded per read.
#[derive(Clone, Copy)]
enum Body {
    Document,
    Stream,
}

#[derive(Debug, Deserialize)]
struct StateResponse {
    total_items: u64,
}

/// Client for the catalog service's schema, record and state endpoints.
///
/// Every call goes through the session manager first, so an expired token is
/// renewed transparently before the request is sent.
pub struct CatalogClient {
    http: Client,
    config: SyncConfig,
    session: SessionManager,
}

impl CatalogClient {
    pub fn new(config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        // Per-read limit only; record streams have no total bound.
        let http = Client::builder()
            .read_timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;
        let session = SessionManager::new(http.clone(), &config);

        Ok(Self {
            http,
            config,
            session,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Obtains a fresh session token.
    pub async fn authenticate(&self) -> SyncResult<()> {
        self.session.authenticate().await.map(drop)
    }

    /// Downloads and parses the resource schema.
    pub async fn fetch_schema(&self) -> SyncResult<Schema> {
        let endpoint = format!("{}/resource/schema", self.config.resource_base());
        let response = self.get("schema", &endpoint, &[], Body::Document).await?;
        let text = response
            .text()
            .await
            .map_err(|e| fetch_error("schema", &endpoint, None, format!("reading schema body: {e}")))?;
        Ok(Schema::from_json_str(&text)?)
    }

    /// Opens the record stream of one pass. `since` anchors delta passes.
    pub async fn open_pass(
        &self,
        resource: &str,
        pass: SyncPass,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<RecordStream> {
        let endpoint = format!(
            "{}/{}/lines",
            self.resource_url(resource),
            pass.segment()
        );

        let mut query = Vec::new();
        if let Some(lang) = self.config.lang.as_deref().filter(|l| !l.is_empty()) {
            query.push(("lang", lang.to_string()));
        }
        if pass.is_delta() {
            if let Some(ts) = since {
                query.push(("delta_timestamp", format_timestamp(&ts)));
            }
        }

        let response = self.get(resource, &endpoint, &query, Body::Stream).await?;
        Ok(RecordStream::from_response(resource, &endpoint, response))
    }

    /// Server-side item count of a resource.
    pub async fn fetch_state(
        &self,
        resource: &str,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<u64> {
        let endpoint = format!("{}/state", self.resource_url(resource));
        let query: Vec<_> = since
            .map(|ts| ("delta_timestamp", format_timestamp(&ts)))
            .into_iter()
            .collect();

        let response = self.get(resource, &endpoint, &query, Body::Document).await?;
        let state: StateResponse = response.json().await.map_err(|e| {
            fetch_error(resource, &endpoint, None, format!("invalid state body: {e}"))
        })?;
        Ok(state.total_items)
    }

    fn resource_url(&self, resource: &str) -> String {
        format!(
            "{}/resource/{resource}/{}",
            self.config.resource_base(),
            self.config.country
        )
    }

    async fn get(
        &self,
        resource: &str,
        endpoint: &str,
        query: &[(&str, String)],
        body: Body,
    ) -> SyncResult<Response> {
        let token = self.session.token().await?;
        debug!(resource, endpoint, "GET");

        let mut request = self
            .http
            .get(endpoint)
            .header(AUTHORIZATION, token)
            .query(query);
        if let Body::Document = body {
            request = request.timeout(self.config.request_timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| {
                error!(resource, endpoint, error = %e, "request failed");
                fetch_error(resource, endpoint, None, e.to_string())
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            error!(resource, endpoint, status = status.as_u16(), "unexpected response status");
            return Err(fetch_error(resource, endpoint, Some(status.as_u16()), body));
        }
        Ok(response)
    }
}

fn fetch_error(resource: &str, endpoint: &str, status: Option<u16>, message: String) -> SyncError {
    SyncError::Fetch {
        resource: resource.to_string(),
        endpoint: endpoint.to_string(),
        status,
        message,
    }
}
