//! Session token handling.
//!
//! Every outbound call asks [`SessionManager::token`] first; the manager logs
//! in again when no token is held or the held one has reached the validity
//! window. Renewal happens under an async mutex, so concurrent callers wait
//! for a single login instead of racing.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

#[derive(Serialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

struct Session {
    token: String,
    issued_at: Instant,
}

/// Issues and renews the session token shared by all requests of a run.
pub struct SessionManager {
    http: Client,
    auth_url: String,
    credentials: Credentials,
    validity: Duration,
    request_timeout: Duration,
    session: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(http: Client, config: &SyncConfig) -> Self {
        Self {
            http,
            auth_url: config.auth_url(),
            credentials: Credentials {
                username: config.user.clone(),
                password: config.password.clone(),
            },
            validity: config.token_validity,
            request_timeout: config.request_timeout,
            session: Mutex::new(None),
        }
    }

    /// Logs in unconditionally, replacing any held token.
    pub async fn authenticate(&self) -> SyncResult<String> {
        let mut session = self.session.lock().await;
        self.login(&mut session).await
    }

    /// Returns a token that is younger than the validity window, logging in
    /// first if necessary.
    pub async fn token(&self) -> SyncResult<String> {
        let mut session = self.session.lock().await;
        if let Some(current) = session.as_ref() {
            if current.issued_at.elapsed() < self.validity {
                return Ok(current.token.clone());
            }
            debug!("session token expired, renewing");
        }
        self.login(&mut session).await
    }

    async fn login(&self, slot: &mut Option<Session>) -> SyncResult<String> {
        debug!(url = %self.auth_url, user = %self.credentials.username, "authenticating");

        let response = self
            .http
            .post(&self.auth_url)
            .json(&self.credentials)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| SyncError::Auth {
                status: None,
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "authentication rejected");
            return Err(SyncError::Auth {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        let issued: TokenResponse = response.json().await.map_err(|e| SyncError::Auth {
            status: Some(status.as_u16()),
            message: format!("invalid token response: {e}"),
        })?;

        *slot = Some(Session {
            token: issued.token.clone(),
            issued_at: Instant::now(),
        });
        info!("authenticated against catalog service");
        Ok(issued.token)
    }
}
