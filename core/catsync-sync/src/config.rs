//! Engine configuration.

use crate::error::{SyncError, SyncResult};
use std::fmt;
use std::time::Duration;

/// Default number of records applied per storage transaction.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Configuration for talking to the catalog service and batching its records.
///
/// Built explicitly by the caller and handed to [`CatalogClient`](crate::CatalogClient);
/// nothing here is read from the environment.
#[derive(Clone)]
pub struct SyncConfig {
    /// Scheme and host of the catalog service, e.g. `https://catalog.example.com`.
    pub service_host: String,
    /// Business service segment of resource URLs.
    pub business_service: String,
    /// API version, used as `/api/v{n}`.
    pub api_version: u32,
    pub user: String,
    pub password: String,
    /// Country segment of resource URLs.
    pub country: String,
    /// Optional `lang` query parameter for record fetches.
    pub lang: Option<String>,
    pub batch_size: usize,
    /// Limit on each read of a response body, and on the whole request for
    /// the auth, schema and state calls. Record streams have no total limit.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Age after which the session token is renewed before the next call.
    pub token_validity: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            service_host: String::new(),
            business_service: String::new(),
            api_version: 1,
            user: String::new(),
            password: String::new(),
            country: String::new(),
            lang: None,
            batch_size: DEFAULT_BATCH_SIZE,
            request_timeout: Duration::from_secs(1000),
            connect_timeout: Duration::from_secs(30),
            token_validity: Duration::from_secs(29 * 60),
        }
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("service_host", &self.service_host)
            .field("business_service", &self.business_service)
            .field("api_version", &self.api_version)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("country", &self.country)
            .field("lang", &self.lang)
            .field("batch_size", &self.batch_size)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("token_validity", &self.token_validity)
            .finish()
    }
}

impl SyncConfig {
    fn api_root(&self) -> String {
        format!(
            "{}/api/v{}",
            self.service_host.trim_end_matches('/'),
            self.api_version
        )
    }

    /// `{host}/api/v{n}/auth`
    pub fn auth_url(&self) -> String {
        format!("{}/auth", self.api_root())
    }

    /// `{host}/api/v{n}/{business_service}`
    pub fn resource_base(&self) -> String {
        format!(
            "{}/{}",
            self.api_root(),
            self.business_service.trim_matches('/')
        )
    }

    /// Rejects configurations that cannot produce valid requests.
    pub fn validate(&self) -> SyncResult<()> {
        let required = [
            ("service_host", &self.service_host),
            ("business_service", &self.business_service),
            ("country", &self.country),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(SyncError::Config(format!("`{field}` must not be empty")));
            }
        }
        if self.batch_size == 0 {
            return Err(SyncError::Config("`batch_size` must be positive".into()));
        }
        Ok(())
    }
}
