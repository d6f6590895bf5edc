/*!
 * Remote login sync
 *
 * Fetches a JSON array of logins from a user-configured URL. Requests are
 * ticketed: only the most recently started sync may replace the remote
 * logins, an older one that resolves later is discarded.
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pwm_logins::{logins_from_value, ImportReport, LoginError};
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Remote URL is empty")]
    EmptyUrl,

    #[error("Invalid remote URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Permission to access {0} was denied")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    Network(String),

    #[error("Remote returned HTTP {0}")]
    Status(u16),

    #[error("Invalid login list: {0}")]
    Format(#[from] LoginError),

    #[error("Sync superseded by a newer request")]
    Superseded,
}

/// Host-permission pattern covering `url`, e.g. `https://example.com/*`
pub fn origin_pattern(url: &str) -> Result<String, SyncError> {
    if url.trim().is_empty() {
        return Err(SyncError::EmptyUrl);
    }

    let invalid = |reason: String| SyncError::InvalidUrl {
        url: url.to_string(),
        reason,
    };

    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| invalid("missing host".to_string()))?;

    Ok(format!("{}://{}/*", parsed.scheme(), host))
}

// ============================================================================
// Fetching
// ============================================================================

#[async_trait(?Send)]
pub trait Fetch {
    /// GET `url` and parse the body as JSON
    async fn fetch_json(&self, url: &str) -> Result<Value, SyncError>;
}

/// `Fetch` over a reqwest client. No timeout is applied.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait(?Send)]
impl Fetch for ReqwestFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value, SyncError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::Status(response.status().as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SyncError::Format(LoginError::Parse(e.to_string())))
    }
}

// ============================================================================
// Sequencing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SyncTicket(u64);

/// Hands out tickets and decides which completed fetch may be applied
#[derive(Debug, Default)]
pub struct RemoteSync {
    latest: u64,
}

impl RemoteSync {
    pub fn begin(&mut self) -> SyncTicket {
        self.latest += 1;
        SyncTicket(self.latest)
    }

    pub fn is_current(&self, ticket: SyncTicket) -> bool {
        ticket.0 == self.latest
    }

    /// Validate a fetched body, unless a newer sync has started since
    pub fn complete(
        &self,
        ticket: SyncTicket,
        body: Result<Value, SyncError>,
    ) -> Result<ImportReport, SyncError> {
        if !self.is_current(ticket) {
            return Err(SyncError::Superseded);
        }
        Ok(logins_from_value(body?)?)
    }
}

/// A sync that passed the permission gate and holds a ticket
pub struct PendingSync {
    pub(crate) ticket: SyncTicket,
    pub(crate) url: String,
    pub(crate) fetcher: Rc<dyn Fetch>,
}

impl PendingSync {
    pub fn ticket(&self) -> SyncTicket {
        self.ticket
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(self) -> FetchedSync {
        tracing::debug!("Fetching remote logins from {}", self.url);
        let body = self.fetcher.fetch_json(&self.url).await;
        FetchedSync {
            ticket: self.ticket,
            url: self.url,
            body,
        }
    }
}

/// Result of a fetch, waiting to be applied
#[derive(Debug)]
pub struct FetchedSync {
    pub(crate) ticket: SyncTicket,
    pub(crate) url: String,
    pub(crate) body: Result<Value, SyncError>,
}

/// Metadata of the last applied sync
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub url: String,
    pub admitted: usize,
    pub rejected: usize,
    pub synced_at: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================
