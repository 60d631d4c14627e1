
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{HelpdeskApi, HelpdeskCredentials, Ticket, TicketFilter, TicketThread};
use crate::SupportError;
use crate::config::HarvestConfig;

/// Upper bound on a server-requested Retry-After wait
const MAX_RETRY_AFTER_SECONDS: u64 = 120;

/// Freshdesk v2 REST client
#[derive(Debug, Clone)]
pub struct FreshdeskClient {
    agent: ureq::Agent,
    throttle_backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Ticket>,
}

impl FreshdeskClient {
    #[inline]
    pub fn new(config: &HarvestConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .http_status_as_error(false)
            .user_agent(concat!("support-rag/", env!("CARGO_PKG_VERSION")))
            .build()
            .into();

        Self {
            agent,
            throttle_backoff: Duration::from_secs(config.throttle_backoff_seconds),
        }
    }

    /// Wait used on HTTP 429 when the response carries no Retry-After
    #[inline]
    pub fn with_throttle_backoff(mut self, backoff: Duration) -> Self {
        self.throttle_backoff = backoff;
        self
    }

    fn build_url(
        credentials: &HelpdeskCredentials,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Url> {
        let mut url = Url::parse(credentials.base_url())
            .and_then(|base| base.join(path))
            .with_context(|| format!("Invalid helpdesk URL: {}", credentials.base_url()))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    fn authorization(credentials: &HelpdeskCredentials) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:X", credentials.api_key())))
    }

    /// GET a JSON document, honouring one 429 Retry-After before giving up
    fn get_json<T: DeserializeOwned>(&self, credentials: &HelpdeskCredentials, url: &Url) -> Result<T> {
        let auth = Self::authorization(credentials);

        for attempt in 1..=2 {
            debug!("GET {} (attempt {})", url, attempt);

            let mut response = self
                .agent
                .get(url.as_str())
                .header("Authorization", &auth)
                .header("Content-Type", "application/json")
                .call()
                .with_context(|| format!("Failed to reach helpdesk at {}", url))?;

            let status = response.status().as_u16();
            if status == 429 && attempt == 1 {
                let wait = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map_or(self.throttle_backoff, |secs| {
                        Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECONDS))
                    });
                warn!("Helpdesk rate limit hit, waiting {:?} before retrying", wait);
                std::thread::sleep(wait);
                continue;
            }

            let body = response
                .body_mut()
                .read_to_string()
                .context("Failed to read helpdesk response")?;

            if !(200..300).contains(&status) {
                return Err(anyhow!("Helpdesk returned HTTP {}: {}", status, truncate(&body, 200)));
            }

            return serde_json::from_str(&body).context("Failed to parse helpdesk response");
        }

        Err(anyhow!("Helpdesk rate limit persisted after retry"))
    }

    async fn fetch<T>(&self, credentials: &HelpdeskCredentials, url: Url) -> crate::Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        let credentials = credentials.clone();
        tokio::task::spawn_blocking(move || client.get_json::<T>(&credentials, &url))
            .await
            .map_err(|e| SupportError::Helpdesk(format!("helpdesk task failed: {e}")))?
            .map_err(|e| SupportError::Helpdesk(format!("{e:#}")))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn to_helpdesk_error(error: &anyhow::Error) -> SupportError {
    SupportError::Helpdesk(format!("{error:#}"))
}

#[async_trait]
impl HelpdeskApi for FreshdeskClient {
    #[inline]
    async fn filtered_tickets(
        &self,
        credentials: &HelpdeskCredentials,
        filter: TicketFilter,
        page: u32,
        per_page: u32,
    ) -> crate::Result<Vec<Ticket>> {
        let url = Self::build_url(
            credentials,
            "/api/v2/tickets",
            &[
                ("filter", filter.as_str().to_string()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ],
        )
        .map_err(|e| to_helpdesk_error(&e))?;
        self.fetch(credentials, url).await
    }

    #[inline]
    async fn search_by_status(
        &self,
        credentials: &HelpdeskCredentials,
        status: u8,
        page: u32,
    ) -> crate::Result<Vec<Ticket>> {
        let url = Self::build_url(
            credentials,
            "/api/v2/search/tickets",
            &[
                ("query", format!("\"status:{status}\"")),
                ("page", page.to_string()),
            ],
        )
        .map_err(|e| to_helpdesk_error(&e))?;
        let response: SearchResponse = self.fetch(credentials, url).await?;
        Ok(response.results)
    }

    #[inline]
    async fn list_recent(
        &self,
        credentials: &HelpdeskCredentials,
        page: u32,
        per_page: u32,
    ) -> crate::Result<Vec<Ticket>> {
        // Without updated_since the list endpoint only covers the last 30 days
        let url = Self::build_url(
            credentials,
            "/api/v2/tickets",
            &[
                ("order_by", "updated_at".to_string()),
                ("order_type", "desc".to_string()),
                ("updated_since", "2000-01-01T00:00:00Z".to_string()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ],
        )
        .map_err(|e| to_helpdesk_error(&e))?;
        self.fetch(credentials, url).await
    }

    #[inline]
    async fn ticket_thread(
        &self,
        credentials: &HelpdeskCredentials,
        ticket_id: u64,
    ) -> crate::Result<TicketThread> {
        let url = Self::build_url(
            credentials,
            &format!("/api/v2/tickets/{ticket_id}"),
            &[("include", "conversations".to_string())],
        )
        .map_err(|e| to_helpdesk_error(&e))?;
        self.fetch(credentials, url).await
    }
}
